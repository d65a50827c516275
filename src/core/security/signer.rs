// Copyright (c) 2026 Concord
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

//! Node signing identity: Ed25519 keypairs behind a backend trait.
//!
//! The governance core only needs the signing primitive; key distribution
//! and rotation live outside the crate. Keys persist as PKCS#8 with atomic
//! writes and best-effort private permissions; in-memory buffers are
//! zeroized after use.

use crate::core::types::PeerId;
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use thiserror::Error;
use zeroize::Zeroize;

/// Signer errors.
#[derive(Debug, Error)]
pub enum SignerError {
    /// Filesystem failure.
    #[error("io")]
    Io,
    /// Key bytes failed to parse.
    #[error("invalid key encoding")]
    InvalidKey,
    /// Key generation failure.
    #[error("crypto")]
    Crypto,
}

/// Signer backend abstraction (HSM compatible).
pub trait SignerBackend: Send + Sync {
    /// Ed25519 public key bytes.
    fn public_key(&self) -> [u8; 32];

    /// Sign message bytes.
    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, SignerError>;

    /// The peer identity this backend signs as.
    fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(&self.public_key())
    }
}

/// In-process Ed25519 backend.
pub struct Ed25519Signer {
    keypair: Ed25519KeyPair,
}

impl Ed25519Signer {
    /// Generate a fresh keypair.
    pub fn generate() -> Result<Self, SignerError> {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| SignerError::Crypto)?;
        let kp = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).map_err(|_| SignerError::InvalidKey)?;
        Ok(Self { keypair: kp })
    }

    /// Parse a PKCS#8 document.
    pub fn from_pkcs8(bytes: &[u8]) -> Result<Self, SignerError> {
        let kp = Ed25519KeyPair::from_pkcs8(bytes).map_err(|_| SignerError::InvalidKey)?;
        Ok(Self { keypair: kp })
    }

    /// Load `node.key` under `data_dir`, or generate and persist one.
    pub fn load_or_create(data_dir: impl AsRef<Path>) -> Result<Self, SignerError> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir).map_err(|_| SignerError::Io)?;
        let path = dir.join("node.key");

        if path.exists() {
            let mut bytes = fs::read(&path).map_err(|_| SignerError::Io)?;
            let res = Self::from_pkcs8(&bytes);
            bytes.zeroize();
            return res;
        }

        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| SignerError::Crypto)?;
        write_key_material(&path, pkcs8.as_ref())?;
        Self::from_pkcs8(pkcs8.as_ref())
    }
}

impl SignerBackend for Ed25519Signer {
    fn public_key(&self) -> [u8; 32] {
        let pk = self.keypair.public_key().as_ref();
        let mut out = [0u8; 32];
        out.copy_from_slice(pk);
        out
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, SignerError> {
        Ok(self.keypair.sign(msg).as_ref().to_vec())
    }
}

fn set_private_perms_best_effort(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
}

/// Atomic write for key material (best-effort fsync, then rename). Shared
/// by the node key and the transport identity.
pub(crate) fn write_key_material(path: &Path, bytes: &[u8]) -> Result<(), SignerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|_| SignerError::Io)?;
    }

    let mut tmp: PathBuf = path.to_path_buf();
    tmp.set_extension("tmp");

    {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .map_err(|_| SignerError::Io)?;
        f.write_all(bytes).map_err(|_| SignerError::Io)?;
        let _ = f.sync_all();
    }

    set_private_perms_best_effort(&tmp);
    fs::rename(&tmp, path).map_err(|_| SignerError::Io)?;
    set_private_perms_best_effort(path);
    Ok(())
}
