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

//! Canonical serialization and signal signing.
//!
//! Signed and hashed forms are hand-built JSON with a fixed field order and
//! no insignificant whitespace:
//!
//! ```text
//! {"source_id":...,"signal_id":...,"timestamp":...,"domain":...,
//!  "signal_type":...,"payload":{"claim_hash":...,"direction":...,
//!  "confidence":...,"evidence_hash":...},"ttl":0,"scope":...,
//!  "prior_signal":...}
//! ```
//!
//! Signatures are Ed25519 over `SHA-256(utf8(canonical))`; the verifying key
//! is the signal's `source_id`. The `ttl` slot is pinned to zero in the
//! signed form so a forwarded (decremented) copy still verifies. Free-form
//! journal data is canonicalized by `serde_json`'s sorted-key map rendering;
//! floats render in their shortest round-trip decimal form.

use crate::core::security::signer::{SignerBackend, SignerError};
use crate::core::types::{LogKind, PeerId, Signal};
use ring::digest;
use ring::signature::{UnparsedPublicKey, ED25519};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Signing backend failure.
    #[error("signing")]
    Signing,
    /// Value cannot be rendered canonically.
    #[error("canonicalize")]
    Canonicalize,
}

impl From<SignerError> for CodecError {
    fn from(_: SignerError) -> Self {
        CodecError::Signing
    }
}

/// SHA-256 over raw bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let d = digest::digest(&digest::SHA256, data);
    let mut out = [0u8; 32];
    out.copy_from_slice(d.as_ref());
    out
}

/// SHA-256 over raw bytes, hex encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Constant-time digest comparison.
pub fn digests_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn json_str(s: &str) -> String {
    // serde_json string rendering handles all escaping.
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn json_opt_str(s: Option<&str>) -> String {
    match s {
        Some(v) => json_str(v),
        None => "null".to_string(),
    }
}

fn json_f64(v: f64) -> String {
    match serde_json::Number::from_f64(v) {
        Some(n) => n.to_string(),
        // Non-finite confidences never enter a signed form; render as zero
        // rather than producing invalid JSON.
        None => "0".to_string(),
    }
}

/// Canonical rendering of an arbitrary JSON value: sorted object keys, no
/// whitespace, shortest-round-trip numbers.
pub fn canonical_value(v: &serde_json::Value) -> String {
    // serde_json maps are BTreeMaps, so `to_string` is already sorted-key
    // and whitespace-free.
    serde_json::to_string(v).unwrap_or_else(|_| "null".to_string())
}

/// The canonical (signed) form of a signal. The signature field is not part
/// of the form.
pub fn canonical_signal(s: &Signal) -> String {
    let mut out = String::with_capacity(256);
    out.push_str("{\"source_id\":");
    out.push_str(&json_str(s.source_id.as_str()));
    out.push_str(",\"signal_id\":");
    out.push_str(&s.signal_id.to_string());
    out.push_str(",\"timestamp\":");
    out.push_str(&s.timestamp.to_string());
    out.push_str(",\"domain\":");
    out.push_str(&json_str(&s.domain));
    out.push_str(",\"signal_type\":");
    out.push_str(&json_str(s.signal_type.as_str()));
    out.push_str(",\"payload\":");
    out.push_str(&canonical_payload(s));
    // The hop count is volatile: every forward decrements it, and a signed
    // form covering it would invalidate honest relays one hop out. The
    // field keeps its canonical position but is rendered as zero.
    out.push_str(",\"ttl\":0");
    out.push_str(",\"scope\":");
    out.push_str(&json_str(s.scope.as_str()));
    out.push_str(",\"prior_signal\":");
    out.push_str(&json_opt_str(s.prior_signal.as_deref()));
    out.push('}');
    out
}

fn canonical_payload(s: &Signal) -> String {
    let p = &s.payload;
    let mut out = String::with_capacity(128);
    out.push_str("{\"claim_hash\":");
    out.push_str(&json_str(&p.claim_hash));
    out.push_str(",\"direction\":");
    out.push_str(&json_str(p.direction.as_str()));
    out.push_str(",\"confidence\":");
    out.push_str(&json_f64(p.confidence));
    out.push_str(",\"evidence_hash\":");
    out.push_str(&json_opt_str(p.evidence_hash.as_deref()));
    out.push('}');
    out
}

/// Digest a signal's canonical form.
pub fn signal_digest(s: &Signal) -> [u8; 32] {
    sha256(canonical_signal(s).as_bytes())
}

/// Deduplication key: digest over the identity-bearing subset
/// `{source_id, signal_id, payload, domain}`. TTL and signature are
/// excluded so a forwarded copy deduplicates against the original.
pub fn dedup_key(s: &Signal) -> [u8; 32] {
    let mut out = String::with_capacity(160);
    out.push_str("{\"source_id\":");
    out.push_str(&json_str(s.source_id.as_str()));
    out.push_str(",\"signal_id\":");
    out.push_str(&s.signal_id.to_string());
    out.push_str(",\"payload\":");
    out.push_str(&canonical_payload(s));
    out.push_str(",\"domain\":");
    out.push_str(&json_str(&s.domain));
    out.push('}');
    sha256(out.as_bytes())
}

/// Sign a signal in place with the node keystore.
pub fn sign_signal<B: SignerBackend>(backend: &B, signal: &mut Signal) -> Result<(), CodecError> {
    let digest = signal_digest(signal);
    let sig = backend.sign(&digest)?;
    signal.signature = hex::encode(sig);
    Ok(())
}

/// Verify a signal signature against its `source_id`.
///
/// Returns false on malformed hex, wrong key or signature length, or
/// algebraic failure. Never panics.
pub fn verify_signal(signal: &Signal) -> bool {
    let Some(pk_bytes) = signal.source_id.as_public_key_bytes() else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(&signal.signature) else {
        return false;
    };
    if sig_bytes.len() != 64 {
        return false;
    }
    let digest = signal_digest(signal);
    let pk = UnparsedPublicKey::new(&ED25519, pk_bytes);
    pk.verify(&digest, &sig_bytes).is_ok()
}

/// Canonical body of a journal entry (the hashed form, `hash` excluded).
pub fn canonical_log_entry(
    i: u64,
    ts: u64,
    kind: LogKind,
    peer: Option<&PeerId>,
    data: &serde_json::Value,
    prev: Option<&str>,
) -> String {
    let kind_json = serde_json::to_string(&kind).unwrap_or_else(|_| "\"IN\"".to_string());
    let mut out = String::with_capacity(128 + data.to_string().len());
    out.push_str("{\"i\":");
    out.push_str(&i.to_string());
    out.push_str(",\"ts\":");
    out.push_str(&ts.to_string());
    out.push_str(",\"kind\":");
    out.push_str(&kind_json);
    out.push_str(",\"peer\":");
    out.push_str(&json_opt_str(peer.map(|p| p.as_str())));
    out.push_str(",\"data\":");
    out.push_str(&canonical_value(data));
    out.push_str(",\"prev\":");
    out.push_str(&json_opt_str(prev));
    out.push('}');
    out
}
