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

//! Exponential-backoff peer isolation.
//!
//! A quarantined peer keeps receiving traffic; only its propagation and
//! influence are zeroed. Duration doubles per recorded violation:
//! `base · 2^(violations − 1)`.

use crate::core::types::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One isolation entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    /// Isolated peer.
    pub peer: PeerId,
    /// Human-readable cause.
    pub reason: String,
    /// Entry time (ms).
    pub quarantined_at: u64,
    /// Expiry time (ms).
    pub expires_at: u64,
    /// Violation count at entry (drives the backoff exponent).
    pub violations: u32,
}

/// Isolation list with lazy expiry.
#[derive(Debug)]
pub struct QuarantineList {
    base_ms: u64,
    entries: BTreeMap<PeerId, QuarantineEntry>,
}

impl QuarantineList {
    /// New list with the given first-offense duration.
    pub fn new(base_ms: u64) -> Self {
        Self {
            base_ms,
            entries: BTreeMap::new(),
        }
    }

    /// Isolate a peer. A repeat offender's count carries over, doubling the
    /// duration each time. Replaces any prior entry.
    pub fn quarantine(&mut self, peer: &PeerId, reason: &str, now: u64) -> QuarantineEntry {
        let violations = self
            .entries
            .get(peer)
            .map(|e| e.violations)
            .unwrap_or(0)
            .saturating_add(1);
        let exponent = violations.saturating_sub(1).min(16);
        let duration = self.base_ms.saturating_mul(1u64 << exponent);
        let entry = QuarantineEntry {
            peer: peer.clone(),
            reason: reason.to_string(),
            quarantined_at: now,
            expires_at: now.saturating_add(duration),
            violations,
        };
        self.entries.insert(peer.clone(), entry.clone());
        entry
    }

    /// Whether the peer is currently isolated. Expired entries self-release.
    pub fn is_quarantined(&mut self, peer: &PeerId, now: u64) -> bool {
        match self.entries.get(peer) {
            Some(e) if now < e.expires_at => true,
            Some(_) => {
                self.entries.remove(peer);
                false
            }
            None => false,
        }
    }

    /// Non-mutating check (expired entries count as released).
    pub fn is_quarantined_at(&self, peer: &PeerId, now: u64) -> bool {
        self.entries
            .get(peer)
            .map(|e| now < e.expires_at)
            .unwrap_or(false)
    }

    /// Influence multiplier: 0 while isolated, else 1.
    pub fn get_influence_multiplier(&self, peer: &PeerId, now: u64) -> f64 {
        if self.is_quarantined_at(peer, now) {
            0.0
        } else {
            1.0
        }
    }

    /// Remove expired entries, returning the released peers.
    pub fn sweep(&mut self, now: u64) -> Vec<QuarantineEntry> {
        let released: Vec<QuarantineEntry> = self
            .entries
            .values()
            .filter(|e| now >= e.expires_at)
            .cloned()
            .collect();
        for e in &released {
            self.entries.remove(&e.peer);
        }
        released
    }

    /// Entry for a peer, expired or not.
    pub fn get(&self, peer: &PeerId) -> Option<&QuarantineEntry> {
        self.entries.get(peer)
    }

    /// Active entry count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no peers are isolated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
