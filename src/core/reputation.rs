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

//! Progressive peer trust.
//!
//! Score = `clamp01(0.4·accuracy + 0.3·consistency + 0.2·min(1, age/100)
//! − 0.1·violations)`. Influence maps score into
//! `[new_peer_influence, 1]` so a fresh peer never starts at zero and an
//! established peer never exceeds one.

use crate::core::types::{clamp01, PeerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tunables for the ledger.
#[derive(Clone, Copy, Debug)]
pub struct ReputationParams {
    /// Influence floor for fresh peers.
    pub new_peer_influence: f64,
    /// Minimum score required to vote.
    pub min_reputation_for_vote: f64,
}

impl Default for ReputationParams {
    fn default() -> Self {
        Self {
            new_peer_influence: 0.1,
            min_reputation_for_vote: 0.2,
        }
    }
}

/// Per-peer trust state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReputationRecord {
    /// Fraction of verifiable interactions that checked out, in \[0, 1\].
    pub accuracy: f64,
    /// Behavioral steadiness, in \[0, 1\].
    pub consistency: f64,
    /// Interaction count (saturates in the score at 100).
    pub age: u64,
    /// Recorded violations.
    pub violations: u32,
    /// Derived score in \[0, 1\].
    pub score: f64,
    /// Last update (ms).
    pub last_updated: u64,
}

impl ReputationRecord {
    fn recompute(&mut self) {
        let age_factor = (self.age as f64 / 100.0).min(1.0);
        let base = 0.4 * self.accuracy + 0.3 * self.consistency + 0.2 * age_factor;
        self.score = clamp01(base - 0.1 * self.violations as f64);
    }
}

/// Trust ledger over all known peers.
#[derive(Debug)]
pub struct ReputationLedger {
    params: ReputationParams,
    records: BTreeMap<PeerId, ReputationRecord>,
}

impl ReputationLedger {
    /// New ledger.
    pub fn new(params: ReputationParams) -> Self {
        Self {
            params,
            records: BTreeMap::new(),
        }
    }

    /// Start tracking a peer if not already tracked.
    pub fn track(&mut self, peer: &PeerId, now: u64) -> &ReputationRecord {
        let params = self.params;
        // A fresh peer starts at the influence floor, not the formula value;
        // the first recorded interaction recomputes.
        self.records
            .entry(peer.clone())
            .or_insert_with(|| ReputationRecord {
                accuracy: 0.5,
                consistency: 0.5,
                age: 0,
                violations: 0,
                score: params.new_peer_influence,
                last_updated: now,
            })
    }

    /// A verifiable interaction checked out.
    pub fn record_success(&mut self, peer: &PeerId, now: u64) {
        self.track(peer, now);
        if let Some(rec) = self.records.get_mut(peer) {
            rec.accuracy = (rec.accuracy + 0.05).min(1.0);
            rec.last_updated = now;
            rec.recompute();
        }
    }

    /// A verifiable interaction failed (bad signature, broken promise).
    pub fn record_failure(&mut self, peer: &PeerId, now: u64) {
        self.track(peer, now);
        if let Some(rec) = self.records.get_mut(peer) {
            rec.accuracy = (rec.accuracy - 0.10).max(0.0);
            rec.last_updated = now;
            rec.recompute();
        }
    }

    /// Steady behavior observed (heartbeat on time, stable stance).
    pub fn record_consistency(&mut self, peer: &PeerId, now: u64) {
        self.track(peer, now);
        if let Some(rec) = self.records.get_mut(peer) {
            rec.consistency = (rec.consistency + 0.02).min(1.0);
            rec.age = rec.age.saturating_add(1);
            rec.last_updated = now;
            rec.recompute();
        }
    }

    /// A violation was attributed to the peer. Costs a flat 0.20 of score.
    pub fn record_violation(&mut self, peer: &PeerId, _reason: &str, now: u64) {
        self.track(peer, now);
        if let Some(rec) = self.records.get_mut(peer) {
            rec.violations = rec.violations.saturating_add(1);
            rec.score = (rec.score - 0.20).max(0.0);
            rec.last_updated = now;
        }
    }

    /// Current score (influence floor for unknown peers).
    pub fn get_score(&self, peer: &PeerId) -> f64 {
        self.records
            .get(peer)
            .map(|r| r.score)
            .unwrap_or(self.params.new_peer_influence)
    }

    /// Effective vote weight in `[new_peer_influence, 1]`.
    pub fn get_influence(&self, peer: &PeerId) -> f64 {
        let floor = self.params.new_peer_influence;
        floor + (1.0 - floor) * self.get_score(peer)
    }

    /// Whether the peer clears the voting gate.
    pub fn can_vote(&self, peer: &PeerId) -> bool {
        self.get_score(peer) >= self.params.min_reputation_for_vote
    }

    /// Violation count (0 for unknown peers).
    pub fn violations(&self, peer: &PeerId) -> u32 {
        self.records.get(peer).map(|r| r.violations).unwrap_or(0)
    }

    /// The record for a peer, if tracked.
    pub fn get(&self, peer: &PeerId) -> Option<&ReputationRecord> {
        self.records.get(peer)
    }

    /// Whether the peer is already tracked.
    pub fn is_tracked(&self, peer: &PeerId) -> bool {
        self.records.contains_key(peer)
    }

    /// Tracked peer count.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no peers are tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
