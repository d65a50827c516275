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

//! Per-claim belief store with bounded history.
//!
//! Resolution is last-writer-wins under the lexicographic order
//! `(timestamp, confidence)`, ties broken toward the incoming signal. The
//! outcome of applying a set of signals therefore depends only on the
//! maximal element, so peers that saw the same signals in any order
//! converge.

use crate::core::types::{Belief, BeliefSample, PeerId, Signal, Stance};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Retained history entries per claim.
pub const MAX_HISTORY: usize = 100;

/// Result of presenting a signal to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The signal replaced the current belief.
    Replaced,
    /// The prior belief won; nothing recorded.
    Kept,
}

/// Point-in-time copy of every belief.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BeliefSnapshot {
    /// Beliefs keyed by claim hash.
    pub beliefs: BTreeMap<String, Belief>,
}

/// In-memory belief store.
#[derive(Debug, Default)]
pub struct BeliefStore {
    beliefs: BTreeMap<String, Belief>,
    history: BTreeMap<String, VecDeque<BeliefSample>>,
}

impl BeliefStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current belief on a claim, if any.
    pub fn get(&self, claim_hash: &str) -> Option<&Belief> {
        self.beliefs.get(claim_hash)
    }

    /// All current beliefs, keyed by claim hash.
    pub fn all(&self) -> &BTreeMap<String, Belief> {
        &self.beliefs
    }

    /// Number of claims with a belief.
    pub fn len(&self) -> usize {
        self.beliefs.len()
    }

    /// True when no beliefs are held.
    pub fn is_empty(&self) -> bool {
        self.beliefs.is_empty()
    }

    /// Present a signal. The belief is replaced iff there is no prior
    /// belief, the signal is newer, or it is equally old with confidence at
    /// least the prior's. Otherwise the prior wins and no history entry is
    /// recorded.
    pub fn apply(&mut self, signal: &Signal) -> ApplyOutcome {
        let claim = &signal.payload.claim_hash;
        let incoming_ts = signal.timestamp;
        let incoming_conf = signal.payload.confidence;

        if let Some(prev) = self.beliefs.get(claim) {
            let newer = incoming_ts > prev.updated_at;
            let tie_wins = incoming_ts == prev.updated_at && incoming_conf >= prev.confidence;
            if !newer && !tie_wins {
                return ApplyOutcome::Kept;
            }
        }

        let belief = Belief {
            claim_hash: claim.clone(),
            stance: signal.payload.direction.stance(),
            confidence: incoming_conf,
            updated_at: incoming_ts,
            last_signal_id: signal.signal_id,
            last_source_id: signal.source_id.clone(),
        };

        let hist = self.history.entry(claim.clone()).or_default();
        hist.push_back(BeliefSample {
            timestamp: incoming_ts,
            stance: belief.stance,
            confidence: incoming_conf,
            signal_id: signal.signal_id,
            source_id: signal.source_id.clone(),
        });
        while hist.len() > MAX_HISTORY {
            hist.pop_front();
        }

        self.beliefs.insert(claim.clone(), belief);
        ApplyOutcome::Replaced
    }

    /// Accepted-update history for a claim, oldest first.
    pub fn get_history(&self, claim_hash: &str) -> Vec<BeliefSample> {
        self.history
            .get(claim_hash)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy of the current belief set.
    pub fn snapshot(&self) -> BeliefSnapshot {
        BeliefSnapshot {
            beliefs: self.beliefs.clone(),
        }
    }

    /// Replace the belief set from a snapshot. History is retained;
    /// `updated_at` may jump backward here, which is the one sanctioned
    /// exception to its monotonicity.
    pub fn restore(&mut self, snapshot: &BeliefSnapshot) {
        self.beliefs = snapshot.beliefs.clone();
    }

    /// Stance and confidence per claim, the store's consensus view.
    pub fn get_consensus(&self) -> BTreeMap<String, (Stance, f64)> {
        self.beliefs
            .iter()
            .map(|(claim, b)| (claim.clone(), (b.stance, b.confidence)))
            .collect()
    }

    /// The peer that most recently updated a claim, if any.
    pub fn last_source(&self, claim_hash: &str) -> Option<&PeerId> {
        self.beliefs.get(claim_hash).map(|b| &b.last_source_id)
    }
}
