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

//! Conflict detection: normalized stance entropy per claim.
//!
//! Each claim accumulates one stance observation per peer. The conflict
//! score is the Shannon entropy of the non-unknown stance distribution,
//! normalized by `log2(max(2, unique))` and clamped to \[0, 1\]. A score of
//! zero means at most one position is in play.

use crate::core::types::{PeerId, Stance};
use std::collections::BTreeMap;

/// One peer's recorded position on a claim.
#[derive(Clone, Debug, PartialEq)]
pub struct StanceObservation {
    /// Position.
    pub stance: Stance,
    /// Confidence in the position.
    pub confidence: f64,
    /// When it was observed (ms).
    pub ts: u64,
}

/// Per-claim conflict state.
#[derive(Clone, Debug, Default)]
pub struct ConflictRecord {
    /// Optional application meaning string.
    pub meaning: Option<String>,
    /// Latest observation per peer.
    pub stances: BTreeMap<PeerId, StanceObservation>,
    /// Histogram over stances, rebuilt on every observation.
    pub counts: BTreeMap<Stance, usize>,
    /// Normalized entropy in \[0, 1\].
    pub score: f64,
}

/// Signals the accumulator emits back to the node.
#[derive(Clone, Debug, PartialEq)]
pub enum ConflictChange {
    /// The score crossed the divergence threshold upward.
    Detected {
        /// Contested claim.
        claim_hash: String,
        /// Score at crossing.
        score: f64,
    },
    /// A contested claim was settled.
    Resolved {
        /// Settled claim.
        claim_hash: String,
    },
}

/// Accumulates stance distributions and scores disagreement.
#[derive(Debug)]
pub struct ConflictAccumulator {
    records: BTreeMap<String, ConflictRecord>,
    threshold: f64,
}

impl ConflictAccumulator {
    /// New accumulator with the given divergence threshold.
    pub fn new(threshold: f64) -> Self {
        Self {
            records: BTreeMap::new(),
            threshold,
        }
    }

    /// Record one peer's position on a claim. Returns a change notification
    /// when the score crosses the threshold upward from below.
    pub fn observe_belief(
        &mut self,
        peer: &PeerId,
        claim_hash: &str,
        stance: Stance,
        confidence: f64,
        ts: u64,
        meaning: Option<&str>,
    ) -> Option<ConflictChange> {
        let rec = self.records.entry(claim_hash.to_string()).or_default();
        if let Some(m) = meaning {
            if !m.is_empty() {
                rec.meaning = Some(m.to_string());
            }
        }
        rec.stances.insert(
            peer.clone(),
            StanceObservation {
                stance,
                confidence,
                ts,
            },
        );

        rec.counts.clear();
        for obs in rec.stances.values() {
            *rec.counts.entry(obs.stance).or_insert(0) += 1;
        }

        let prev_score = rec.score;
        rec.score = score_distribution(&rec.counts, rec.stances.len());

        if prev_score < self.threshold && rec.score >= self.threshold {
            return Some(ConflictChange::Detected {
                claim_hash: claim_hash.to_string(),
                score: rec.score,
            });
        }
        None
    }

    /// Settle a claim: zero the score and clear the distribution.
    pub fn resolve(&mut self, claim_hash: &str) -> Option<ConflictChange> {
        let rec = self.records.get_mut(claim_hash)?;
        rec.stances.clear();
        rec.counts.clear();
        rec.score = 0.0;
        Some(ConflictChange::Resolved {
            claim_hash: claim_hash.to_string(),
        })
    }

    /// Current score for a claim (0 when untracked).
    pub fn score(&self, claim_hash: &str) -> f64 {
        self.records.get(claim_hash).map(|r| r.score).unwrap_or(0.0)
    }

    /// The record for a claim, if tracked.
    pub fn get(&self, claim_hash: &str) -> Option<&ConflictRecord> {
        self.records.get(claim_hash)
    }

    /// Claims currently scoring at or above the threshold.
    pub fn contested(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|(_, r)| r.score >= self.threshold)
            .map(|(c, _)| c.as_str())
            .collect()
    }

    /// Drop records whose newest observation predates `now - horizon_ms`.
    pub fn prune(&mut self, now: u64, horizon_ms: u64) {
        let cutoff = now.saturating_sub(horizon_ms);
        self.records.retain(|_, rec| {
            rec.stances
                .values()
                .map(|o| o.ts)
                .max()
                .map(|newest| newest >= cutoff)
                .unwrap_or(false)
        });
    }

    /// Number of tracked claims.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no claims are tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Normalized entropy of a stance histogram. Unknown stances count toward
/// the total but not the distribution.
fn score_distribution(counts: &BTreeMap<Stance, usize>, total: usize) -> f64 {
    let unique = counts
        .iter()
        .filter(|(s, n)| **s != Stance::Unknown && **n > 0)
        .count();
    if total <= 1 || unique <= 1 {
        return 0.0;
    }

    let total_f = total as f64;
    let mut entropy = 0.0;
    for (stance, n) in counts.iter() {
        if *stance == Stance::Unknown || *n == 0 {
            continue;
        }
        let p = *n as f64 / total_f;
        entropy -= p * p.log2();
    }

    let norm = (unique.max(2) as f64).log2();
    (entropy / norm).min(1.0)
}
