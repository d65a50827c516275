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

//! Signal acceptance pipeline: verify, TTL, dedup, forward.
//!
//! Acceptance order is fixed: quarantine gate, signature, TTL, dedup,
//! per-source id monotonicity. Exact duplicates drop silently; everything
//! else produces a rejection reason. The seen set is bounded; on overflow
//! the newest 90% survive (approximate FIFO).

use crate::core::codec::{dedup_key, verify_signal};
use crate::core::types::{PeerId, Signal};
use std::collections::{BTreeMap, HashSet, VecDeque};
use thiserror::Error;

/// Publish errors. Only a programmer-contract violation surfaces here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    /// The signal does not verify; it was never signed or was mutated.
    #[error("invalid signature")]
    InvalidSignature,
}

/// Outcome of presenting an incoming signal to the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub enum IncomingOutcome {
    /// Accepted; carries the forward copy unless TTL ran out or the local
    /// node is itself isolated.
    Accepted {
        /// TTL-decremented copy to re-broadcast, if any.
        forward: Option<Signal>,
    },
    /// Dropped with a reason (sender charged where the reason warrants it).
    Rejected {
        /// Why it was dropped.
        reason: RejectReason,
    },
    /// Exact duplicate; silently ignored, state unchanged.
    Duplicate,
}

/// Rejection causes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// Delivering peer is isolated.
    SenderQuarantined,
    /// Signature failed to verify (charges a reputation failure).
    InvalidSignature,
    /// TTL exhausted.
    TtlExpired,
    /// `signal_id` at or below the source's high-water mark.
    StaleSignalId,
}

impl RejectReason {
    /// Human-readable form for journals and callbacks.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::SenderQuarantined => "Sender quarantined",
            RejectReason::InvalidSignature => "Invalid signature",
            RejectReason::TtlExpired => "TTL expired",
            RejectReason::StaleSignalId => "Stale signal id",
        }
    }
}

/// Deduplication and forwarding state.
#[derive(Debug)]
pub struct Propagation {
    max_seen: usize,
    seen: HashSet<[u8; 32]>,
    seen_order: VecDeque<[u8; 32]>,
    /// Per-source high-water mark for `signal_id`.
    max_seen_id: BTreeMap<PeerId, u64>,
}

impl Propagation {
    /// New pipeline with the given seen-set cap.
    pub fn new(max_seen: usize) -> Self {
        Self {
            max_seen: max_seen.max(1),
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
            max_seen_id: BTreeMap::new(),
        }
    }

    /// Prepare a locally authored signal for broadcast. The signal MUST
    /// already verify; anything else is a caller bug surfaced as
    /// [`PublishError::InvalidSignature`].
    pub fn publish(&mut self, signal: &Signal) -> Result<(), PublishError> {
        if !verify_signal(signal) {
            return Err(PublishError::InvalidSignature);
        }
        self.mark_seen(dedup_key(signal));
        self.bump_high_water(&signal.source_id, signal.signal_id);
        Ok(())
    }

    /// Run the acceptance pipeline on an incoming signal.
    ///
    /// `sender_quarantined` and `self_quarantined` reflect the quarantine
    /// list at the delivery instant; the pipeline itself holds no peer
    /// state beyond dedup bookkeeping.
    pub fn on_incoming(
        &mut self,
        signal: &Signal,
        sender_quarantined: bool,
        self_quarantined: bool,
    ) -> IncomingOutcome {
        if sender_quarantined {
            return IncomingOutcome::Rejected {
                reason: RejectReason::SenderQuarantined,
            };
        }

        if !verify_signal(signal) {
            return IncomingOutcome::Rejected {
                reason: RejectReason::InvalidSignature,
            };
        }

        if signal.ttl == 0 {
            return IncomingOutcome::Rejected {
                reason: RejectReason::TtlExpired,
            };
        }

        let key = dedup_key(signal);
        if self.seen.contains(&key) {
            return IncomingOutcome::Duplicate;
        }

        // Replay tightening: a signal at or below the source's high-water
        // mark is not a fresh utterance even if its payload differs.
        if let Some(max) = self.max_seen_id.get(&signal.source_id) {
            if signal.signal_id <= *max {
                return IncomingOutcome::Rejected {
                    reason: RejectReason::StaleSignalId,
                };
            }
        }

        self.mark_seen(key);
        self.bump_high_water(&signal.source_id, signal.signal_id);

        let forward = if self_quarantined {
            None
        } else {
            let mut copy = signal.clone();
            copy.ttl = copy.ttl.saturating_sub(1);
            Some(copy)
        };

        IncomingOutcome::Accepted { forward }
    }

    /// Whether a signal's dedup key has been seen.
    pub fn has_seen(&self, signal: &Signal) -> bool {
        self.seen.contains(&dedup_key(signal))
    }

    /// Seen-set size.
    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    fn mark_seen(&mut self, key: [u8; 32]) {
        if self.seen.insert(key) {
            self.seen_order.push_back(key);
        }
        if self.seen.len() > self.max_seen {
            // Drop the oldest 10%; the newest 90% survive.
            let drop_n = (self.max_seen / 10).max(1);
            for _ in 0..drop_n {
                match self.seen_order.pop_front() {
                    Some(old) => {
                        self.seen.remove(&old);
                    }
                    None => break,
                }
            }
        }
    }

    fn bump_high_water(&mut self, source: &PeerId, signal_id: u64) {
        let entry = self.max_seen_id.entry(source.clone()).or_insert(0);
        if signal_id > *entry {
            *entry = signal_id;
        }
    }
}
