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

//! Drift detection: four independent triggers that revoke authority.
//!
//! Triggers are evaluated per peer in a fixed order (hold duration, comms
//! staleness, confidence decay, belief divergence) and the first hit wins.
//! A peer fires at most once until its flag is reset, so a revocation chain
//! cannot re-enter itself.

use crate::core::types::{DriftReason, PeerId, Stance};
use std::collections::BTreeMap;

/// Accumulated observation state for one peer.
#[derive(Clone, Debug)]
pub struct DriftPeerState {
    /// When the peer began holding authority, if it does.
    pub hold_start: Option<u64>,
    /// Last communication time (ms).
    pub last_comms: u64,
    /// Last reported confidence.
    pub confidence: f64,
    /// Latest stance per claim.
    pub beliefs: BTreeMap<String, (Stance, f64)>,
    /// Divergence score from the last check.
    pub drift_score: f64,
    /// One-shot flag; set on first trigger, cleared by `reset`.
    pub triggered: bool,
}

impl Default for DriftPeerState {
    fn default() -> Self {
        Self {
            hold_start: None,
            last_comms: 0,
            // A peer is innocent of confidence decay until it reports.
            confidence: 1.0,
            beliefs: BTreeMap::new(),
            drift_score: 0.0,
            triggered: false,
        }
    }
}

/// A fired trigger.
#[derive(Clone, Debug, PartialEq)]
pub struct DriftEvent {
    /// Drifting peer.
    pub peer: PeerId,
    /// Which trigger fired.
    pub reason: DriftReason,
    /// Human-readable detail.
    pub details: String,
}

/// Detector thresholds.
#[derive(Clone, Copy, Debug)]
pub struct DriftParams {
    /// HOLD_TOO_LONG threshold.
    pub hold_drift_threshold_ms: u64,
    /// STALE_COMMS threshold.
    pub stale_comms_threshold_ms: u64,
    /// CONFIDENCE_DECAY threshold.
    pub confidence_drift_threshold: f64,
    /// BELIEF_DIVERGENCE threshold.
    pub belief_divergence_threshold: f64,
}

/// Watches peers for deviation from expected behavior.
#[derive(Debug)]
pub struct DriftDetector {
    params: DriftParams,
    peers: BTreeMap<PeerId, DriftPeerState>,
}

impl DriftDetector {
    /// New detector.
    pub fn new(params: DriftParams) -> Self {
        Self {
            params,
            peers: BTreeMap::new(),
        }
    }

    /// Record a communication from a peer.
    pub fn record_comms(&mut self, peer: &PeerId, confidence: f64, now: u64) {
        let st = self.peers.entry(peer.clone()).or_default();
        st.last_comms = now;
        st.confidence = confidence;
    }

    /// Record a communication without a confidence report (e.g. a relayed
    /// signal rather than a heartbeat).
    pub fn touch_comms(&mut self, peer: &PeerId, now: u64) {
        let st = self.peers.entry(peer.clone()).or_default();
        st.last_comms = now;
    }

    /// Record a peer's stance on a claim.
    pub fn record_belief(&mut self, peer: &PeerId, claim_hash: &str, stance: Stance, confidence: f64) {
        let st = self.peers.entry(peer.clone()).or_default();
        st.beliefs.insert(claim_hash.to_string(), (stance, confidence));
    }

    /// Mark the peer as holding authority from `now`.
    pub fn begin_hold(&mut self, peer: &PeerId, now: u64) {
        let st = self.peers.entry(peer.clone()).or_default();
        if st.hold_start.is_none() {
            st.hold_start = Some(now);
        }
    }

    /// Clear the hold marker (window expired or revoked).
    pub fn end_hold(&mut self, peer: &PeerId) {
        if let Some(st) = self.peers.get_mut(peer) {
            st.hold_start = None;
        }
    }

    /// Re-arm a peer's one-shot flag (after recontact or re-admission).
    pub fn reset(&mut self, peer: &PeerId) {
        if let Some(st) = self.peers.get_mut(peer) {
            st.triggered = false;
            st.drift_score = 0.0;
        }
    }

    /// Forget a peer entirely.
    pub fn forget(&mut self, peer: &PeerId) {
        self.peers.remove(peer);
    }

    /// Evaluate every non-triggered peer against the four triggers, in
    /// order. The first hit per peer sets its flag and produces an event.
    pub fn check(
        &mut self,
        consensus: &BTreeMap<String, (Stance, f64)>,
        now: u64,
    ) -> Vec<DriftEvent> {
        let params = self.params;
        let mut events = Vec::new();

        for (peer, st) in self.peers.iter_mut() {
            if st.triggered {
                continue;
            }

            if let Some(hold_start) = st.hold_start {
                let held = now.saturating_sub(hold_start);
                if held > params.hold_drift_threshold_ms {
                    st.triggered = true;
                    events.push(DriftEvent {
                        peer: peer.clone(),
                        reason: DriftReason::HoldTooLong,
                        details: format!("authority held {held}ms"),
                    });
                    continue;
                }
            }

            let silent = now.saturating_sub(st.last_comms);
            if silent > params.stale_comms_threshold_ms {
                st.triggered = true;
                events.push(DriftEvent {
                    peer: peer.clone(),
                    reason: DriftReason::StaleComms,
                    details: format!("silent {silent}ms"),
                });
                continue;
            }

            if st.confidence < params.confidence_drift_threshold {
                st.triggered = true;
                events.push(DriftEvent {
                    peer: peer.clone(),
                    reason: DriftReason::ConfidenceDecay,
                    details: format!("confidence {:.3}", st.confidence),
                });
                continue;
            }

            let score = divergence(&st.beliefs, consensus);
            st.drift_score = score;
            if score > params.belief_divergence_threshold {
                st.triggered = true;
                events.push(DriftEvent {
                    peer: peer.clone(),
                    reason: DriftReason::BeliefDivergence,
                    details: format!("divergence {score:.3}"),
                });
            }
        }

        events
    }

    /// Observation state for a peer.
    pub fn get(&self, peer: &PeerId) -> Option<&DriftPeerState> {
        self.peers.get(peer)
    }
}

/// Mean per-shared-claim divergence between a peer's stances and the
/// consensus view: 1.0 where non-unknown stances differ, |Δconfidence|
/// otherwise. Zero when no claims are shared.
fn divergence(
    peer_beliefs: &BTreeMap<String, (Stance, f64)>,
    consensus: &BTreeMap<String, (Stance, f64)>,
) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for (claim, (cons_stance, cons_conf)) in consensus.iter() {
        let Some((peer_stance, peer_conf)) = peer_beliefs.get(claim) else {
            continue;
        };
        let contribution = if peer_stance != cons_stance
            && *peer_stance != Stance::Unknown
            && *cons_stance != Stance::Unknown
        {
            1.0
        } else {
            (peer_conf - cons_conf).abs()
        };
        sum += contribution;
        n += 1;
    }
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}
