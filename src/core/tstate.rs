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

//! Swarm degradation ladder.
//!
//! The node-wide T-state is recomputed from the staleness and confidence of
//! peer observations: the staler the quietest peer, the deeper the
//! degradation. T4 is an explicit recontact mode entered from T2/T3 and left
//! only by completing recontact (or a forced transition).

use crate::core::types::{PeerId, TState};
use std::collections::BTreeMap;

/// Latest liveness observation for one peer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeerObservation {
    /// Observation time (ms).
    pub ts: u64,
    /// Reported confidence.
    pub confidence: f64,
}

/// A completed transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TStateChange {
    /// Level before.
    pub from: TState,
    /// Level after.
    pub to: TState,
}

/// Holds the singleton state plus the observation map.
#[derive(Debug)]
pub struct TStateManager {
    state: TState,
    observations: BTreeMap<PeerId, PeerObservation>,
    stale_threshold_ms: u64,
}

impl TStateManager {
    /// Start healthy.
    pub fn new(stale_threshold_ms: u64) -> Self {
        Self {
            state: TState::T0,
            observations: BTreeMap::new(),
            stale_threshold_ms,
        }
    }

    /// Current level.
    pub fn state(&self) -> TState {
        self.state
    }

    /// Record a peer observation.
    pub fn observe(&mut self, peer: &PeerId, confidence: f64, ts: u64) {
        self.observations
            .insert(peer.clone(), PeerObservation { ts, confidence });
    }

    /// Forget a peer (dropped from membership).
    pub fn forget(&mut self, peer: &PeerId) {
        self.observations.remove(peer);
    }

    /// Recompute the level from observations. No observations means no
    /// evidence of degradation, so a lone node stays at T0. While recontact
    /// is in progress (T4) the ladder is suspended.
    pub fn update(&mut self, now: u64) -> Option<TStateChange> {
        if self.state == TState::T4 {
            return None;
        }
        if self.observations.is_empty() {
            return self.transition(TState::T0);
        }

        let max_stale = self
            .observations
            .values()
            .map(|o| now.saturating_sub(o.ts))
            .max()
            .unwrap_or(0);
        let min_conf = self
            .observations
            .values()
            .map(|o| o.confidence)
            .fold(f64::INFINITY, f64::min);

        let unit = self.stale_threshold_ms;
        let next = if max_stale > 3 * unit {
            TState::T3
        } else if max_stale > 2 * unit {
            TState::T2
        } else if max_stale > unit || min_conf < 0.5 {
            TState::T1
        } else {
            TState::T0
        };
        self.transition(next)
    }

    /// Force an external transition (tests, operator recontact).
    pub fn force(&mut self, state: TState) -> Option<TStateChange> {
        self.transition(state)
    }

    /// Begin recontact: T2/T3 → T4. No-op from other levels.
    pub fn initiate_recontact(&mut self) -> Option<TStateChange> {
        if matches!(self.state, TState::T2 | TState::T3) {
            self.transition(TState::T4)
        } else {
            None
        }
    }

    /// Finish recontact: T4 → T0. No-op from other levels.
    pub fn complete_recontact(&mut self) -> Option<TStateChange> {
        if self.state == TState::T4 {
            self.transition(TState::T0)
        } else {
            None
        }
    }

    /// Authority multiplier at the current level.
    pub fn multiplier(&self) -> f64 {
        self.state.multiplier()
    }

    /// Whether fresh authority may be granted now.
    pub fn can_grant_new_authority(&self) -> bool {
        self.state.can_grant_new_authority()
    }

    /// Whether pattern bundles may be propagated now.
    pub fn can_propagate_learning(&self) -> bool {
        self.state.can_propagate_learning()
    }

    fn transition(&mut self, next: TState) -> Option<TStateChange> {
        if next == self.state {
            return None;
        }
        let change = TStateChange {
            from: self.state,
            to: next,
        };
        self.state = next;
        Some(change)
    }
}
