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

//! Stance checkpoint rounds.
//!
//! A checkpoint round broadcasts a request for peers' current stances on a
//! claim and collects the responses until the prune horizon. Responders
//! answer point-to-point with their stance or `(unknown, 0)` when they hold
//! none.

use crate::core::beliefs::BeliefStore;
use crate::core::types::{PeerId, Stance};
use crate::networking::wire::Message;
use crate::networking::Outbound;
use std::collections::BTreeMap;

/// A collected response.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckpointResponse {
    /// Responding peer.
    pub peer: PeerId,
    /// Its stance.
    pub stance: Stance,
    /// Its confidence.
    pub confidence: f64,
    /// Optional application meaning.
    pub meaning: Option<String>,
}

/// An open round.
#[derive(Clone, Debug, Default)]
pub struct PendingCheckpoint {
    /// When the round opened (ms).
    pub requested_at: u64,
    /// Responses so far, in arrival order.
    pub responses: Vec<CheckpointResponse>,
}

/// Tracks open rounds keyed by claim.
#[derive(Debug)]
pub struct CheckpointTracker {
    max_age_ms: u64,
    pending: BTreeMap<String, PendingCheckpoint>,
}

impl CheckpointTracker {
    /// New tracker with the given prune horizon.
    pub fn new(max_age_ms: u64) -> Self {
        Self {
            max_age_ms,
            pending: BTreeMap::new(),
        }
    }

    /// Open a round for a claim (re-opening resets it) and produce the
    /// request broadcast.
    pub fn request(&mut self, self_id: &PeerId, claim_hash: &str, now: u64) -> Outbound {
        self.pending.insert(
            claim_hash.to_string(),
            PendingCheckpoint {
                requested_at: now,
                responses: Vec::new(),
            },
        );
        Outbound::Broadcast(Message::CheckpointReq {
            from: self_id.clone(),
            ts: now,
            claim_hash: claim_hash.to_string(),
        })
    }

    /// Answer a peer's request from our belief store.
    pub fn on_request(
        &self,
        self_id: &PeerId,
        from: &PeerId,
        claim_hash: &str,
        beliefs: &BeliefStore,
        now: u64,
    ) -> Outbound {
        let (stance, confidence) = beliefs
            .get(claim_hash)
            .map(|b| (b.stance, b.confidence))
            .unwrap_or((Stance::Unknown, 0.0));
        Outbound::Send(
            from.clone(),
            Message::CheckpointResp {
                from: self_id.clone(),
                ts: now,
                claim_hash: claim_hash.to_string(),
                stance,
                confidence,
                meaning: Some(String::new()),
            },
        )
    }

    /// Record a response for an open round. Returns it when the round is
    /// known (unsolicited responses are dropped).
    pub fn on_response(
        &mut self,
        from: &PeerId,
        claim_hash: &str,
        stance: Stance,
        confidence: f64,
        meaning: Option<&str>,
    ) -> Option<&CheckpointResponse> {
        let round = self.pending.get_mut(claim_hash)?;
        round.responses.push(CheckpointResponse {
            peer: from.clone(),
            stance,
            confidence,
            meaning: meaning.map(|m| m.to_string()),
        });
        round.responses.last()
    }

    /// Drop rounds past the horizon, returning the claims closed.
    pub fn prune(&mut self, now: u64) -> Vec<String> {
        let cutoff = now.saturating_sub(self.max_age_ms);
        let closed: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, round)| round.requested_at < cutoff)
            .map(|(claim, _)| claim.clone())
            .collect();
        for claim in &closed {
            self.pending.remove(claim);
        }
        closed
    }

    /// The open round for a claim, if any.
    pub fn get(&self, claim_hash: &str) -> Option<&PendingCheckpoint> {
        self.pending.get(claim_hash)
    }

    /// Open round count.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when no rounds are open.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
