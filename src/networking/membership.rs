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

//! Peer liveness and the bounded peer set.
//!
//! Heartbeats go out every interval, peer lists every two intervals. A peer
//! is alive while it was heard from inside the timeout window. Listed peers
//! from PEER_LIST are a liveness hint only; trust never travels
//! transitively.

use crate::core::types::{PeerId, TState};
use crate::networking::wire::{Message, PeerEntry};
use crate::networking::Outbound;
use std::collections::BTreeMap;

/// Liveness state for one peer.
#[derive(Clone, Debug, PartialEq)]
pub struct PeerInfo {
    /// Last time we heard from (or of) the peer (ms).
    pub last_seen: u64,
    /// Inside the timeout window.
    pub alive: bool,
    /// Last reported confidence.
    pub confidence: f64,
    /// Last reported degradation level.
    pub t_state: Option<TState>,
}

/// Membership tunables.
#[derive(Clone, Copy, Debug)]
pub struct MembershipParams {
    /// Heartbeat cadence.
    pub heartbeat_interval_ms: u64,
    /// Liveness window.
    pub peer_timeout_ms: u64,
    /// Peer set cap.
    pub max_peers: usize,
}

/// Tracks the peer set and produces periodic beacons.
#[derive(Debug)]
pub struct Membership {
    params: MembershipParams,
    peers: BTreeMap<PeerId, PeerInfo>,
    last_heartbeat_at: u64,
    last_peer_list_at: u64,
}

impl Membership {
    /// Empty membership.
    pub fn new(params: MembershipParams) -> Self {
        Self {
            params,
            peers: BTreeMap::new(),
            last_heartbeat_at: 0,
            last_peer_list_at: 0,
        }
    }

    /// Record contact with a peer. Returns true on first contact.
    pub fn observe(
        &mut self,
        peer: &PeerId,
        confidence: Option<f64>,
        t_state: Option<TState>,
        now: u64,
    ) -> bool {
        let newly_seen = !self.peers.contains_key(peer);
        let info = self.peers.entry(peer.clone()).or_insert(PeerInfo {
            last_seen: now,
            alive: true,
            confidence: 0.5,
            t_state: None,
        });
        info.last_seen = now;
        info.alive = true;
        if let Some(c) = confidence {
            info.confidence = c;
        }
        if let Some(t) = t_state {
            info.t_state = Some(t);
        }
        newly_seen
    }

    /// Drop a peer (admission refusal or cap enforcement).
    pub fn remove(&mut self, peer: &PeerId) {
        self.peers.remove(peer);
    }

    /// HELLO handler: observe the sender and the peers it announced, then
    /// reply point-to-point with our alive set.
    pub fn on_hello(
        &mut self,
        self_id: &PeerId,
        from: &PeerId,
        known_peers: &[PeerId],
        t_state: Option<TState>,
        now: u64,
    ) -> Outbound {
        self.observe(from, None, t_state, now);
        for p in known_peers {
            if p != self_id {
                self.observe(p, None, None, now);
            }
        }
        Outbound::Send(
            from.clone(),
            Message::PeerList {
                from: self_id.clone(),
                ts: now,
                peers: self.alive_entries(),
            },
        )
    }

    /// HEARTBEAT handler.
    pub fn on_heartbeat(
        &mut self,
        from: &PeerId,
        t_state: Option<TState>,
        confidence: Option<f64>,
        now: u64,
    ) {
        self.observe(from, confidence, t_state, now);
    }

    /// PEER_LIST handler: the sender is a first-class observation, the
    /// listed peers only a liveness hint.
    pub fn on_peer_list(&mut self, self_id: &PeerId, from: &PeerId, entries: &[PeerEntry], now: u64) {
        self.observe(from, None, None, now);
        for entry in entries {
            if &entry.id != self_id {
                self.observe(&entry.id, entry.confidence, None, now);
            }
        }
    }

    /// Periodic work: beacons, liveness recomputation, cap enforcement.
    /// Returns outbound messages plus any peers dropped by the cap.
    pub fn tick(
        &mut self,
        self_id: &PeerId,
        self_t_state: TState,
        self_confidence: f64,
        now: u64,
    ) -> (Vec<Outbound>, Vec<PeerId>) {
        let mut out = Vec::new();

        if now.saturating_sub(self.last_heartbeat_at) >= self.params.heartbeat_interval_ms {
            self.last_heartbeat_at = now;
            out.push(Outbound::Broadcast(Message::Heartbeat {
                from: self_id.clone(),
                ts: now,
                t_state: Some(self_t_state),
                confidence: Some(self_confidence),
            }));
        }

        if now.saturating_sub(self.last_peer_list_at) >= 2 * self.params.heartbeat_interval_ms {
            self.last_peer_list_at = now;
            out.push(Outbound::Broadcast(Message::PeerList {
                from: self_id.clone(),
                ts: now,
                peers: self.alive_entries(),
            }));
        }

        for info in self.peers.values_mut() {
            info.alive = now.saturating_sub(info.last_seen) <= self.params.peer_timeout_ms;
        }

        let dropped = self.enforce_cap();
        (out, dropped)
    }

    fn enforce_cap(&mut self) -> Vec<PeerId> {
        let mut dropped = Vec::new();
        while self.peers.len() > self.params.max_peers {
            let oldest = self
                .peers
                .iter()
                .min_by_key(|(_, info)| info.last_seen)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    self.peers.remove(&id);
                    dropped.push(id);
                }
                None => break,
            }
        }
        dropped
    }

    fn alive_entries(&self) -> Vec<PeerEntry> {
        self.peers
            .iter()
            .filter(|(_, info)| info.alive)
            .map(|(id, info)| PeerEntry {
                id: id.clone(),
                confidence: Some(info.confidence),
            })
            .collect()
    }

    /// All tracked peers.
    pub fn peers(&self) -> &BTreeMap<PeerId, PeerInfo> {
        &self.peers
    }

    /// Alive peer ids.
    pub fn alive_peers(&self) -> Vec<PeerId> {
        self.peers
            .iter()
            .filter(|(_, info)| info.alive)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Tracked peer count.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True when no peers are tracked.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
