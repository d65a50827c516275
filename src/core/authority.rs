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

//! Time-bounded authority windows.
//!
//! Windows are granted against the current T-state: the base duration is
//! scaled by the level multiplier at grant time, and every remaining window
//! shrinks again on each later degradation (the remaining time is multiplied
//! by the new level's multiplier, compounding across transitions). A window
//! never grows except by a fresh grant.

use crate::core::types::{PeerId, Scope, TState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A pending authority request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthorityRequest {
    /// Request id.
    pub id: String,
    /// Requesting peer.
    pub peer: PeerId,
    /// Requested scope.
    pub scope: Scope,
    /// Stated reason.
    pub reason: String,
    /// Request time (ms).
    pub requested_at: u64,
}

/// An active authority window. One per peer; a re-grant replaces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthorityWindow {
    /// Window id (inherited from the request).
    pub id: String,
    /// Holder.
    pub peer: PeerId,
    /// Grant time (ms).
    pub granted_at: u64,
    /// Expiry time (ms).
    pub expires_at: u64,
    /// Degradation level at grant.
    pub t_state_at_grant: TState,
    /// Scope of the grant.
    pub scope: Scope,
    /// Optional free-form conditions.
    pub conditions: Option<String>,
}

/// Owns every window and pending request.
#[derive(Debug)]
pub struct AuthorityManager {
    base_duration_ms: u64,
    windows: BTreeMap<PeerId, AuthorityWindow>,
    pending: BTreeMap<String, AuthorityRequest>,
    next_seq: u64,
}

impl AuthorityManager {
    /// New manager with the T0 window length.
    pub fn new(base_duration_ms: u64) -> Self {
        Self {
            base_duration_ms,
            windows: BTreeMap::new(),
            pending: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// File a request. Returns `None` when the current T-state forbids new
    /// grants (the caller surfaces this as a denial).
    pub fn request(
        &mut self,
        peer: &PeerId,
        scope: Scope,
        reason: &str,
        tstate: TState,
        now: u64,
    ) -> Option<AuthorityRequest> {
        if !tstate.can_grant_new_authority() {
            return None;
        }
        self.next_seq += 1;
        let id = format!("auth:{}:{}", peer, self.next_seq);
        let req = AuthorityRequest {
            id: id.clone(),
            peer: peer.clone(),
            scope,
            reason: reason.to_string(),
            requested_at: now,
        };
        self.pending.insert(id, req.clone());
        Some(req)
    }

    /// Materialize a pending request into a window scaled by the current
    /// T-state. Returns `None` for unknown request ids.
    pub fn grant(&mut self, request_id: &str, tstate: TState, now: u64) -> Option<AuthorityWindow> {
        let req = self.pending.remove(request_id)?;
        let duration = (self.base_duration_ms as f64 * tstate.multiplier()) as u64;
        let window = AuthorityWindow {
            id: req.id,
            peer: req.peer.clone(),
            granted_at: now,
            expires_at: now.saturating_add(duration),
            t_state_at_grant: tstate,
            scope: req.scope,
            conditions: None,
        };
        self.windows.insert(req.peer, window.clone());
        Some(window)
    }

    /// Drop a pending request. Returns it for journaling, `None` if unknown.
    pub fn deny(&mut self, request_id: &str) -> Option<AuthorityRequest> {
        self.pending.remove(request_id)
    }

    /// Remove a peer's window. Returns it for journaling; the caller is
    /// responsible for the follow-on quarantine and violation.
    pub fn revoke(&mut self, peer: &PeerId) -> Option<AuthorityWindow> {
        self.windows.remove(peer)
    }

    /// Whether the peer holds an unexpired window.
    pub fn has_authority(&self, peer: &PeerId, now: u64) -> bool {
        self.windows
            .get(peer)
            .map(|w| now < w.expires_at)
            .unwrap_or(false)
    }

    /// Remove and return expired windows.
    pub fn check_expirations(&mut self, now: u64) -> Vec<AuthorityWindow> {
        let expired: Vec<AuthorityWindow> = self
            .windows
            .values()
            .filter(|w| now >= w.expires_at)
            .cloned()
            .collect();
        for w in &expired {
            self.windows.remove(&w.peer);
        }
        expired
    }

    /// Scale every remaining window by the new level's multiplier. Called on
    /// each T-state change; repeated degradations compound. Multipliers
    /// never exceed 1, so no window ever extends.
    pub fn shrink_windows(&mut self, new_state: TState, now: u64) {
        let m = new_state.multiplier();
        for w in self.windows.values_mut() {
            let remaining = w.expires_at.saturating_sub(now);
            let scaled = (remaining as f64 * m) as u64;
            w.expires_at = now.saturating_add(scaled);
        }
    }

    /// The active window for a peer, if any.
    pub fn window(&self, peer: &PeerId) -> Option<&AuthorityWindow> {
        self.windows.get(peer)
    }

    /// A pending request by id.
    pub fn pending(&self, request_id: &str) -> Option<&AuthorityRequest> {
        self.pending.get(request_id)
    }

    /// Active window count.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// True when no windows are active.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
