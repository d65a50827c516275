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

//! Deterministic state reconstruction from the journal.
//!
//! Replay folds entries in index order; signal-bearing kinds go through the
//! same belief resolution rule as live traffic, so two replays of one log
//! always land on identical state.

use crate::core::audit::AuditLog;
use crate::core::beliefs::BeliefStore;
use crate::core::types::{Belief, LogKind, PeerId, Signal};
use std::collections::{BTreeMap, BTreeSet};

/// State recovered from a journal.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayState {
    /// Reconstructed beliefs per claim.
    pub beliefs: BTreeMap<String, Belief>,
    /// Peers seen in the journal.
    pub peers: BTreeSet<PeerId>,
    /// ROLLBACK entries encountered (noted, not re-applied unless the
    /// snapshot itself was journaled).
    pub rollbacks: u64,
}

/// Fold a journal into fresh state.
pub fn replay(log: &AuditLog) -> ReplayState {
    let mut store = BeliefStore::new();
    let mut peers: BTreeSet<PeerId> = BTreeSet::new();
    let mut rollbacks = 0u64;

    for entry in log.entries() {
        if let Some(peer) = &entry.peer {
            peers.insert(peer.clone());
        }

        match entry.kind {
            LogKind::In | LogKind::OutSend | LogKind::OutBroadcast => {
                let Some(raw) = entry.data.get("signal") else {
                    continue;
                };
                let Ok(signal) = serde_json::from_value::<Signal>(raw.clone()) else {
                    continue;
                };
                peers.insert(signal.source_id.clone());
                store.apply(&signal);
            }
            LogKind::Rollback => {
                rollbacks += 1;
                // If the snapshot was journaled alongside the rollback,
                // honor it; otherwise the entry is informational.
                if let Some(snap) = entry.data.get("beliefs") {
                    if let Ok(beliefs) =
                        serde_json::from_value::<BTreeMap<String, Belief>>(snap.clone())
                    {
                        let snapshot = crate::core::beliefs::BeliefSnapshot { beliefs };
                        store.restore(&snapshot);
                    }
                }
            }
            _ => {}
        }
    }

    ReplayState {
        beliefs: store.all().clone(),
        peers,
        rollbacks,
    }
}
