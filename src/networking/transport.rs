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

//! Transport contract and the in-memory bus.
//!
//! The contract every transport honors: a stable identity, point-to-point
//! sends that silently drop when the recipient is unknown, and broadcasts
//! that are never echoed back to the sender.

use crate::core::types::PeerId;
use crate::networking::wire::Message;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport is no longer able to deliver.
    #[error("transport closed")]
    Closed,
}

/// Message-passing transport beneath a node.
pub trait Transport: Send {
    /// This endpoint's stable identity.
    fn id(&self) -> &PeerId;

    /// Point-to-point delivery. Unknown recipients are dropped silently.
    fn send(&self, to: &PeerId, msg: &Message) -> Result<(), TransportError>;

    /// Deliver to every other endpoint. MUST NOT echo to the sender.
    fn broadcast(&self, msg: &Message) -> Result<(), TransportError>;
}

type Inbox = mpsc::UnboundedSender<Message>;

/// Process-local hub connecting [`MemoryTransport`] endpoints.
///
/// Used by simulations and tests; a fresh node under test registers and
/// receives an endpoint plus its inbox receiver.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inboxes: Arc<Mutex<BTreeMap<PeerId, Inbox>>>,
}

impl MemoryBus {
    /// New empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint. A re-registration replaces the prior inbox.
    pub fn register(&self, id: PeerId) -> (MemoryTransport, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut inboxes) = self.inboxes.lock() {
            inboxes.insert(id.clone(), tx);
        }
        (
            MemoryTransport {
                id,
                bus: self.clone(),
            },
            rx,
        )
    }

    /// Remove an endpoint.
    pub fn unregister(&self, id: &PeerId) {
        if let Ok(mut inboxes) = self.inboxes.lock() {
            inboxes.remove(id);
        }
    }

    fn deliver(&self, to: &PeerId, msg: &Message) {
        if let Ok(inboxes) = self.inboxes.lock() {
            if let Some(tx) = inboxes.get(to) {
                // A closed inbox is indistinguishable from an unknown peer.
                let _ = tx.send(msg.clone());
            }
        }
    }

    fn fanout(&self, except: &PeerId, msg: &Message) {
        let targets: Vec<(PeerId, Inbox)> = match self.inboxes.lock() {
            Ok(inboxes) => inboxes
                .iter()
                .filter(|(id, _)| *id != except)
                .map(|(id, tx)| (id.clone(), tx.clone()))
                .collect(),
            Err(_) => return,
        };
        for (_, tx) in targets {
            let _ = tx.send(msg.clone());
        }
    }

    /// Registered endpoint count.
    pub fn len(&self) -> usize {
        self.inboxes.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// True when no endpoints are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One endpoint on the [`MemoryBus`].
#[derive(Clone)]
pub struct MemoryTransport {
    id: PeerId,
    bus: MemoryBus,
}

impl Transport for MemoryTransport {
    fn id(&self) -> &PeerId {
        &self.id
    }

    fn send(&self, to: &PeerId, msg: &Message) -> Result<(), TransportError> {
        self.bus.deliver(to, msg);
        Ok(())
    }

    fn broadcast(&self, msg: &Message) -> Result<(), TransportError> {
        self.bus.fanout(&self.id, msg);
        Ok(())
    }
}
