// Copyright (c) 2026 Concord
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Networking: wire protocol, transports, liveness, and propagation.

pub mod checkpoints;
pub mod gossip;
pub mod membership;
pub mod propagation;
pub mod transport;
pub mod wire;

use crate::core::types::PeerId;
use crate::networking::wire::Message;

/// A queued outbound action, flushed to the transport by the node driver.
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    /// Deliver to every other peer.
    Broadcast(Message),
    /// Deliver point-to-point.
    Send(PeerId, Message),
}
