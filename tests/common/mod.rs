// Copyright (c) 2026 Concord
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]
#![allow(dead_code)]

//! Shared helpers for integration tests: deterministic clocks, signed
//! signals, and a pump-until-quiet swarm over the in-memory bus.

use concord::core::clock::ManualClock;
use concord::core::codec::sign_signal;
use concord::core::security::signer::{Ed25519Signer, SignerBackend};
use concord::core::types::{
    Direction, GovernanceConfig, PeerId, Scope, Signal, SignalPayload, SignalType,
};
use concord::networking::transport::{MemoryBus, MemoryTransport, Transport};
use concord::networking::wire::Message;
use concord::networking::Outbound;
use concord::node::Node;
use tokio::sync::mpsc;

/// Fresh Ed25519 signer.
pub fn make_signer() -> Ed25519Signer {
    Ed25519Signer::generate().expect("keypair generation")
}

/// Default config used across scenario tests.
pub fn test_config() -> GovernanceConfig {
    GovernanceConfig::default()
}

/// Build and sign a delta signal from the given signer.
pub fn signed_signal(
    signer: &Ed25519Signer,
    signal_id: u64,
    timestamp: u64,
    domain: &str,
    claim_hash: &str,
    direction: Direction,
    confidence: f64,
    ttl: u32,
) -> Signal {
    let mut signal = Signal {
        source_id: signer.peer_id(),
        signal_id,
        timestamp,
        domain: domain.to_string(),
        signal_type: SignalType::Delta,
        payload: SignalPayload {
            claim_hash: claim_hash.to_string(),
            direction,
            confidence,
            evidence_hash: None,
        },
        ttl,
        scope: Scope::Global,
        prior_signal: None,
        signature: String::new(),
    };
    sign_signal(signer, &mut signal).expect("sign");
    signal
}

/// One simulated node plus its bus endpoint.
pub struct SimNode {
    pub node: Node<Ed25519Signer>,
    pub transport: MemoryTransport,
    pub inbox: mpsc::UnboundedReceiver<Message>,
}

/// A swarm of nodes over one memory bus and one manual clock.
pub struct Sim {
    pub bus: MemoryBus,
    pub clock: ManualClock,
    pub nodes: Vec<SimNode>,
}

impl Sim {
    /// Spin up `n` nodes sharing a bus and clock.
    pub fn new(n: usize, cfg: GovernanceConfig) -> Self {
        let bus = MemoryBus::new();
        let clock = ManualClock::at(1_000);
        let mut nodes = Vec::with_capacity(n);
        for _ in 0..n {
            let signer = make_signer();
            let node = Node::with_clock(signer, cfg.clone(), Box::new(clock.clone()));
            let (transport, inbox) = bus.register(node.id().clone());
            nodes.push(SimNode {
                node,
                transport,
                inbox,
            });
        }
        Self { bus, clock, nodes }
    }

    /// Identity of node `i`.
    pub fn id(&self, i: usize) -> PeerId {
        self.nodes[i].node.id().clone()
    }

    /// Deliver queued traffic until the swarm is quiet.
    pub fn pump(&mut self) {
        loop {
            let mut progressed = false;
            for sim in self.nodes.iter_mut() {
                for out in sim.node.take_outbound() {
                    match out {
                        Outbound::Broadcast(msg) => {
                            let _ = sim.transport.broadcast(&msg);
                        }
                        Outbound::Send(to, msg) => {
                            let _ = sim.transport.send(&to, &msg);
                        }
                    }
                    progressed = true;
                }
            }
            for sim in self.nodes.iter_mut() {
                while let Ok(msg) = sim.inbox.try_recv() {
                    sim.node.handle_message(msg);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
    }

    /// Advance the clock, tick every node, and pump until quiet.
    pub fn step(&mut self, advance_ms: u64) {
        self.clock.advance(advance_ms);
        for sim in self.nodes.iter_mut() {
            sim.node.tick();
        }
        self.pump();
    }
}
