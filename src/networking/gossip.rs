// Copyright (c) 2026 Concord
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Gossip transport: the JSON wire carried over a libp2p gossipsub topic.
//!
//! Governance messages ride a single topic; gossipsub deduplicates them by
//! content address (SHA-256 of the payload), which lines up with the
//! codec's own dedup keys. Gossipsub never redelivers a node's own
//! publishes, satisfying the transport contract's no-self-echo invariant.
//! The transport identity is a separate keypair from the governance key and
//! persists under the data directory via the same atomic key write the
//! signer uses.

use crate::core::codec::sha256;
use crate::core::security::signer::write_key_material;
use crate::monitoring::metrics::Metrics;
use crate::networking::wire::Message;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use libp2p::futures::StreamExt;
use libp2p::gossipsub::{self, IdentTopic, MessageAuthenticity};
use libp2p::swarm::{NetworkBehaviour, Swarm, SwarmEvent};
use libp2p::{identify, identity, noise, ping, tcp, yamux, Multiaddr, PeerId, SwarmBuilder};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Gossip transport errors. All of these surface at launch; once the driver
/// is running, failures are recovered locally.
#[derive(Debug, Error)]
pub enum GossipError {
    /// Data directory or key file unavailable.
    #[error("io")]
    Io,
    /// Persisted transport key failed to parse.
    #[error("invalid transport key")]
    Key,
    /// Listen address did not parse.
    #[error("bad listen address")]
    Address,
    /// Transport or behaviour construction failed.
    #[error("swarm setup")]
    Setup,
}

/// Runtime configuration for the gossip transport.
#[derive(Clone, Debug)]
pub struct GossipConfig {
    /// Listen multiaddr, e.g. "/ip4/0.0.0.0/tcp/4001".
    pub listen_addr: String,
    /// Topic carrying governance messages.
    pub topic: String,
    /// Directory holding the persistent transport key.
    pub data_dir: String,
    /// Peers to dial at startup.
    pub bootstrap: Vec<String>,
    /// Optional allowlist of transport peer ids (empty admits everyone).
    pub allow_peers: Vec<String>,
}

/// Link-level notifications surfaced to the embedding process.
#[derive(Clone, Debug)]
pub enum GossipEvent {
    /// A permitted peer connected (base58 transport id).
    Joined(String),
    /// A permitted peer disconnected.
    Left(String),
}

/// Caller-side endpoints of a running gossip transport.
pub struct GossipHandle {
    inbound: mpsc::Receiver<Message>,
    outbound: mpsc::Sender<Message>,
    events: mpsc::Receiver<GossipEvent>,
}

impl GossipHandle {
    /// Decoded inbound governance messages.
    pub fn inbound(&mut self) -> &mut mpsc::Receiver<Message> {
        &mut self.inbound
    }

    /// Sender for outbound broadcasts.
    pub fn outbound(&self) -> mpsc::Sender<Message> {
        self.outbound.clone()
    }

    /// Link-level events.
    pub fn events(&mut self) -> &mut mpsc::Receiver<GossipEvent> {
        &mut self.events
    }

    /// Split into independently owned endpoints.
    pub fn into_parts(
        self,
    ) -> (
        mpsc::Receiver<Message>,
        mpsc::Sender<Message>,
        mpsc::Receiver<GossipEvent>,
    ) {
        (self.inbound, self.outbound, self.events)
    }
}

/// Start the gossip transport. Setup errors (key, address, swarm
/// construction) are returned here; the spawned driver only ever recovers.
pub fn launch(
    cfg: GossipConfig,
    metrics: Arc<Metrics>,
) -> Result<(GossipHandle, JoinHandle<()>), GossipError> {
    let keypair = transport_keypair(Path::new(&cfg.data_dir))?;
    let local_id = PeerId::from(keypair.public());
    let allowlist = Allowlist::parse(&cfg.allow_peers);

    let mut swarm = build_swarm(keypair)?;

    let topic = IdentTopic::new(&cfg.topic);
    swarm
        .behaviour_mut()
        .pubsub
        .subscribe(&topic)
        .map_err(|_| GossipError::Setup)?;

    let listen: Multiaddr = cfg.listen_addr.parse().map_err(|_| GossipError::Address)?;
    swarm.listen_on(listen).map_err(|_| GossipError::Address)?;

    dial_bootstrap(&mut swarm, &cfg.bootstrap);

    info!(id = %local_id, topic = %cfg.topic, "gossip transport up");

    let (in_tx, in_rx) = mpsc::channel(256);
    let (out_tx, out_rx) = mpsc::channel(256);
    let (ev_tx, ev_rx) = mpsc::channel(64);

    let driver = GossipDriver {
        swarm,
        topic,
        allowlist,
        metrics,
        inbound: in_tx,
        events: ev_tx,
    };
    let task = tokio::spawn(driver.drive(out_rx));

    Ok((
        GossipHandle {
            inbound: in_rx,
            outbound: out_tx,
            events: ev_rx,
        },
        task,
    ))
}

#[derive(NetworkBehaviour)]
struct NodeBehaviour {
    pubsub: gossipsub::Behaviour,
    identify: identify::Behaviour,
    ping: ping::Behaviour,
}

fn build_swarm(keypair: identity::Keypair) -> Result<Swarm<NodeBehaviour>, GossipError> {
    let swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            tcp::Config::default().nodelay(true),
            noise::Config::new,
            yamux::Config::default,
        )
        .map_err(|_| GossipError::Setup)?
        .with_behaviour(|key| {
            // Content-addressed message ids: the mesh deduplicates on the
            // same bytes our propagation layer hashes.
            let pubsub_config = gossipsub::ConfigBuilder::default()
                .validation_mode(gossipsub::ValidationMode::Strict)
                .message_id_fn(|message: &gossipsub::Message| {
                    gossipsub::MessageId::from(sha256(&message.data).to_vec())
                })
                .build()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let pubsub = gossipsub::Behaviour::new(
                MessageAuthenticity::Signed(key.clone()),
                pubsub_config,
            )?;
            let identify = identify::Behaviour::new(identify::Config::new(
                "/concord/1.0".to_string(),
                key.public(),
            ));
            Ok(NodeBehaviour {
                pubsub,
                identify,
                ping: ping::Behaviour::default(),
            })
        })
        .map_err(|_| GossipError::Setup)?
        .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(60)))
        .build();
    Ok(swarm)
}

fn dial_bootstrap(swarm: &mut Swarm<NodeBehaviour>, bootstrap: &[String]) {
    for raw in bootstrap {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let Ok(addr) = raw.parse::<Multiaddr>() else {
            warn!(addr = raw, "unparseable bootstrap address; skipped");
            continue;
        };
        if let Err(e) = swarm.dial(addr) {
            warn!(addr = raw, err = ?e, "bootstrap dial failed");
        }
    }
}

/// Load the transport keypair from `data_dir/gossip.key`, or generate and
/// persist a fresh one.
fn transport_keypair(data_dir: &Path) -> Result<identity::Keypair, GossipError> {
    fs::create_dir_all(data_dir).map_err(|_| GossipError::Io)?;
    let path = data_dir.join("gossip.key");
    match fs::read(&path) {
        Ok(bytes) => identity::Keypair::from_protobuf_encoding(&bytes).map_err(|_| GossipError::Key),
        Err(_) => {
            let keypair = identity::Keypair::generate_ed25519();
            let bytes = keypair
                .to_protobuf_encoding()
                .map_err(|_| GossipError::Key)?;
            write_key_material(&path, &bytes).map_err(|_| GossipError::Io)?;
            Ok(keypair)
        }
    }
}

/// Admission set for transport peers. Empty means open.
struct Allowlist(HashSet<PeerId>);

impl Allowlist {
    fn parse(entries: &[String]) -> Self {
        let mut set = HashSet::new();
        for raw in entries {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match raw.parse() {
                Ok(id) => {
                    set.insert(id);
                }
                Err(_) => warn!(entry = raw, "bad allowlist entry; skipped"),
            }
        }
        Self(set)
    }

    fn permits(&self, peer: &PeerId) -> bool {
        self.0.is_empty() || self.0.contains(peer)
    }
}

struct GossipDriver {
    swarm: Swarm<NodeBehaviour>,
    topic: IdentTopic,
    allowlist: Allowlist,
    metrics: Arc<Metrics>,
    inbound: mpsc::Sender<Message>,
    events: mpsc::Sender<GossipEvent>,
}

impl GossipDriver {
    async fn drive(mut self, mut outbound: mpsc::Receiver<Message>) {
        self.metrics.gossip_peers.set(0);
        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => {
                    self.on_swarm_event(event).await;
                }
                queued = outbound.recv() => {
                    let Some(msg) = queued else {
                        // Node side hung up; nothing left to carry.
                        break;
                    };
                    self.publish(msg);
                }
            }
        }
        debug!("gossip driver stopped");
    }

    fn publish(&mut self, msg: Message) {
        let bytes = match msg.to_bytes() {
            Ok(b) => b,
            Err(_) => {
                self.metrics.gossip_invalid_msg_total.inc();
                return;
            }
        };
        if let Err(e) = self
            .swarm
            .behaviour_mut()
            .pubsub
            .publish(self.topic.clone(), bytes)
        {
            // Expected while the mesh is still forming.
            debug!(err = ?e, "publish deferred");
        }
    }

    async fn on_swarm_event(&mut self, event: SwarmEvent<NodeBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(NodeBehaviourEvent::Pubsub(gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            })) => {
                self.on_payload(propagation_source, &message.data).await;
            }

            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                if !self.allowlist.permits(&peer_id) {
                    self.metrics.gossip_banned_total.inc();
                    warn!(%peer_id, "peer outside allowlist; closing");
                    let _ = self.swarm.disconnect_peer_id(peer_id);
                    return;
                }
                self.metrics.gossip_peers.inc();
                let _ = self
                    .events
                    .send(GossipEvent::Joined(peer_id.to_base58()))
                    .await;
            }

            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                if self.allowlist.permits(&peer_id) {
                    self.metrics.gossip_peers.dec();
                    let _ = self
                        .events
                        .send(GossipEvent::Left(peer_id.to_base58()))
                        .await;
                }
            }

            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "gossip listening");
            }

            _ => {}
        }
    }

    async fn on_payload(&mut self, relay: PeerId, data: &[u8]) {
        if !self.allowlist.permits(&relay) {
            self.metrics.gossip_banned_total.inc();
            return;
        }
        match Message::from_bytes(data) {
            Ok(msg) => {
                let _ = self.inbound.send(msg).await;
            }
            Err(_) => {
                self.metrics.gossip_invalid_msg_total.inc();
                debug!(%relay, "undecodable gossip payload");
            }
        }
    }
}
