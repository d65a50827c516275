#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Concord node entrypoint (systemd-friendly).
//! Starts the gossip transport, drives the governance loop, and keeps the
//! process alive.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};

use concord::core::security::signer::Ed25519Signer;
use concord::core::types::{GovernanceConfig, PeerId};
use concord::monitoring::metrics::Metrics;
use concord::networking::gossip::{launch, GossipConfig};
use concord::networking::transport::{Transport, TransportError};
use concord::networking::wire::Message;
use concord::node::Node;

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Extract node index from a path like `/srv/concord/node3/data`.
fn node_index_from_data_dir(data_dir: &str) -> u16 {
    for part in Path::new(data_dir).components() {
        let s = part.as_os_str().to_string_lossy();
        if let Some(rest) = s.strip_prefix("node") {
            if let Ok(n) = rest.parse::<u16>() {
                if (1..=99).contains(&n) {
                    return n;
                }
            }
        }
    }
    1
}

fn load_config(data_dir: &str) -> GovernanceConfig {
    let path = Path::new(data_dir).join("concord.toml");
    match std::fs::read_to_string(&path) {
        Ok(raw) => match GovernanceConfig::from_toml(&raw) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), err = %e, "bad config; using defaults");
                GovernanceConfig::default()
            }
        },
        Err(_) => GovernanceConfig::default(),
    }
}

/// Bridges the governance node onto the gossip outbound channel.
///
/// Gossipsub has no point-to-point lane; sends ride the topic and
/// recipients filter by envelope, which the dispatch layer already does.
struct GossipTransport {
    id: PeerId,
    outbound: mpsc::Sender<Message>,
}

impl Transport for GossipTransport {
    fn id(&self) -> &PeerId {
        &self.id
    }

    fn send(&self, _to: &PeerId, msg: &Message) -> Result<(), TransportError> {
        self.outbound
            .try_send(msg.clone())
            .map_err(|_| TransportError::Closed)
    }

    fn broadcast(&self, msg: &Message) -> Result<(), TransportError> {
        self.outbound
            .try_send(msg.clone())
            .map_err(|_| TransportError::Closed)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();

    let data_dir = env("CONCORD_DATA_DIR", "./data");
    let node_idx = node_index_from_data_dir(&data_dir);

    // per-node ports: node1=4001, node2=4002, ...
    let p2p_port: u16 = 4000 + node_idx;
    let listen_addr = format!("/ip4/0.0.0.0/tcp/{p2p_port}");

    let topic = env("CONCORD_TOPIC", "concord-governance");
    let bootstrap: Vec<String> = env("CONCORD_BOOTSTRAP", "")
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let cfg = load_config(&data_dir);
    let signer =
        Ed25519Signer::load_or_create(&data_dir).context("load or create node key")?;
    let metrics = Arc::new(Metrics::new().context("metrics init")?);

    let gossip_cfg = GossipConfig {
        listen_addr,
        topic,
        data_dir: data_dir.clone(),
        bootstrap,
        allow_peers: Vec::new(),
    };

    info!(
        node = node_idx,
        data_dir = %data_dir,
        version = env!("CARGO_PKG_VERSION"),
        built = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
        "concord node starting"
    );

    let (gossip, gossip_task) =
        launch(gossip_cfg, metrics.clone()).map_err(|e| anyhow::anyhow!("gossip start: {e}"))?;
    let (mut gossip_inbound, gossip_outbound, mut gossip_events) = gossip.into_parts();

    let node = Node::new(signer, cfg).with_metrics(metrics);
    let node_id = node.id().clone();
    info!(id = %node_id, "governance identity ready");

    let transport = GossipTransport {
        id: node_id,
        outbound: gossip_outbound,
    };

    // Bridge gossip traffic into the node inbox, logging link events along
    // the way.
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let bridge_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = gossip_inbound.recv() => {
                    let Some(msg) = msg else { break };
                    if inbox_tx.send(msg).is_err() {
                        break;
                    }
                }
                ev = gossip_events.recv() => {
                    let Some(ev) = ev else {
                        warn!("gossip event channel closed");
                        break;
                    };
                    info!(?ev, "gossip event");
                }
            }
        }
    });

    let node_task = tokio::spawn(concord::node::run(
        node,
        transport,
        inbox_rx,
        Duration::from_millis(250),
        None,
    ));

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown requested");

    node_task.abort();
    bridge_task.abort();
    gossip_task.abort();
    Ok(())
}
