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

mod common;

use common::{test_config, Sim};
use concord::core::clock::Clock;
use concord::core::security::signer::SignerBackend;
use concord::core::types::{Direction, Stance};
use concord::networking::transport::{MemoryBus, Transport};
use concord::networking::wire::Message;

#[test]
fn broadcasts_are_never_echoed_to_the_sender() {
    let bus = MemoryBus::new();
    let a = common::make_signer().peer_id();
    let b = common::make_signer().peer_id();
    let (ta, mut rx_a) = bus.register(a.clone());
    let (_tb, mut rx_b) = bus.register(b.clone());

    let msg = Message::Hello {
        from: a.clone(),
        ts: 1,
        known_peers: Vec::new(),
        t_state: None,
    };
    ta.broadcast(&msg).expect("broadcast");

    assert!(rx_b.try_recv().is_ok(), "peer receives the broadcast");
    assert!(rx_a.try_recv().is_err(), "sender never hears itself");
}

#[test]
fn sends_to_unknown_peers_drop_silently() {
    let bus = MemoryBus::new();
    let a = common::make_signer().peer_id();
    let stranger = common::make_signer().peer_id();
    let (ta, _rx_a) = bus.register(a.clone());

    let msg = Message::Heartbeat {
        from: a,
        ts: 1,
        t_state: None,
        confidence: None,
    };
    assert!(ta.send(&stranger, &msg).is_ok());
}

#[test]
fn published_beliefs_converge_across_the_swarm() {
    let mut sim = Sim::new(4, test_config());

    // Everyone says hello and settles.
    for i in 0..sim.nodes.len() {
        sim.nodes[i].node.hello();
    }
    sim.pump();

    sim.nodes[0]
        .node
        .publish("sensors", "claim:c", Direction::Strengthen, 0.8, None)
        .expect("publish");
    sim.pump();

    for i in 0..sim.nodes.len() {
        let belief = sim.nodes[i].node.belief("claim:c").expect("converged");
        assert_eq!(belief.stance, Stance::Strengthen);
        assert_eq!(belief.confidence, 0.8);
    }
}

#[test]
fn duplicates_are_silent_and_leave_state_unchanged() {
    let mut sim = Sim::new(3, test_config());
    for i in 0..sim.nodes.len() {
        sim.nodes[i].node.hello();
    }
    sim.pump();

    sim.nodes[0]
        .node
        .publish("sensors", "claim:d", Direction::Weaken, 0.6, None)
        .expect("publish");
    sim.pump();

    let audit_len_before = sim.nodes[1].node.audit().len();
    let belief_before = sim.nodes[1].node.belief("claim:d").cloned();

    // Replay the original broadcast verbatim at node 1.
    let replayed = {
        let from = sim.id(0);
        let signal = sim.nodes[1]
            .node
            .audit()
            .entries()
            .iter()
            .rev()
            .find_map(|e| {
                e.data
                    .get("signal")
                    .and_then(|s| serde_json::from_value(s.clone()).ok())
            })
            .expect("journaled signal");
        Message::LearningSignal {
            from,
            ts: sim.clock.now_ms(),
            signal,
        }
    };
    sim.nodes[1].node.handle_message(replayed);

    assert_eq!(sim.nodes[1].node.audit().len(), audit_len_before);
    assert_eq!(sim.nodes[1].node.belief("claim:d").cloned(), belief_before);
}

#[test]
fn quarantined_senders_are_dropped_at_the_door() {
    let mut sim = Sim::new(3, test_config());
    for i in 0..sim.nodes.len() {
        sim.nodes[i].node.hello();
    }
    sim.pump();

    // Both healthy nodes isolate the offender, so neither direct delivery
    // nor an honest relay can carry its signal.
    let offender = sim.id(2);
    let now = sim.clock.now_ms();
    sim.nodes[0].node.quarantine_peer(&offender, "test", now);
    sim.nodes[1].node.quarantine_peer(&offender, "test", now);
    sim.nodes[0].node.take_outbound();
    sim.nodes[1].node.take_outbound();
    sim.nodes[0].node.take_events();
    sim.nodes[1].node.take_events();

    sim.nodes[2]
        .node
        .publish("sensors", "claim:q", Direction::Strengthen, 0.9, None)
        .expect("publish");
    sim.pump();

    assert!(sim.nodes[0].node.belief("claim:q").is_none());
    assert!(sim.nodes[1].node.belief("claim:q").is_none());

    use concord::core::events::CoreEvent;
    let rejected = sim.nodes[1].node.take_events().into_iter().any(|e| {
        matches!(
            e,
            CoreEvent::SignalRejected { ref reason, .. } if reason == "Sender quarantined"
        )
    });
    assert!(rejected);
}

#[test]
fn heartbeats_keep_peers_alive_and_silence_kills_them() {
    let cfg = test_config();
    let mut sim = Sim::new(3, cfg);
    for i in 0..sim.nodes.len() {
        sim.nodes[i].node.hello();
    }
    sim.pump();

    // A few heartbeat rounds.
    for _ in 0..3 {
        sim.step(1_000);
    }
    for i in 0..sim.nodes.len() {
        assert_eq!(sim.nodes[i].node.membership().alive_peers().len(), 2);
    }

    // Node 2 goes dark: nobody ticks it, so it sends nothing.
    let dark = sim.nodes.remove(2);
    let dark_id = dark.node.id().clone();
    sim.bus.unregister(&dark_id);

    for _ in 0..6 {
        sim.step(1_000);
    }
    for i in 0..sim.nodes.len() {
        assert!(!sim.nodes[i]
            .node
            .membership()
            .alive_peers()
            .contains(&dark_id));
    }
}

#[test]
fn conflicting_publishes_trigger_detection_and_checkpoints() {
    let mut sim = Sim::new(5, test_config());
    for i in 0..sim.nodes.len() {
        sim.nodes[i].node.hello();
    }
    sim.pump();

    // Three strengthen, two weaken, all distinct authors.
    for i in 0..5 {
        let direction = if i < 3 {
            Direction::Strengthen
        } else {
            Direction::Weaken
        };
        sim.clock.advance(50);
        sim.nodes[i]
            .node
            .publish("sensors", "claim:x", direction, 0.85, None)
            .expect("publish");
        sim.pump();
    }

    // Every node saw five stances; the split crosses the threshold.
    let mut any_detected = false;
    for i in 0..sim.nodes.len() {
        let audit = sim.nodes[i].node.audit();
        let detected = audit
            .entries()
            .iter()
            .any(|e| e.kind == concord::core::types::LogKind::ConflictDetected);
        let requested = audit
            .entries()
            .iter()
            .any(|e| e.kind == concord::core::types::LogKind::CheckpointReq);
        if detected {
            any_detected = true;
            assert!(requested, "detection opens a checkpoint round");
        }
    }
    assert!(any_detected);
}
