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

use common::{make_signer, test_config};
use concord::core::authority::AuthorityManager;
use concord::core::clock::ManualClock;
use concord::core::events::CoreEvent;
use concord::core::security::signer::SignerBackend;
use concord::core::tstate::TStateManager;
use concord::core::types::{PeerId, Scope, TState};
use concord::networking::wire::Message;
use concord::node::Node;

fn peer(n: u8) -> PeerId {
    let mut key = [0u8; 32];
    key[0] = n;
    PeerId::from_public_key(&key)
}

#[test]
fn staleness_ladder_degrades_and_recovers() {
    let mut ts = TStateManager::new(5_000);
    let p = peer(1);

    ts.observe(&p, 0.9, 10_000);
    assert!(ts.update(10_500).is_none());
    assert_eq!(ts.state(), TState::T0);

    // One unit stale.
    let change = ts.update(15_500).expect("T0 -> T1");
    assert_eq!((change.from, change.to), (TState::T0, TState::T1));

    // Two units.
    assert_eq!(ts.update(20_500).expect("to T2").to, TState::T2);
    // Three units.
    assert_eq!(ts.update(25_500).expect("to T3").to, TState::T3);

    // Fresh contact heals completely.
    ts.observe(&p, 0.9, 25_600);
    assert_eq!(ts.update(25_700).expect("back to T0").to, TState::T0);
}

#[test]
fn low_confidence_alone_degrades_one_step() {
    let mut ts = TStateManager::new(5_000);
    ts.observe(&peer(1), 0.4, 10_000);
    assert_eq!(ts.update(10_100).expect("to T1").to, TState::T1);
    // Never deeper than T1 on confidence alone.
    assert!(ts.update(10_200).is_none());
    assert_eq!(ts.state(), TState::T1);
}

#[test]
fn recontact_cycle_suspends_the_ladder() {
    let mut ts = TStateManager::new(5_000);
    let p = peer(1);
    ts.observe(&p, 0.9, 0);
    ts.update(20_000);
    assert_eq!(ts.state(), TState::T3);

    let change = ts.initiate_recontact().expect("T3 -> T4");
    assert_eq!(change.to, TState::T4);
    assert!(ts.can_grant_new_authority());
    assert!(ts.can_propagate_learning());

    // The ladder is suspended while recontact runs.
    assert!(ts.update(100_000).is_none());
    assert_eq!(ts.state(), TState::T4);

    assert_eq!(ts.complete_recontact().expect("T4 -> T0").to, TState::T0);
}

#[test]
fn grant_gates_follow_the_ladder() {
    let mut auth = AuthorityManager::new(60_000);
    let p = peer(1);

    // T2 and T3 refuse fresh grants.
    assert!(auth
        .request(&p, Scope::Cluster, "work", TState::T2, 1_000)
        .is_none());
    assert!(auth
        .request(&p, Scope::Cluster, "work", TState::T3, 1_000)
        .is_none());

    // T1 grants shortened windows.
    let req = auth
        .request(&p, Scope::Cluster, "work", TState::T1, 1_000)
        .expect("request at T1");
    let window = auth.grant(&req.id, TState::T1, 1_000).expect("grant");
    assert_eq!(window.expires_at - window.granted_at, 42_000); // 60_000 * 0.7
    assert!(auth.has_authority(&p, 1_001));
}

#[test]
fn shrink_compounds_across_degradations() {
    let mut auth = AuthorityManager::new(60_000);
    let p = peer(1);
    let now = 0u64;

    let req = auth
        .request(&p, Scope::Global, "ops", TState::T0, now)
        .expect("request");
    let window = auth.grant(&req.id, TState::T0, now).expect("grant");
    assert_eq!(window.expires_at, 60_000);

    auth.shrink_windows(TState::T2, now);
    assert_eq!(auth.window(&p).expect("window").expires_at, 24_000);

    auth.shrink_windows(TState::T3, now);
    assert_eq!(auth.window(&p).expect("window").expires_at, 2_400);

    // Recontact (multiplier 1.0) never re-extends.
    auth.shrink_windows(TState::T4, now);
    assert_eq!(auth.window(&p).expect("window").expires_at, 2_400);
}

#[test]
fn node_level_shrink_matches_the_ladder() {
    let clock = ManualClock::at(0);
    let mut node = Node::with_clock(make_signer(), test_config(), Box::new(clock.clone()));
    let p = make_signer().peer_id();

    node.handle_message(Message::Hello {
        from: p.clone(),
        ts: 0,
        known_peers: Vec::new(),
        t_state: None,
    });
    node.handle_message(Message::AuthorityRequest {
        from: p.clone(),
        ts: 0,
        scope: Scope::Global,
        reason: "ops".to_string(),
    });
    let granted = node
        .take_events()
        .into_iter()
        .find_map(|e| match e {
            CoreEvent::AuthorityGranted { window } => Some(window),
            _ => None,
        })
        .expect("granted");
    assert_eq!(granted.expires_at, 60_000);

    node.force_t_state(TState::T2);
    node.force_t_state(TState::T3);
    // 60_000 * 0.4 * 0.1
    assert!(node.has_authority(&p));
    clock.advance(2_500);
    assert!(!node.has_authority(&p));
}

#[test]
fn requests_at_depressed_states_are_denied() {
    let clock = ManualClock::at(0);
    let mut node = Node::with_clock(make_signer(), test_config(), Box::new(clock.clone()));
    let p = make_signer().peer_id();

    node.handle_message(Message::Hello {
        from: p.clone(),
        ts: 0,
        known_peers: Vec::new(),
        t_state: None,
    });
    node.force_t_state(TState::T3);
    node.take_events();

    node.handle_message(Message::AuthorityRequest {
        from: p.clone(),
        ts: 0,
        scope: Scope::Global,
        reason: "ops".to_string(),
    });
    let events = node.take_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, CoreEvent::AuthorityDenied { .. })));
    assert!(!node.has_authority(&p));

    // The denial went back to the requester point-to-point.
    let denies: usize = node
        .take_outbound()
        .iter()
        .filter(|o| {
            matches!(
                o,
                concord::networking::Outbound::Send(to, Message::AuthorityDeny { .. }) if to == &p
            )
        })
        .count();
    assert_eq!(denies, 1);
}

#[test]
fn expired_windows_lapse_on_tick() {
    let clock = ManualClock::at(0);
    let mut node = Node::with_clock(make_signer(), test_config(), Box::new(clock.clone()));
    let p = make_signer().peer_id();

    node.handle_message(Message::Hello {
        from: p.clone(),
        ts: 0,
        known_peers: Vec::new(),
        t_state: None,
    });
    node.handle_message(Message::AuthorityRequest {
        from: p.clone(),
        ts: 0,
        scope: Scope::Global,
        reason: "ops".to_string(),
    });
    node.take_events();

    clock.advance(60_001);
    node.tick();
    let events = node.take_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, CoreEvent::AuthorityExpired { .. })));
    assert!(!node.has_authority(&p));
    // Expiry is not a sanction.
    assert!(!node.is_quarantined(&p));
}
