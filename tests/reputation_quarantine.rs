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

use concord::core::admission::{admit, AdmissionDecision};
use concord::core::quarantine::QuarantineList;
use concord::core::reputation::{ReputationLedger, ReputationParams};
use concord::core::types::PeerId;
use proptest::prelude::*;

fn peer(n: u8) -> PeerId {
    let mut key = [0u8; 32];
    key[0] = n;
    PeerId::from_public_key(&key)
}

fn params() -> ReputationParams {
    ReputationParams {
        new_peer_influence: 0.1,
        min_reputation_for_vote: 0.2,
    }
}

#[test]
fn fresh_peers_start_at_the_influence_floor() {
    let mut rep = ReputationLedger::new(params());
    let p = peer(1);
    rep.track(&p, 0);
    assert_eq!(rep.get_score(&p), 0.1);
    assert!((rep.get_influence(&p) - 0.19).abs() < 1e-12);
    assert!(!rep.can_vote(&p));
}

#[test]
fn score_formula_matches_the_components() {
    let mut rep = ReputationLedger::new(params());
    let p = peer(1);
    rep.track(&p, 0);
    for i in 0..10 {
        rep.record_consistency(&p, i);
    }
    rep.record_success(&p, 100);
    rep.record_failure(&p, 101);

    let rec = rep.get(&p).expect("tracked");
    assert!((rec.accuracy - 0.45).abs() < 1e-9);
    assert!((rec.consistency - 0.7).abs() < 1e-9);
    assert_eq!(rec.age, 10);
    // 0.4*0.45 + 0.3*0.7 + 0.2*0.1 = 0.41
    assert!((rec.score - 0.41).abs() < 1e-9);
}

#[test]
fn violations_cost_a_flat_fifth() {
    let mut rep = ReputationLedger::new(params());
    let p = peer(1);
    for i in 0..40 {
        rep.record_consistency(&p, i);
    }
    let before = rep.get_score(&p);
    rep.record_violation(&p, "drift", 100);
    let after = rep.get_score(&p);
    assert!((before - after - 0.2).abs() < 1e-9);
    assert_eq!(rep.violations(&p), 1);
}

proptest! {
    // Invariant 1: influence stays inside [new_peer_influence, 1] under any
    // update sequence.
    #[test]
    fn prop_influence_stays_bounded(ops in proptest::collection::vec(0u8..4u8, 0..200)) {
        let mut rep = ReputationLedger::new(params());
        let p = peer(1);
        rep.track(&p, 0);
        for (i, op) in ops.iter().enumerate() {
            let now = i as u64;
            match op {
                0 => rep.record_success(&p, now),
                1 => rep.record_failure(&p, now),
                2 => rep.record_consistency(&p, now),
                _ => rep.record_violation(&p, "fuzz", now),
            }
            let score = rep.get_score(&p);
            let influence = rep.get_influence(&p);
            prop_assert!((0.0..=1.0).contains(&score));
            prop_assert!((0.1..=1.0).contains(&influence));
        }
    }
}

#[test]
fn quarantine_durations_double_per_violation() {
    let mut q = QuarantineList::new(30_000);
    let p = peer(1);

    let first = q.quarantine(&p, "first", 0);
    assert_eq!(first.expires_at, 30_000);
    assert_eq!(first.violations, 1);

    // Re-offend while (or after) isolated: the count carries.
    let second = q.quarantine(&p, "second", 10_000);
    assert_eq!(second.violations, 2);
    assert_eq!(second.expires_at - 10_000, 60_000);

    let third = q.quarantine(&p, "third", 20_000);
    assert_eq!(third.violations, 3);
    assert_eq!(third.expires_at - 20_000, 120_000);
}

#[test]
fn quarantine_self_releases_on_expiry() {
    let mut q = QuarantineList::new(30_000);
    let p = peer(1);
    q.quarantine(&p, "offense", 0);

    assert!(q.is_quarantined(&p, 29_999));
    assert_eq!(q.get_influence_multiplier(&p, 1_000), 0.0);

    assert!(!q.is_quarantined(&p, 30_000));
    assert_eq!(q.get_influence_multiplier(&p, 30_001), 1.0);
    // The self-release removed the entry.
    assert!(q.get(&p).is_none());
}

#[test]
fn sweep_reports_released_peers() {
    let mut q = QuarantineList::new(10_000);
    q.quarantine(&peer(1), "a", 0);
    q.quarantine(&peer(2), "b", 5_000);

    let released = q.sweep(12_000);
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].peer, peer(1));
    assert!(q.is_quarantined_at(&peer(2), 12_000));
}

#[test]
fn admission_refuses_repeat_offenders_and_the_isolated() {
    let mut rep = ReputationLedger::new(params());
    let mut q = QuarantineList::new(30_000);

    let clean = peer(1);
    assert_eq!(admit(&clean, &rep, &mut q, 0), AdmissionDecision::Admitted);

    // Quarantined peers are refused while isolated, admitted after.
    let isolated = peer(2);
    q.quarantine(&isolated, "offense", 0);
    assert!(matches!(
        admit(&isolated, &rep, &mut q, 1_000),
        AdmissionDecision::Denied(_)
    ));
    assert_eq!(
        admit(&isolated, &rep, &mut q, 40_000),
        AdmissionDecision::Admitted
    );

    // A returning peer with more than three violations is refused for good.
    let offender = peer(3);
    for i in 0..4 {
        rep.record_violation(&offender, "drift", i);
    }
    assert!(matches!(
        admit(&offender, &rep, &mut q, 50_000),
        AdmissionDecision::Denied(_)
    ));
}
