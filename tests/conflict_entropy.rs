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

use concord::core::conflict::{ConflictAccumulator, ConflictChange};
use concord::core::types::{PeerId, Stance};
use proptest::prelude::*;

fn peer(n: u8) -> PeerId {
    let mut key = [0u8; 32];
    key[0] = n;
    PeerId::from_public_key(&key)
}

#[test]
fn split_swarm_crosses_the_threshold_once() {
    let mut acc = ConflictAccumulator::new(0.6);
    let mut detections = 0;

    // 3 peers strengthen, then 2 weaken.
    for n in 0..3 {
        if acc
            .observe_belief(&peer(n), "claim:X", Stance::Strengthen, 0.85, 1_000 + n as u64, None)
            .is_some()
        {
            detections += 1;
        }
    }
    assert_eq!(acc.score("claim:X"), 0.0);

    for n in 3..5 {
        if let Some(ConflictChange::Detected { score, .. }) =
            acc.observe_belief(&peer(n), "claim:X", Stance::Weaken, 0.95, 1_000 + n as u64, None)
        {
            assert!(score >= 0.6);
            detections += 1;
        }
    }

    // The 3-vs-2 split scores high entropy, and the crossing fired exactly
    // once on the way up.
    assert!(acc.score("claim:X") > 0.6);
    assert_eq!(detections, 1);
}

#[test]
fn unanimous_stances_score_zero() {
    let mut acc = ConflictAccumulator::new(0.6);
    for n in 0..6 {
        let change =
            acc.observe_belief(&peer(n), "claim:U", Stance::Strengthen, 0.9, 1_000, None);
        assert!(change.is_none());
    }
    assert_eq!(acc.score("claim:U"), 0.0);
}

#[test]
fn unknown_stances_never_create_conflict() {
    let mut acc = ConflictAccumulator::new(0.6);
    acc.observe_belief(&peer(0), "claim:K", Stance::Strengthen, 0.9, 1_000, None);
    for n in 1..5 {
        acc.observe_belief(&peer(n), "claim:K", Stance::Unknown, 0.0, 1_000, None);
    }
    assert_eq!(acc.score("claim:K"), 0.0);
}

#[test]
fn resolve_clears_the_record_and_rearms_detection() {
    let mut acc = ConflictAccumulator::new(0.6);
    acc.observe_belief(&peer(0), "claim:R", Stance::Strengthen, 0.9, 1_000, None);
    let detected =
        acc.observe_belief(&peer(1), "claim:R", Stance::Weaken, 0.9, 1_001, None);
    assert!(matches!(detected, Some(ConflictChange::Detected { .. })));

    let resolved = acc.resolve("claim:R");
    assert!(matches!(resolved, Some(ConflictChange::Resolved { .. })));
    assert_eq!(acc.score("claim:R"), 0.0);
    assert!(acc.get("claim:R").unwrap().stances.is_empty());

    // A fresh ascent fires again.
    acc.observe_belief(&peer(0), "claim:R", Stance::Strengthen, 0.9, 2_000, None);
    let detected_again =
        acc.observe_belief(&peer(1), "claim:R", Stance::Weaken, 0.9, 2_001, None);
    assert!(matches!(detected_again, Some(ConflictChange::Detected { .. })));
}

#[test]
fn stale_records_prune() {
    let mut acc = ConflictAccumulator::new(0.6);
    acc.observe_belief(&peer(0), "claim:old", Stance::Strengthen, 0.9, 1_000, None);
    acc.observe_belief(&peer(0), "claim:new", Stance::Strengthen, 0.9, 500_000, None);
    acc.prune(600_000, 200_000);
    assert!(acc.get("claim:old").is_none());
    assert!(acc.get("claim:new").is_some());
}

proptest! {
    // Invariant: the score stays in [0, 1] and is zero whenever fewer than
    // two distinct non-unknown stances are present.
    #[test]
    fn prop_score_bounds(
        stances in proptest::collection::vec(0u8..4u8, 1..24)
    ) {
        let mut acc = ConflictAccumulator::new(0.6);
        let table = [Stance::Strengthen, Stance::Weaken, Stance::Retract, Stance::Unknown];
        for (i, s) in stances.iter().enumerate() {
            acc.observe_belief(
                &peer(i as u8),
                "claim:p",
                table[*s as usize],
                0.5,
                1_000 + i as u64,
                None,
            );
        }
        let score = acc.score("claim:p");
        prop_assert!((0.0..=1.0).contains(&score));

        let unique: std::collections::BTreeSet<u8> =
            stances.iter().copied().filter(|s| *s != 3).collect();
        if unique.len() <= 1 {
            prop_assert_eq!(score, 0.0);
        }
    }
}
