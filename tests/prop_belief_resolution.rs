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

use concord::core::beliefs::{ApplyOutcome, BeliefStore};
use concord::core::types::{
    Direction, PeerId, Scope, Signal, SignalPayload, SignalType, Stance,
};
use proptest::prelude::*;

fn make_signal(source: u8, signal_id: u64, ts: u64, confidence: f64, direction: Direction) -> Signal {
    let mut key = [0u8; 32];
    key[0] = source;
    Signal {
        source_id: PeerId::from_public_key(&key),
        signal_id,
        timestamp: ts,
        domain: "test".to_string(),
        signal_type: SignalType::Delta,
        payload: SignalPayload {
            claim_hash: "claim:p".to_string(),
            direction,
            confidence,
            evidence_hash: None,
        },
        ttl: 8,
        scope: Scope::Global,
        prior_signal: None,
        signature: String::new(),
    }
}

fn final_belief(signals: &[Signal]) -> (Stance, f64, u64) {
    let mut store = BeliefStore::new();
    for s in signals {
        store.apply(s);
    }
    let b = store.get("claim:p").expect("at least one signal applied");
    (b.stance, b.confidence, b.updated_at)
}

proptest! {
    // The belief after applying a signal set depends only on the maximal
    // (timestamp, confidence) element, so any two orders agree.
    #[test]
    fn prop_resolution_is_order_independent(
        mut entries in proptest::collection::vec(
            (1u64..1000u64, 0u32..=100u32, 0u8..3u8),
            1..24,
        )
    ) {
        // Distinct (timestamp, confidence) pairs avoid the sanctioned tie
        // toward the incoming signal.
        entries.sort();
        entries.dedup_by_key(|(ts, conf, _)| (*ts, *conf));

        let directions = [Direction::Strengthen, Direction::Weaken, Direction::Retract];
        let signals: Vec<Signal> = entries
            .iter()
            .enumerate()
            .map(|(i, (ts, conf, d))| {
                make_signal(
                    (i % 7) as u8,
                    i as u64 + 1,
                    *ts,
                    *conf as f64 / 100.0,
                    directions[*d as usize],
                )
            })
            .collect();

        let forward = final_belief(&signals);

        let mut reversed = signals.clone();
        reversed.reverse();
        prop_assert_eq!(final_belief(&reversed), forward);

        // Interleave from both ends for a third order.
        let mut mixed = Vec::with_capacity(signals.len());
        let mut lo = 0usize;
        let mut hi = signals.len();
        while lo < hi {
            hi -= 1;
            mixed.push(signals[hi].clone());
            if lo < hi {
                mixed.push(signals[lo].clone());
                lo += 1;
            }
        }
        prop_assert_eq!(final_belief(&mixed), forward);
    }
}

#[test]
fn equal_timestamp_ties_break_toward_incoming() {
    let mut store = BeliefStore::new();
    store.apply(&make_signal(1, 1, 100, 0.5, Direction::Strengthen));

    // Same timestamp, same confidence: the incoming signal wins.
    assert_eq!(
        store.apply(&make_signal(2, 1, 100, 0.5, Direction::Weaken)),
        ApplyOutcome::Replaced
    );
    assert_eq!(store.get("claim:p").unwrap().stance, Stance::Weaken);

    // Same timestamp, lower confidence: the prior belief wins.
    assert_eq!(
        store.apply(&make_signal(3, 1, 100, 0.4, Direction::Retract)),
        ApplyOutcome::Kept
    );
    assert_eq!(store.get("claim:p").unwrap().stance, Stance::Weaken);

    // Older timestamp: the prior belief wins regardless of confidence.
    assert_eq!(
        store.apply(&make_signal(3, 2, 99, 1.0, Direction::Retract)),
        ApplyOutcome::Kept
    );
}

#[test]
fn losing_signals_leave_no_history() {
    let mut store = BeliefStore::new();
    store.apply(&make_signal(1, 1, 100, 0.5, Direction::Strengthen));
    store.apply(&make_signal(2, 1, 50, 0.9, Direction::Weaken)); // stale, kept out
    let history = store.get_history("claim:p");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].stance, Stance::Strengthen);
}

#[test]
fn history_is_capped_at_newest_hundred() {
    let mut store = BeliefStore::new();
    for i in 0..250u64 {
        store.apply(&make_signal(1, i + 1, 100 + i, 0.5, Direction::Strengthen));
    }
    let history = store.get_history("claim:p");
    assert_eq!(history.len(), 100);
    assert_eq!(history[0].timestamp, 100 + 150);
    assert_eq!(history[99].timestamp, 100 + 249);
}

#[test]
fn snapshot_restore_round_trips() {
    let mut store = BeliefStore::new();
    store.apply(&make_signal(1, 1, 100, 0.5, Direction::Strengthen));
    store.apply(&make_signal(2, 1, 200, 0.7, Direction::Weaken));
    let snapshot = store.snapshot();

    store.apply(&make_signal(3, 1, 300, 0.9, Direction::Retract));
    assert_eq!(store.get("claim:p").unwrap().stance, Stance::Retract);

    store.restore(&snapshot);
    assert_eq!(store.all(), &snapshot.beliefs);
    assert_eq!(store.get("claim:p").unwrap().stance, Stance::Weaken);
}
