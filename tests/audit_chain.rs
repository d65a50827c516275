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

use concord::core::audit::AuditLog;
use concord::core::types::{LogKind, PeerId};
use proptest::prelude::*;
use serde_json::json;

fn peer(n: u8) -> PeerId {
    let mut key = [0u8; 32];
    key[0] = n;
    PeerId::from_public_key(&key)
}

fn build_log(entries: usize) -> AuditLog {
    let mut log = AuditLog::new();
    for i in 0..entries {
        log.append(
            LogKind::In,
            json!({ "claimHash": format!("claim:{}", i % 7), "seq": i }),
            Some(&peer((i % 5) as u8)),
            1_000 + i as u64,
        );
    }
    log
}

#[test]
fn fresh_chain_verifies() {
    let log = build_log(1_000);
    let status = log.verify();
    assert!(status.valid);
    assert_eq!(status.broken_at, None);
}

#[test]
fn tampering_breaks_the_chain_at_the_mutated_entry() {
    let log = build_log(1_000);
    let jsonl = log.export_jsonl();

    // Mutate entry 500's data through the JSONL form.
    let mut lines: Vec<serde_json::Value> = jsonl
        .lines()
        .map(|l| serde_json::from_str(l).expect("line parses"))
        .collect();
    lines[500]["data"]["seq"] = json!(999_999);
    let tampered: String = lines
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("\n");

    let reimported = AuditLog::from_jsonl(&tampered).expect("import");
    let status = reimported.verify();
    assert!(!status.valid);
    assert_eq!(status.broken_at, Some(500));
}

#[test]
fn jsonl_round_trip_is_byte_exact_and_valid() {
    let log = build_log(64);
    let exported = log.export_jsonl();
    let imported = AuditLog::from_jsonl(&exported).expect("import");
    assert!(imported.verify().valid);
    assert_eq!(imported.export_jsonl(), exported);
    assert_eq!(imported.next_index(), log.next_index());
    assert_eq!(imported.last_hash(), log.last_hash());
}

#[test]
fn import_continues_the_chain() {
    let log = build_log(10);
    let mut imported = AuditLog::from_jsonl(&log.export_jsonl()).expect("import");
    imported.append(LogKind::Drift, json!({ "reason": "STALE_COMMS" }), None, 9_999);
    assert!(imported.verify().valid);
    assert_eq!(imported.entries().last().unwrap().i, 10);
}

#[test]
fn compaction_keeps_the_suffix_verifiable() {
    let mut log = build_log(200);
    log.compact(50);
    assert_eq!(log.len(), 50);
    assert_eq!(log.entries().first().unwrap().i, 150);
    assert!(log.verify().valid);

    // Still append-able and verifiable after compaction.
    log.append(LogKind::Release, json!({}), Some(&peer(1)), 10_000);
    assert!(log.verify().valid);
}

#[test]
fn provenance_follows_a_claim_in_index_order() {
    let log = build_log(70);
    let trail = log.trace_provenance("claim:3");
    assert!(!trail.is_empty());
    let mut last = None;
    for entry in &trail {
        assert_eq!(
            entry.data.get("claimHash").and_then(|v| v.as_str()),
            Some("claim:3")
        );
        if let Some(prev) = last {
            assert!(entry.i > prev);
        }
        last = Some(entry.i);
    }
}

proptest! {
    // Arbitrary payload content never produces an unverifiable chain.
    #[test]
    fn prop_chain_verifies_for_any_payloads(
        payloads in proptest::collection::vec(".{0,40}", 1..32)
    ) {
        let mut log = AuditLog::new();
        let author = peer(0);
        for (i, p) in payloads.iter().enumerate() {
            log.append(
                LogKind::In,
                json!({ "blob": p, "i": i }),
                if i % 2 == 0 { Some(&author) } else { None },
                i as u64,
            );
        }
        let status = log.verify();
        prop_assert!(status.valid);

        let reimported = AuditLog::from_jsonl(&log.export_jsonl()).expect("import");
        prop_assert!(reimported.verify().valid);
    }
}
