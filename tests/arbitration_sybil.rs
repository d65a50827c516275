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

use concord::core::arbitration::{Arbitration, VoteError};
use concord::core::quarantine::QuarantineList;
use concord::core::reputation::{ReputationLedger, ReputationParams};
use concord::core::types::PeerId;

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

/// Establish a peer the way the swarm does: steady heartbeats plus a
/// verified publish.
fn establish(rep: &mut ReputationLedger, p: &PeerId, heartbeats: u32, now: u64) {
    for i in 0..heartbeats {
        rep.record_consistency(p, now + i as u64);
    }
    rep.record_success(p, now + heartbeats as u64);
}

#[test]
fn sybil_majority_loses_to_established_minority() {
    let mut rep = ReputationLedger::new(params());
    let mut quarantine = QuarantineList::new(30_000);
    let mut arb = Arbitration::new();
    let now = 50_000u64;

    // 5 honest peers, warmed up over 40 heartbeat rounds.
    let honest: Vec<PeerId> = (0..5).map(peer).collect();
    for p in &honest {
        establish(&mut rep, p, 40, 1_000);
        assert!(rep.get_score(p) >= 0.5, "honest score {}", rep.get_score(p));
        assert!(rep.get_influence(p) >= 0.55);
    }

    // 20 attackers join freshly: tracked at the influence floor only.
    let attackers: Vec<PeerId> = (100..120).map(|n| peer(n as u8)).collect();
    for p in &attackers {
        rep.track(p, now);
        assert!(rep.get_score(p) < 0.2);
    }

    let proposer = honest[0].clone();
    let proposal = arb.propose(
        &proposer,
        "claim:X",
        vec![
            "strengthen".to_string(),
            "weaken".to_string(),
            "retract".to_string(),
        ],
        now,
    );

    for p in &honest {
        let claimed = rep.get_influence(p);
        arb.record_vote(&proposal.id, p, "strengthen", claimed, &rep, &mut quarantine, now)
            .expect("honest vote counts");
    }
    for p in &attackers {
        // Fresh peers sit below the voting gate; their flood never lands.
        let err = arb
            .record_vote(&proposal.id, p, "weaken", 0.95, &rep, &mut quarantine, now)
            .expect_err("fresh attacker is below the voting gate");
        assert_eq!(err, VoteError::BelowThreshold);
    }

    let result = arb.tally(&proposal.id, &rep, &quarantine, now).expect("open");
    assert_eq!(result.winner, "strengthen");
    assert!(result.scores["strengthen"] > 2.5);
    assert_eq!(result.scores["weaken"], 0.0);
}

#[test]
fn quarantined_voter_never_moves_the_tally() {
    let mut rep = ReputationLedger::new(params());
    let mut quarantine = QuarantineList::new(30_000);
    let mut arb = Arbitration::new();
    let now = 10_000u64;

    let honest = peer(1);
    let offender = peer(2);
    establish(&mut rep, &honest, 40, 0);
    establish(&mut rep, &offender, 40, 0);

    let proposal = arb.propose(
        &peer(0),
        "claim:Y",
        vec!["strengthen".to_string(), "weaken".to_string()],
        now,
    );

    arb.record_vote(
        &proposal.id,
        &honest,
        "strengthen",
        rep.get_influence(&honest),
        &rep,
        &mut quarantine,
        now,
    )
    .expect("honest vote");

    quarantine.quarantine(&offender, "test isolation", now);
    let err = arb
        .record_vote(
            &proposal.id,
            &offender,
            "weaken",
            rep.get_influence(&offender),
            &rep,
            &mut quarantine,
            now,
        )
        .expect_err("quarantined voter rejected");
    assert_eq!(err, VoteError::Quarantined);

    let result = arb.tally(&proposal.id, &rep, &quarantine, now).expect("open");
    assert_eq!(result.winner, "strengthen");
    assert_eq!(result.scores["weaken"], 0.0);
}

#[test]
fn vote_counted_then_quarantined_is_dropped_at_tally() {
    let mut rep = ReputationLedger::new(params());
    let mut quarantine = QuarantineList::new(30_000);
    let mut arb = Arbitration::new();
    let now = 10_000u64;

    let steady = peer(1);
    let flaky = peer(2);
    establish(&mut rep, &steady, 40, 0);
    establish(&mut rep, &flaky, 40, 0);

    let proposal = arb.propose(
        &peer(0),
        "claim:Z",
        vec!["strengthen".to_string(), "weaken".to_string()],
        now,
    );
    arb.record_vote(
        &proposal.id,
        &steady,
        "strengthen",
        rep.get_influence(&steady),
        &rep,
        &mut quarantine,
        now,
    )
    .expect("steady vote");
    arb.record_vote(
        &proposal.id,
        &flaky,
        "weaken",
        rep.get_influence(&flaky),
        &rep,
        &mut quarantine,
        now,
    )
    .expect("flaky vote recorded while in good standing");

    // Isolation lands between vote and tally.
    quarantine.quarantine(&flaky, "late violation", now + 1);

    let result = arb
        .tally(&proposal.id, &rep, &quarantine, now + 2)
        .expect("open");
    assert_eq!(result.winner, "strengthen");
    assert_eq!(result.scores["weaken"], 0.0);
}

#[test]
fn claimed_weight_is_capped_by_current_influence() {
    let mut rep = ReputationLedger::new(params());
    let mut quarantine = QuarantineList::new(30_000);
    let mut arb = Arbitration::new();
    let now = 10_000u64;

    let voter = peer(1);
    establish(&mut rep, &voter, 40, 0);
    let influence = rep.get_influence(&voter);

    let proposal = arb.propose(
        &peer(0),
        "claim:W",
        vec!["strengthen".to_string(), "weaken".to_string()],
        now,
    );
    let recorded = arb
        .record_vote(&proposal.id, &voter, "weaken", 50.0, &rep, &mut quarantine, now)
        .expect("vote");
    assert!((recorded - influence).abs() < 1e-9);

    let result = arb.tally(&proposal.id, &rep, &quarantine, now).expect("open");
    assert!((result.scores["weaken"] - influence).abs() < 1e-9);
}

#[test]
fn ties_break_toward_the_earliest_option() {
    let mut rep = ReputationLedger::new(params());
    let mut quarantine = QuarantineList::new(30_000);
    let mut arb = Arbitration::new();
    let now = 10_000u64;

    let a = peer(1);
    let b = peer(2);
    establish(&mut rep, &a, 40, 0);
    establish(&mut rep, &b, 40, 0);
    assert!((rep.get_influence(&a) - rep.get_influence(&b)).abs() < 1e-12);

    let proposal = arb.propose(
        &peer(0),
        "claim:T",
        vec!["weaken".to_string(), "strengthen".to_string()],
        now,
    );
    arb.record_vote(
        &proposal.id,
        &a,
        "strengthen",
        rep.get_influence(&a),
        &rep,
        &mut quarantine,
        now,
    )
    .expect("vote a");
    arb.record_vote(
        &proposal.id,
        &b,
        "weaken",
        rep.get_influence(&b),
        &rep,
        &mut quarantine,
        now,
    )
    .expect("vote b");

    // Dead even; the ballot order decides.
    let result = arb.tally(&proposal.id, &rep, &quarantine, now).expect("open");
    assert_eq!(result.winner, "weaken");
}

#[test]
fn duplicate_votes_overwrite() {
    let mut rep = ReputationLedger::new(params());
    let mut quarantine = QuarantineList::new(30_000);
    let mut arb = Arbitration::new();
    let now = 10_000u64;

    let voter = peer(1);
    establish(&mut rep, &voter, 40, 0);

    let proposal = arb.propose(
        &peer(0),
        "claim:D",
        vec!["strengthen".to_string(), "weaken".to_string()],
        now,
    );
    arb.record_vote(
        &proposal.id,
        &voter,
        "strengthen",
        rep.get_influence(&voter),
        &rep,
        &mut quarantine,
        now,
    )
    .expect("first vote");
    arb.record_vote(
        &proposal.id,
        &voter,
        "weaken",
        rep.get_influence(&voter),
        &rep,
        &mut quarantine,
        now + 1,
    )
    .expect("recast");

    let result = arb.tally(&proposal.id, &rep, &quarantine, now + 2).expect("open");
    assert_eq!(result.winner, "weaken");
    assert_eq!(result.scores["strengthen"], 0.0);
}

#[test]
fn quarantined_vote_is_journaled_but_never_counted() {
    use common::{make_signer, test_config};
    use concord::core::clock::{Clock, ManualClock};
    use concord::core::security::signer::SignerBackend;
    use concord::core::types::LogKind;
    use concord::networking::wire::Message;
    use concord::node::Node;

    let clock = ManualClock::at(1_000);
    let mut node = Node::with_clock(make_signer(), test_config(), Box::new(clock.clone()));
    let offender = make_signer().peer_id();

    node.handle_message(Message::Hello {
        from: offender.clone(),
        ts: 1_000,
        known_peers: Vec::new(),
        t_state: None,
    });
    let now = clock.now_ms();
    node.quarantine_peer(&offender, "offense", now);

    let proposal_id = node.propose("claim:A4", vec![
        "strengthen".to_string(),
        "weaken".to_string(),
    ]);

    node.handle_message(Message::ArbitrationVote {
        from: offender.clone(),
        ts: now,
        proposal_id: proposal_id.clone(),
        option: "weaken".to_string(),
        weight: 0.9,
    });

    // The vote left a journal trail but never entered the book.
    let vote_entry = node
        .audit()
        .entries()
        .iter()
        .find(|e| e.kind == LogKind::Vote && e.peer.as_ref() == Some(&offender))
        .expect("vote journaled");
    assert_eq!(vote_entry.data["counted"], false);

    let result = node.tally(&proposal_id).expect("open proposal");
    assert_eq!(result.scores["weaken"], 0.0);
}

#[test]
fn unknown_proposal_is_a_noop() {
    let rep = ReputationLedger::new(params());
    let mut quarantine = QuarantineList::new(30_000);
    let mut arb = Arbitration::new();
    let err = arb
        .record_vote(
            "nobody:1",
            &peer(1),
            "strengthen",
            1.0,
            &rep,
            &mut quarantine,
            0,
        )
        .expect_err("unknown proposal");
    assert_eq!(err, VoteError::UnknownProposal);
    assert!(arb.tally("nobody:1", &rep, &quarantine, 0).is_none());
}
