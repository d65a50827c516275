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

//! Reputation-weighted arbitration of contested claims.
//!
//! Vote weight anti-inflation: a vote's claimed weight is capped by the
//! voter's influence both when recorded and again at tally time, so a peer
//! whose standing collapsed mid-vote cannot ride its old weight. Quarantined
//! voters are excluded at both points as well.

use crate::core::quarantine::QuarantineList;
use crate::core::reputation::ReputationLedger;
use crate::core::types::PeerId;
use std::collections::BTreeMap;
use thiserror::Error;

/// Vote recording errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VoteError {
    /// No proposal with that id.
    #[error("unknown proposal")]
    UnknownProposal,
    /// The proposal already resolved.
    #[error("proposal resolved")]
    AlreadyResolved,
    /// The option is not on the ballot.
    #[error("unknown option")]
    UnknownOption,
    /// The voter is isolated.
    #[error("voter quarantined")]
    Quarantined,
    /// The voter's score is below the voting gate.
    #[error("reputation below threshold")]
    BelowThreshold,
}

/// One recorded vote.
#[derive(Clone, Debug, PartialEq)]
pub struct VoteRecord {
    /// Chosen option.
    pub option: String,
    /// Weight after the recording-time cap.
    pub weight: f64,
    /// When recorded (ms).
    pub ts: u64,
}

/// An arbitration round. Lifecycle: open → resolved (terminal).
#[derive(Clone, Debug)]
pub struct Proposal {
    /// Unique id.
    pub id: String,
    /// Contested claim.
    pub claim_hash: String,
    /// Ballot, in tie-break priority order.
    pub options: Vec<String>,
    /// Latest vote per peer (duplicates overwrite).
    pub votes: BTreeMap<PeerId, VoteRecord>,
    /// Creation time (ms).
    pub created_at: u64,
    /// Terminal flag.
    pub resolved: bool,
    /// Winning option once resolved.
    pub winner: Option<String>,
}

/// Outcome of a tally.
#[derive(Clone, Debug, PartialEq)]
pub struct TallyResult {
    /// Proposal id.
    pub proposal_id: String,
    /// Settled claim.
    pub claim_hash: String,
    /// Winning option.
    pub winner: String,
    /// Per-option weight sums.
    pub scores: BTreeMap<String, f64>,
}

/// Proposal book.
#[derive(Debug, Default)]
pub struct Arbitration {
    proposals: BTreeMap<String, Proposal>,
    next_seq: u64,
}

impl Arbitration {
    /// Empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a local proposal. The id embeds the proposer and a local
    /// sequence number, so ids never collide across the swarm.
    pub fn propose(
        &mut self,
        proposer: &PeerId,
        claim_hash: &str,
        options: Vec<String>,
        now: u64,
    ) -> Proposal {
        self.next_seq += 1;
        let id = format!("{}:{}", proposer, self.next_seq);
        let proposal = Proposal {
            id: id.clone(),
            claim_hash: claim_hash.to_string(),
            options,
            votes: BTreeMap::new(),
            created_at: now,
            resolved: false,
            winner: None,
        };
        self.proposals.insert(id, proposal.clone());
        proposal
    }

    /// Record a remote proposal. Ignored if the id is already known.
    pub fn on_proposal(&mut self, id: &str, claim_hash: &str, options: Vec<String>, now: u64) {
        self.proposals
            .entry(id.to_string())
            .or_insert_with(|| Proposal {
                id: id.to_string(),
                claim_hash: claim_hash.to_string(),
                options,
                votes: BTreeMap::new(),
                created_at: now,
                resolved: false,
                winner: None,
            });
    }

    /// Record a vote. `claimed_weight` is capped by the voter's current
    /// influence; a repeated vote from the same peer overwrites the prior
    /// one.
    pub fn record_vote(
        &mut self,
        proposal_id: &str,
        voter: &PeerId,
        option: &str,
        claimed_weight: f64,
        reputation: &ReputationLedger,
        quarantine: &mut QuarantineList,
        now: u64,
    ) -> Result<f64, VoteError> {
        let proposal = self
            .proposals
            .get_mut(proposal_id)
            .ok_or(VoteError::UnknownProposal)?;
        if proposal.resolved {
            return Err(VoteError::AlreadyResolved);
        }
        if !proposal.options.iter().any(|o| o == option) {
            return Err(VoteError::UnknownOption);
        }
        if quarantine.is_quarantined(voter, now) {
            return Err(VoteError::Quarantined);
        }
        if !reputation.can_vote(voter) {
            return Err(VoteError::BelowThreshold);
        }

        let weight = claimed_weight.min(reputation.get_influence(voter)).max(0.0);
        proposal.votes.insert(
            voter.clone(),
            VoteRecord {
                option: option.to_string(),
                weight,
                ts: now,
            },
        );
        Ok(weight)
    }

    /// Tally an open proposal. Every option starts at zero; each vote from
    /// a currently non-quarantined peer contributes
    /// `min(recorded_weight, current_influence)`. Winner is the argmax with
    /// ties broken by earliest ballot position. Marks the proposal resolved.
    pub fn tally(
        &mut self,
        proposal_id: &str,
        reputation: &ReputationLedger,
        quarantine: &QuarantineList,
        now: u64,
    ) -> Option<TallyResult> {
        let proposal = self.proposals.get_mut(proposal_id)?;
        if proposal.resolved {
            return None;
        }

        let mut scores: BTreeMap<String, f64> = proposal
            .options
            .iter()
            .map(|o| (o.clone(), 0.0))
            .collect();

        for (voter, vote) in proposal.votes.iter() {
            if quarantine.is_quarantined_at(voter, now) {
                continue;
            }
            let effective = vote.weight.min(reputation.get_influence(voter));
            if let Some(total) = scores.get_mut(&vote.option) {
                *total += effective;
            }
        }

        let mut winner: Option<(usize, f64)> = None;
        for (idx, option) in proposal.options.iter().enumerate() {
            let total = scores.get(option).copied().unwrap_or(0.0);
            match winner {
                Some((_, best)) if total <= best => {}
                _ => winner = Some((idx, total)),
            }
        }
        let (winner_idx, _) = winner?;
        let winner_opt = proposal.options[winner_idx].clone();

        proposal.resolved = true;
        proposal.winner = Some(winner_opt.clone());

        Some(TallyResult {
            proposal_id: proposal_id.to_string(),
            claim_hash: proposal.claim_hash.clone(),
            winner: winner_opt,
            scores,
        })
    }

    /// Ids of open proposals older than `max_age_ms`, oldest first. These
    /// are due for auto-tally.
    pub fn due(&self, now: u64, max_age_ms: u64) -> Vec<String> {
        let mut ids: Vec<(u64, String)> = self
            .proposals
            .iter()
            .filter(|(_, p)| !p.resolved && now.saturating_sub(p.created_at) > max_age_ms)
            .map(|(id, p)| (p.created_at, id.clone()))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Drop resolved proposals older than the horizon.
    pub fn prune_resolved(&mut self, now: u64, horizon_ms: u64) {
        let cutoff = now.saturating_sub(horizon_ms);
        self.proposals
            .retain(|_, p| !p.resolved || p.created_at >= cutoff);
    }

    /// Whether any open proposal targets the claim.
    pub fn has_open_for_claim(&self, claim_hash: &str) -> bool {
        self.proposals
            .values()
            .any(|p| !p.resolved && p.claim_hash == claim_hash)
    }

    /// Look up a proposal.
    pub fn get(&self, proposal_id: &str) -> Option<&Proposal> {
        self.proposals.get(proposal_id)
    }

    /// Proposal count (open and resolved).
    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    /// True when the book is empty.
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }
}
