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

//! Per-node composition of the governance core.
//!
//! A node is logically single-threaded: every mutation happens from one
//! task processing one message or one tick at a time. Subsystems never call
//! each other; the node reducer chains their facts in a fixed order
//! (drift → revoke → quarantine → violation), journals each step, and
//! queues [`CoreEvent`]s and [`Outbound`] actions for the driver to drain.

use crate::core::admission::{self, AdmissionDecision};
use crate::core::arbitration::{Arbitration, TallyResult};
use crate::core::audit::AuditLog;
use crate::core::authority::AuthorityManager;
use crate::core::beliefs::{ApplyOutcome, BeliefStore};
use crate::core::clock::{Clock, SystemClock};
use crate::core::codec::sign_signal;
use crate::core::conflict::{ConflictAccumulator, ConflictChange};
use crate::core::drift::{DriftDetector, DriftParams};
use crate::core::events::CoreEvent;
use crate::core::patterns::{PatternBundle, PatternParams, PatternTracker};
use crate::core::quarantine::QuarantineList;
use crate::core::replay::{replay, ReplayState};
use crate::core::reputation::{ReputationLedger, ReputationParams};
use crate::core::rollback::RollbackBuffer;
use crate::core::security::signer::SignerBackend;
use crate::core::tstate::{TStateChange, TStateManager};
use crate::core::types::{
    clamp01, Belief, Direction, GovernanceConfig, LogKind, PeerId, Scope, Signal, SignalPayload,
    SignalType, Stance, TState,
};
use crate::monitoring::metrics::Metrics;
use crate::networking::checkpoints::CheckpointTracker;
use crate::networking::membership::{Membership, MembershipParams};
use crate::networking::propagation::{IncomingOutcome, Propagation, RejectReason};
use crate::networking::transport::Transport;
use crate::networking::wire::Message;
use crate::networking::Outbound;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Conflict and resolved-proposal records older than this are pruned.
const RECORD_PRUNE_HORIZON_MS: u64 = 600_000;

/// Node operation errors. Wire-level failures never surface here; only
/// contract violations do.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The keystore failed to sign.
    #[error("signing")]
    Signing,
    /// An unsigned or mutated signal reached `publish`.
    #[error("invalid signature")]
    InvalidSignature,
}

/// One governance node.
pub struct Node<S: SignerBackend> {
    id: PeerId,
    signer: S,
    cfg: GovernanceConfig,
    clock: Box<dyn Clock>,

    beliefs: BeliefStore,
    membership: Membership,
    propagation: Propagation,
    conflicts: ConflictAccumulator,
    checkpoints: CheckpointTracker,
    arbitration: Arbitration,
    reputation: ReputationLedger,
    quarantine: QuarantineList,
    tstate: TStateManager,
    authority: AuthorityManager,
    drift: DriftDetector,
    audit: AuditLog,
    rollback: RollbackBuffer,
    patterns: PatternTracker,

    next_signal_id: u64,
    outbound: VecDeque<Outbound>,
    events: VecDeque<CoreEvent>,
    metrics: Option<Arc<Metrics>>,
}

impl<S: SignerBackend> Node<S> {
    /// Build a node over the system clock.
    pub fn new(signer: S, cfg: GovernanceConfig) -> Self {
        Self::with_clock(signer, cfg, Box::new(SystemClock))
    }

    /// Build a node over an injected clock (tests, replay).
    pub fn with_clock(signer: S, cfg: GovernanceConfig, clock: Box<dyn Clock>) -> Self {
        let id = signer.peer_id();
        Self {
            id,
            beliefs: BeliefStore::new(),
            membership: Membership::new(MembershipParams {
                heartbeat_interval_ms: cfg.heartbeat_interval_ms,
                peer_timeout_ms: cfg.peer_timeout_ms,
                max_peers: cfg.max_peers,
            }),
            propagation: Propagation::new(cfg.max_seen_signals),
            conflicts: ConflictAccumulator::new(cfg.belief_divergence_threshold),
            checkpoints: CheckpointTracker::new(cfg.checkpoint_max_age_ms),
            arbitration: Arbitration::new(),
            reputation: ReputationLedger::new(ReputationParams {
                new_peer_influence: cfg.new_peer_influence,
                min_reputation_for_vote: cfg.min_reputation_for_vote,
            }),
            quarantine: QuarantineList::new(cfg.quarantine_base_ms),
            tstate: TStateManager::new(cfg.stale_comms_threshold_ms),
            authority: AuthorityManager::new(cfg.base_authority_duration_ms),
            drift: DriftDetector::new(DriftParams {
                hold_drift_threshold_ms: cfg.hold_drift_threshold_ms,
                stale_comms_threshold_ms: cfg.stale_comms_threshold_ms,
                confidence_drift_threshold: cfg.confidence_drift_threshold,
                belief_divergence_threshold: cfg.belief_divergence_threshold,
            }),
            audit: AuditLog::new(),
            rollback: RollbackBuffer::new(),
            patterns: PatternTracker::new(PatternParams {
                bundle_threshold: cfg.pattern_bundle_threshold,
                min_success_rate: cfg.min_success_rate_for_bundle,
            }),
            next_signal_id: 0,
            outbound: VecDeque::new(),
            events: VecDeque::new(),
            metrics: None,
            signer,
            cfg,
            clock,
        }
    }

    /// Attach a metrics registry.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// This node's identity.
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// The active configuration.
    pub fn config(&self) -> &GovernanceConfig {
        &self.cfg
    }

    // ------------------------------------------------------------------
    // Publishing
    // ------------------------------------------------------------------

    /// Sign and broadcast a delta signal, applying it locally first.
    pub fn publish(
        &mut self,
        domain: &str,
        claim_hash: &str,
        direction: Direction,
        confidence: f64,
        evidence_hash: Option<String>,
    ) -> Result<Signal, NodeError> {
        self.publish_typed(
            domain,
            claim_hash,
            direction,
            confidence,
            evidence_hash,
            SignalType::Delta,
            Scope::Global,
            None,
        )
    }

    /// Sign and broadcast a signal with full control of type, scope, and
    /// predecessor.
    #[allow(clippy::too_many_arguments)]
    pub fn publish_typed(
        &mut self,
        domain: &str,
        claim_hash: &str,
        direction: Direction,
        confidence: f64,
        evidence_hash: Option<String>,
        signal_type: SignalType,
        scope: Scope,
        prior_signal: Option<String>,
    ) -> Result<Signal, NodeError> {
        let now = self.clock.now_ms();
        self.next_signal_id += 1;
        let mut signal = Signal {
            source_id: self.id.clone(),
            signal_id: self.next_signal_id,
            timestamp: now,
            domain: domain.to_string(),
            signal_type,
            payload: SignalPayload {
                claim_hash: claim_hash.to_string(),
                direction,
                confidence: clamp01(confidence),
                evidence_hash,
            },
            ttl: self.cfg.default_ttl,
            scope,
            prior_signal,
            signature: String::new(),
        };
        sign_signal(&self.signer, &mut signal).map_err(|_| NodeError::Signing)?;
        self.propagation
            .publish(&signal)
            .map_err(|_| NodeError::InvalidSignature)?;

        self.journal(
            LogKind::OutBroadcast,
            json!({ "signal": signal_value(&signal) }),
            None,
            now,
        );

        let outcome = self.beliefs.apply(&signal);
        self.patterns
            .observe(domain, outcome == ApplyOutcome::Replaced);
        let self_id = self.id.clone();
        let change = self.conflicts.observe_belief(
            &self_id,
            claim_hash,
            direction.stance(),
            signal.payload.confidence,
            now,
            None,
        );
        self.handle_conflict_change(change, now);
        self.reputation.record_success(&self_id, now);

        self.push_out(Outbound::Broadcast(Message::LearningSignal {
            from: self.id.clone(),
            ts: now,
            signal: signal.clone(),
        }));
        Ok(signal)
    }

    /// Broadcast a HELLO announcing this node.
    pub fn hello(&mut self) {
        let now = self.clock.now_ms();
        let msg = Message::Hello {
            from: self.id.clone(),
            ts: now,
            known_peers: self.membership.alive_peers(),
            t_state: Some(self.tstate.state()),
        };
        self.push_out(Outbound::Broadcast(msg));
    }

    // ------------------------------------------------------------------
    // Message dispatch
    // ------------------------------------------------------------------

    /// Apply one inbound wire message. Never panics; wire-level failures
    /// are dropped locally with a journal trail.
    pub fn handle_message(&mut self, msg: Message) {
        let now = self.clock.now_ms();
        match msg {
            Message::Hello {
                from,
                known_peers,
                t_state,
                ..
            } => {
                if !self.ensure_admitted(&from, now) {
                    return;
                }
                self.drift.touch_comms(&from, now);
                let self_id = self.id.clone();
                let reply = self
                    .membership
                    .on_hello(&self_id, &from, &known_peers, t_state, now);
                self.push_out(reply);
            }

            Message::Heartbeat {
                from,
                t_state,
                confidence,
                ..
            } => {
                if !self.ensure_admitted(&from, now) {
                    return;
                }
                self.membership.on_heartbeat(&from, t_state, confidence, now);
                self.drift
                    .record_comms(&from, confidence.unwrap_or(1.0), now);
                self.reputation.record_consistency(&from, now);
            }

            Message::PeerList { from, peers, .. } => {
                if !self.ensure_admitted(&from, now) {
                    return;
                }
                let self_id = self.id.clone();
                self.membership.on_peer_list(&self_id, &from, &peers, now);
                self.drift.touch_comms(&from, now);
            }

            Message::LearningSignal { from, signal, .. } => {
                self.on_incoming_signal(signal, from, now);
            }

            Message::CheckpointReq {
                from, claim_hash, ..
            } => {
                if !self.ensure_admitted(&from, now) {
                    return;
                }
                self.drift.touch_comms(&from, now);
                let reply =
                    self.checkpoints
                        .on_request(&self.id, &from, &claim_hash, &self.beliefs, now);
                self.push_out(reply);
            }

            Message::CheckpointResp {
                from,
                claim_hash,
                stance,
                confidence,
                meaning,
                ..
            } => {
                if !self.ensure_admitted(&from, now) {
                    return;
                }
                self.drift.touch_comms(&from, now);
                if self
                    .checkpoints
                    .on_response(&from, &claim_hash, stance, confidence, meaning.as_deref())
                    .is_none()
                {
                    // Unsolicited response; nothing tracked for this claim.
                    return;
                }
                self.journal(
                    LogKind::CheckpointResp,
                    json!({
                        "claimHash": claim_hash.clone(),
                        "stance": stance.as_str(),
                        "confidence": confidence,
                    }),
                    Some(&from),
                    now,
                );
                self.push_event(CoreEvent::CheckpointResponse {
                    claim_hash: claim_hash.clone(),
                    from: from.clone(),
                });
                let change = self.conflicts.observe_belief(
                    &from,
                    &claim_hash,
                    stance,
                    confidence,
                    now,
                    meaning.as_deref(),
                );
                self.drift.record_belief(&from, &claim_hash, stance, confidence);
                self.handle_conflict_change(change, now);

                if self.conflicts.score(&claim_hash) >= self.cfg.belief_divergence_threshold
                    && !self.arbitration.has_open_for_claim(&claim_hash)
                {
                    self.open_proposal(&claim_hash, default_ballot(), now);
                }
            }

            Message::ArbitrationProposal {
                from,
                proposal_id,
                claim_hash,
                options,
                ..
            } => {
                if !self.ensure_admitted(&from, now) {
                    return;
                }
                self.drift.touch_comms(&from, now);
                self.arbitration
                    .on_proposal(&proposal_id, &claim_hash, options, now);
                self.journal(
                    LogKind::Proposal,
                    json!({ "proposalId": proposal_id.clone(), "claimHash": claim_hash.clone() }),
                    Some(&from),
                    now,
                );
                self.push_event(CoreEvent::ProposalOpened {
                    proposal_id: proposal_id.clone(),
                    claim_hash: claim_hash.clone(),
                });
                self.auto_vote(&proposal_id, &claim_hash, now);
            }

            Message::ArbitrationVote {
                from,
                proposal_id,
                option,
                weight,
                ..
            } => {
                // No admission gate here: an isolated or distrusted peer's
                // vote is still journaled, just never counted.
                self.drift.touch_comms(&from, now);
                let result = self.arbitration.record_vote(
                    &proposal_id,
                    &from,
                    &option,
                    weight,
                    &self.reputation,
                    &mut self.quarantine,
                    now,
                );
                let (counted, detail) = match &result {
                    Ok(w) => (true, format!("{w:.4}")),
                    Err(e) => (false, e.to_string()),
                };
                self.journal(
                    LogKind::Vote,
                    json!({
                        "proposalId": proposal_id,
                        "option": option,
                        "weight": weight,
                        "counted": counted,
                        "detail": detail,
                    }),
                    Some(&from),
                    now,
                );
                if counted {
                    self.metric(|m| m.votes_total.inc());
                }
            }

            Message::AuthorityRequest {
                from,
                scope,
                reason,
                ..
            } => {
                if !self.ensure_admitted(&from, now) {
                    return;
                }
                self.drift.touch_comms(&from, now);
                self.handle_authority_request(&from, scope, &reason, now);
            }

            Message::AuthorityGrant {
                from,
                request_id,
                expires_at,
                ..
            } => {
                self.journal(
                    LogKind::Grant,
                    json!({ "requestId": request_id, "expiresAt": expires_at, "remote": true }),
                    Some(&from),
                    now,
                );
            }

            Message::AuthorityDeny {
                from,
                request_id,
                reason,
                ..
            } => {
                self.journal(
                    LogKind::Deny,
                    json!({ "requestId": request_id, "reason": reason.clone(), "remote": true }),
                    Some(&from),
                    now,
                );
                self.push_event(CoreEvent::AuthorityDenied {
                    peer: self.id.clone(),
                    reason,
                });
            }

            Message::AuthorityRevoke {
                from,
                target_peer,
                reason,
                ..
            } => {
                // Advisory; local windows are only revoked by local drift
                // or an explicit local decision.
                self.journal(
                    LogKind::Revoke,
                    json!({ "targetPeer": target_peer.as_str(), "reason": reason, "remote": true }),
                    Some(&from),
                    now,
                );
            }

            Message::PatternBundle { from, bundle, .. } => {
                if !self.ensure_admitted(&from, now) {
                    return;
                }
                self.drift.touch_comms(&from, now);
                self.patterns.merge_bundle(&bundle);
                self.journal(
                    LogKind::PatternBundle,
                    json!({ "patterns": bundle.patterns.len(), "inbound": true }),
                    Some(&from),
                    now,
                );
            }

            Message::QuarantineNotice {
                from,
                target_peer,
                reason,
                ..
            } => {
                // A peer's isolation decision is a hint, never adopted.
                self.journal(
                    LogKind::Quarantine,
                    json!({ "targetPeer": target_peer.as_str(), "reason": reason, "remote": true }),
                    Some(&from),
                    now,
                );
            }
        }
    }

    fn on_incoming_signal(&mut self, signal: Signal, from: PeerId, now: u64) {
        let sender_quarantined = self.quarantine.is_quarantined(&from, now);
        if !sender_quarantined && !self.ensure_admitted(&from, now) {
            return;
        }
        let self_quarantined = {
            let self_id = self.id.clone();
            self.quarantine.is_quarantined(&self_id, now)
        };

        match self
            .propagation
            .on_incoming(&signal, sender_quarantined, self_quarantined)
        {
            IncomingOutcome::Rejected { reason } => {
                if reason == RejectReason::InvalidSignature {
                    self.reputation.record_failure(&from, now);
                }
                debug!(peer = %from, reason = reason.as_str(), "signal rejected");
                self.metric(|m| m.signals_rejected_total.inc());
                self.push_event(CoreEvent::SignalRejected {
                    from,
                    reason: reason.as_str().to_string(),
                });
            }

            IncomingOutcome::Duplicate => {
                self.metric(|m| m.signals_deduped_total.inc());
            }

            IncomingOutcome::Accepted { forward } => {
                self.reputation.record_success(&from, now);
                self.membership.observe(&from, None, None, now);
                self.drift.touch_comms(&from, now);

                self.journal(
                    LogKind::In,
                    json!({ "signal": signal_value(&signal) }),
                    Some(&from),
                    now,
                );

                let outcome = self.beliefs.apply(&signal);
                self.patterns
                    .observe(&signal.domain, outcome == ApplyOutcome::Replaced);

                let source = signal.source_id.clone();
                let claim = signal.payload.claim_hash.clone();
                let stance = signal.payload.direction.stance();
                let confidence = signal.payload.confidence;
                let change = self.conflicts.observe_belief(
                    &source,
                    &claim,
                    stance,
                    confidence,
                    signal.timestamp,
                    None,
                );
                self.drift.record_belief(&source, &claim, stance, confidence);
                self.handle_conflict_change(change, now);

                if let Some(fwd) = forward {
                    if fwd.ttl > 0 {
                        self.metric(|m| m.signals_forwarded_total.inc());
                        self.push_out(Outbound::Broadcast(Message::LearningSignal {
                            from: self.id.clone(),
                            ts: now,
                            signal: fwd,
                        }));
                    }
                }

                self.metric(|m| m.signals_accepted_total.inc());
                self.push_event(CoreEvent::SignalAccepted { signal, from });
            }
        }
    }

    // ------------------------------------------------------------------
    // Periodic work
    // ------------------------------------------------------------------

    /// One scheduler tick: beacons, liveness, T-state, expirations,
    /// quarantine sweep, drift checks, prune horizons.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();

        let self_id = self.id.clone();
        let self_conf = self.self_confidence();
        let (beacons, dropped) =
            self.membership
                .tick(&self_id, self.tstate.state(), self_conf, now);
        let sent_heartbeat = beacons
            .iter()
            .any(|o| matches!(o, Outbound::Broadcast(Message::Heartbeat { .. })));
        for b in beacons {
            self.push_out(b);
        }
        if sent_heartbeat {
            // Keep the self-view of reputation in step with how steady
            // peers see us; the tally-side cap makes over-claiming moot.
            self.reputation.record_consistency(&self_id, now);
        }
        for peer in dropped {
            self.tstate.forget(&peer);
            self.drift.forget(&peer);
        }

        for (peer, info) in self.membership.peers().clone() {
            self.tstate.observe(&peer, info.confidence, info.last_seen);
        }
        let change = self.tstate.update(now);
        self.apply_tstate_change(change, now);

        for window in self.authority.check_expirations(now) {
            self.journal(
                LogKind::Expire,
                json!({ "windowId": window.id.clone(), "expiresAt": window.expires_at }),
                Some(&window.peer),
                now,
            );
            self.push_event(CoreEvent::AuthorityExpired { window });
        }

        for entry in self.quarantine.sweep(now) {
            self.drift.reset(&entry.peer);
            self.journal(
                LogKind::Release,
                json!({ "reason": entry.reason }),
                Some(&entry.peer),
                now,
            );
            self.push_event(CoreEvent::PeerReleased { peer: entry.peer });
        }

        let consensus = self.beliefs.get_consensus();
        for ev in self.drift.check(&consensus, now) {
            self.journal(
                LogKind::Drift,
                json!({ "reason": ev.reason.as_str(), "details": ev.details.clone() }),
                Some(&ev.peer),
                now,
            );
            self.metric(|m| m.drift_events_total.inc());
            self.push_event(CoreEvent::DriftTriggered {
                peer: ev.peer.clone(),
                reason: ev.reason,
                details: ev.details.clone(),
            });
            if self.authority.window(&ev.peer).is_some() {
                self.revoke_authority(&ev.peer, &format!("drift: {}", ev.reason.as_str()));
            }
        }

        for claim in self.checkpoints.prune(now) {
            debug!(claim = %claim, "checkpoint round closed");
        }

        for proposal_id in self.arbitration.due(now, self.cfg.arbitration_max_age_ms) {
            self.finish_tally(&proposal_id, now);
        }

        if self.tstate.can_propagate_learning() {
            if let Some(bundle) = self.patterns.take_bundle(now) {
                self.broadcast_bundle(bundle, now);
            }
        }

        self.conflicts.prune(now, RECORD_PRUNE_HORIZON_MS);
        self.arbitration.prune_resolved(now, RECORD_PRUNE_HORIZON_MS);

        let alive = self.membership.alive_peers().len() as i64;
        self.metric(move |m| m.peers_alive.set(alive));
    }

    // ------------------------------------------------------------------
    // Arbitration
    // ------------------------------------------------------------------

    /// Open an arbitration round for a claim and vote our own stance.
    pub fn propose(&mut self, claim_hash: &str, options: Vec<String>) -> String {
        let now = self.clock.now_ms();
        self.open_proposal(claim_hash, options, now)
    }

    /// Cast (or recast) our vote on an open proposal. Returns false when
    /// the vote is ineligible or the proposal is unknown.
    pub fn vote(&mut self, proposal_id: &str, option: &str) -> bool {
        let now = self.clock.now_ms();
        self.cast_vote(proposal_id, option, now)
    }

    /// Tally an open proposal now (also runs automatically at the prune
    /// horizon). Returns the result when the proposal was open.
    pub fn tally(&mut self, proposal_id: &str) -> Option<TallyResult> {
        let now = self.clock.now_ms();
        self.finish_tally(proposal_id, now)
    }

    fn open_proposal(&mut self, claim_hash: &str, options: Vec<String>, now: u64) -> String {
        let self_id = self.id.clone();
        let proposal = self
            .arbitration
            .propose(&self_id, claim_hash, options.clone(), now);
        self.journal(
            LogKind::Proposal,
            json!({
                "proposalId": proposal.id.clone(),
                "claimHash": claim_hash,
                "options": options.clone(),
            }),
            None,
            now,
        );
        self.metric(|m| m.proposals_total.inc());
        self.push_event(CoreEvent::ProposalOpened {
            proposal_id: proposal.id.clone(),
            claim_hash: claim_hash.to_string(),
        });
        self.push_out(Outbound::Broadcast(Message::ArbitrationProposal {
            from: self.id.clone(),
            ts: now,
            proposal_id: proposal.id.clone(),
            claim_hash: claim_hash.to_string(),
            options,
        }));
        self.auto_vote(&proposal.id, claim_hash, now);
        proposal.id
    }

    fn auto_vote(&mut self, proposal_id: &str, claim_hash: &str, now: u64) {
        let Some(belief) = self.beliefs.get(claim_hash) else {
            return;
        };
        if belief.stance == Stance::Unknown {
            return;
        }
        let option = belief.stance.as_str().to_string();
        self.cast_vote(proposal_id, &option, now);
    }

    fn cast_vote(&mut self, proposal_id: &str, option: &str, now: u64) -> bool {
        let self_id = self.id.clone();
        let weight = self.reputation.get_influence(&self_id);
        let result = self.arbitration.record_vote(
            proposal_id,
            &self_id,
            option,
            weight,
            &self.reputation,
            &mut self.quarantine,
            now,
        );
        match result {
            Ok(recorded) => {
                self.journal(
                    LogKind::Vote,
                    json!({
                        "proposalId": proposal_id,
                        "option": option,
                        "weight": recorded,
                        "counted": true,
                    }),
                    None,
                    now,
                );
                self.metric(|m| m.votes_total.inc());
                self.push_out(Outbound::Broadcast(Message::ArbitrationVote {
                    from: self.id.clone(),
                    ts: now,
                    proposal_id: proposal_id.to_string(),
                    option: option.to_string(),
                    weight: recorded,
                }));
                true
            }
            Err(e) => {
                debug!(proposal = proposal_id, err = %e, "local vote not recorded");
                false
            }
        }
    }

    fn finish_tally(&mut self, proposal_id: &str, now: u64) -> Option<TallyResult> {
        let result = self
            .arbitration
            .tally(proposal_id, &self.reputation, &self.quarantine, now)?;

        // Settlements are rollback points.
        let snapshot = self.beliefs.snapshot();
        self.journal(
            LogKind::Snapshot,
            json!({ "claims": snapshot.beliefs.len(), "cause": "resolution" }),
            None,
            now,
        );
        self.rollback.push(snapshot, now);

        self.journal(
            LogKind::Resolution,
            json!({
                "proposalId": result.proposal_id.clone(),
                "claimHash": result.claim_hash.clone(),
                "winner": result.winner.clone(),
                "scores": result.scores.clone(),
            }),
            None,
            now,
        );
        if let Some(change) = self.conflicts.resolve(&result.claim_hash) {
            if let ConflictChange::Resolved { claim_hash } = change {
                self.journal(
                    LogKind::ConflictResolved,
                    json!({ "claimHash": claim_hash }),
                    None,
                    now,
                );
                self.push_event(CoreEvent::ConflictResolved { claim_hash });
            }
        }
        self.push_event(CoreEvent::ProposalResolved {
            proposal_id: result.proposal_id.clone(),
            claim_hash: result.claim_hash.clone(),
            winner: result.winner.clone(),
        });
        Some(result)
    }

    // ------------------------------------------------------------------
    // Checkpoints
    // ------------------------------------------------------------------

    /// Open a checkpoint round for a claim.
    pub fn request_checkpoint(&mut self, claim_hash: &str) {
        let now = self.clock.now_ms();
        self.start_checkpoint(claim_hash, now);
    }

    fn start_checkpoint(&mut self, claim_hash: &str, now: u64) {
        let self_id = self.id.clone();
        let out = self.checkpoints.request(&self_id, claim_hash, now);
        self.journal(
            LogKind::CheckpointReq,
            json!({ "claimHash": claim_hash }),
            None,
            now,
        );
        self.push_out(out);
    }

    fn handle_conflict_change(&mut self, change: Option<ConflictChange>, now: u64) {
        let Some(ConflictChange::Detected { claim_hash, score }) = change else {
            return;
        };
        self.journal(
            LogKind::ConflictDetected,
            json!({ "claimHash": claim_hash, "score": score }),
            None,
            now,
        );
        self.metric(|m| m.conflicts_detected_total.inc());
        self.push_event(CoreEvent::ConflictDetected {
            claim_hash: claim_hash.clone(),
            score,
        });
        if self.checkpoints.get(&claim_hash).is_none() {
            self.start_checkpoint(&claim_hash, now);
        }
    }

    // ------------------------------------------------------------------
    // Authority
    // ------------------------------------------------------------------

    /// Ask the swarm for an authority window.
    pub fn request_authority(&mut self, scope: Scope, reason: &str) {
        let now = self.clock.now_ms();
        self.journal(
            LogKind::AuthorityRequest,
            json!({ "scope": scope.as_str(), "reason": reason }),
            None,
            now,
        );
        self.push_out(Outbound::Broadcast(Message::AuthorityRequest {
            from: self.id.clone(),
            ts: now,
            scope,
            reason: reason.to_string(),
        }));
    }

    fn handle_authority_request(&mut self, from: &PeerId, scope: Scope, reason: &str, now: u64) {
        if self.quarantine.is_quarantined(from, now) {
            self.deny_request(from, "", "quarantined", now);
            return;
        }
        let state = self.tstate.state();
        let Some(req) = self.authority.request(from, scope, reason, state, now) else {
            // NotAuthorizedState: the ladder forbids fresh grants.
            self.deny_request(from, "", &format!("degraded state {state}"), now);
            return;
        };
        self.journal(
            LogKind::AuthorityRequest,
            json!({ "requestId": req.id.clone(), "scope": scope.as_str(), "reason": reason }),
            Some(from),
            now,
        );

        // Grant policy: an admitted, non-quarantined requester gets its
        // window; refusal paths above journal the denial.
        if let Some(window) = self.authority.grant(&req.id, state, now) {
            self.journal(
                LogKind::Grant,
                json!({
                    "windowId": window.id.clone(),
                    "expiresAt": window.expires_at,
                    "tState": window.t_state_at_grant.as_str(),
                    "scope": window.scope.as_str(),
                }),
                Some(from),
                now,
            );
            self.metric(|m| m.authority_grants_total.inc());
            self.push_event(CoreEvent::AuthorityGranted {
                window: window.clone(),
            });
            self.push_out(Outbound::Send(
                from.clone(),
                Message::AuthorityGrant {
                    from: self.id.clone(),
                    ts: now,
                    request_id: window.id,
                    expires_at: window.expires_at,
                },
            ));
        }
    }

    fn deny_request(&mut self, from: &PeerId, request_id: &str, reason: &str, now: u64) {
        self.journal(
            LogKind::Deny,
            json!({ "requestId": request_id, "reason": reason }),
            Some(from),
            now,
        );
        self.push_event(CoreEvent::AuthorityDenied {
            peer: from.clone(),
            reason: reason.to_string(),
        });
        self.push_out(Outbound::Send(
            from.clone(),
            Message::AuthorityDeny {
                from: self.id.clone(),
                ts: now,
                request_id: request_id.to_string(),
                reason: reason.to_string(),
            },
        ));
    }

    /// Revoke a peer's window. The consequences run in fixed order:
    /// journal, event, quarantine, violation.
    pub fn revoke_authority(&mut self, peer: &PeerId, reason: &str) -> bool {
        let now = self.clock.now_ms();
        let Some(window) = self.authority.revoke(peer) else {
            return false;
        };
        self.journal(
            LogKind::Revoke,
            json!({ "windowId": window.id, "reason": reason }),
            Some(peer),
            now,
        );
        self.metric(|m| m.authority_revocations_total.inc());
        self.push_event(CoreEvent::AuthorityRevoked {
            peer: peer.clone(),
            reason: reason.to_string(),
        });
        self.push_out(Outbound::Broadcast(Message::AuthorityRevoke {
            from: self.id.clone(),
            ts: now,
            target_peer: peer.clone(),
            reason: reason.to_string(),
        }));

        self.quarantine_peer(peer, reason, now);
        self.reputation.record_violation(peer, reason, now);
        true
    }

    /// Whether a peer currently holds authority.
    pub fn has_authority(&self, peer: &PeerId) -> bool {
        self.authority.has_authority(peer, self.clock.now_ms())
    }

    // ------------------------------------------------------------------
    // Quarantine
    // ------------------------------------------------------------------

    /// Isolate a peer now.
    pub fn quarantine_peer(&mut self, peer: &PeerId, reason: &str, now: u64) {
        let entry = self.quarantine.quarantine(peer, reason, now);
        self.journal(
            LogKind::Quarantine,
            json!({
                "reason": entry.reason.clone(),
                "expiresAt": entry.expires_at,
                "violations": entry.violations,
            }),
            Some(peer),
            now,
        );
        self.metric(|m| m.quarantines_total.inc());
        self.push_event(CoreEvent::PeerQuarantined {
            peer: peer.clone(),
            reason: entry.reason.clone(),
            expires_at: entry.expires_at,
        });
        self.push_out(Outbound::Broadcast(Message::QuarantineNotice {
            from: self.id.clone(),
            ts: now,
            target_peer: peer.clone(),
            reason: reason.to_string(),
        }));
    }

    /// Whether a peer is currently isolated.
    pub fn is_quarantined(&self, peer: &PeerId) -> bool {
        self.quarantine
            .is_quarantined_at(peer, self.clock.now_ms())
    }

    // ------------------------------------------------------------------
    // Drift hold markers
    // ------------------------------------------------------------------

    /// Mark a peer as deliberately holding (application-signaled pause).
    /// A hold past `hold_drift_threshold_ms` trips the drift detector.
    pub fn mark_hold(&mut self, peer: &PeerId) {
        let now = self.clock.now_ms();
        self.drift.begin_hold(peer, now);
    }

    /// Clear a peer's hold marker.
    pub fn clear_hold(&mut self, peer: &PeerId) {
        self.drift.end_hold(peer);
    }

    // ------------------------------------------------------------------
    // T-state
    // ------------------------------------------------------------------

    /// Current degradation level.
    pub fn t_state(&self) -> TState {
        self.tstate.state()
    }

    /// Force a level (tests, operator intervention).
    pub fn force_t_state(&mut self, state: TState) {
        let now = self.clock.now_ms();
        let change = self.tstate.force(state);
        self.apply_tstate_change(change, now);
    }

    /// Begin recontact (T2/T3 → T4).
    pub fn initiate_recontact(&mut self) {
        let now = self.clock.now_ms();
        let change = self.tstate.initiate_recontact();
        self.apply_tstate_change(change, now);
    }

    /// Complete recontact (T4 → T0).
    pub fn complete_recontact(&mut self) {
        let now = self.clock.now_ms();
        let change = self.tstate.complete_recontact();
        self.apply_tstate_change(change, now);
    }

    fn apply_tstate_change(&mut self, change: Option<TStateChange>, now: u64) {
        let Some(c) = change else {
            return;
        };
        self.authority.shrink_windows(c.to, now);
        self.journal(
            LogKind::TStateChange,
            json!({ "from": c.from.as_str(), "to": c.to.as_str() }),
            None,
            now,
        );
        info!(from = c.from.as_str(), to = c.to.as_str(), "t-state changed");
        let gauge = match c.to {
            TState::T0 => 0,
            TState::T1 => 1,
            TState::T2 => 2,
            TState::T3 => 3,
            TState::T4 => 4,
        };
        self.metric(move |m| m.t_state.set(gauge));
        self.push_event(CoreEvent::TStateChanged {
            from: c.from,
            to: c.to,
        });
    }

    // ------------------------------------------------------------------
    // Snapshots and rollback
    // ------------------------------------------------------------------

    /// Snapshot the belief store into the rollback ring.
    pub fn take_snapshot(&mut self) {
        let now = self.clock.now_ms();
        let snapshot = self.beliefs.snapshot();
        self.journal(
            LogKind::Snapshot,
            json!({ "claims": snapshot.beliefs.len(), "cause": "manual" }),
            None,
            now,
        );
        self.rollback.push(snapshot, now);
    }

    /// Restore the newest snapshot. The journaled entry carries the full
    /// belief set so replay reproduces the restored state.
    pub fn rollback_latest(&mut self) -> bool {
        let now = self.clock.now_ms();
        let Some(entry) = self.rollback.pop_latest() else {
            return false;
        };
        self.beliefs.restore(&entry.snapshot);
        let beliefs_value =
            serde_json::to_value(&entry.snapshot.beliefs).unwrap_or(serde_json::Value::Null);
        self.journal(
            LogKind::Rollback,
            json!({ "takenAt": entry.taken_at, "beliefs": beliefs_value }),
            None,
            now,
        );
        true
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Current belief on a claim.
    pub fn belief(&self, claim_hash: &str) -> Option<&Belief> {
        self.beliefs.get(claim_hash)
    }

    /// The belief store.
    pub fn beliefs(&self) -> &BeliefStore {
        &self.beliefs
    }

    /// Current conflict score for a claim.
    pub fn conflict_score(&self, claim_hash: &str) -> f64 {
        self.conflicts.score(claim_hash)
    }

    /// A peer's reputation score.
    pub fn get_score(&self, peer: &PeerId) -> f64 {
        self.reputation.get_score(peer)
    }

    /// A peer's effective influence (zero while isolated).
    pub fn get_influence(&self, peer: &PeerId) -> f64 {
        let now = self.clock.now_ms();
        self.reputation.get_influence(peer) * self.quarantine.get_influence_multiplier(peer, now)
    }

    /// The journal.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Replay the journal into fresh state (determinism check, recovery).
    pub fn replay_audit(&self) -> ReplayState {
        replay(&self.audit)
    }

    /// The arbitration book.
    pub fn arbitration(&self) -> &Arbitration {
        &self.arbitration
    }

    /// The membership view.
    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    /// Drain queued outbound actions.
    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        self.outbound.drain(..).collect()
    }

    /// Drain queued events.
    pub fn take_events(&mut self) -> Vec<CoreEvent> {
        self.events.drain(..).collect()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_admitted(&mut self, peer: &PeerId, now: u64) -> bool {
        if peer == &self.id {
            return true;
        }
        // A peer already in the fold stays admitted; quarantine gating of
        // its signals is propagation's job, and the returning-offender bar
        // applies at re-contact, once the peer has fallen out of view.
        if self.reputation.is_tracked(peer) && self.membership.peers().contains_key(peer) {
            return true;
        }
        match admission::admit(peer, &self.reputation, &mut self.quarantine, now) {
            AdmissionDecision::Admitted => {
                if !self.reputation.is_tracked(peer) {
                    self.reputation.track(peer, now);
                }
                true
            }
            AdmissionDecision::Denied(reason) => {
                self.journal(
                    LogKind::AdmissionDenied,
                    json!({ "reason": reason }),
                    Some(peer),
                    now,
                );
                self.membership.remove(peer);
                self.push_event(CoreEvent::AdmissionDenied {
                    peer: peer.clone(),
                    reason,
                });
                false
            }
        }
    }

    fn broadcast_bundle(&mut self, bundle: PatternBundle, now: u64) {
        self.journal(
            LogKind::PatternBundle,
            json!({ "patterns": bundle.patterns.len(), "inbound": false }),
            None,
            now,
        );
        self.push_event(CoreEvent::PatternBundleSent {
            pattern_count: bundle.patterns.len(),
        });
        self.push_out(Outbound::Broadcast(Message::PatternBundle {
            from: self.id.clone(),
            ts: now,
            bundle,
        }));
    }

    fn self_confidence(&self) -> f64 {
        let all = self.beliefs.all();
        if all.is_empty() {
            return 1.0;
        }
        all.values().map(|b| b.confidence).sum::<f64>() / all.len() as f64
    }

    fn journal(
        &mut self,
        kind: LogKind,
        data: serde_json::Value,
        peer: Option<&PeerId>,
        now: u64,
    ) {
        self.audit.append(kind, data, peer, now);
    }

    fn push_out(&mut self, out: Outbound) {
        self.outbound.push_back(out);
    }

    fn push_event(&mut self, ev: CoreEvent) {
        self.events.push_back(ev);
    }

    fn metric<F: FnOnce(&Metrics)>(&self, f: F) {
        if let Some(m) = &self.metrics {
            f(m);
        }
    }
}

/// The standard arbitration ballot.
pub fn default_ballot() -> Vec<String> {
    vec![
        Stance::Strengthen.as_str().to_string(),
        Stance::Weaken.as_str().to_string(),
        Stance::Retract.as_str().to_string(),
    ]
}

fn signal_value(signal: &Signal) -> serde_json::Value {
    serde_json::to_value(signal).unwrap_or(serde_json::Value::Null)
}

/// Drive a node over a transport: multiplex the inbox, the tick interval,
/// and event forwarding until the inbox closes.
pub async fn run<S: SignerBackend, T: Transport>(
    mut node: Node<S>,
    transport: T,
    mut inbox: mpsc::UnboundedReceiver<Message>,
    tick_interval: Duration,
    events: Option<mpsc::UnboundedSender<CoreEvent>>,
) {
    let mut ticker = tokio::time::interval(tick_interval);
    node.hello();
    flush(&mut node, &transport, &events);

    loop {
        tokio::select! {
            maybe = inbox.recv() => {
                match maybe {
                    Some(msg) => {
                        node.handle_message(msg);
                        flush(&mut node, &transport, &events);
                    }
                    None => {
                        info!("inbox closed; node loop stopping");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                node.tick();
                flush(&mut node, &transport, &events);
            }
        }
    }
}

fn flush<S: SignerBackend, T: Transport>(
    node: &mut Node<S>,
    transport: &T,
    events: &Option<mpsc::UnboundedSender<CoreEvent>>,
) {
    for out in node.take_outbound() {
        let result = match &out {
            Outbound::Broadcast(msg) => transport.broadcast(msg),
            Outbound::Send(to, msg) => transport.send(to, msg),
        };
        if let Err(e) = result {
            warn!(err = %e, "outbound delivery failed");
        }
    }
    if let Some(tx) = events {
        for ev in node.take_events() {
            let _ = tx.send(ev);
        }
    }
}
