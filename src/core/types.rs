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

//! Core governance types: identities, signals, beliefs, and configuration.
//!
//! Containers are `BTreeMap`/`BTreeSet` throughout the crate so iteration
//! order (and every derived hash, tally, and journal entry) is deterministic.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable peer identity: the lowercase hex encoding of an Ed25519 public key.
///
/// Equality is byte-exact on the hex string.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap an already-encoded hex identity.
    pub fn new(hex_key: impl Into<String>) -> Self {
        Self(hex_key.into())
    }

    /// Derive the identity from raw Ed25519 public key bytes.
    pub fn from_public_key(pk: &[u8; 32]) -> Self {
        Self(hex::encode(pk))
    }

    /// Interpret as Ed25519 public key bytes if this is valid 32-byte hex.
    pub fn as_public_key_bytes(&self) -> Option<[u8; 32]> {
        let bytes = hex::decode(&self.0).ok()?;
        if bytes.len() != 32 {
            return None;
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Some(out)
    }

    /// The hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A node's position on a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    /// The claim is supported.
    Strengthen,
    /// The claim is doubted.
    Weaken,
    /// The claim is withdrawn.
    Retract,
    /// No position held.
    Unknown,
}

impl Stance {
    /// Wire/display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stance::Strengthen => "strengthen",
            Stance::Weaken => "weaken",
            Stance::Retract => "retract",
            Stance::Unknown => "unknown",
        }
    }

    /// Parse a wire name; anything unrecognized is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "strengthen" => Stance::Strengthen,
            "weaken" => Stance::Weaken,
            "retract" => Stance::Retract,
            _ => Stance::Unknown,
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction a signal pushes a claim in. Unlike [`Stance`] there is no
/// neutral element: a signal always takes a position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Push toward acceptance.
    Strengthen,
    /// Push toward doubt.
    Weaken,
    /// Withdraw the claim.
    Retract,
}

impl Direction {
    /// The stance a belief adopts when this direction is applied.
    pub fn stance(&self) -> Stance {
        match self {
            Direction::Strengthen => Stance::Strengthen,
            Direction::Weaken => Stance::Weaken,
            Direction::Retract => Stance::Retract,
        }
    }

    /// Wire/display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Strengthen => "strengthen",
            Direction::Weaken => "weaken",
            Direction::Retract => "retract",
        }
    }
}

/// Kind of belief update a signal carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    /// Incremental belief update.
    Delta,
    /// Correction of earlier signals.
    Correction,
    /// Deprecation of a claim.
    Deprecation,
}

impl SignalType {
    /// Wire/display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Delta => "delta",
            SignalType::Correction => "correction",
            SignalType::Deprecation => "deprecation",
        }
    }
}

/// Propagation scope of a signal or authority window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// This node only.
    Local,
    /// The local cluster.
    Cluster,
    /// The whole swarm.
    Global,
}

impl Scope {
    /// Wire/display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Local => "local",
            Scope::Cluster => "cluster",
            Scope::Global => "global",
        }
    }
}

/// Swarm-wide degradation level.
///
/// T0 is healthy operation; T1–T3 are progressively degraded under
/// communication loss; T4 is an explicit recontact mode entered from T2/T3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TState {
    /// Healthy.
    T0,
    /// Mild degradation.
    T1,
    /// Moderate degradation.
    T2,
    /// Severe degradation.
    T3,
    /// Recontact in progress.
    T4,
}

impl TState {
    /// Authority-duration multiplier for this level.
    pub fn multiplier(&self) -> f64 {
        match self {
            TState::T0 => 1.0,
            TState::T1 => 0.7,
            TState::T2 => 0.4,
            TState::T3 => 0.1,
            TState::T4 => 1.0,
        }
    }

    /// Whether fresh authority may be granted at this level.
    pub fn can_grant_new_authority(&self) -> bool {
        matches!(self, TState::T0 | TState::T1 | TState::T4)
    }

    /// Whether learned pattern bundles may be propagated at this level.
    pub fn can_propagate_learning(&self) -> bool {
        matches!(self, TState::T0 | TState::T4)
    }

    /// Display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TState::T0 => "T0",
            TState::T1 => "T1",
            TState::T2 => "T2",
            TState::T3 => "T3",
            TState::T4 => "T4",
        }
    }
}

impl fmt::Display for TState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a peer was flagged by the drift detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftReason {
    /// Authority held past the hold threshold.
    HoldTooLong,
    /// No communication past the staleness threshold.
    StaleComms,
    /// Reported confidence below the decay threshold.
    ConfidenceDecay,
    /// Beliefs diverged from swarm consensus past the divergence threshold.
    BeliefDivergence,
}

impl DriftReason {
    /// Display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftReason::HoldTooLong => "HOLD_TOO_LONG",
            DriftReason::StaleComms => "STALE_COMMS",
            DriftReason::ConfidenceDecay => "CONFIDENCE_DECAY",
            DriftReason::BeliefDivergence => "BELIEF_DIVERGENCE",
        }
    }
}

impl fmt::Display for DriftReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a learned pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStatus {
    /// Still accumulating observations.
    Forming,
    /// Meets emission thresholds, not yet propagated.
    Ready,
    /// Broadcast to the swarm.
    Propagated,
}

/// Journal entry kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogKind {
    /// Inbound signal accepted.
    In,
    /// Outbound point-to-point send.
    OutSend,
    /// Outbound broadcast.
    OutBroadcast,
    /// Conflict score crossed the divergence threshold.
    ConflictDetected,
    /// Contested claim settled.
    ConflictResolved,
    /// Checkpoint round opened.
    CheckpointReq,
    /// Checkpoint response recorded.
    CheckpointResp,
    /// Arbitration proposal opened.
    Proposal,
    /// Arbitration vote recorded.
    Vote,
    /// Arbitration winner decided.
    Resolution,
    /// Authority requested.
    AuthorityRequest,
    /// Authority window granted.
    Grant,
    /// Authority request denied.
    Deny,
    /// Authority window revoked.
    Revoke,
    /// Authority window lapsed on its own.
    Expire,
    /// Drift trigger fired.
    Drift,
    /// Peer isolated.
    Quarantine,
    /// Quarantine expired.
    Release,
    /// Peer refused admission.
    AdmissionDenied,
    /// Degradation level changed.
    TStateChange,
    /// Belief store restored from a snapshot.
    Rollback,
    /// Belief snapshot taken.
    Snapshot,
    /// Learning bundle sent or received.
    PatternBundle,
}

/// Payload of a belief-update signal.
///
/// Field order is the canonical serialization order; do not reorder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalPayload {
    /// Application-defined claim identifier.
    pub claim_hash: String,
    /// Direction of the update.
    pub direction: Direction,
    /// Author confidence in \[0, 1\].
    pub confidence: f64,
    /// Optional evidence reference.
    #[serde(default)]
    pub evidence_hash: Option<String>,
}

/// A signed, TTL-bounded belief update. Immutable once signed.
///
/// Field order is the canonical serialization order (signature last, outside
/// the signed form); do not reorder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Author identity (hex Ed25519 public key).
    pub source_id: PeerId,
    /// Strictly increasing per source in send order.
    pub signal_id: u64,
    /// Wall-clock ms; authoritative for belief ordering.
    pub timestamp: u64,
    /// Application domain string.
    pub domain: String,
    /// Update kind.
    pub signal_type: SignalType,
    /// Belief update payload.
    pub payload: SignalPayload,
    /// Remaining hops; decremented on each forward.
    pub ttl: u32,
    /// Propagation scope.
    pub scope: Scope,
    /// Optional reference to the signal this supersedes.
    #[serde(default)]
    pub prior_signal: Option<String>,
    /// Hex Ed25519 signature over the canonical form.
    pub signature: String,
}

/// A node's current position on one claim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    /// Claim identifier.
    pub claim_hash: String,
    /// Current stance.
    pub stance: Stance,
    /// Current confidence in \[0, 1\].
    pub confidence: f64,
    /// Timestamp of the accepted signal (non-decreasing except on rollback).
    pub updated_at: u64,
    /// Signal id that produced this belief.
    pub last_signal_id: u64,
    /// Author of that signal.
    pub last_source_id: PeerId,
}

/// One retained history entry for a claim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeliefSample {
    /// Signal timestamp.
    pub timestamp: u64,
    /// Stance adopted.
    pub stance: Stance,
    /// Confidence adopted.
    pub confidence: f64,
    /// Producing signal id.
    pub signal_id: u64,
    /// Producing source.
    pub source_id: PeerId,
}

/// Clamp a confidence-like value into \[0, 1\]. NaN maps to 0.
pub fn clamp01(v: f64) -> f64 {
    if v.is_nan() {
        return 0.0;
    }
    v.clamp(0.0, 1.0)
}

fn default_base_authority_duration_ms() -> u64 {
    60_000
}
fn default_hold_drift_threshold_ms() -> u64 {
    3_000
}
fn default_belief_divergence_threshold() -> f64 {
    0.6
}
fn default_confidence_drift_threshold() -> f64 {
    0.3
}
fn default_stale_comms_threshold_ms() -> u64 {
    5_000
}
fn default_heartbeat_interval_ms() -> u64 {
    1_000
}
fn default_peer_timeout_ms() -> u64 {
    4_000
}
fn default_max_peers() -> usize {
    32
}
fn default_ttl() -> u32 {
    8
}
fn default_max_seen_signals() -> usize {
    50_000
}
fn default_min_reputation_for_vote() -> f64 {
    0.2
}
fn default_new_peer_influence() -> f64 {
    0.1
}
fn default_pattern_bundle_threshold() -> u32 {
    5
}
fn default_min_success_rate_for_bundle() -> f64 {
    0.6
}
fn default_quarantine_base_ms() -> u64 {
    30_000
}
fn default_checkpoint_max_age_ms() -> u64 {
    30_000
}
fn default_arbitration_max_age_ms() -> u64 {
    30_000
}

/// Governance configuration. Every field has a serde default so partial TOML
/// documents work; unknown keys are ignored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Authority window length at T0.
    #[serde(default = "default_base_authority_duration_ms")]
    pub base_authority_duration_ms: u64,
    /// HOLD_TOO_LONG drift trigger.
    #[serde(default = "default_hold_drift_threshold_ms")]
    pub hold_drift_threshold_ms: u64,
    /// Conflict detection and divergence drift threshold.
    #[serde(default = "default_belief_divergence_threshold")]
    pub belief_divergence_threshold: f64,
    /// CONFIDENCE_DECAY drift trigger.
    #[serde(default = "default_confidence_drift_threshold")]
    pub confidence_drift_threshold: f64,
    /// STALE_COMMS drift trigger and T-state ladder unit.
    #[serde(default = "default_stale_comms_threshold_ms")]
    pub stale_comms_threshold_ms: u64,
    /// Heartbeat cadence.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Liveness window.
    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,
    /// Peer set cap.
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,
    /// Initial signal TTL.
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,
    /// Dedup set cap.
    #[serde(default = "default_max_seen_signals")]
    pub max_seen_signals: usize,
    /// Voting gate.
    #[serde(default = "default_min_reputation_for_vote")]
    pub min_reputation_for_vote: f64,
    /// Influence floor for fresh peers.
    #[serde(default = "default_new_peer_influence")]
    pub new_peer_influence: f64,
    /// Pattern emission gate (observation count).
    #[serde(default = "default_pattern_bundle_threshold")]
    pub pattern_bundle_threshold: u32,
    /// Pattern quality gate (success rate).
    #[serde(default = "default_min_success_rate_for_bundle")]
    pub min_success_rate_for_bundle: f64,
    /// First quarantine duration; doubles per violation.
    #[serde(default = "default_quarantine_base_ms")]
    pub quarantine_base_ms: u64,
    /// Checkpoint round prune horizon.
    #[serde(default = "default_checkpoint_max_age_ms")]
    pub checkpoint_max_age_ms: u64,
    /// Open-proposal prune horizon (auto-tally point).
    #[serde(default = "default_arbitration_max_age_ms")]
    pub arbitration_max_age_ms: u64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            base_authority_duration_ms: default_base_authority_duration_ms(),
            hold_drift_threshold_ms: default_hold_drift_threshold_ms(),
            belief_divergence_threshold: default_belief_divergence_threshold(),
            confidence_drift_threshold: default_confidence_drift_threshold(),
            stale_comms_threshold_ms: default_stale_comms_threshold_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            peer_timeout_ms: default_peer_timeout_ms(),
            max_peers: default_max_peers(),
            default_ttl: default_ttl(),
            max_seen_signals: default_max_seen_signals(),
            min_reputation_for_vote: default_min_reputation_for_vote(),
            new_peer_influence: default_new_peer_influence(),
            pattern_bundle_threshold: default_pattern_bundle_threshold(),
            min_success_rate_for_bundle: default_min_success_rate_for_bundle(),
            quarantine_base_ms: default_quarantine_base_ms(),
            checkpoint_max_age_ms: default_checkpoint_max_age_ms(),
            arbitration_max_age_ms: default_arbitration_max_age_ms(),
        }
    }
}

impl GovernanceConfig {
    /// Parse a TOML document into a config. Missing keys take defaults.
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}
