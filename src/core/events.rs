// Copyright (c) 2026 Concord
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Typed node events.
//!
//! The subsystems never call into each other; they return facts, and the
//! node reducer turns facts into [`CoreEvent`]s applied in order. The
//! embedding application drains the queue after each operation. This keeps
//! revocation chains (revoke → quarantine → violation) from re-entering the
//! component that started them.

use crate::core::authority::AuthorityWindow;
use crate::core::types::{DriftReason, PeerId, Signal, TState};

/// Everything observable about a node's governance activity.
#[derive(Clone, Debug, PartialEq)]
pub enum CoreEvent {
    /// An inbound signal passed the full acceptance pipeline.
    SignalAccepted {
        /// The accepted signal.
        signal: Signal,
        /// Delivering peer (not necessarily the author).
        from: PeerId,
    },
    /// An inbound signal was dropped. Duplicates are silent and do not
    /// produce this event.
    SignalRejected {
        /// Delivering peer.
        from: PeerId,
        /// Why it was dropped.
        reason: String,
    },
    /// A claim's conflict score crossed the divergence threshold.
    ConflictDetected {
        /// Contested claim.
        claim_hash: String,
        /// Score at crossing.
        score: f64,
    },
    /// A contested claim settled.
    ConflictResolved {
        /// Settled claim.
        claim_hash: String,
    },
    /// A checkpoint response arrived.
    CheckpointResponse {
        /// Claim being checkpointed.
        claim_hash: String,
        /// Responding peer.
        from: PeerId,
    },
    /// An arbitration proposal opened (local or remote).
    ProposalOpened {
        /// Proposal id.
        proposal_id: String,
        /// Contested claim.
        claim_hash: String,
    },
    /// An arbitration proposal resolved.
    ProposalResolved {
        /// Proposal id.
        proposal_id: String,
        /// Settled claim.
        claim_hash: String,
        /// Winning option.
        winner: String,
    },
    /// An authority request was denied.
    AuthorityDenied {
        /// Requesting peer.
        peer: PeerId,
        /// Why.
        reason: String,
    },
    /// An authority window was granted.
    AuthorityGranted {
        /// The window.
        window: AuthorityWindow,
    },
    /// An authority window lapsed.
    AuthorityExpired {
        /// The lapsed window.
        window: AuthorityWindow,
    },
    /// An authority window was revoked.
    AuthorityRevoked {
        /// Former holder.
        peer: PeerId,
        /// Why.
        reason: String,
    },
    /// A drift trigger fired.
    DriftTriggered {
        /// Drifting peer.
        peer: PeerId,
        /// Which trigger.
        reason: DriftReason,
        /// Detail string.
        details: String,
    },
    /// A peer entered quarantine.
    PeerQuarantined {
        /// Isolated peer.
        peer: PeerId,
        /// Why.
        reason: String,
        /// Isolation expiry (ms).
        expires_at: u64,
    },
    /// A quarantine expired.
    PeerReleased {
        /// Released peer.
        peer: PeerId,
    },
    /// A peer was refused admission.
    AdmissionDenied {
        /// Refused peer.
        peer: PeerId,
        /// Why.
        reason: String,
    },
    /// The degradation level changed.
    TStateChanged {
        /// Level before.
        from: TState,
        /// Level after.
        to: TState,
    },
    /// A learning bundle was broadcast.
    PatternBundleSent {
        /// Patterns in the bundle.
        pattern_count: usize,
    },
}
