// Copyright (c) 2026 Concord
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! First-contact admission gate.
//!
//! A peer is admitted unless it is currently isolated or returns with a
//! violation history past the refusal bar. Admission is checked once per
//! contact; nothing downstream re-checks it.

use crate::core::quarantine::QuarantineList;
use crate::core::reputation::ReputationLedger;
use crate::core::types::PeerId;

/// Violations past which a returning peer is refused.
pub const MAX_RETURNING_VIOLATIONS: u32 = 3;

/// Outcome of an admission check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Peer may participate.
    Admitted,
    /// Peer refused, with the reason.
    Denied(String),
}

impl AdmissionDecision {
    /// True for [`AdmissionDecision::Admitted`].
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionDecision::Admitted)
    }
}

/// Decide whether a peer making contact may participate.
pub fn admit(
    peer: &PeerId,
    reputation: &ReputationLedger,
    quarantine: &mut QuarantineList,
    now: u64,
) -> AdmissionDecision {
    if quarantine.is_quarantined(peer, now) {
        return AdmissionDecision::Denied("quarantined".to_string());
    }
    let violations = reputation.violations(peer);
    if violations > MAX_RETURNING_VIOLATIONS {
        return AdmissionDecision::Denied(format!("violation history ({violations})"));
    }
    AdmissionDecision::Admitted
}
