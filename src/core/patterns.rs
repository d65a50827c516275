// Copyright (c) 2026 Concord
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Learning pattern bundles.
//!
//! Domains accumulate signal outcomes; once a domain clears the observation
//! and success-rate gates its pattern becomes ready, and ready patterns are
//! bundled for broadcast whenever the T-state permits learning propagation
//! (T0/T4). Incoming bundles merge as low-weight observations.

use crate::core::types::PatternStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Emission gates.
#[derive(Clone, Copy, Debug)]
pub struct PatternParams {
    /// Observations required before a pattern can emit.
    pub bundle_threshold: u32,
    /// Success rate required before a pattern can emit.
    pub min_success_rate: f64,
}

/// Accumulated outcome state for one domain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Domain the pattern formed in.
    pub domain: String,
    /// Observations so far.
    pub observations: u32,
    /// Successful outcomes among them.
    pub successes: u32,
    /// Lifecycle stage.
    pub status: PatternStatus,
}

impl Pattern {
    /// Success fraction (0 when unobserved).
    pub fn success_rate(&self) -> f64 {
        if self.observations == 0 {
            return 0.0;
        }
        self.successes as f64 / self.observations as f64
    }
}

/// A broadcastable set of ready patterns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternBundle {
    /// Ready patterns.
    pub patterns: Vec<Pattern>,
    /// Creation time (ms).
    pub created_at: u64,
}

/// Per-domain outcome tracker.
#[derive(Debug)]
pub struct PatternTracker {
    params: PatternParams,
    patterns: BTreeMap<String, Pattern>,
}

impl PatternTracker {
    /// New tracker.
    pub fn new(params: PatternParams) -> Self {
        Self {
            params,
            patterns: BTreeMap::new(),
        }
    }

    /// Record a signal outcome in a domain. Returns true when the domain's
    /// pattern just became ready.
    pub fn observe(&mut self, domain: &str, success: bool) -> bool {
        let pat = self
            .patterns
            .entry(domain.to_string())
            .or_insert_with(|| Pattern {
                domain: domain.to_string(),
                observations: 0,
                successes: 0,
                status: PatternStatus::Forming,
            });
        pat.observations = pat.observations.saturating_add(1);
        if success {
            pat.successes = pat.successes.saturating_add(1);
        }

        if pat.status == PatternStatus::Forming
            && pat.observations >= self.params.bundle_threshold
            && pat.success_rate() >= self.params.min_success_rate
        {
            pat.status = PatternStatus::Ready;
            return true;
        }
        false
    }

    /// Bundle every ready pattern, marking each propagated. Returns `None`
    /// when nothing is ready.
    pub fn take_bundle(&mut self, now: u64) -> Option<PatternBundle> {
        let ready: Vec<Pattern> = self
            .patterns
            .values()
            .filter(|p| p.status == PatternStatus::Ready)
            .cloned()
            .collect();
        if ready.is_empty() {
            return None;
        }
        for p in self.patterns.values_mut() {
            if p.status == PatternStatus::Ready {
                p.status = PatternStatus::Propagated;
            }
        }
        Some(PatternBundle {
            patterns: ready,
            created_at: now,
        })
    }

    /// Merge a remote bundle: each pattern lands as one observation (a
    /// liveness-grade hint, not a full adoption of the remote counts).
    pub fn merge_bundle(&mut self, bundle: &PatternBundle) {
        for remote in bundle.patterns.iter() {
            self.observe(&remote.domain, remote.success_rate() >= self.params.min_success_rate);
        }
    }

    /// Pattern for a domain.
    pub fn get(&self, domain: &str) -> Option<&Pattern> {
        self.patterns.get(domain)
    }

    /// Tracked domain count.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when no domains are tracked.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
