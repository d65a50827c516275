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

//! Prometheus metrics for the governance core.

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Connected gossip peers gauge.
    pub gossip_peers: IntGauge,
    /// Alive governance peers gauge.
    pub peers_alive: IntGauge,
    /// Current T-state (0–4) gauge.
    pub t_state: IntGauge,

    /// Accepted signals.
    pub signals_accepted_total: IntCounter,
    /// Rejected signals.
    pub signals_rejected_total: IntCounter,
    /// Silently deduplicated signals.
    pub signals_deduped_total: IntCounter,
    /// Forwarded signals.
    pub signals_forwarded_total: IntCounter,

    /// Conflicts detected.
    pub conflicts_detected_total: IntCounter,
    /// Proposals opened.
    pub proposals_total: IntCounter,
    /// Votes recorded.
    pub votes_total: IntCounter,
    /// Quarantine events.
    pub quarantines_total: IntCounter,
    /// Drift triggers fired.
    pub drift_events_total: IntCounter,
    /// Authority grants.
    pub authority_grants_total: IntCounter,
    /// Authority revocations.
    pub authority_revocations_total: IntCounter,

    /// Invalid decoded gossip messages.
    pub gossip_invalid_msg_total: IntCounter,
    /// Banned gossip peer events.
    pub gossip_banned_total: IntCounter,
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let gossip_peers = IntGauge::new("concord_gossip_peers", "Connected gossip peers")
            .map_err(|_| MetricsError::Prom)?;
        let peers_alive = IntGauge::new("concord_peers_alive", "Alive governance peers")
            .map_err(|_| MetricsError::Prom)?;
        let t_state =
            IntGauge::new("concord_t_state", "Current degradation level (0-4)")
                .map_err(|_| MetricsError::Prom)?;

        let signals_accepted_total =
            IntCounter::new("concord_signals_accepted_total", "Accepted signals")
                .map_err(|_| MetricsError::Prom)?;
        let signals_rejected_total =
            IntCounter::new("concord_signals_rejected_total", "Rejected signals")
                .map_err(|_| MetricsError::Prom)?;
        let signals_deduped_total =
            IntCounter::new("concord_signals_deduped_total", "Deduplicated signals")
                .map_err(|_| MetricsError::Prom)?;
        let signals_forwarded_total =
            IntCounter::new("concord_signals_forwarded_total", "Forwarded signals")
                .map_err(|_| MetricsError::Prom)?;

        let conflicts_detected_total =
            IntCounter::new("concord_conflicts_detected_total", "Conflicts detected")
                .map_err(|_| MetricsError::Prom)?;
        let proposals_total = IntCounter::new("concord_proposals_total", "Proposals opened")
            .map_err(|_| MetricsError::Prom)?;
        let votes_total = IntCounter::new("concord_votes_total", "Votes recorded")
            .map_err(|_| MetricsError::Prom)?;
        let quarantines_total =
            IntCounter::new("concord_quarantines_total", "Quarantine events")
                .map_err(|_| MetricsError::Prom)?;
        let drift_events_total =
            IntCounter::new("concord_drift_events_total", "Drift triggers fired")
                .map_err(|_| MetricsError::Prom)?;
        let authority_grants_total =
            IntCounter::new("concord_authority_grants_total", "Authority grants")
                .map_err(|_| MetricsError::Prom)?;
        let authority_revocations_total = IntCounter::new(
            "concord_authority_revocations_total",
            "Authority revocations",
        )
        .map_err(|_| MetricsError::Prom)?;

        let gossip_invalid_msg_total = IntCounter::new(
            "concord_gossip_invalid_msg_total",
            "Invalid decoded gossip messages",
        )
        .map_err(|_| MetricsError::Prom)?;
        let gossip_banned_total =
            IntCounter::new("concord_gossip_banned_total", "Banned gossip peer events")
                .map_err(|_| MetricsError::Prom)?;

        for c in [
            &signals_accepted_total,
            &signals_rejected_total,
            &signals_deduped_total,
            &signals_forwarded_total,
            &conflicts_detected_total,
            &proposals_total,
            &votes_total,
            &quarantines_total,
            &drift_events_total,
            &authority_grants_total,
            &authority_revocations_total,
            &gossip_invalid_msg_total,
            &gossip_banned_total,
        ] {
            registry
                .register(Box::new(c.clone()))
                .map_err(|_| MetricsError::Prom)?;
        }
        for g in [&gossip_peers, &peers_alive, &t_state] {
            registry
                .register(Box::new(g.clone()))
                .map_err(|_| MetricsError::Prom)?;
        }

        Ok(Self {
            registry,
            gossip_peers,
            peers_alive,
            t_state,
            signals_accepted_total,
            signals_rejected_total,
            signals_deduped_total,
            signals_forwarded_total,
            conflicts_detected_total,
            proposals_total,
            votes_total,
            quarantines_total,
            drift_events_total,
            authority_grants_total,
            authority_revocations_total,
            gossip_invalid_msg_total,
            gossip_banned_total,
        })
    }
}
