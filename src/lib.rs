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
#![warn(missing_docs)]

//! Concord - peer-to-peer governance core for shared belief coordination.
//!
//! This crate provides:
//! - Signed, TTL-bounded, deduplicated belief signals (Ed25519 over canonical JSON)
//! - A per-claim belief store with deterministic last-writer resolution
//! - Conflict detection by stance entropy, with checkpoint rounds and
//!   reputation-weighted arbitration
//! - Progressive trust, exponential-backoff quarantine, and drift-driven
//!   authority revocation under a swarm-wide degradation ladder
//! - A hash-chained audit journal with deterministic replay
//! - Transports: an in-memory bus and a libp2p gossipsub adapter
//! - Monitoring via Prometheus metrics and structured logging

/// Governance core (beliefs, conflict, arbitration, trust, audit).
pub mod core;
/// Observability (metrics, structured logging helpers).
pub mod monitoring;
/// Networking (wire protocol, transports, liveness, propagation).
pub mod networking;
/// Per-node composition and run loop.
pub mod node;
