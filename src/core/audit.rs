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

//! Hash-chained event journal.
//!
//! Every entry hashes its own body plus the previous entry's hash, so a
//! single mutated byte breaks the chain from that point on. The journal
//! round-trips through JSONL byte-for-byte; a broken chain is surfaced with
//! the first bad index and never auto-repaired.

use crate::core::codec::{canonical_log_entry, digests_equal, sha256_hex};
use crate::core::types::{LogKind, PeerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Journal errors.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A JSONL line failed to parse.
    #[error("parse")]
    Parse,
    /// The imported document was empty.
    #[error("empty journal")]
    Empty,
}

/// One journal entry. Field order is the JSONL serialization order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Index, strictly increasing from 0.
    pub i: u64,
    /// Append time (ms).
    pub ts: u64,
    /// Entry kind.
    pub kind: LogKind,
    /// Subject peer, when one exists.
    #[serde(default)]
    pub peer: Option<PeerId>,
    /// Free-form payload.
    pub data: serde_json::Value,
    /// Hash of entry `i − 1` (null iff `i == 0` or compacted away).
    #[serde(default)]
    pub prev: Option<String>,
    /// SHA-256 over the canonical body.
    pub hash: String,
}

/// Result of a chain verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainStatus {
    /// Whether the whole retained chain verified.
    pub valid: bool,
    /// First broken index when invalid.
    pub broken_at: Option<u64>,
}

impl ChainStatus {
    fn ok() -> Self {
        Self {
            valid: true,
            broken_at: None,
        }
    }

    fn broken(i: u64) -> Self {
        Self {
            valid: false,
            broken_at: Some(i),
        }
    }
}

/// Append-only hash-chained journal.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Vec<LogEntry>,
    last_hash: Option<String>,
    counter: u64,
    /// Predecessor hash of the oldest retained entry after compaction.
    base_prev: Option<String>,
}

impl AuditLog {
    /// Empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Assigns the next index, links the chain, and hashes
    /// the canonical body.
    pub fn append(
        &mut self,
        kind: LogKind,
        data: serde_json::Value,
        peer: Option<&PeerId>,
        now: u64,
    ) -> &LogEntry {
        let i = self.counter;
        self.counter += 1;
        let prev = self.last_hash.clone();
        let body = canonical_log_entry(i, now, kind, peer, &data, prev.as_deref());
        let hash = sha256_hex(body.as_bytes());
        self.last_hash = Some(hash.clone());
        self.entries.push(LogEntry {
            i,
            ts: now,
            kind,
            peer: peer.cloned(),
            data,
            prev,
            hash,
        });
        self.entries.last().expect("entry just pushed")
    }

    /// Verify the retained chain: linkage, index continuity, and per-entry
    /// hash recomputation. Stops at the first failure.
    pub fn verify(&self) -> ChainStatus {
        let mut expected_prev = self.base_prev.clone();
        let mut expected_i = self.entries.first().map(|e| e.i);

        for entry in self.entries.iter() {
            if Some(entry.i) != expected_i {
                return ChainStatus::broken(entry.i);
            }
            if entry.i == 0 {
                if entry.prev.is_some() {
                    return ChainStatus::broken(entry.i);
                }
            } else if entry.prev != expected_prev {
                return ChainStatus::broken(entry.i);
            }

            let body = canonical_log_entry(
                entry.i,
                entry.ts,
                entry.kind,
                entry.peer.as_ref(),
                &entry.data,
                entry.prev.as_deref(),
            );
            let recomputed = sha256_hex(body.as_bytes());
            if !digests_equal(recomputed.as_bytes(), entry.hash.as_bytes()) {
                return ChainStatus::broken(entry.i);
            }

            expected_prev = Some(entry.hash.clone());
            expected_i = Some(entry.i + 1);
        }
        ChainStatus::ok()
    }

    /// Entries whose payload references the claim, in index order. Matches
    /// a nested `signal.payload.claim_hash` as well as top-level
    /// `claim_hash`/`claimHash` fields (wire payloads are camelCase,
    /// canonical signal forms snake_case).
    pub fn trace_provenance(&self, claim_hash: &str) -> Vec<&LogEntry> {
        self.entries
            .iter()
            .filter(|e| entry_references_claim(e, claim_hash))
            .collect()
    }

    /// Serialize the journal, one entry per line.
    pub fn export_jsonl(&self) -> String {
        let mut out = String::new();
        for entry in self.entries.iter() {
            if let Ok(line) = serde_json::to_string(entry) {
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }

    /// Rebuild a journal from its JSONL form. `last_hash` and the counter
    /// are restored from the final entry.
    pub fn from_jsonl(raw: &str) -> Result<Self, AuditError> {
        let mut entries = Vec::new();
        for line in raw.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let entry: LogEntry = serde_json::from_str(trimmed).map_err(|_| AuditError::Parse)?;
            entries.push(entry);
        }
        let last = entries.last().ok_or(AuditError::Empty)?;
        let last_hash = Some(last.hash.clone());
        let counter = last.i + 1;
        let base_prev = entries.first().and_then(|e| e.prev.clone());
        Ok(Self {
            entries,
            last_hash,
            counter,
            base_prev,
        })
    }

    /// Keep only the newest `keep_last` entries, pinning the predecessor
    /// hash of the oldest survivor so the suffix still verifies. The growth
    /// valve for long-lived nodes.
    pub fn compact(&mut self, keep_last: usize) {
        if self.entries.len() <= keep_last {
            return;
        }
        let cut = self.entries.len() - keep_last;
        self.entries.drain(..cut);
        self.base_prev = self.entries.first().and_then(|e| e.prev.clone());
    }

    /// All retained entries, index order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Hash of the newest entry.
    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// Next index to be assigned.
    pub fn next_index(&self) -> u64 {
        self.counter
    }

    /// Retained entry count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn entry_references_claim(entry: &LogEntry, claim_hash: &str) -> bool {
    let data = &entry.data;
    if data.get("claim_hash").and_then(|v| v.as_str()) == Some(claim_hash) {
        return true;
    }
    if data.get("claimHash").and_then(|v| v.as_str()) == Some(claim_hash) {
        return true;
    }
    data.get("signal")
        .and_then(|s| s.get("payload"))
        .and_then(|p| p.get("claim_hash"))
        .and_then(|v| v.as_str())
        == Some(claim_hash)
}
