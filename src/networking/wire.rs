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

//! JSON wire protocol.
//!
//! Every message is a JSON object with a `type` tag plus the envelope
//! fields `from` (sender identity) and `ts` (ms). Payload fields are
//! camelCase on the wire. Unknown fields are ignored on decode for forward
//! compatibility.

use crate::core::patterns::PatternBundle;
use crate::core::types::{PeerId, Scope, Signal, Stance, TState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire decode errors.
#[derive(Debug, Error)]
pub enum WireError {
    /// The bytes were not a recognizable message.
    #[error("decode")]
    Decode,
    /// The message could not be serialized.
    #[error("encode")]
    Encode,
}

/// A peer entry carried in PEER_LIST.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerEntry {
    /// Peer identity.
    pub id: PeerId,
    /// Sender's confidence in the peer, if reported.
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Wire messages. The serde tag is the wire `type` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// First contact announcement.
    #[serde(rename = "HELLO")]
    Hello {
        /// Sender.
        from: PeerId,
        /// Send time (ms).
        ts: u64,
        /// Peers the sender already knows.
        #[serde(rename = "knownPeers", default)]
        known_peers: Vec<PeerId>,
        /// Sender's degradation level.
        #[serde(rename = "tState", default)]
        t_state: Option<TState>,
    },
    /// Periodic liveness beacon.
    #[serde(rename = "HEARTBEAT")]
    Heartbeat {
        /// Sender.
        from: PeerId,
        /// Send time (ms).
        ts: u64,
        /// Sender's degradation level.
        #[serde(rename = "tState", default)]
        t_state: Option<TState>,
        /// Sender's self-reported confidence.
        #[serde(default)]
        confidence: Option<f64>,
    },
    /// Alive-peer gossip (liveness hint only; no transitive trust).
    #[serde(rename = "PEER_LIST")]
    PeerList {
        /// Sender.
        from: PeerId,
        /// Send time (ms).
        ts: u64,
        /// Alive peers as the sender sees them.
        peers: Vec<PeerEntry>,
    },
    /// A signed belief update.
    #[serde(rename = "LEARNING_SIGNAL")]
    LearningSignal {
        /// Delivering peer (not necessarily the author).
        from: PeerId,
        /// Send time (ms).
        ts: u64,
        /// The signal.
        signal: Signal,
    },
    /// Request for stance snapshots on a claim.
    #[serde(rename = "CHECKPOINT_REQ")]
    CheckpointReq {
        /// Sender.
        from: PeerId,
        /// Send time (ms).
        ts: u64,
        /// Claim to snapshot.
        #[serde(rename = "claimHash")]
        claim_hash: String,
    },
    /// Point-to-point stance snapshot.
    #[serde(rename = "CHECKPOINT_RESP")]
    CheckpointResp {
        /// Sender.
        from: PeerId,
        /// Send time (ms).
        ts: u64,
        /// Claim snapshotted.
        #[serde(rename = "claimHash")]
        claim_hash: String,
        /// Sender's stance.
        stance: Stance,
        /// Sender's confidence.
        confidence: f64,
        /// Optional application meaning.
        #[serde(default)]
        meaning: Option<String>,
    },
    /// Open an arbitration round.
    #[serde(rename = "ARBITRATION_PROPOSAL")]
    ArbitrationProposal {
        /// Proposer.
        from: PeerId,
        /// Send time (ms).
        ts: u64,
        /// Proposal id.
        #[serde(rename = "proposalId")]
        proposal_id: String,
        /// Contested claim.
        #[serde(rename = "claimHash")]
        claim_hash: String,
        /// Ballot in tie-break priority order.
        options: Vec<String>,
    },
    /// A weighted vote.
    #[serde(rename = "ARBITRATION_VOTE")]
    ArbitrationVote {
        /// Voter.
        from: PeerId,
        /// Send time (ms).
        ts: u64,
        /// Proposal id.
        #[serde(rename = "proposalId")]
        proposal_id: String,
        /// Chosen option.
        option: String,
        /// Claimed weight (capped by the receiver).
        weight: f64,
    },
    /// Ask the receiver for an authority window.
    #[serde(rename = "AUTHORITY_REQUEST")]
    AuthorityRequest {
        /// Requesting peer.
        from: PeerId,
        /// Send time (ms).
        ts: u64,
        /// Requested scope.
        scope: Scope,
        /// Stated reason.
        reason: String,
    },
    /// Authority granted to the receiver.
    #[serde(rename = "AUTHORITY_GRANT")]
    AuthorityGrant {
        /// Granting peer.
        from: PeerId,
        /// Send time (ms).
        ts: u64,
        /// Request this grant answers.
        #[serde(rename = "requestId")]
        request_id: String,
        /// Window expiry (ms).
        #[serde(rename = "expiresAt")]
        expires_at: u64,
    },
    /// Authority request denied.
    #[serde(rename = "AUTHORITY_DENY")]
    AuthorityDeny {
        /// Denying peer.
        from: PeerId,
        /// Send time (ms).
        ts: u64,
        /// Request this denial answers (empty when denied pre-request).
        #[serde(rename = "requestId", default)]
        request_id: String,
        /// Why.
        reason: String,
    },
    /// Authority revoked from a peer.
    #[serde(rename = "AUTHORITY_REVOKE")]
    AuthorityRevoke {
        /// Revoking peer.
        from: PeerId,
        /// Send time (ms).
        ts: u64,
        /// Former holder.
        #[serde(rename = "targetPeer")]
        target_peer: PeerId,
        /// Why.
        reason: String,
    },
    /// Learned pattern bundle.
    #[serde(rename = "PATTERN_BUNDLE")]
    PatternBundle {
        /// Sender.
        from: PeerId,
        /// Send time (ms).
        ts: u64,
        /// The bundle.
        bundle: PatternBundle,
    },
    /// Advisory that the sender isolated a peer.
    #[serde(rename = "QUARANTINE_NOTICE")]
    QuarantineNotice {
        /// Sender.
        from: PeerId,
        /// Send time (ms).
        ts: u64,
        /// Isolated peer.
        #[serde(rename = "targetPeer")]
        target_peer: PeerId,
        /// Why.
        reason: String,
    },
}

impl Message {
    /// The envelope sender.
    pub fn from_peer(&self) -> &PeerId {
        match self {
            Message::Hello { from, .. }
            | Message::Heartbeat { from, .. }
            | Message::PeerList { from, .. }
            | Message::LearningSignal { from, .. }
            | Message::CheckpointReq { from, .. }
            | Message::CheckpointResp { from, .. }
            | Message::ArbitrationProposal { from, .. }
            | Message::ArbitrationVote { from, .. }
            | Message::AuthorityRequest { from, .. }
            | Message::AuthorityGrant { from, .. }
            | Message::AuthorityDeny { from, .. }
            | Message::AuthorityRevoke { from, .. }
            | Message::PatternBundle { from, .. }
            | Message::QuarantineNotice { from, .. } => from,
        }
    }

    /// The envelope timestamp.
    pub fn ts(&self) -> u64 {
        match self {
            Message::Hello { ts, .. }
            | Message::Heartbeat { ts, .. }
            | Message::PeerList { ts, .. }
            | Message::LearningSignal { ts, .. }
            | Message::CheckpointReq { ts, .. }
            | Message::CheckpointResp { ts, .. }
            | Message::ArbitrationProposal { ts, .. }
            | Message::ArbitrationVote { ts, .. }
            | Message::AuthorityRequest { ts, .. }
            | Message::AuthorityGrant { ts, .. }
            | Message::AuthorityDeny { ts, .. }
            | Message::AuthorityRevoke { ts, .. }
            | Message::PatternBundle { ts, .. }
            | Message::QuarantineNotice { ts, .. } => *ts,
        }
    }

    /// Encode to wire bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(|_| WireError::Encode)
    }

    /// Decode from wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(|_| WireError::Decode)
    }
}
