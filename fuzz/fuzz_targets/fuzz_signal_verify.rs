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

#![no_main]
#![forbid(unsafe_code)]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use concord::core::codec::{canonical_signal, dedup_key, verify_signal};
use concord::core::types::{Direction, PeerId, Scope, Signal, SignalPayload, SignalType};

#[derive(Clone, Debug, Arbitrary)]
struct Input {
    source_hex: String,
    signal_id: u64,
    timestamp: u64,
    domain: String,
    claim_hash: String,
    confidence: f64,
    ttl: u32,
    signature: String,
}

fuzz_target!(|inp: Input| {
    let signal = Signal {
        source_id: PeerId::new(inp.source_hex),
        signal_id: inp.signal_id,
        timestamp: inp.timestamp,
        domain: inp.domain,
        signal_type: SignalType::Delta,
        payload: SignalPayload {
            claim_hash: inp.claim_hash,
            direction: Direction::Strengthen,
            confidence: inp.confidence,
            evidence_hash: None,
        },
        ttl: inp.ttl,
        scope: Scope::Global,
        prior_signal: None,
        signature: inp.signature,
    };

    // Verification must return false, never panic, on garbage identities
    // and signatures; canonicalization must stay total.
    let _ = verify_signal(&signal);
    let _ = canonical_signal(&signal);
    let _ = dedup_key(&signal);
});
