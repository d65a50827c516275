// Copyright (c) 2026 Concord
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Best-effort: ensure wire decoding never panics. Semantics are covered
    // by integration tests; here we only care about parser robustness.
    let _ = concord::networking::wire::Message::from_bytes(data);
});
