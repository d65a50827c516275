// Copyright (c) 2026 Concord
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Journal import and chain verification must not panic on any input.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(log) = concord::core::audit::AuditLog::from_jsonl(s) {
            let _ = log.verify();
        }
    }
});
