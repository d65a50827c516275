// Copyright (c) 2026 Concord
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Observability (metrics, structured logging helpers).

pub mod metrics;
