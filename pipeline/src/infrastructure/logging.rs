// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Structured logging init for the running engine (as opposed to
//! `pipeline_bootstrap::logger`'s minimal bootstrap-phase abstraction).
//! Every stage's `Metrics::log`/`raw` additionally emits a `tracing` event
//! (see `pipeline_domain::metrics`); this installs the subscriber that
//! collects them.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing-subscriber` fmt layer driven by `RUST_LOG`,
/// defaulting to `info` when unset. Idempotent-ish: a second call in the
/// same process will error from `tracing`'s global dispatcher guard, which
/// callers should treat as "already initialized" rather than fatal.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
