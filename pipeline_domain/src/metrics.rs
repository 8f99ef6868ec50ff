// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `Metrics` and `Metadata` — the bag passed to every stage's `bind`.
//!
//! Grounded in `examples/original_source/binarian/engine/common.py`.
//! `Metrics::log`/`raw` keep the original's wall-clock/RSS summary line
//! (some callers, e.g. `EcsTask` log streaming, want exactly that shape) and
//! additionally emit a `tracing` event per SPEC_FULL.md §3 so stage
//! diagnostics integrate with structured log collection.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::element::Element;

#[derive(Clone)]
pub struct Metrics {
    name: String,
}

impl Metrics {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mirrors `Metrics.log`: `HH:MM:SS <rss_mb:04> name: data`.
    pub fn log(&self, data: impl std::fmt::Display) {
        let rss_mb = current_rss_mb();
        let ts = timestamp_hms();
        let line = format!("{ts} {rss_mb:>4} {}: {data}", self.name);
        println!("{line}");
        tracing::info!(target: "pipeline::metrics", stage = %self.name, rss_mb, "{data}");
    }

    /// Mirrors `Metrics.raw`: forwards a value unadorned (used for streamed
    /// task-runner log lines).
    pub fn raw(&self, data: impl std::fmt::Display) {
        println!("{data}");
        tracing::debug!(target: "pipeline::metrics::raw", stage = %self.name, "{data}");
    }
}

fn timestamp_hms() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let h = (secs / 3600) % 24;
    let m = (secs / 60) % 60;
    let s = secs % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

/// Resident set size in MiB, best-effort (Linux `/proc/self/status`); `0` on
/// platforms where it can't be read cheaply.
fn current_rss_mb() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    if let Some(kb) = rest.trim().split_whitespace().next() {
                        if let Ok(kb) = kb.parse::<u64>() {
                            return kb / 1024;
                        }
                    }
                }
            }
        }
        0
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

/// String-keyed bag of arbitrary values written by stages (digests,
/// markers, merge-group partitions) and logged in full at pipeline
/// completion. Shared by `Rc<RefCell<_>>` since every stage bound into a
/// pipeline writes into the same instance.
#[derive(Default)]
pub struct Metadata {
    values: HashMap<String, Element>,
}

pub type MetadataHandle = Rc<RefCell<Metadata>>;

impl Metadata {
    pub fn new() -> MetadataHandle {
        Rc::new(RefCell::new(Metadata::default()))
    }

    pub fn set(&mut self, name: impl Into<String>, value: Element) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Element> {
        self.values.get(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }
}
