// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Prometheus-backed counters/histograms, ambient alongside the spec's own
//! `Metrics` log/raw bag (SPEC_FULL.md §3). Matches the shape of the
//! teacher's `infrastructure::metrics`, scaled down to the handful of
//! signals this engine's stages actually produce: throughput, bytes moved,
//! and the merge-heap's live size.

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

pub struct EngineMetrics {
    pub registry: Registry,
    pub stage_items_total: IntCounter,
    pub bytes_read_total: IntCounter,
    pub bytes_written_total: IntCounter,
    pub merge_heap_size: IntGauge,
    pub stage_duration_seconds: Histogram,
}

impl EngineMetrics {
    fn new() -> Self {
        let registry = Registry::new();

        let stage_items_total =
            IntCounter::new("pipeline_stage_items_total", "items processed across all stages").unwrap();
        let bytes_read_total = IntCounter::new("pipeline_bytes_read_total", "bytes read from upstream pipes").unwrap();
        let bytes_written_total =
            IntCounter::new("pipeline_bytes_written_total", "bytes appended to downstream pipes").unwrap();
        let merge_heap_size = IntGauge::new("pipeline_merge_heap_size", "live entries in the k-way merge heap").unwrap();
        let stage_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "pipeline_stage_duration_seconds",
            "wall-clock time spent inside a stage's changed/flush callback",
        ))
        .unwrap();

        registry.register(Box::new(stage_items_total.clone())).unwrap();
        registry.register(Box::new(bytes_read_total.clone())).unwrap();
        registry.register(Box::new(bytes_written_total.clone())).unwrap();
        registry.register(Box::new(merge_heap_size.clone())).unwrap();
        registry.register(Box::new(stage_duration_seconds.clone())).unwrap();

        Self {
            registry,
            stage_items_total,
            bytes_read_total,
            bytes_written_total,
            merge_heap_size,
            stage_duration_seconds,
        }
    }
}

pub static ENGINE_METRICS: Lazy<EngineMetrics> = Lazy::new(EngineMetrics::new);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_registered_and_incrementable() {
        ENGINE_METRICS.stage_items_total.inc();
        ENGINE_METRICS.bytes_read_total.inc_by(10);
        assert!(ENGINE_METRICS.registry.gather().len() >= 5);
    }
}
