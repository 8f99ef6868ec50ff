// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Adaptive Pipeline
//!
//! A stream-processing engine for composing byte- and item-oriented
//! stages into pipelines, built around two parallel pipe types (`Binary`
//! and `Item`) joined by a `Funnel` that wires each stage's upstream and
//! downstream handles and drives it to a fixed point after every append.
//!
//! ## Architecture
//!
//! `pipeline_domain` owns the pipe/funnel/stage contract and the value
//! objects (`Element`, `S3Object`, `Token`, markers) that flow through it.
//! This crate (`pipeline`) builds concrete `Stage` implementations on top
//! of that contract — compression, XML/NDJSON conversion, external
//! sorting, S3/FTP/ECS/Lambda adapters — plus the role entry points
//! (`roles`) that assemble those stages into the handful of pipelines the
//! `master`/`worker-*`/Lambda roles run, and the infrastructure adapters
//! (`infrastructure`) that implement `pipeline_domain::ports` against real
//! AWS/FTP backends.
//!
//! ## Roles
//!
//! - `master`: orchestrates a worklist of filenames, launching throttled
//!   ECS tasks for whichever of raw/json/sort each file still needs.
//! - `worker-ftp`/`worker-json`/`worker-sort`: the ECS tasks `master`
//!   launches — download, convert, and externally sort one file each.
//! - `lambda_handlers`: the two sort-core steps (`quick-sort`/`kway-merge`)
//!   `worker-sort` dispatches out to Lambda when a single shard's sort or
//!   merge step is itself too large to run in one process.

pub mod infrastructure;
pub mod roles;
pub mod stages;

// Tests are organized as:
// - Unit tests: #[cfg(test)] modules within each source file
// - Integration tests: separate files in tests/ directory

pub use pipeline_domain::{
    Element, ElementKind, Funnel, Pipeline, PipelineError, PipelineResult, StageHandle,
};
