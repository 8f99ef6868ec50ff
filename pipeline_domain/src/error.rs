// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain error hierarchy.
//!
//! Mirrors the teacher's bucketed `PipelineError` (configuration / processing /
//! security / infrastructure / system) but narrowed to the kinds this engine
//! actually raises: protocol violations at bind time, malformed payloads
//! during NDJSON indexing, and transient failures surfaced by adapters after
//! their own retry budget is exhausted.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// Adjacent stages declare incompatible element kinds at `Funnel::bind`.
    #[error("incompatible stage I/O: {0}")]
    IncompatibleStage(String),

    /// A stage was misconfigured (bad chunk size, empty steps factory, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// JSON decode failure inside `NDJsonIndex`, or a malformed remote
    /// function payload. Fatal: logged and re-raised, never recovered.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A remote function call returned `errorMessage`.
    #[error("remote function failed: {0}")]
    RemoteFunctionFailed(String),

    /// Retries against an external collaborator (object store, task runner,
    /// FTP) were exhausted.
    #[error("transient external failure after retries: {0}")]
    TransientExternal(String),

    /// `NDJsonMeasure::find_newline` exhausted its assigned range without a
    /// newline; treated as the object ending without a newline (see Open
    /// Questions) rather than propagated as a hard bug.
    #[error("boundary not found in range: {0}")]
    BoundaryNotFound(String),

    /// Generic I/O failure from an adapter.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(value: std::io::Error) -> Self {
        PipelineError::Io(value.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
