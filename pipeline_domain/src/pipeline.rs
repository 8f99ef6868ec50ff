// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `Pipeline` — the top-level, externally driven funnel plus its
//! metrics/metadata bag and start/flush/complete lifecycle.
//!
//! Grounded in `examples/original_source/binarian/engine/pipeline.py`.

use crate::element::Element;
use crate::error::PipelineResult;
use crate::funnel::{Funnel, StageHandle};
use crate::metrics::{Metadata, MetadataHandle, Metrics};

pub struct Pipeline {
    name: String,
    funnel: Funnel,
    metrics: Metrics,
    metadata: MetadataHandle,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, stages: Vec<StageHandle>) -> Self {
        let name = name.into();
        Self {
            metrics: Metrics::new(name.clone()),
            metadata: Metadata::new(),
            funnel: Funnel::new(stages),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &MetadataHandle {
        &self.metadata
    }

    pub fn init(&mut self) -> PipelineResult<()> {
        self.funnel
            .bind(self.metrics.clone(), self.metadata.clone(), None)
    }

    pub fn run(&self, input: Element) {
        self.funnel.append_items(vec![input]);
    }

    pub fn flush(&self) {
        self.funnel.flush();
    }

    /// Logs every metadata key/value at pipeline completion, mirroring the
    /// Python original's `complete`.
    pub fn complete(&self) {
        let metadata = self.metadata.borrow();
        for key in metadata.keys() {
            if let Some(value) = metadata.get(key) {
                self.metrics.log(format!("{key}={value:?}"));
            }
        }
    }

    /// `init` -> `run` -> `flush` -> `complete`, returning whatever remains
    /// buffered in the tail pipe.
    pub fn start(&mut self, input: Element) -> PipelineResult<Vec<Element>> {
        self.init()?;
        self.run(input);
        self.flush();
        self.complete();
        Ok(self.funnel.read_items(-1).unwrap_or_default())
    }
}
