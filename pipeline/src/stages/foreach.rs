// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Chunked/windowed sub-pipeline stages (§4.E), grounded in
//! `examples/original_source/binarian/common/foreach.py`.
//!
//! `ForEachItemParallel` cannot ship the Python original's design literally:
//! each sub-funnel's pipes are `Rc<RefCell<_>>`, which is not `Send`, so a
//! worker thread cannot hold a live handle into the shared downstream pipe.
//! Instead each worker builds and drains its *own* sub-funnel entirely
//! within one thread, returning the collected output as a plain `Vec`; the
//! calling thread performs the single serialized write into `next`. This
//! still parallelizes the expensive per-item work (the steps themselves) and
//! satisfies the "downstream writes must be serialized" requirement by
//! construction rather than by a mutex.

use std::sync::Arc;

use pipeline_domain::element::{Element, ElementKind};
use pipeline_domain::funnel::{Funnel, StageHandle};
use pipeline_domain::metrics::{MetadataHandle, Metrics};
use pipeline_domain::pipe::{Pipe, PipeHandle};
use pipeline_domain::stage::{AnyPipe, Stage};

use crate::infrastructure::config::rayon_config::ForEachWorkerPool;

type ChunkSteps = Box<dyn Fn(usize, MetadataHandle) -> Vec<StageHandle>>;
type ParallelSteps = Arc<dyn Fn(usize, MetadataHandle) -> Vec<StageHandle> + Send + Sync>;

/// Lazily builds a sub-funnel from binary input, closing it every time at
/// least `chunksize` bytes have been fed through since the last close.
pub struct ForEachChunk {
    chunksize: usize,
    steps: ChunkSteps,
    iteration: usize,
    processed: usize,
    funnel: Option<Funnel>,
    prev: Option<PipeHandle<u8>>,
    next: Option<PipeHandle<Element>>,
    metrics: Option<Metrics>,
    metadata: Option<MetadataHandle>,
}

impl ForEachChunk {
    pub fn new(chunksize: usize, steps: impl Fn(usize, MetadataHandle) -> Vec<StageHandle> + 'static) -> Self {
        Self {
            chunksize,
            steps: Box::new(steps),
            iteration: 0,
            processed: 0,
            funnel: None,
            prev: None,
            next: None,
            metrics: None,
            metadata: None,
        }
    }

    fn init_funnel(&mut self) {
        if self.funnel.is_none() {
            let metadata = self.metadata.clone().unwrap();
            let stages = (self.steps)(self.iteration, metadata.clone());
            let mut funnel = Funnel::new(stages);
            funnel
                .bind(self.metrics.clone().unwrap(), metadata, None)
                .expect("foreach-chunk sub-funnel type mismatch");
            self.funnel = Some(funnel);
        }
    }

    fn drain_completed(&self) {
        if let Some(funnel) = &self.funnel {
            let next = self.next.as_ref().unwrap();
            while let Some(items) = funnel.read_items(1) {
                Pipe::append(next, items);
            }
        }
    }

    fn close_funnel(&mut self) {
        if let Some(funnel) = self.funnel.take() {
            funnel.flush();
            let next = self.next.as_ref().unwrap();
            if let Some(items) = funnel.read_items(-1) {
                Pipe::append(next, items);
            }
            self.iteration += 1;
            self.processed = 0;
        }
    }

    fn process(&mut self) {
        let prev = self.prev.as_ref().unwrap().clone();
        if let Some(chunk) = Pipe::read(&prev, -1) {
            self.processed += chunk.len();
            self.funnel.as_ref().unwrap().append_bytes(chunk);
            self.drain_completed();
        }
        if self.processed >= self.chunksize {
            self.close_funnel();
        }
    }
}

impl Stage for ForEachChunk {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, metrics: Metrics, metadata: MetadataHandle) {
        self.prev = Some(prev.as_binary().clone());
        self.next = Some(next.as_item().clone());
        self.metrics = Some(metrics);
        self.metadata = Some(metadata);
    }
    fn changed(&mut self) {
        let has_data = Pipe::length_of(self.prev.as_ref().unwrap()) > 0;
        if has_data {
            self.init_funnel();
            self.process();
        }
    }
    fn flush(&mut self) {
        if self.funnel.is_some() || Pipe::length_of(self.prev.as_ref().unwrap()) > 0 {
            self.init_funnel();
            self.process();
        }
        self.close_funnel();
    }
}

/// Like `ForEachChunk` but per non-empty item batch rather than a byte
/// threshold: build -> append -> flush -> drain -> destroy, once per batch.
pub struct ForEachItem {
    steps: ChunkSteps,
    iteration: usize,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
    metrics: Option<Metrics>,
    metadata: Option<MetadataHandle>,
}

impl ForEachItem {
    pub fn new(steps: impl Fn(usize, MetadataHandle) -> Vec<StageHandle> + 'static) -> Self {
        Self {
            steps: Box::new(steps),
            iteration: 0,
            prev: None,
            next: None,
            metrics: None,
            metadata: None,
        }
    }

    fn process(&mut self) {
        let prev = self.prev.as_ref().unwrap().clone();
        let next = self.next.as_ref().unwrap().clone();
        while let Some(batch) = Pipe::read(&prev, -1) {
            let metadata = self.metadata.clone().unwrap();
            let stages = (self.steps)(self.iteration, metadata.clone());
            let mut funnel = Funnel::new(stages);
            funnel
                .bind(self.metrics.clone().unwrap(), metadata, None)
                .expect("foreach-item sub-funnel type mismatch");
            funnel.append_items(batch);
            funnel.flush();
            if let Some(items) = funnel.read_items(-1) {
                Pipe::append(&next, items);
            }
            self.iteration += 1;
        }
    }
}

impl Stage for ForEachItem {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, metrics: Metrics, metadata: MetadataHandle) {
        self.prev = Some(prev.as_item().clone());
        self.next = Some(next.as_item().clone());
        self.metrics = Some(metrics);
        self.metadata = Some(metadata);
    }
    fn changed(&mut self) {
        self.process();
    }
    fn flush(&mut self) {
        self.process();
    }
}

/// Fans items out across a bounded worker pool; each worker builds and
/// fully drains its own sub-funnel, returning its output for the caller to
/// append downstream. Ordering across items is not preserved.
pub struct ForEachItemParallel {
    pool: ForEachWorkerPool,
    steps: ParallelSteps,
    iteration: usize,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
    metrics: Option<Metrics>,
}

impl ForEachItemParallel {
    pub fn new(
        threads: usize,
        steps: impl Fn(usize, MetadataHandle) -> Vec<StageHandle> + Send + Sync + 'static,
    ) -> Self {
        Self {
            pool: ForEachWorkerPool::new(threads).expect("failed to build ForEachItemParallel worker pool"),
            steps: Arc::new(steps),
            iteration: 0,
            prev: None,
            next: None,
            metrics: None,
        }
    }

    fn process(&mut self) {
        let prev = self.prev.as_ref().unwrap().clone();
        let next = self.next.as_ref().unwrap().clone();
        while let Some(batch) = Pipe::read(&prev, -1) {
            let base_iteration = self.iteration;
            self.iteration += batch.len();
            let metrics = self.metrics.clone().unwrap();
            let steps = Arc::clone(&self.steps);

            // Each worker gets a throwaway `Metadata` rather than the shared
            // pipeline one: `MetadataHandle` is `Rc<RefCell<_>>` and cannot
            // cross a thread boundary, and the sub-funnels this stage runs
            // (Serialize -> Lambda -> Deserialize, per the worker-sort
            // distributed role) don't write anything the outer pipeline
            // needs to observe.
            let results: Vec<Vec<Element>> = self.pool.pool().install(|| {
                use rayon::prelude::*;
                batch
                    .into_par_iter()
                    .enumerate()
                    .map(|(offset, item)| {
                        let index = base_iteration + offset;
                        let worker_metadata = pipeline_domain::metrics::Metadata::new();
                        let stages = (steps)(index, worker_metadata.clone());
                        let mut funnel = Funnel::new(stages);
                        funnel
                            .bind(metrics.clone(), worker_metadata, None)
                            .expect("foreach-item-parallel sub-funnel type mismatch");
                        funnel.append_items(vec![item]);
                        funnel.flush();
                        funnel.read_items(-1).unwrap_or_default()
                    })
                    .collect()
            });

            for items in results {
                Pipe::append(&next, items);
            }
        }
    }
}

impl Stage for ForEachItemParallel {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, metrics: Metrics, _metadata: MetadataHandle) {
        self.prev = Some(prev.as_item().clone());
        self.next = Some(next.as_item().clone());
        self.metrics = Some(metrics);
    }
    fn changed(&mut self) {
        self.process();
    }
    fn flush(&mut self) {
        self.process();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::basic::OneToOne;
    use pipeline_domain::funnel::stage_handle;
    use pipeline_domain::pipe::{new_byte_pipe, new_item_pipe};

    fn upcase(e: Element) -> Element {
        match e {
            Element::Text(s) => Element::Text(s.to_uppercase()),
            other => other,
        }
    }

    #[test]
    fn foreach_chunk_closes_once_threshold_is_crossed() {
        let prev = new_byte_pipe();
        let next = new_item_pipe();
        let mut stage = ForEachChunk::new(4, |_i, _m| {
            vec![stage_handle(crate::stages::ndjson::NDJsonIndex::new(
                |v: &serde_json::Value| v.to_string(),
            ))]
        });
        stage.bind(
            AnyPipe::Binary(prev.clone()),
            AnyPipe::Item(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(&prev, b"{\"a\":1}\n{\"a\":2}\n".to_vec());
        let items = Pipe::read(&next, -1);
        assert!(items.is_some());
    }

    #[test]
    fn foreach_item_processes_each_batch_through_its_own_funnel() {
        let prev = new_item_pipe();
        let next = new_item_pipe();
        let mut stage = ForEachItem::new(|_i, _m| vec![stage_handle(OneToOne::new(upcase))]);
        stage.bind(
            AnyPipe::Item(prev.clone()),
            AnyPipe::Item(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(&prev, vec![Element::Text("a".into()), Element::Text("b".into())]);
        let out = Pipe::read(&next, -1).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_text(), Some("A"));
    }

    #[test]
    fn foreach_item_parallel_processes_every_item_through_its_own_funnel() {
        let prev = new_item_pipe();
        let next = new_item_pipe();
        let mut stage = ForEachItemParallel::new(2, |_i, _m| vec![stage_handle(OneToOne::new(upcase))]);
        stage.bind(
            AnyPipe::Item(prev.clone()),
            AnyPipe::Item(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(
            &prev,
            vec![Element::Text("x".into()), Element::Text("y".into()), Element::Text("z".into())],
        );
        let out = Pipe::read(&next, -1).unwrap();
        assert_eq!(out.len(), 3);
    }
}
