// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Throttling tokens (§4.E), grounded in
//! `examples/original_source/binarian/common/throttling.py`. The queue
//! itself is a cross-pipeline semaphore (§5): multiple `Pipeline`s run on
//! separate OS threads via a top-level executor and draw from the same
//! queue, so it is built on `std::sync::mpsc` rather than the `Rc`-based
//! single-thread cooperative primitives the rest of the engine uses.

use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use pipeline_domain::element::{Element, ElementKind};
use pipeline_domain::metrics::{MetadataHandle, Metrics};
use pipeline_domain::pipe::{Pipe, PipeHandle};
use pipeline_domain::stage::{AnyPipe, Stage};
use pipeline_domain::token::{Token, TokenResource};

/// A bounded pool of opaque resource handles (FTP host/directory pairs, job
/// slots, ...), pre-loaded at construction and drawn down by `AcquireToken`.
pub struct TokenQueue {
    sender: mpsc::Sender<TokenResource>,
    receiver: Mutex<mpsc::Receiver<TokenResource>>,
}

impl TokenQueue {
    pub fn new(resources: Vec<TokenResource>) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel();
        for resource in resources {
            let _ = sender.send(resource);
        }
        Arc::new(Self {
            sender,
            receiver: Mutex::new(receiver),
        })
    }

    fn acquire(&self, timeout: Duration) -> Option<TokenResource> {
        self.receiver.lock().unwrap().recv_timeout(timeout).ok()
    }

    fn release(&self, resource: TokenResource) {
        let _ = self.sender.send(resource);
    }
}

/// For each item, blocks (bounded by `timeout`) to dequeue a resource and
/// emits `Token{item: resource, value: item}`.
pub struct AcquireToken {
    queue: Arc<TokenQueue>,
    timeout: Duration,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
    metrics: Option<Metrics>,
}

impl AcquireToken {
    pub fn new(queue: Arc<TokenQueue>, timeout: Duration) -> Self {
        Self {
            queue,
            timeout,
            prev: None,
            next: None,
            metrics: None,
        }
    }
}

impl Stage for AcquireToken {
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
        let prev = self.prev.as_ref().unwrap();
        let next = self.next.as_ref().unwrap();
        while let Some(batch) = Pipe::read(prev, 1) {
            for value in batch {
                let text = value.as_text().map(str::to_string).unwrap_or_default();
                let resource = self
                    .queue
                    .acquire(self.timeout)
                    .expect("token queue exhausted its acquire timeout");
                if let Some(metrics) = &self.metrics {
                    metrics.log(format!("acquired {:?}", resource.0));
                }
                Pipe::append(next, vec![Element::Token(Token::new(resource, text))]);
            }
        }
    }
    fn flush(&mut self) {
        self.changed();
    }
}

/// For each token, enqueues its resource back and emits `token.value`.
pub struct ReleaseToken {
    queue: Arc<TokenQueue>,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
}

impl ReleaseToken {
    pub fn new(queue: Arc<TokenQueue>) -> Self {
        Self {
            queue,
            prev: None,
            next: None,
        }
    }
}

impl Stage for ReleaseToken {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, _metrics: Metrics, _metadata: MetadataHandle) {
        self.prev = Some(prev.as_item().clone());
        self.next = Some(next.as_item().clone());
    }
    fn changed(&mut self) {
        let prev = self.prev.as_ref().unwrap();
        let next = self.next.as_ref().unwrap();
        while let Some(batch) = Pipe::read(prev, -1) {
            for value in batch {
                if let Element::Token(token) = value {
                    self.queue.release(token.item.clone());
                    Pipe::append(next, vec![Element::Text(token.value)]);
                }
            }
        }
    }
    fn flush(&mut self) {
        self.changed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::pipe::new_item_pipe;

    #[test]
    fn acquire_then_release_round_trips_the_resource() {
        let queue = TokenQueue::new(vec![TokenResource(serde_json::json!({"host": "a"}))]);
        let (prev, mid) = (new_item_pipe(), new_item_pipe());
        let mut acquire = AcquireToken::new(queue.clone(), Duration::from_secs(1));
        acquire.bind(
            AnyPipe::Item(prev.clone()),
            AnyPipe::Item(mid.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(&prev, vec![Element::Text("job-1".into())]);
        let tokens = Pipe::read(&mid, -1).unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(queue.acquire(Duration::from_millis(10)).is_none());

        let (prev2, next2) = (new_item_pipe(), new_item_pipe());
        Pipe::append(&prev2, tokens);
        let mut release = ReleaseToken::new(queue.clone());
        release.bind(
            AnyPipe::Item(prev2.clone()),
            AnyPipe::Item(next2.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        release.changed();
        let out = Pipe::read(&next2, -1).unwrap();
        assert_eq!(out[0].as_text(), Some("job-1"));
        assert!(queue.acquire(Duration::from_millis(10)).is_some());
    }
}
