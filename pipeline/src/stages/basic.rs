// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Seed/transform/terminal combinators (§4.D), grounded in
//! `examples/original_source/binarian/common/objects.py` and
//! `binarian/common/{conditional,consumers,waiting}.py`.

use pipeline_domain::element::{Element, ElementKind};
use pipeline_domain::funnel::{Funnel, StageHandle};
use pipeline_domain::metrics::{MetadataHandle, Metrics};
use pipeline_domain::pipe::{Pipe, PipeHandle};
use pipeline_domain::stage::{AnyPipe, Stage};

/// Emits `[value]` on `flush`, ignoring whatever arrived upstream. Used as
/// a seed, e.g. re-wrapping an upload's resulting key as an `S3Prefix` for
/// a later cleanup listing.
pub struct Singleton {
    value: Element,
    next: Option<PipeHandle<Element>>,
}

impl Singleton {
    pub fn new(value: Element) -> Self {
        Self { value, next: None }
    }
}

impl Stage for Singleton {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn bind(&mut self, _prev: AnyPipe, next: AnyPipe, _metrics: Metrics, _metadata: MetadataHandle) {
        self.next = Some(next.as_item().clone());
    }
    fn flush(&mut self) {
        Pipe::append(self.next.as_ref().unwrap(), vec![self.value.clone()]);
    }
}

/// For each input item, emits `f(item)`; batched by reading everything
/// available on each `changed`.
pub struct OneToOne {
    transform: Box<dyn Fn(Element) -> Element>,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
}

impl OneToOne {
    pub fn new(transform: impl Fn(Element) -> Element + 'static) -> Self {
        Self {
            transform: Box::new(transform),
            prev: None,
            next: None,
        }
    }
}

impl Stage for OneToOne {
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
        while let Some(items) = Pipe::read(prev, -1) {
            let out = items.into_iter().map(|i| (self.transform)(i)).collect();
            Pipe::append(next, out);
        }
    }
    fn flush(&mut self) {
        self.changed();
    }
}

/// For each item, emits every element of `f(item)`; `f` defaults to
/// wrapping the item in a one-element vec (identity under flattening).
pub struct OneToMany {
    transform: Box<dyn Fn(Element) -> Vec<Element>>,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
}

impl OneToMany {
    pub fn new(transform: impl Fn(Element) -> Vec<Element> + 'static) -> Self {
        Self {
            transform: Box::new(transform),
            prev: None,
            next: None,
        }
    }

    pub fn identity() -> Self {
        Self::new(|item| vec![item])
    }
}

impl Stage for OneToMany {
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
        while let Some(items) = Pipe::read(prev, 1) {
            for item in items {
                let out = (self.transform)(item);
                Pipe::append(next, out);
            }
        }
    }
    fn flush(&mut self) {
        self.changed();
    }
}

/// For each input item, routes it to an inner sub-funnel when
/// `cond(v) XOR inverse` holds, else passes it straight through.
pub struct Conditional {
    condition: Box<dyn Fn(&Element) -> bool>,
    inverse: bool,
    funnel: Funnel,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
}

impl Conditional {
    pub fn new(steps: Vec<StageHandle>, condition: impl Fn(&Element) -> bool + 'static, inverse: bool) -> Self {
        Self {
            condition: Box::new(condition),
            inverse,
            funnel: Funnel::new(steps),
            prev: None,
            next: None,
        }
    }
}

impl Stage for Conditional {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, metrics: Metrics, metadata: MetadataHandle) {
        let prev_pipe = prev.as_item().clone();
        let next_pipe = next.as_item().clone();
        self.funnel
            .bind(metrics, metadata, None)
            .expect("conditional sub-funnel type mismatch");
        let inner_tail = self.funnel.last().as_item().clone();
        let forward_to = next_pipe.clone();
        self.funnel.subscribe(move || {
            if let Some(items) = Pipe::read(&inner_tail, -1) {
                Pipe::append(&forward_to, items);
            }
        });
        self.prev = Some(prev_pipe);
        self.next = Some(next_pipe);
    }
    fn changed(&mut self) {
        let prev = self.prev.as_ref().unwrap().clone();
        let next = self.next.as_ref().unwrap().clone();
        while let Some(batch) = Pipe::read(&prev, 1) {
            for v in batch {
                let satisfies = (self.condition)(&v) != self.inverse;
                if satisfies {
                    self.funnel.append_items(vec![v]);
                } else {
                    Pipe::append(&next, vec![v]);
                }
            }
        }
    }
    fn flush(&mut self) {
        self.funnel.flush();
    }
}

/// Drains upstream to nothing on `flush`; used as a pipeline terminator
/// when the byte tail is never read.
pub struct BinaryConsumer {
    prev: Option<PipeHandle<u8>>,
}

impl Default for BinaryConsumer {
    fn default() -> Self {
        Self { prev: None }
    }
}

impl Stage for BinaryConsumer {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn bind(&mut self, prev: AnyPipe, _next: AnyPipe, _metrics: Metrics, _metadata: MetadataHandle) {
        self.prev = Some(prev.as_binary().clone());
    }
    fn changed(&mut self) {}
    fn flush(&mut self) {
        let prev = self.prev.as_ref().unwrap();
        while Pipe::read(prev, -1).is_some() {}
    }
}

/// Item-pipe counterpart of `BinaryConsumer`.
pub struct DictConsumer {
    prev: Option<PipeHandle<Element>>,
}

impl Default for DictConsumer {
    fn default() -> Self {
        Self { prev: None }
    }
}

impl Stage for DictConsumer {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn bind(&mut self, prev: AnyPipe, _next: AnyPipe, _metrics: Metrics, _metadata: MetadataHandle) {
        self.prev = Some(prev.as_item().clone());
    }
    fn changed(&mut self) {}
    fn flush(&mut self) {
        let prev = self.prev.as_ref().unwrap();
        while Pipe::read(prev, -1).is_some() {}
    }
}

/// Barrier stage: on `flush`, drains all available upstream data and
/// forwards it downstream in one shot. No `changed` handler at all.
pub struct WaitAll {
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
}

impl Default for WaitAll {
    fn default() -> Self {
        Self { prev: None, next: None }
    }
}

impl Stage for WaitAll {
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
    fn flush(&mut self) {
        let prev = self.prev.as_ref().unwrap();
        let next = self.next.as_ref().unwrap();
        while let Some(chunk) = Pipe::read(prev, -1) {
            Pipe::append(next, chunk);
        }
    }
}

/// Logs each item via `Metrics::log` as it passes through unchanged. Used
/// as a pipeline's final step purely for its log side effect.
pub struct DictDebug {
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
    metrics: Option<Metrics>,
}

impl Default for DictDebug {
    fn default() -> Self {
        Self {
            prev: None,
            next: None,
            metrics: None,
        }
    }
}

impl Stage for DictDebug {
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
        while let Some(chunk) = Pipe::read(prev, 1) {
            if let Some(metrics) = &self.metrics {
                metrics.log(format!("debug {:?}", chunk[0]));
            }
            Pipe::append(next, chunk);
        }
    }
    fn flush(&mut self) {
        self.changed();
    }
}

/// Byte-pipe counterpart of `DictDebug`, logging cumulative bytes seen.
pub struct BinaryDebug {
    total: usize,
    prev: Option<PipeHandle<u8>>,
    next: Option<PipeHandle<u8>>,
    metrics: Option<Metrics>,
}

impl Default for BinaryDebug {
    fn default() -> Self {
        Self {
            total: 0,
            prev: None,
            next: None,
            metrics: None,
        }
    }
}

impl Stage for BinaryDebug {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, metrics: Metrics, _metadata: MetadataHandle) {
        self.prev = Some(prev.as_binary().clone());
        self.next = Some(next.as_binary().clone());
        self.metrics = Some(metrics);
    }
    fn changed(&mut self) {
        let prev = self.prev.as_ref().unwrap();
        let next = self.next.as_ref().unwrap();
        while let Some(chunk) = Pipe::read(prev, -1) {
            self.total += chunk.len();
            if let Some(metrics) = &self.metrics {
                metrics.log(format!("debug {}/{}", chunk.len(), self.total));
            }
            Pipe::append(next, chunk);
        }
    }
    fn flush(&mut self) {
        self.changed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::funnel::stage_handle;
    use pipeline_domain::pipe::{new_item_pipe, Pipe};

    fn item_pipe_pair() -> (PipeHandle<Element>, PipeHandle<Element>) {
        (new_item_pipe(), new_item_pipe())
    }

    #[test]
    fn singleton_ignores_input_and_emits_only_on_flush() {
        let (prev, next) = item_pipe_pair();
        let metrics = Metrics::new("t");
        let metadata = pipeline_domain::metrics::Metadata::new();
        let mut s = Singleton::new(Element::Text("seed".into()));
        s.bind(AnyPipe::Item(prev.clone()), AnyPipe::Item(next.clone()), metrics, metadata);
        Pipe::append(&prev, vec![Element::Text("ignored".into())]);
        assert!(Pipe::read(&next, -1).is_none());
        s.flush();
        let out = Pipe::read(&next, -1).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn conditional_routes_by_predicate_xor_inverse() {
        let (prev, next) = item_pipe_pair();
        let metrics = Metrics::new("t");
        let metadata = pipeline_domain::metrics::Metadata::new();
        let passthrough = stage_handle(OneToOne::new(|e| e));
        let mut cond = Conditional::new(vec![passthrough], |e| matches!(e, Element::Text(s) if s == "route"), false);
        cond.bind(AnyPipe::Item(prev.clone()), AnyPipe::Item(next.clone()), metrics, metadata);

        Pipe::append(&prev, vec![Element::Text("other".into())]);
        let direct = Pipe::read(&next, -1).unwrap();
        assert_eq!(direct.len(), 1);

        Pipe::append(&prev, vec![Element::Text("route".into())]);
        cond.flush();
        let routed = Pipe::read(&next, -1).unwrap();
        assert_eq!(routed.len(), 1);
    }

    #[test]
    fn wait_all_forwards_everything_on_flush_only() {
        let (prev, next) = item_pipe_pair();
        let metrics = Metrics::new("t");
        let metadata = pipeline_domain::metrics::Metadata::new();
        let mut w = WaitAll::default();
        w.bind(AnyPipe::Item(prev.clone()), AnyPipe::Item(next.clone()), metrics, metadata);
        Pipe::append(&prev, vec![Element::Text("a".into()), Element::Text("b".into())]);
        assert!(Pipe::read(&next, -1).is_none());
        w.flush();
        assert_eq!(Pipe::read(&next, -1).unwrap().len(), 2);
    }
}
