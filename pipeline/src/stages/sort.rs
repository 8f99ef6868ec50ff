// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Sort core (§4.H), grounded in
//! `examples/original_source/binarian/common/sorting.py`. `DataMarker`/
//! `MinMax` have no surviving Python source (the retrieval pack only kept
//! `QuickSort`/`MergeSort` from this module) and are built from spec.md
//! §4.H/§4.J prose instead.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use pipeline_domain::element::{Element, ElementKind};
use pipeline_domain::funnel::{Funnel, StageHandle};
use pipeline_domain::marker::DataMarkerCollection;
use pipeline_domain::merge_group::compare_keys;
use pipeline_domain::metrics::{MetadataHandle, Metrics};
use pipeline_domain::pipe::{Pipe, PipeHandle};
use pipeline_domain::s3::S3Object;
use pipeline_domain::stage::{AnyPipe, Stage};

/// Sorts one fully-buffered batch in place on `flush`. Appropriate only
/// when a shard's whole sort key space fits in memory (the base case the
/// distributed `MergeSort` above decomposes into).
pub struct QuickSort {
    key: Box<dyn Fn(&Element) -> String>,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
}

impl QuickSort {
    pub fn new(key: impl Fn(&Element) -> String + 'static) -> Self {
        Self {
            key: Box::new(key),
            prev: None,
            next: None,
        }
    }

    pub fn by_line_key() -> Self {
        Self::new(|e| e.as_line().map(|l| l.key.clone()).unwrap_or_default())
    }
}

impl Stage for QuickSort {
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
        if let Some(mut data) = Pipe::read(prev, -1) {
            data.sort_by(|a, b| compare_keys(&(self.key)(a), &(self.key)(b)));
            Pipe::append(next, data);
        }
    }
}

/// Heap entry ordered purely by key; `Reverse` turns `BinaryHeap`'s max-heap
/// into the min-heap the k-way merge needs. `shard` breaks ties in a fixed,
/// deterministic order rather than leaving equal keys to interleave
/// arbitrarily across shards.
struct HeapEntry {
    key: String,
    shard: usize,
    item: Element,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.shard == other.shard
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        compare_keys(&self.key, &other.key).then_with(|| self.shard.cmp(&other.shard))
    }
}

/// K-way merges already-sorted shards: each shard is read through its own
/// sub-funnel (typically download + `NDJsonIndex`), fed `piecesize` ranges
/// at a time so no single shard's whole content need be buffered at once.
pub struct MergeSort {
    piecesize: u64,
    steps: Box<dyn Fn(&S3Object) -> Vec<StageHandle>>,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
    metrics: Option<Metrics>,
    metadata: Option<MetadataHandle>,
}

impl MergeSort {
    pub fn new(piecesize: u64, steps: impl Fn(&S3Object) -> Vec<StageHandle> + 'static) -> Self {
        Self {
            piecesize,
            steps: Box::new(steps),
            prev: None,
            next: None,
            metrics: None,
            metadata: None,
        }
    }
}

impl Stage for MergeSort {
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
    fn flush(&mut self) {
        let prev = self.prev.as_ref().unwrap();
        let next = self.next.as_ref().unwrap();
        let Some(data) = Pipe::read(prev, -1) else {
            return;
        };
        let shards: Vec<S3Object> = data.iter().filter_map(|e| e.as_s3_object().cloned()).collect();
        if shards.is_empty() {
            return;
        }

        let mut funnels: Vec<Option<Funnel>> = shards
            .iter()
            .map(|shard| {
                let mut funnel = Funnel::new((self.steps)(shard));
                funnel
                    .bind(self.metrics.clone().unwrap(), self.metadata.clone().unwrap(), None)
                    .expect("merge-sort sub-funnel type mismatch");
                Some(funnel)
            })
            .collect();
        let mut pieces: Vec<Vec<pipeline_domain::s3::S3ObjectRange>> =
            shards.iter().map(|shard| shard.split(self.piecesize)).collect();

        let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::new();

        fn push(i: usize, funnels: &mut [Option<Funnel>], pieces: &mut [Vec<pipeline_domain::s3::S3ObjectRange>], heap: &mut BinaryHeap<Reverse<HeapEntry>>) {
            let Some(funnel) = &funnels[i] else {
                return;
            };
            if let Some(items) = funnel.read_items(1) {
                if let Some(item) = items.into_iter().next() {
                    let key = item.as_line().map(|l| l.key.clone()).unwrap_or_default();
                    heap.push(Reverse(HeapEntry { key, shard: i, item }));
                }
                return;
            }
            if !pieces[i].is_empty() {
                let piece = pieces[i].remove(0);
                funnel.append_items(vec![Element::S3Range(piece)]);
                push(i, funnels, pieces, heap);
                return;
            }
            funnel.flush();
            if let Some(items) = funnel.read_items(1) {
                if let Some(item) = items.into_iter().next() {
                    let key = item.as_line().map(|l| l.key.clone()).unwrap_or_default();
                    heap.push(Reverse(HeapEntry { key, shard: i, item }));
                    return;
                }
            }
            funnels[i] = None;
        }

        for i in 0..shards.len() {
            push(i, &mut funnels, &mut pieces, &mut heap);
        }

        while let Some(Reverse(entry)) = heap.pop() {
            Pipe::append(next, vec![entry.item]);
            push(entry.shard, &mut funnels, &mut pieces, &mut heap);
        }
    }
}

/// Attaches `count+1` `{offset -> key}` markers at equidistant item indices,
/// emitting `Element::Marker` on `flush`. `offset` is the cumulative byte
/// length of `data` fields of all items before it, so the first marker's
/// offset is always 0 and the last is the total byte length of the batch.
/// Computing equidistant indices needs the final item count up front, so
/// items are buffered across `changed()` calls and only marked up in
/// `flush`; upstream items are forwarded unchanged at that point, with the
/// marker collection appended as one extra item at the tail, mirroring how
/// the worker-sort role threads markers back to the master alongside the
/// shard it just wrote.
pub struct DataMarker {
    key: Box<dyn Fn(&Element) -> String>,
    count: u64,
    buffer: Vec<Element>,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
}

impl DataMarker {
    pub fn new(count: u64, key: impl Fn(&Element) -> String + 'static) -> Self {
        Self {
            key: Box::new(key),
            count: count.max(1),
            buffer: Vec::new(),
            prev: None,
            next: None,
        }
    }

    fn byte_len(item: &Element) -> u64 {
        item.as_line().map(|l| l.data.len() as u64).unwrap_or(0)
    }
}

impl Stage for DataMarker {
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
        while let Some(batch) = Pipe::read(prev, -1) {
            self.buffer.extend(batch);
        }
    }
    fn flush(&mut self) {
        self.changed();
        let n = self.buffer.len() as u64;
        let mut collection = DataMarkerCollection::default();
        if n > 0 {
            let mut cumulative = Vec::with_capacity(self.buffer.len() + 1);
            let mut running = 0u64;
            cumulative.push(0u64);
            for item in &self.buffer {
                running += Self::byte_len(item);
                cumulative.push(running);
            }
            for i in 0..self.count {
                let idx = ((i * n) / self.count) as usize;
                collection.push(cumulative[idx], (self.key)(&self.buffer[idx]));
            }
            let last = self.buffer.len() - 1;
            collection.push(cumulative[self.buffer.len()], (self.key)(&self.buffer[last]));
        }
        let next = self.next.as_ref().unwrap();
        let items = std::mem::take(&mut self.buffer);
        Pipe::append(next, items);
        Pipe::append(next, vec![Element::Marker(collection)]);
    }
}

/// Tracks the minimum/maximum sort key observed, appending `Element::Marker`
/// with exactly those two samples on `flush` — the cheap alternative to
/// `DataMarker`'s equidistant sampling when only the shard's outer bounds
/// are needed. `min-offset` is the cumulative byte length of items strictly
/// before the minimum; `max-offset` is the cumulative byte length including
/// the maximum itself.
pub struct MinMax {
    key: Box<dyn Fn(&Element) -> String>,
    cumulative: u64,
    min: Option<(u64, String)>,
    max: Option<(u64, String)>,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
}

impl MinMax {
    pub fn new(key: impl Fn(&Element) -> String + 'static) -> Self {
        Self {
            key: Box::new(key),
            cumulative: 0,
            min: None,
            max: None,
            prev: None,
            next: None,
        }
    }
}

impl Stage for MinMax {
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
            for item in &batch {
                let key = (self.key)(item);
                let start_offset = self.cumulative;
                self.cumulative += item.as_line().map(|l| l.data.len() as u64).unwrap_or(0);
                let end_offset = self.cumulative;
                match &self.min {
                    Some((_, k)) if compare_keys(k, &key) != std::cmp::Ordering::Greater => {}
                    _ => self.min = Some((start_offset, key.clone())),
                }
                match &self.max {
                    Some((_, k)) if compare_keys(&key, k) != std::cmp::Ordering::Greater => {}
                    _ => self.max = Some((end_offset, key)),
                }
            }
            Pipe::append(next, batch);
        }
    }
    fn flush(&mut self) {
        self.changed();
        let mut collection = DataMarkerCollection::default();
        if let Some((offset, key)) = self.min.take() {
            collection.push(offset, key);
        }
        if let Some((offset, key)) = self.max.take() {
            collection.push(offset, key);
        }
        let next = self.next.as_ref().unwrap();
        Pipe::append(next, vec![Element::Marker(collection)]);
    }
}

/// Bridges a `DataMarker`/`MinMax` marker collection from the item pipe
/// into metadata, under `name`, so a later `S3Upload` key closure (which
/// only sees metadata, not the pipe) can embed it via
/// `DataMarkerCollection::queryable`. Non-marker items pass through
/// unchanged.
pub struct MarkerToMetadata {
    name: String,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
    metadata: Option<MetadataHandle>,
}

impl MarkerToMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prev: None,
            next: None,
            metadata: None,
        }
    }
}

impl Stage for MarkerToMetadata {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, _metrics: Metrics, metadata: MetadataHandle) {
        self.prev = Some(prev.as_item().clone());
        self.next = Some(next.as_item().clone());
        self.metadata = Some(metadata);
    }
    fn changed(&mut self) {
        let prev = self.prev.as_ref().unwrap();
        let next = self.next.as_ref().unwrap();
        while let Some(batch) = Pipe::read(prev, -1) {
            let mut forwarded = Vec::with_capacity(batch.len());
            for item in batch {
                if matches!(item, Element::Marker(_)) {
                    self.metadata.as_ref().unwrap().borrow_mut().set(self.name.clone(), item);
                } else {
                    forwarded.push(item);
                }
            }
            if !forwarded.is_empty() {
                Pipe::append(next, forwarded);
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
    use pipeline_domain::ndjson::NdjsonIndexed;
    use pipeline_domain::pipe::new_item_pipe;

    fn line(key: &str) -> Element {
        Element::Line(NdjsonIndexed::new(key, format!("{key}\n").into_bytes()))
    }

    #[test]
    fn quicksort_orders_by_key() {
        let prev = new_item_pipe();
        let next = new_item_pipe();
        let mut stage = QuickSort::by_line_key();
        stage.bind(
            AnyPipe::Item(prev.clone()),
            AnyPipe::Item(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(&prev, vec![line("3"), line("1"), line("2")]);
        stage.flush();
        let out = Pipe::read(&next, -1).unwrap();
        let keys: Vec<&str> = out.iter().map(|e| e.as_line().unwrap().key.as_str()).collect();
        assert_eq!(keys, vec!["1", "2", "3"]);
    }

    #[test]
    fn minmax_emits_first_and_last_key_as_markers() {
        let prev = new_item_pipe();
        let next = new_item_pipe();
        let mut stage = MinMax::new(|e| e.as_line().map(|l| l.key.clone()).unwrap_or_default());
        stage.bind(
            AnyPipe::Item(prev.clone()),
            AnyPipe::Item(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(&prev, vec![line("5"), line("9"), line("2")]);
        stage.flush();
        let out = Pipe::read(&next, -1).unwrap();
        assert_eq!(out.len(), 4);
        let marker = out.last().unwrap().clone();
        if let Element::Marker(collection) = marker {
            assert_eq!(collection.markers.len(), 2);
        } else {
            panic!("expected a marker element");
        }
    }
}
