// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! NDJSON framing (§4.G), grounded in
//! `examples/original_source/binarian/common/json.py`.

use pipeline_domain::element::{Element, ElementKind};
use pipeline_domain::funnel::{Funnel, StageHandle};
use pipeline_domain::metrics::{MetadataHandle, Metrics};
use pipeline_domain::ndjson::NdjsonIndexed;
use pipeline_domain::pipe::{Pipe, PipeHandle};
use pipeline_domain::s3::S3ObjectRange;
use pipeline_domain::stage::{AnyPipe, Stage};

/// Flushes a line-aligned prefix once upstream exceeds `chunksize`: finds
/// the last `\n` and emits everything up to and including it as one blob.
pub struct NDJsonChunk {
    chunksize: usize,
    prev: Option<PipeHandle<u8>>,
    next: Option<PipeHandle<u8>>,
}

impl NDJsonChunk {
    pub fn new(chunksize: usize) -> Self {
        Self {
            chunksize,
            prev: None,
            next: None,
        }
    }
}

impl Stage for NDJsonChunk {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, _metrics: Metrics, _metadata: MetadataHandle) {
        self.prev = Some(prev.as_binary().clone());
        self.next = Some(next.as_binary().clone());
    }
    fn changed(&mut self) {
        let prev = self.prev.as_ref().unwrap();
        let next = self.next.as_ref().unwrap();
        if Pipe::length_of(prev) > self.chunksize {
            let index = Pipe::rfind(prev, b'\n');
            if index > -1 {
                if let Some(chunk) = Pipe::read(prev, index as isize + 1) {
                    Pipe::append(next, chunk);
                }
            }
        }
    }
    fn flush(&mut self) {
        let prev = self.prev.as_ref().unwrap();
        let next = self.next.as_ref().unwrap();
        if Pipe::length_of(prev) > 0 {
            if let Some(chunk) = Pipe::read(prev, -1) {
                Pipe::append(next, chunk);
            }
        }
    }
}

/// Splits upstream bytes at each `\n`, parses each line's JSON and applies
/// `extract` to compute a sort key, emitting `{key, data}` items. A parse
/// failure is fatal (logged, then propagated as an `Err` from the owning
/// call rather than silently dropped).
pub struct NDJsonIndex {
    extract: Box<dyn Fn(&serde_json::Value) -> String>,
    chunksize: usize,
    prev: Option<PipeHandle<u8>>,
    next: Option<PipeHandle<Element>>,
    metrics: Option<Metrics>,
}

impl NDJsonIndex {
    pub fn new(extract: impl Fn(&serde_json::Value) -> String + 'static) -> Self {
        Self::with_chunksize(extract, 1024 * 1024)
    }

    pub fn with_chunksize(extract: impl Fn(&serde_json::Value) -> String + 'static, chunksize: usize) -> Self {
        Self {
            extract: Box::new(extract),
            chunksize,
            prev: None,
            next: None,
            metrics: None,
        }
    }

    fn extract_key(&self, chunk: &[u8]) -> String {
        match serde_json::from_slice::<serde_json::Value>(chunk) {
            Ok(value) => (self.extract)(&value),
            Err(err) => {
                if let Some(metrics) = &self.metrics {
                    metrics.log(format!("JSON malformed: {err}"));
                }
                panic!("malformed NDJSON line: {err}");
            }
        }
    }

    fn process(&mut self, size: usize) {
        let prev = self.prev.as_ref().unwrap().clone();
        let next = self.next.as_ref().unwrap().clone();
        if Pipe::length_of(&prev) > size {
            let mut chunks = Vec::new();
            while Pipe::find(&prev, b'\n') > -1 {
                let index = Pipe::find(&prev, b'\n');
                if let Some(chunk) = Pipe::read(&prev, index + 1) {
                    let key = self.extract_key(&chunk);
                    chunks.push(Element::Line(NdjsonIndexed::new(key, chunk)));
                } else {
                    break;
                }
            }
            if !chunks.is_empty() {
                Pipe::append(&next, chunks);
            }
        }
    }
}

impl Stage for NDJsonIndex {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, metrics: Metrics, _metadata: MetadataHandle) {
        self.prev = Some(prev.as_binary().clone());
        self.next = Some(next.as_item().clone());
        self.metrics = Some(metrics);
    }
    fn changed(&mut self) {
        self.process(self.chunksize);
    }
    fn flush(&mut self) {
        self.process(0);
    }
}

/// Writes indexed items' `data` back to a byte stream, in order.
pub struct NDJsonFlush {
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<u8>>,
}

impl Default for NDJsonFlush {
    fn default() -> Self {
        Self { prev: None, next: None }
    }
}

impl Stage for NDJsonFlush {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, _metrics: Metrics, _metadata: MetadataHandle) {
        self.prev = Some(prev.as_item().clone());
        self.next = Some(next.as_binary().clone());
    }
    fn changed(&mut self) {
        let prev = self.prev.as_ref().unwrap();
        let next = self.next.as_ref().unwrap();
        while let Some(chunks) = Pipe::read(prev, -1) {
            for chunk in chunks {
                if let Some(line) = chunk.as_line() {
                    Pipe::append(next, line.data.clone());
                }
            }
        }
    }
    fn flush(&mut self) {
        self.changed();
    }
}

/// Aligns an `S3ObjectRange` to line boundaries (§4.G, invariant 4): for a
/// non-zero start, scans backward from `start-1` for the previous `\n`; for
/// an end short of the object's last byte, scans forward from `end` for the
/// next `\n`. `steps` builds the sub-pipeline (typically an S3-ranged
/// download) `find_newline` drives with a rolling window.
pub struct NDJsonMeasure {
    steps: Box<dyn Fn() -> Vec<StageHandle>>,
    windowsize: u64,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
    metrics: Option<Metrics>,
    metadata: Option<MetadataHandle>,
}

impl NDJsonMeasure {
    pub fn new(steps: impl Fn() -> Vec<StageHandle> + 'static, windowsize: u64) -> Self {
        Self {
            steps: Box::new(steps),
            windowsize,
            prev: None,
            next: None,
            metrics: None,
            metadata: None,
        }
    }

    /// Scans forward from `from` (exclusive) for the first `\n`, returning
    /// its absolute offset. Per the Open Questions resolution: when the
    /// object ends before a newline is found, the last readable byte of the
    /// object (`item.total - 1`) is adopted as the boundary rather than
    /// treating it as a bug — the final line simply has no trailing
    /// newline, which is expected for the object's very last line.
    fn find_newline(&self, item: &S3ObjectRange, from: u64) -> u64 {
        let last_byte = item.total.saturating_sub(1);
        let mut funnel = Funnel::new((self.steps)());
        funnel
            .bind(self.metrics.clone().unwrap(), self.metadata.clone().unwrap(), None)
            .expect("ndjson-measure sub-funnel type mismatch");

        let mut index = from;
        while index < last_byte {
            let window_end = (index + self.windowsize - 1).min(last_byte);
            funnel.append_items(vec![Element::S3Range(item.between(index, window_end))]);
            if let Some(bytes) = funnel.read_bytes(-1) {
                for byte in bytes {
                    if byte == b'\n' {
                        return index;
                    }
                    index += 1;
                }
            } else {
                break;
            }
        }
        last_byte
    }

    fn process(&mut self, item: &S3ObjectRange) {
        let start = if item.start == 0 { 0 } else { self.find_newline(item, item.start - 1) + 1 };
        let end = if item.end == item.total.saturating_sub(1) {
            item.end
        } else {
            self.find_newline(item, item.end)
        };
        let next = self.next.as_ref().unwrap();
        Pipe::append(next, vec![Element::S3Range(item.between(start, end))]);
    }
}

impl Stage for NDJsonMeasure {
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
        let prev = self.prev.as_ref().unwrap().clone();
        while let Some(batch) = Pipe::read(&prev, 1) {
            for value in batch {
                if let Some(range) = value.as_s3_range() {
                    let range = range.clone();
                    self.process(&range);
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
    use std::sync::Arc;

    use pipeline_domain::funnel::stage_handle;
    use pipeline_domain::pipe::{new_byte_pipe, new_item_pipe};

    use crate::infrastructure::object_store::InMemoryObjectStore;
    use crate::stages::object_store::S3Download;

    #[test]
    fn chunk_flushes_a_line_aligned_prefix_past_threshold() {
        let prev = new_byte_pipe();
        let next = new_byte_pipe();
        let mut stage = NDJsonChunk::new(4);
        stage.bind(
            AnyPipe::Binary(prev.clone()),
            AnyPipe::Binary(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(&prev, b"abc\ndefgh\n".to_vec());
        let out = Pipe::read(&next, -1).unwrap();
        assert_eq!(out, b"abc\ndefgh\n");
    }

    #[test]
    fn index_emits_key_value_pairs_per_line() {
        let prev = new_byte_pipe();
        let next = new_item_pipe();
        let mut stage = NDJsonIndex::new(|v| v.get("title").and_then(|t| t.as_str()).unwrap_or_default().to_string());
        stage.bind(
            AnyPipe::Binary(prev.clone()),
            AnyPipe::Item(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(&prev, b"{\"title\":\"b\"}\n{\"title\":\"a\"}\n".to_vec());
        let items = Pipe::read(&next, -1).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_line().unwrap().key, "b");
        assert_eq!(items[1].as_line().unwrap().key, "a");
    }

    #[test]
    fn measure_adopts_the_last_byte_when_the_final_line_is_unterminated() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.seed("bucket", "key", b"abc\ndef".to_vec());

        let prev = new_item_pipe();
        let next = new_item_pipe();
        let mut stage = NDJsonMeasure::new(
            {
                let store = store.clone();
                move || vec![stage_handle(S3Download::new(store.clone(), 64))]
            },
            64,
        );
        stage.bind(
            AnyPipe::Item(prev.clone()),
            AnyPipe::Item(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );

        // total=7 ("abc\ndef"), the tail "def" has no trailing newline, so
        // aligning end=3 must walk off the end of the object.
        let range = S3ObjectRange {
            bucket: "bucket".to_string(),
            key: "key".to_string(),
            total: 7,
            start: 0,
            end: 3,
        };
        Pipe::append(&prev, vec![Element::S3Range(range)]);
        let out = Pipe::read(&next, -1).unwrap();
        assert_eq!(out.len(), 1);
        let aligned = out[0].as_s3_range().unwrap();
        assert_eq!(aligned.start, 0);
        assert_eq!(aligned.end, 6, "should adopt the object's last readable byte, not the unaligned input end");
    }

    #[test]
    fn flush_writes_back_in_order() {
        let prev = new_item_pipe();
        let next = new_byte_pipe();
        let mut stage = NDJsonFlush::default();
        stage.bind(
            AnyPipe::Item(prev.clone()),
            AnyPipe::Binary(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(
            &prev,
            vec![
                Element::Line(NdjsonIndexed::new("a", b"one\n".to_vec())),
                Element::Line(NdjsonIndexed::new("b", b"two\n".to_vec())),
            ],
        );
        let out = Pipe::read(&next, -1).unwrap();
        assert_eq!(out, b"one\ntwo\n");
    }
}
