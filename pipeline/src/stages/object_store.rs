// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Object-store stages (§4.I), grounded in
//! `examples/original_source/binarian/amazon/s3.py`.
//!
//! The engine's `Stage::changed`/`flush` are synchronous (every other stage
//! in this crate only ever touches in-memory pipes), but `ObjectStore` is an
//! `async_trait` port. Each stage here owns a dedicated single-threaded
//! `tokio::runtime::Runtime` purely to bridge that gap via `block_on` --
//! it's a private implementation detail of this module, not a second
//! event loop competing with whatever runtime the owning role runs on.

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use pipeline_domain::element::{Element, ElementKind};
use pipeline_domain::metrics::{MetadataHandle, Metrics};
use pipeline_domain::pipe::{Pipe, PipeHandle};
use pipeline_domain::ports::{ObjectStore, PartList};
use pipeline_domain::s3::{S3Object, S3Target};
use pipeline_domain::stage::{AnyPipe, Stage};

fn bridge_runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build object-store bridge runtime")
}

fn target_to_download_bounds(target: &S3Target) -> (u64, Option<u64>) {
    match target {
        S3Target::Whole(_) => (0, None),
        S3Target::Range(range) => (range.start, Some(range.end + 1)),
    }
}

/// Streams an object (or a byte range of one) out as binary, in
/// `chunksize`-bounded GET requests further split into 128KiB append calls.
pub struct S3Download {
    store: Arc<dyn ObjectStore>,
    chunksize: u64,
    runtime: Runtime,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<u8>>,
    metrics: Option<Metrics>,
}

impl S3Download {
    pub fn new(store: Arc<dyn ObjectStore>, chunksize: u64) -> Self {
        Self {
            store,
            chunksize,
            runtime: bridge_runtime(),
            prev: None,
            next: None,
            metrics: None,
        }
    }

    fn download(&self, target: &S3Target) {
        let (bucket, key) = match target {
            S3Target::Whole(o) => (o.bucket.clone(), o.key.clone()),
            S3Target::Range(r) => (r.bucket.clone(), r.key.clone()),
        };
        let (mut offset, known_end) = target_to_download_bounds(target);
        let size = match known_end {
            Some(end) => end,
            None => {
                let measured = self
                    .runtime
                    .block_on(self.store.head(&bucket, &key))
                    .expect("head request failed")
                    .expect("object does not exist");
                if let Some(metrics) = &self.metrics {
                    metrics.log(format!("downloading s3://{bucket}/{key} measured as {measured} bytes"));
                }
                measured
            }
        };

        while offset < size {
            offset += self.fetch_range(&bucket, &key, offset, size);
        }
    }

    fn fetch_range(&self, bucket: &str, key: &str, offset: u64, total: u64) -> u64 {
        let available = (total - offset).min(self.chunksize) - 1;
        if let Some(metrics) = &self.metrics {
            metrics.log(format!("downloading range {offset}:{}", offset + available));
        }
        let body = self
            .runtime
            .block_on(self.store.get(bucket, key, offset, offset + available))
            .expect("range GET failed");
        let next = self.next.as_ref().unwrap();
        for chunk in body.chunks(128 * 1024) {
            Pipe::append(next, chunk.to_vec());
        }
        available + 1
    }
}

impl Stage for S3Download {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn length(&self) -> Option<usize> {
        None
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, metrics: Metrics, _metadata: MetadataHandle) {
        self.prev = Some(prev.as_item().clone());
        self.next = Some(next.as_binary().clone());
        self.metrics = Some(metrics);
    }
    fn changed(&mut self) {
        let prev = self.prev.as_ref().unwrap().clone();
        while let Some(batch) = Pipe::read(&prev, 1) {
            for item in &batch {
                let target = match item {
                    Element::S3Object(o) => S3Target::Whole(o.clone()),
                    Element::S3Range(r) => S3Target::Range(r.clone()),
                    _ => continue,
                };
                self.download(&target);
            }
        }
    }
    fn flush(&mut self) {}
}

/// Buffers binary input into multipart parts, starting the upload lazily
/// (so `keyer` can read values other stages set into metadata upstream) and
/// completing it on `flush`.
pub struct S3Upload {
    store: Arc<dyn ObjectStore>,
    runtime: Runtime,
    bucket: String,
    keyer: Box<dyn Fn(&MetadataHandle) -> String>,
    key: Option<String>,
    chunksize: u64,
    part: u32,
    parts: Vec<(u32, String)>,
    upload_id: Option<String>,
    prev: Option<PipeHandle<u8>>,
    next: Option<PipeHandle<Element>>,
    metrics: Option<Metrics>,
    metadata: Option<MetadataHandle>,
}

impl S3Upload {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        key: impl Fn(&MetadataHandle) -> String + 'static,
        chunksize: u64,
    ) -> Self {
        Self {
            store,
            runtime: bridge_runtime(),
            bucket: bucket.into(),
            keyer: Box::new(key),
            key: None,
            chunksize,
            part: 1,
            parts: Vec::new(),
            upload_id: None,
            prev: None,
            next: None,
            metrics: None,
            metadata: None,
        }
    }

    fn start_upload(&mut self) {
        if self.upload_id.is_none() {
            let key = (self.keyer)(self.metadata.as_ref().unwrap());
            let upload_id = self
                .runtime
                .block_on(self.store.create_multipart(&self.bucket, &key))
                .expect("create_multipart_upload failed");
            if let Some(metrics) = &self.metrics {
                metrics.log(format!("upload started {key}"));
            }
            self.key = Some(key);
            self.upload_id = Some(upload_id);
        }
    }

    fn upload(&mut self, threshold: usize) {
        let prev = self.prev.as_ref().unwrap().clone();
        while Pipe::length_of(&prev) > threshold {
            let Some(chunk) = Pipe::read(&prev, self.chunksize as isize) else {
                break;
            };
            let len = chunk.len();
            if let Some(metrics) = &self.metrics {
                metrics.log(format!("part {} started; {len} bytes", self.part));
            }
            let etag = self
                .runtime
                .block_on(self.store.upload_part(
                    &self.bucket,
                    self.key.as_ref().unwrap(),
                    self.upload_id.as_ref().unwrap(),
                    self.part,
                    chunk,
                ))
                .expect("upload_part failed");
            if let Some(metrics) = &self.metrics {
                metrics.log(format!("part {} completed; {len} bytes", self.part));
            }
            self.parts.push((self.part, etag));
            self.part += 1;
        }
    }

    fn complete(&mut self) {
        let key = self.key.clone().unwrap();
        self.runtime
            .block_on(self.store.complete_multipart(
                &self.bucket,
                &key,
                self.upload_id.as_ref().unwrap(),
                PartList(self.parts.clone()),
            ))
            .expect("complete_multipart_upload failed");
        if let Some(metrics) = &self.metrics {
            metrics.log(format!("upload completed {key}"));
        }
        let next = self.next.as_ref().unwrap();
        Pipe::append(next, vec![Element::S3Object(S3Object::new(self.bucket.clone(), key))]);
    }
}

impl Stage for S3Upload {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn length(&self) -> Option<usize> {
        None
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, metrics: Metrics, metadata: MetadataHandle) {
        self.prev = Some(prev.as_binary().clone());
        self.next = Some(next.as_item().clone());
        self.metrics = Some(metrics);
        self.metadata = Some(metadata);
    }
    fn changed(&mut self) {
        self.start_upload();
        self.upload(self.chunksize as usize);
    }
    fn flush(&mut self) {
        self.start_upload();
        self.upload(0);
        self.complete();
    }
}

/// Lists a prefix's immediate contents as `Element::S3Object`s.
pub struct S3List {
    store: Arc<dyn ObjectStore>,
    runtime: Runtime,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
}

impl S3List {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            runtime: bridge_runtime(),
            prev: None,
            next: None,
        }
    }
}

impl Stage for S3List {
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
        let prev = self.prev.as_ref().unwrap().clone();
        let next = self.next.as_ref().unwrap();
        while let Some(items) = Pipe::read(&prev, -1) {
            for item in items {
                if let Element::S3Prefix(p) = item {
                    let keys = self
                        .runtime
                        .block_on(self.store.list_v2(&p.bucket, &p.prefix))
                        .expect("list_objects_v2 failed");
                    let objects = keys.into_iter().map(|k| Element::S3Object(S3Object::new(p.bucket.clone(), k))).collect();
                    Pipe::append(next, objects);
                }
            }
        }
    }
    fn flush(&mut self) {
        self.changed();
    }
}

/// Deletes every object in a batch, then forwards the batch unchanged (the
/// sort core uses this to reclaim a merged shard's inputs after a
/// successful write).
pub struct S3Delete {
    store: Arc<dyn ObjectStore>,
    runtime: Runtime,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
}

impl S3Delete {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            runtime: bridge_runtime(),
            prev: None,
            next: None,
        }
    }
}

impl Stage for S3Delete {
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
        let prev = self.prev.as_ref().unwrap().clone();
        let next = self.next.as_ref().unwrap();
        while let Some(items) = Pipe::read(&prev, -1) {
            let objects: Vec<&S3Object> = items.iter().filter_map(|e| e.as_s3_object()).collect();
            if let Some(first) = objects.first() {
                let keys: Vec<String> = objects.iter().map(|o| o.key.clone()).collect();
                self.runtime
                    .block_on(self.store.delete_objects(&first.bucket, &keys))
                    .expect("delete_objects failed");
            }
            Pipe::append(next, items);
        }
    }
    fn flush(&mut self) {
        self.changed();
    }
}

/// Copies each object under a new, metadata-derived key then deletes the
/// original, emitting the renamed objects.
pub struct S3Rename {
    store: Arc<dyn ObjectStore>,
    runtime: Runtime,
    key: Box<dyn Fn(&MetadataHandle) -> String>,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
    metrics: Option<Metrics>,
    metadata: Option<MetadataHandle>,
}

impl S3Rename {
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Fn(&MetadataHandle) -> String + 'static) -> Self {
        Self {
            store,
            runtime: bridge_runtime(),
            key: Box::new(key),
            prev: None,
            next: None,
            metrics: None,
            metadata: None,
        }
    }
}

impl Stage for S3Rename {
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
        let next = self.next.as_ref().unwrap();
        while let Some(items) = Pipe::read(&prev, -1) {
            let mut renamed = Vec::new();
            for item in items {
                let Some(object) = item.as_s3_object() else { continue };
                let new_key = (self.key)(self.metadata.as_ref().unwrap());
                if let Some(metrics) = &self.metrics {
                    metrics.log(format!("copying {}/{} to {}", object.bucket, object.key, new_key));
                }
                self.runtime
                    .block_on(self.store.copy(&object.bucket, &object.key, &object.bucket, &new_key))
                    .expect("copy_object failed");
                self.runtime
                    .block_on(self.store.delete_objects(&object.bucket, &[object.key.clone()]))
                    .expect("delete_object failed");
                renamed.push(Element::S3Object(S3Object::new(object.bucket.clone(), new_key)));
            }
            Pipe::append(next, renamed);
        }
    }
    fn flush(&mut self) {
        self.changed();
    }
}

/// Splits each `S3Object` into `chunksize`-bounded `S3ObjectRange`s,
/// measuring the object first if its length isn't already known.
pub struct S3Chunk {
    store: Arc<dyn ObjectStore>,
    runtime: Runtime,
    chunksize: u64,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
}

impl S3Chunk {
    pub fn new(store: Arc<dyn ObjectStore>, chunksize: u64) -> Self {
        Self {
            store,
            runtime: bridge_runtime(),
            chunksize,
            prev: None,
            next: None,
        }
    }
}

impl Stage for S3Chunk {
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
        let prev = self.prev.as_ref().unwrap().clone();
        let next = self.next.as_ref().unwrap();
        while let Some(items) = Pipe::read(&prev, -1) {
            for item in items {
                let Some(object) = item.as_s3_object() else { continue };
                let total = match object.total {
                    Some(total) => total,
                    None => self
                        .runtime
                        .block_on(self.store.head(&object.bucket, &object.key))
                        .expect("head_object failed")
                        .expect("object does not exist"),
                };
                let measured = S3Object::with_total(object.bucket.clone(), object.key.clone(), total);
                let ranges = measured.split(self.chunksize);
                Pipe::append(next, ranges.into_iter().map(Element::S3Range).collect());
            }
        }
    }
    fn flush(&mut self) {
        self.changed();
    }
}

/// Evaluates whether a metadata-derived key exists in `bucket`, emitting
/// `Element::Text("true"|"false")`. A non-missing-object error from the
/// store is fatal, matching the Python original re-raising anything other
/// than a 404.
pub struct S3KeyExists {
    store: Arc<dyn ObjectStore>,
    runtime: Runtime,
    bucket: String,
    key: Box<dyn Fn(&Element) -> String>,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
}

impl S3KeyExists {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, key: impl Fn(&Element) -> String + 'static) -> Self {
        Self {
            store,
            runtime: bridge_runtime(),
            bucket: bucket.into(),
            key: Box::new(key),
            prev: None,
            next: None,
        }
    }
}

impl Stage for S3KeyExists {
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
        let prev = self.prev.as_ref().unwrap().clone();
        let next = self.next.as_ref().unwrap();
        while let Some(items) = Pipe::read(&prev, -1) {
            for item in &items {
                let key = (self.key)(item);
                let exists = self
                    .runtime
                    .block_on(self.store.head(&self.bucket, &key))
                    .expect("head_object failed")
                    .is_some();
                Pipe::append(next, vec![Element::Text(exists.to_string())]);
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
    use crate::infrastructure::object_store::InMemoryObjectStore;
    use pipeline_domain::pipe::{new_byte_pipe, new_item_pipe};

    #[test]
    fn download_streams_a_whole_object() {
        let backing = Arc::new(InMemoryObjectStore::new());
        backing.seed("b", "k", b"hello world".to_vec());
        let store: Arc<dyn ObjectStore> = backing;
        let prev = new_item_pipe();
        let next = new_byte_pipe();
        let mut stage = S3Download::new(store.clone(), 1024);
        stage.bind(
            AnyPipe::Item(prev.clone()),
            AnyPipe::Binary(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(&prev, vec![Element::S3Object(S3Object::new("b", "k"))]);
        let out = Pipe::read(&next, -1).unwrap();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn key_exists_reports_false_for_a_missing_key() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let prev = new_item_pipe();
        let next = new_item_pipe();
        let mut stage = S3KeyExists::new(store, "bucket", |e| e.as_text().unwrap_or_default().to_string());
        stage.bind(
            AnyPipe::Item(prev.clone()),
            AnyPipe::Item(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(&prev, vec![Element::Text("missing-key".into())]);
        let out = Pipe::read(&next, -1).unwrap();
        assert_eq!(out[0].as_text(), Some("false"));
    }
}
