// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Running-digest passthrough stages (§4.D), grounded in
//! `examples/original_source/binarian/digest.py`. The Python original hashes
//! with `hashlib`'s `md5`/`sha1`; this ports directly onto the `md-5`/`sha1`
//! crates, which expose the same incremental `update`/`finalize` shape.

use digest::Digest;
use md5::Md5;
use sha1::Sha1;

use pipeline_domain::element::{Element, ElementKind};
use pipeline_domain::metrics::{MetadataHandle, Metrics};
use pipeline_domain::pipe::{Pipe, PipeHandle};
use pipeline_domain::stage::{AnyPipe, Stage};

enum Algorithm {
    Md5(Md5),
    Sha1(Sha1),
}

impl Algorithm {
    fn update(&mut self, chunk: &[u8]) {
        match self {
            Algorithm::Md5(h) => Digest::update(h, chunk),
            Algorithm::Sha1(h) => Digest::update(h, chunk),
        }
    }

    fn hex_digest(self) -> String {
        match self {
            Algorithm::Md5(h) => hex::encode(h.finalize()),
            Algorithm::Sha1(h) => hex::encode(h.finalize()),
        }
    }
}

/// Passes bytes through unchanged while feeding them into a running hash;
/// on `flush` writes the hex digest into metadata under `name`.
pub struct ChecksumStage {
    name: String,
    instance: Option<Algorithm>,
    prev: Option<PipeHandle<u8>>,
    next: Option<PipeHandle<u8>>,
    metadata: Option<MetadataHandle>,
}

impl ChecksumStage {
    pub fn md5(name: impl Into<String>) -> Self {
        Self::new(name, Algorithm::Md5(Md5::new()))
    }

    pub fn sha1(name: impl Into<String>) -> Self {
        Self::new(name, Algorithm::Sha1(Sha1::new()))
    }

    fn new(name: impl Into<String>, instance: Algorithm) -> Self {
        Self {
            name: name.into(),
            instance: Some(instance),
            prev: None,
            next: None,
            metadata: None,
        }
    }
}

impl Stage for ChecksumStage {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, _metrics: Metrics, metadata: MetadataHandle) {
        self.prev = Some(prev.as_binary().clone());
        self.next = Some(next.as_binary().clone());
        self.metadata = Some(metadata);
    }
    fn changed(&mut self) {
        let prev = self.prev.as_ref().unwrap();
        let next = self.next.as_ref().unwrap();
        if let Some(chunk) = Pipe::read(prev, -1) {
            self.instance.as_mut().unwrap().update(&chunk);
            Pipe::append(next, chunk);
        }
    }
    fn flush(&mut self) {
        self.changed();
        if let Some(instance) = self.instance.take() {
            let digest = instance.hex_digest();
            self.metadata
                .as_ref()
                .unwrap()
                .borrow_mut()
                .set(self.name.clone(), Element::Text(digest));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::pipe::new_byte_pipe;

    #[test]
    fn md5_passes_bytes_through_and_records_the_digest() {
        let prev = new_byte_pipe();
        let next = new_byte_pipe();
        let metadata = pipeline_domain::metrics::Metadata::new();
        let mut stage = ChecksumStage::md5("md5");
        stage.bind(
            AnyPipe::Binary(prev.clone()),
            AnyPipe::Binary(next.clone()),
            Metrics::new("t"),
            metadata.clone(),
        );
        Pipe::append(&prev, b"hello".to_vec());
        stage.flush();
        let out = Pipe::read(&next, -1).unwrap();
        assert_eq!(out, b"hello");
        let recorded = metadata.borrow().get("md5").cloned();
        assert!(matches!(recorded, Some(Element::Text(_))));
    }
}
