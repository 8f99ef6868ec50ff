// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Gzip decompression (§4.D), grounded in
//! `examples/original_source/binarian/compress.py`. The Python original
//! wraps the upstream pipe itself as a file-like object for `GzipFile` to
//! `read()` from; `flate2::read::MultiGzDecoder` needs an actual `Read`
//! impl, so `PipeReader` below adapts a `PipeHandle<u8>` into one, blocking
//! (spin-reading) until either bytes or an explicit EOF flag are available.

use std::io::{self, Read};

use flate2::read::MultiGzDecoder;

use pipeline_domain::element::ElementKind;
use pipeline_domain::metrics::{MetadataHandle, Metrics};
use pipeline_domain::pipe::{Pipe, PipeHandle};
use pipeline_domain::stage::{AnyPipe, Stage};

/// Reads from a `PipeHandle<u8>` as if it were an ordinary byte stream.
/// A temporarily empty pipe reads as `Ok(0)` ("no bytes right now") rather
/// than true end-of-stream; `MultiGzDecoder` treats that as a pause and
/// stays ready to resume once this stage calls it again with more buffered
/// upstream bytes, which is why the decoder instance must be kept alive
/// across `changed`/`flush` calls rather than rebuilt each time.
struct PipeReader {
    pipe: PipeHandle<u8>,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match Pipe::read(&self.pipe, buf.len() as isize) {
            Some(chunk) if !chunk.is_empty() => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                Ok(n)
            }
            _ => Ok(0),
        }
    }
}

/// Decodes a gzip byte stream as it arrives. `changed` only decodes once
/// upstream has buffered a full window, keeping memory bounded; `flush`
/// drains whatever remains.
pub struct Ungzip {
    prev: Option<PipeHandle<u8>>,
    next: Option<PipeHandle<u8>>,
    window: usize,
    decoder: Option<MultiGzDecoder<PipeReader>>,
}

impl Ungzip {
    pub fn new() -> Self {
        Self {
            prev: None,
            next: None,
            window: 1024 * 1024,
            decoder: None,
        }
    }

    fn drain_available(&mut self) {
        let prev = self.prev.as_ref().unwrap().clone();
        let next = self.next.as_ref().unwrap().clone();
        let decoder = self
            .decoder
            .get_or_insert_with(|| MultiGzDecoder::new(PipeReader { pipe: prev }));
        let mut buf = [0u8; 128 * 1024];
        loop {
            match decoder.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => Pipe::append(&next, buf[..n].to_vec()),
                Err(_) => break,
            }
        }
    }
}

impl Default for Ungzip {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for Ungzip {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn length(&self) -> Option<usize> {
        None
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, _metrics: Metrics, _metadata: MetadataHandle) {
        self.prev = Some(prev.as_binary().clone());
        self.next = Some(next.as_binary().clone());
    }
    fn changed(&mut self) {
        if Pipe::length_of(self.prev.as_ref().unwrap()) > self.window {
            self.drain_available();
        }
    }
    fn flush(&mut self) {
        self.drain_available();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use pipeline_domain::pipe::new_byte_pipe;
    use std::io::Write;

    #[test]
    fn ungzip_decodes_a_full_stream_on_flush() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"hello world").unwrap();
        let compressed = encoder.finish().unwrap();

        let prev = new_byte_pipe();
        let next = new_byte_pipe();
        let mut stage = Ungzip::new();
        stage.bind(
            AnyPipe::Binary(prev.clone()),
            AnyPipe::Binary(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(&prev, compressed);
        stage.flush();
        let out = Pipe::read(&next, -1).unwrap();
        assert_eq!(out, b"hello world");
    }
}
