// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! FTP retrieval (§4.I), grounded in
//! `examples/original_source/binarian/transfer.py`.
//!
//! The Python original drives `ftplib.FTP.retrbinary` with a callback and
//! interleaves an idle `NOOP` every 60s to keep the control connection
//! alive during a slow transfer. That keepalive belongs to the concrete FTP
//! client adapter (behind the `FtpClient` port), not this stage: the stage
//! only needs one file's bytes, split into 128KiB append calls the same way
//! the Python original's `blocksize` did.

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use pipeline_domain::element::{Element, ElementKind};
use pipeline_domain::metrics::{MetadataHandle, Metrics};
use pipeline_domain::pipe::{Pipe, PipeHandle};
use pipeline_domain::ports::FtpClient;
use pipeline_domain::stage::{AnyPipe, Stage};

pub struct FtpDownload {
    client: Arc<dyn FtpClient>,
    runtime: Runtime,
    host: String,
    directory: String,
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<u8>>,
    metrics: Option<Metrics>,
}

impl FtpDownload {
    pub fn new(client: Arc<dyn FtpClient>, host: impl Into<String>, directory: impl Into<String>) -> Self {
        Self {
            client,
            runtime: Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build ftp bridge runtime"),
            host: host.into(),
            directory: directory.into(),
            prev: None,
            next: None,
            metrics: None,
        }
    }
}

impl Stage for FtpDownload {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, metrics: Metrics, _metadata: MetadataHandle) {
        self.prev = Some(prev.as_item().clone());
        self.next = Some(next.as_binary().clone());
        self.metrics = Some(metrics);
    }
    fn changed(&mut self) {
        let prev = self.prev.as_ref().unwrap();
        if let Some(items) = Pipe::read(prev, 1) {
            if let Some(filename) = items.first().and_then(|e| e.as_text()) {
                if let Some(metrics) = &self.metrics {
                    metrics.log(format!("download started {} {filename}", self.directory));
                }
                let body = self
                    .runtime
                    .block_on(self.client.retrieve(&self.host, &self.directory, filename))
                    .expect("ftp RETR failed");
                let next = self.next.as_ref().unwrap();
                for chunk in body.chunks(128 * 1024) {
                    Pipe::append(next, chunk.to_vec());
                }
                if let Some(metrics) = &self.metrics {
                    metrics.log(format!("download completed {} {filename}", self.directory));
                }
            }
        }
    }
    fn flush(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline_domain::error::PipelineResult;
    use pipeline_domain::pipe::{new_byte_pipe, new_item_pipe};

    struct StubFtp;

    #[async_trait]
    impl FtpClient for StubFtp {
        async fn retrieve(&self, _host: &str, _directory: &str, filename: &str) -> PipelineResult<Vec<u8>> {
            Ok(format!("contents of {filename}").into_bytes())
        }
    }

    #[test]
    fn download_appends_the_retrieved_file_in_blocks() {
        let prev = new_item_pipe();
        let next = new_byte_pipe();
        let mut stage = FtpDownload::new(Arc::new(StubFtp), "ftp.example.com", "/incoming");
        stage.bind(
            AnyPipe::Item(prev.clone()),
            AnyPipe::Binary(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(&prev, vec![Element::Text("report.csv".into())]);
        let out = Pipe::read(&next, -1).unwrap();
        assert_eq!(out, b"contents of report.csv");
    }
}
