// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The `worker-ftp` role (§4.J/§6): downloads one file from an FTP mirror
//! and re-uploads it to S3 under its raw key. Grounded in `worker_ftp` in
//! `examples/original_source/src/index.py`.

use std::sync::Arc;

use pipeline_domain::element::Element;
use pipeline_domain::error::PipelineResult;
use pipeline_domain::funnel::stage_handle;
use pipeline_domain::metrics::MetadataHandle;
use pipeline_domain::pipeline::Pipeline;
use pipeline_domain::ports::{FtpClient, ObjectStore};

use crate::stages::ftp::FtpDownload;
use crate::stages::object_store::S3Upload;

pub fn worker_ftp(
    client: Arc<dyn FtpClient>,
    store: Arc<dyn ObjectStore>,
    name: impl Into<String>,
    host: impl Into<String>,
    directory: impl Into<String>,
    bucket: impl Into<String>,
    input: impl Into<String>,
    output: impl Into<String>,
) -> PipelineResult<Vec<Element>> {
    let output = output.into();
    let steps = vec![
        stage_handle(FtpDownload::new(client, host, directory)),
        stage_handle(S3Upload::new(store, bucket, move |_metadata: &MetadataHandle| output.clone(), 128 * 1024 * 1024)),
    ];
    let mut pipeline = Pipeline::new(name, steps);
    pipeline.start(Element::Text(input.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline_domain::error::PipelineResult as Result_;

    struct StubFtp;

    #[async_trait]
    impl FtpClient for StubFtp {
        async fn retrieve(&self, _host: &str, _directory: &str, filename: &str) -> Result_<Vec<u8>> {
            Ok(format!("body of {filename}").into_bytes())
        }
    }

    #[test]
    fn downloads_then_uploads_under_the_given_key() {
        let store = Arc::new(crate::infrastructure::object_store::InMemoryObjectStore::default());
        let out = worker_ftp(
            Arc::new(StubFtp),
            store.clone(),
            "worker-ftp-test",
            "ftp.example.com",
            "/dumps",
            "bucket",
            "current24.xml.gz",
            "raw/enwiki/current24.xml.gz",
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_s3_object().map(|o| o.key.as_str()), Some("raw/enwiki/current24.xml.gz"));
        assert_eq!(
            store.get_object("bucket", "raw/enwiki/current24.xml.gz").unwrap(),
            b"body of current24.xml.gz"
        );
    }
}
