// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The `worker-json` role (§4.J/§6): downloads a raw XML dump, decompresses
//! it, converts it to NDJSON, and re-uploads the result. Grounded in
//! `worker_json` in `examples/original_source/src/index.py`.

use std::sync::Arc;

use pipeline_domain::element::Element;
use pipeline_domain::error::PipelineResult;
use pipeline_domain::funnel::stage_handle;
use pipeline_domain::metrics::MetadataHandle;
use pipeline_domain::pipeline::Pipeline;
use pipeline_domain::ports::ObjectStore;
use pipeline_domain::s3::S3Object;

use crate::stages::compress::Ungzip;
use crate::stages::object_store::{S3Download, S3Upload};
use crate::stages::xml::XmlToJson;

#[allow(clippy::too_many_arguments)]
pub fn worker_json(
    store: Arc<dyn ObjectStore>,
    name: impl Into<String>,
    rowtag: impl Into<String>,
    bucket: impl Into<String>,
    input: impl Into<String>,
    output: impl Into<String>,
) -> PipelineResult<Vec<Element>> {
    let bucket = bucket.into();
    let output = output.into();
    let steps = vec![
        stage_handle(S3Download::new(store.clone(), 64 * 1024 * 1024)),
        stage_handle(Ungzip::new()),
        stage_handle(XmlToJson::new(rowtag)),
        stage_handle(S3Upload::new(store, bucket.clone(), move |_metadata: &MetadataHandle| output.clone(), 128 * 1024 * 1024)),
    ];
    let mut pipeline = Pipeline::new(name, steps);
    pipeline.start(Element::S3Object(S3Object::new(bucket, input.into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downloads_decompresses_converts_and_uploads() {
        let store = Arc::new(crate::infrastructure::object_store::InMemoryObjectStore::default());
        let xml = br#"<mediawiki><page><title>A</title></page><page><title>B</title></page></mediawiki>"#;

        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(xml).unwrap();
        let gz = encoder.finish().unwrap();
        store.seed("bucket", "raw/enwiki/current.xml.gz", gz);

        let out = worker_json(
            store.clone(),
            "worker-json-test",
            "page",
            "bucket",
            "raw/enwiki/current.xml.gz",
            "json/enwiki/current.json",
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        let body = store.get_object("bucket", "json/enwiki/current.json").unwrap();
        let text = String::from_utf8(body).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("\"title\":\"A\""));
    }
}
