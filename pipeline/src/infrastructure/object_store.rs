// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! In-memory `ObjectStore` adapter. Production wiring against the real AWS
//! SDK is explicitly out of scope (§1); this is the adapter the object-store
//! *stages* (`S3Download`, `S3Upload`, ...) are tested and driven against
//! locally, and the shape a production adapter would slot in behind.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use pipeline_domain::error::{PipelineError, PipelineResult};
use pipeline_domain::ports::{ObjectStore, PartList};

#[derive(Default)]
struct MultipartUpload {
    parts: HashMap<u32, Vec<u8>>,
}

#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    uploads: Mutex<HashMap<String, MultipartUpload>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body);
    }

    pub fn get_object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn head(&self, bucket: &str, key: &str) -> PipelineResult<Option<u64>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|b| b.len() as u64))
    }

    async fn get(&self, bucket: &str, key: &str, start: u64, end: u64) -> PipelineResult<Vec<u8>> {
        let objects = self.objects.lock().unwrap();
        let body = objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| PipelineError::TransientExternal(format!("no such object: {bucket}/{key}")))?;
        let start = start as usize;
        let end = (end as usize).min(body.len().saturating_sub(1));
        if start > end || start >= body.len() {
            return Ok(Vec::new());
        }
        Ok(body[start..=end].to_vec())
    }

    async fn create_multipart(&self, _bucket: &str, key: &str) -> PipelineResult<String> {
        let upload_id = format!("upload-{key}-{}", self.uploads.lock().unwrap().len());
        self.uploads.lock().unwrap().insert(upload_id.clone(), MultipartUpload::default());
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: u32,
        body: Vec<u8>,
    ) -> PipelineResult<String> {
        let mut uploads = self.uploads.lock().unwrap();
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| PipelineError::InvalidConfiguration(format!("unknown upload id {upload_id}")))?;
        let etag = format!("etag-{part_number}");
        upload.parts.insert(part_number, body);
        Ok(etag)
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: PartList,
    ) -> PipelineResult<()> {
        let upload = self
            .uploads
            .lock()
            .unwrap()
            .remove(upload_id)
            .ok_or_else(|| PipelineError::InvalidConfiguration(format!("unknown upload id {upload_id}")))?;
        let mut body = Vec::new();
        let mut numbers: Vec<u32> = parts.0.iter().map(|(n, _)| *n).collect();
        numbers.sort_unstable();
        for n in numbers {
            if let Some(chunk) = upload.parts.get(&n) {
                body.extend_from_slice(chunk);
            }
        }
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn list_v2(&self, bucket: &str, prefix: &str) -> PipelineResult<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> PipelineResult<()> {
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(&(bucket.to_string(), key.clone()));
        }
        Ok(())
    }

    async fn copy(&self, src_bucket: &str, src_key: &str, dst_bucket: &str, dst_key: &str) -> PipelineResult<()> {
        let body = self
            .objects
            .lock()
            .unwrap()
            .get(&(src_bucket.to_string(), src_key.to_string()))
            .cloned()
            .ok_or_else(|| PipelineError::TransientExternal(format!("no such object: {src_bucket}/{src_key}")))?;
        self.objects
            .lock()
            .unwrap()
            .insert((dst_bucket.to_string(), dst_key.to_string()), body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn multipart_upload_concatenates_parts_in_order() {
        let store = InMemoryObjectStore::new();
        let upload_id = store.create_multipart("b", "k").await.unwrap();
        store.upload_part("b", "k", &upload_id, 2, b"world".to_vec()).await.unwrap();
        store.upload_part("b", "k", &upload_id, 1, b"hello ".to_vec()).await.unwrap();
        store
            .complete_multipart("b", "k", &upload_id, PartList(vec![(1, "e1".into()), (2, "e2".into())]))
            .await
            .unwrap();
        assert_eq!(store.get_object("b", "k").unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn head_reports_none_for_missing_objects() {
        let store = InMemoryObjectStore::new();
        assert!(store.head("b", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn copy_duplicates_an_object_under_a_new_key() {
        let store = InMemoryObjectStore::new();
        store.seed("b", "src", b"payload".to_vec());
        store.copy("b", "src", "b", "dst").await.unwrap();
        assert_eq!(store.get_object("b", "dst").unwrap(), b"payload");
    }
}
