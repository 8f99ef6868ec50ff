// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! External collaborator contracts (§4.I). Per §1 Non-goals these are
//! interfaces only — production wiring against the real AWS SDK, a real FTP
//! client, and a real parameter store is out of scope. `pipeline` provides
//! an in-memory adapter of each for tests and local roles.

use async_trait::async_trait;

use crate::error::PipelineResult;

#[derive(Debug, Clone)]
pub struct PartList(pub Vec<(u32, String)>);

/// Object store: ranged reads, multipart writes, list, delete, copy.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn head(&self, bucket: &str, key: &str) -> PipelineResult<Option<u64>>;
    async fn get(&self, bucket: &str, key: &str, start: u64, end: u64) -> PipelineResult<Vec<u8>>;
    async fn create_multipart(&self, bucket: &str, key: &str) -> PipelineResult<String>;
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Vec<u8>,
    ) -> PipelineResult<String>;
    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: PartList,
    ) -> PipelineResult<()>;
    async fn list_v2(&self, bucket: &str, prefix: &str) -> PipelineResult<Vec<String>>;
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> PipelineResult<()>;
    async fn copy(&self, src_bucket: &str, src_key: &str, dst_bucket: &str, dst_key: &str) -> PipelineResult<()>;
}

/// A generic byte source supporting ranged reads, the shape `S3Download`
/// and `NDJsonMeasure::find_newline`'s sub-pipeline need without coupling
/// to `ObjectStore` directly.
#[async_trait]
pub trait ByteSource: Send + Sync {
    async fn read_range(&self, start: u64, end: u64) -> PipelineResult<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct LaunchedTask {
    pub task_arn: String,
    pub log_stream: String,
}

/// Runs a container with environment variables, blocks until exit, streams
/// logs. Consumed by `EcsTask`.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(
        &self,
        task_def: &str,
        cluster: &str,
        security_group: &str,
        vpc_subnet: &str,
        env: Vec<(String, String)>,
    ) -> PipelineResult<LaunchedTask>;

    /// Polls until `stoppedAt` is set (or the bounded poll budget is
    /// exhausted), invoking `on_log` for every streamed log line.
    async fn wait(&self, task: &LaunchedTask, on_log: &mut dyn FnMut(&str)) -> PipelineResult<()>;
}

#[derive(Debug, Clone)]
pub struct RemoteInvocation {
    pub status: u16,
    pub payload: serde_json::Value,
}

/// An invokable remote function returning a JSON result. Consumed by
/// `Lambda`.
#[async_trait]
pub trait RemoteFunction: Send + Sync {
    async fn invoke(&self, function: &str, payload: serde_json::Value) -> PipelineResult<RemoteInvocation>;
}

/// Key-value parameter store (bucket name, security group, vpc subnet,
/// task/cluster ARNs) consumed by the `master` role at startup.
#[async_trait]
pub trait Parameters: Send + Sync {
    async fn value(&self, name: &str) -> PipelineResult<String>;
}

/// A remote FTP host/directory pair, retrieved one file at a time. Consumed
/// by `FtpDownload`.
#[async_trait]
pub trait FtpClient: Send + Sync {
    async fn retrieve(&self, host: &str, directory: &str, filename: &str) -> PipelineResult<Vec<u8>>;
}
