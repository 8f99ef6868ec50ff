// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Placeholder adapters for the external collaborators `pipeline_domain`
//! only declares as interfaces (§1 Non-goals): a real ECS `TaskRunner` and
//! a real FTP `FtpClient`. Unlike `InMemoryObjectStore`, which gives
//! `master`/`worker-*` something real to run against locally, these two
//! ports have no in-process equivalent worth faking — launching a
//! container or dialing an FTP mirror either really happens or doesn't.
//! Wiring them here to a loud `TransientExternal` failure keeps the
//! boundary explicit at the process entry point instead of panicking deep
//! inside a stage the first time a production deployment forgets to
//! supply its own adapter.

use async_trait::async_trait;
use pipeline_domain::error::{PipelineError, PipelineResult};
use pipeline_domain::ports::{FtpClient, LaunchedTask, TaskRunner};

/// Stands in for a real ECS/Fargate `TaskRunner` until one is wired.
pub struct UnwiredTaskRunner;

#[async_trait]
impl TaskRunner for UnwiredTaskRunner {
    async fn run(
        &self,
        _task_def: &str,
        _cluster: &str,
        _security_group: &str,
        _vpc_subnet: &str,
        _env: Vec<(String, String)>,
    ) -> PipelineResult<LaunchedTask> {
        Err(PipelineError::TransientExternal(
            "no TaskRunner adapter is wired for this process; container orchestration is out of scope (§1)".into(),
        ))
    }

    async fn wait(&self, _task: &LaunchedTask, _on_log: &mut dyn FnMut(&str)) -> PipelineResult<()> {
        Err(PipelineError::TransientExternal(
            "no TaskRunner adapter is wired for this process; container orchestration is out of scope (§1)".into(),
        ))
    }
}

/// Stands in for a real RFC-959 `FtpClient` until one is wired.
pub struct UnwiredFtpClient;

#[async_trait]
impl FtpClient for UnwiredFtpClient {
    async fn retrieve(&self, _host: &str, _directory: &str, _filename: &str) -> PipelineResult<Vec<u8>> {
        Err(PipelineError::TransientExternal(
            "no FtpClient adapter is wired for this process; a real FTP client is out of scope (§1)".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn task_runner_reports_transient_external() {
        let runner = UnwiredTaskRunner;
        let err = runner.run("task", "cluster", "sg", "subnet", Vec::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::TransientExternal(_)));
    }

    #[tokio::test]
    async fn ftp_client_reports_transient_external() {
        let client = UnwiredFtpClient;
        let err = client.retrieve("ftp.example.com", "/dumps", "current.xml.gz").await.unwrap_err();
        assert!(matches!(err, PipelineError::TransientExternal(_)));
    }
}
