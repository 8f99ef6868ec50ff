// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Process entry point (§4.J/§6): the single binary every role runs as.
//! `pipeline_bootstrap::bootstrap_cli` resolves which role to run from
//! `--role` (falling back to the `TYPE` environment variable, matching how
//! the ECS task definitions and Lambda wrapper already launch this
//! process), each role reads its own documented environment variables, and
//! the resulting `PipelineResult` is mapped straight to a process exit
//! code.
//!
//! None of the six role functions in `pipeline::roles` are themselves
//! async — each builds and drives a `Pipeline` synchronously, bridging out
//! to async ports (`ObjectStore`, `TaskRunner`, `FtpClient`) through their
//! own internal runtimes where needed (see `roles::master::bridge_runtime`
//! and `stages::remote::bridge_runtime`). `main` stays synchronous too, to
//! avoid nesting a second Tokio runtime under one already driving it.

use std::sync::Arc;

use pipeline::infrastructure::config::RoleConfig;
use pipeline::infrastructure::logging::init_tracing;
use pipeline::infrastructure::object_store::InMemoryObjectStore;
use pipeline::infrastructure::unwired::{UnwiredFtpClient, UnwiredTaskRunner};
use pipeline::roles::{lambda_handlers, master, worker_ftp, worker_json, worker_sort};
use pipeline::stages::throttling::TokenQueue;
use pipeline_bootstrap::exit_code::{result_to_exit_code, ExitCode};
use pipeline_domain::element::Element;
use pipeline_domain::error::{PipelineError, PipelineResult};
use pipeline_domain::ports::{FtpClient, TaskRunner};
use pipeline_domain::token::TokenResource;

/// Reads a required environment variable, turning a missing one into the
/// same `InvalidConfiguration` error `RoleConfig::from_env` raises for a
/// missing `BUCKET`.
fn required_env(name: &str) -> PipelineResult<String> {
    std::env::var(name).map_err(|_| PipelineError::InvalidConfiguration(format!("missing required environment variable {name}")))
}

fn optional_env(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

fn run_role(role: &str, store: Arc<InMemoryObjectStore>) -> PipelineResult<Vec<Element>> {
    match role {
        "master-get" => {
            let config = RoleConfig::from_env()?;
            let runner: Arc<dyn TaskRunner> = Arc::new(UnwiredTaskRunner);
            let ftp_queue = TokenQueue::new(vec![TokenResource(serde_json::json!({
                "Host": optional_env("HOST"),
                "Directory": optional_env("DIRECTORY"),
            }))]);
            let json_queue = TokenQueue::new(vec![TokenResource(serde_json::json!({}))]);
            master::master_get(
                store,
                runner,
                ftp_queue,
                json_queue,
                required_env("NAME")?,
                required_env("ROWTAG")?,
                config.bucket,
                config.cluster_arn,
                config.task_arn,
                config.security_group,
                config.vpc_subnet,
            )
        }
        "master-sort" => {
            let config = RoleConfig::from_env()?;
            let runner: Arc<dyn TaskRunner> = Arc::new(UnwiredTaskRunner);
            master::master_sort(
                store,
                runner,
                required_env("NAME")?,
                required_env("TAG")?,
                config.bucket,
                config.cluster_arn,
                config.task_arn,
                config.security_group,
                config.vpc_subnet,
            )
        }
        "worker-ftp" => {
            let client: Arc<dyn FtpClient> = Arc::new(UnwiredFtpClient);
            worker_ftp::worker_ftp(
                client,
                store,
                required_env("NAME")?,
                required_env("HOST")?,
                required_env("DIRECTORY")?,
                required_env("BUCKET")?,
                required_env("INPUT")?,
                required_env("OUTPUT")?,
            )
        }
        "worker-json" => worker_json::worker_json(
            store,
            required_env("NAME")?,
            required_env("ROWTAG")?,
            required_env("BUCKET")?,
            required_env("INPUT")?,
            required_env("OUTPUT")?,
        ),
        "worker-sort" => worker_sort::worker_sort(
            store,
            required_env("NAME")?,
            required_env("TAG")?,
            required_env("BUCKET")?,
            required_env("INPUT")?,
            required_env("OUTPUT")?,
        ),
        "lambda" => {
            let payload = required_env("LAMBDA_EVENT")?;
            let event: lambda_handlers::LambdaEvent = serde_json::from_str(&payload)
                .map_err(|e| PipelineError::MalformedPayload(format!("invalid LAMBDA_EVENT JSON: {e}")))?;
            lambda_handlers::handler(store, event)
        }
        other => Err(PipelineError::InvalidConfiguration(format!(
            "role '{other}' passed CLI validation but has no dispatch arm"
        ))),
    }
}

fn main() -> std::process::ExitCode {
    let validated = match pipeline_bootstrap::bootstrap_cli() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("CLI error: {e}");
            return std::process::ExitCode::from(ExitCode::UsageError.as_i32() as u8);
        }
    };

    init_tracing();
    tracing::info!(role = %validated.role, verbose = validated.verbose, "starting pipeline process");

    let store = Arc::new(InMemoryObjectStore::new());
    let result = run_role(&validated.role, store);

    if let Err(ref e) = result {
        tracing::error!(role = %validated.role, error = %e, "role failed");
    }

    result_to_exit_code(result)
}
