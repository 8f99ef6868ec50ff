// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Role parameter loading: bucket name, security group, vpc subnet,
//! task/cluster ARNs, fetched from a key-value parameter store at startup
//! for the `master` role, with environment-variable overrides for local
//! runs and tests. Mirrors the teacher's `infrastructure::config` loading
//! shape, built on the same `config` crate.

pub mod rayon_config;

use config::{Config, Environment};
use pipeline_domain::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RoleConfig {
    pub bucket: String,
    #[serde(default)]
    pub security_group: String,
    #[serde(default)]
    pub vpc_subnet: String,
    #[serde(default)]
    pub cluster_arn: String,
    #[serde(default)]
    pub task_arn: String,
}

impl RoleConfig {
    /// Loads from environment variables (`BUCKET`, `SECURITY_GROUP`,
    /// `VPC_SUBNET`, `CLUSTER_ARN`, `TASK_ARN`), matching the env vars §6
    /// documents each role reading directly.
    pub fn from_env() -> PipelineResult<Self> {
        let settings = Config::builder()
            .add_source(Environment::default().try_parsing(true))
            .build()
            .map_err(|e| PipelineError::InvalidConfiguration(e.to_string()))?;
        settings
            .try_deserialize()
            .map_err(|e| PipelineError::InvalidConfiguration(e.to_string()))
    }
}

/// Environment-backed implementation of the `Parameters` port. Production
/// wiring against a real parameter store is out of scope (§1); this is the
/// local/dev/test implementation the interface exists to allow.
pub struct EnvParameters;

#[async_trait::async_trait]
impl pipeline_domain::ports::Parameters for EnvParameters {
    async fn value(&self, name: &str) -> PipelineResult<String> {
        std::env::var(name).map_err(|_| {
            PipelineError::InvalidConfiguration(format!("parameter '{name}' not set in environment"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::ports::Parameters;

    #[tokio::test]
    async fn env_parameters_reads_process_environment() {
        std::env::set_var("TEST_PARAM_KEY", "value");
        let params = EnvParameters;
        assert_eq!(params.value("TEST_PARAM_KEY").await.unwrap(), "value");
        std::env::remove_var("TEST_PARAM_KEY");
    }
}
