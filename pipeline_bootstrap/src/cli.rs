// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling with security-first design.
//!
//! Every role this process can run (`master-get`, `master-sort`,
//! `worker-ftp`, `worker-json`, `worker-sort`, `lambda`) is selected by a
//! single value, mirroring the original's `TYPE` environment variable. The
//! CLI accepts it either as `--role` or, if omitted, falls back to reading
//! `TYPE` from the environment so a process launched exactly the way the
//! original ECS task definitions launched it keeps working unchanged.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. parse()                         │  clap, with a TYPE env fallback
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. validate()                      │  role name allow-list
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. ValidatedCli                    │  safe, validated role selection
//! └─────────────────────────────────────┘
//! ```

use clap::Parser;
use thiserror::Error;

const KNOWN_ROLES: &[&str] = &["master-get", "master-sort", "worker-ftp", "worker-json", "worker-sort", "lambda"];

/// Raw CLI shape, parsed by clap before validation.
#[derive(Debug, Parser)]
#[command(name = "pipeline", about = "Adaptive pipeline role entry point")]
pub struct Cli {
    /// Which role to run. Falls back to the `TYPE` environment variable
    /// when omitted, matching how the ECS task definitions and Lambda
    /// wrapper launch this binary.
    #[arg(long)]
    pub role: Option<String>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no role selected: pass --role or set the TYPE environment variable")]
    MissingRole,
    #[error("unknown role '{0}'; expected one of {KNOWN_ROLES:?}")]
    UnknownRole(String),
}

/// A role selection that has passed the allow-list check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCli {
    pub role: String,
    pub verbose: bool,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse argv, then fall back to `TYPE` and validate against the known
/// role list.
///
/// # Errors
///
/// Returns [`ParseError`] if no role was supplied by either means, or if
/// the supplied role isn't one this binary knows how to run.
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = parse_cli();
    validate_cli(cli)
}

fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    let role = cli
        .role
        .or_else(|| std::env::var("TYPE").ok())
        .ok_or(ParseError::MissingRole)?;

    if !KNOWN_ROLES.contains(&role.as_str()) {
        return Err(ParseError::UnknownRole(role));
    }

    Ok(ValidatedCli { role, verbose: cli.verbose })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_a_known_role() {
        let cli = Cli { role: Some("worker-ftp".into()), verbose: false };
        let validated = validate_cli(cli).unwrap();
        assert_eq!(validated.role, "worker-ftp");
    }

    #[test]
    fn rejects_an_unknown_role() {
        let cli = Cli { role: Some("not-a-role".into()), verbose: false };
        assert!(matches!(validate_cli(cli), Err(ParseError::UnknownRole(_))));
    }

    #[test]
    fn rejects_a_missing_role_when_type_env_is_unset() {
        // SAFETY: std::env::remove_var is unsafe in this edition because it
        // mutates process-global state; this test doesn't run concurrently
        // with anything else that reads TYPE.
        unsafe {
            std::env::remove_var("TYPE");
        }
        let cli = Cli { role: None, verbose: false };
        assert!(matches!(validate_cli(cli), Err(ParseError::MissingRole)));
    }
}
