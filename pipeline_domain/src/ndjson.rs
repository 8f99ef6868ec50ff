// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `NDJsonIndexed` — `{key, data}` value object shared by the NDJSON framing
//! and sort-core stages.

use serde::{Deserialize, Serialize};

/// `data` is a complete line including its trailing `\n`; `key` is the sort
/// key extracted from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NdjsonIndexed {
    pub key: String,
    pub data: Vec<u8>,
}

impl NdjsonIndexed {
    pub fn new(key: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            data,
        }
    }
}

impl std::fmt::Display for NdjsonIndexed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.key, self.data.len())
    }
}
