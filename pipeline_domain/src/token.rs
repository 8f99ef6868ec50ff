// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `Token` — the throttling handle issued by `AcquireToken` and returned by
//! `ReleaseToken`. Grounded in
//! `examples/original_source/binarian/common/throttling.py`.

use serde::{Deserialize, Serialize};

/// An opaque resource drawn from a throttling queue (an FTP host/directory
/// pair, a job slot, ...), serialized as JSON so it can ride inside
/// `Element` and be shipped across the `Serialize`/`Deserialize` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResource(pub serde_json::Value);

/// `{item, value}` pair: `item` is the resource drawn from the queue,
/// `value` is the input that acquired it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub item: TokenResource,
    pub value: String,
}

impl Token {
    pub fn new(item: TokenResource, value: impl Into<String>) -> Self {
        Self {
            item,
            value: value.into(),
        }
    }
}
