// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `Element` — the tagged sum type flowing through item pipes.
//!
//! The Python original ships untyped dicts/lists/objects through `DictPipe`;
//! per Design Notes §9 ("dynamically typed stage I/O -> tagged element
//! types") this becomes one compile-time enum so every stage's `changed`
//! can `match` instead of duck-type.

use serde::{Deserialize, Serialize};

use crate::marker::DataMarkerCollection;
use crate::merge_group::MergeGroupCollection;
use crate::ndjson::NdjsonIndexed;
use crate::s3::{S3Object, S3ObjectRange, S3Prefix};
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Binary,
    Item,
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementKind::Binary => write!(f, "binary"),
            ElementKind::Item => write!(f, "item"),
        }
    }
}

/// One item traveling through an item pipe. Variants correspond 1:1 to the
/// duck-typed shapes the Python original passes around: a parsed JSON
/// value (rows out of `XmlToJson`/ad-hoc), an indexed NDJSON line, object
/// store references, a throttling token, and the two sort-core side-channel
/// collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Element {
    Json(serde_json::Value),
    Line(NdjsonIndexed),
    S3Object(S3Object),
    S3Range(S3ObjectRange),
    S3Prefix(S3Prefix),
    Token(Token),
    Marker(DataMarkerCollection),
    MergeGroup(MergeGroupCollection),
    Text(String),
}

impl Element {
    pub fn as_line(&self) -> Option<&NdjsonIndexed> {
        match self {
            Element::Line(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_s3_object(&self) -> Option<&S3Object> {
        match self {
            Element::S3Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_s3_range(&self) -> Option<&S3ObjectRange> {
        match self {
            Element::S3Range(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_token(&self) -> Option<&Token> {
        match self {
            Element::Token(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Element::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_marker(&self) -> Option<&DataMarkerCollection> {
        match self {
            Element::Marker(m) => Some(m),
            _ => None,
        }
    }
}
