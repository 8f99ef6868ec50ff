// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Object-store value objects: `S3Object`, `S3Prefix`, `S3ObjectRange`.
//!
//! Grounded in `examples/original_source/binarian/amazon/s3.py`. The Python
//! original duck-types a "whole object or range" via `hasattr(target,
//! "start")`; per Design Notes §9 this becomes an explicit variant type here
//! (`S3Target`) so `S3Download` can `match` instead of probing attributes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Prefix {
    pub bucket: String,
    pub prefix: String,
}

impl S3Prefix {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }
}

/// A whole object, lazily measured. `total` is `None` until a HEAD (via the
/// object-store port) populates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Object {
    pub bucket: String,
    pub key: String,
    pub total: Option<u64>,
}

/// An inclusive byte range `[start, end]` of a known-total object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3ObjectRange {
    pub bucket: String,
    pub key: String,
    pub total: u64,
    pub start: u64,
    pub end: u64,
}

/// Either a whole object or a sub-range of one, used wherever the original
/// duck-typed between the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum S3Target {
    Whole(S3Object),
    Range(S3ObjectRange),
}

impl S3Object {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            total: None,
        }
    }

    pub fn with_total(bucket: impl Into<String>, key: impl Into<String>, total: u64) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            total: Some(total),
        }
    }

    pub fn ensure_measured(&self) -> u64 {
        self.total.expect("S3Object must be measured via head() before ranging")
    }

    /// One inclusive range `[start, start+size).min(total)-1]`.
    pub fn range(&self, start: u64, size: u64) -> S3ObjectRange {
        let total = self.ensure_measured();
        let end = (start + size).min(total).saturating_sub(1);
        S3ObjectRange {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            total,
            start,
            end,
        }
    }

    /// Contiguous inclusive ranges of at most `size` bytes covering
    /// `[start, end)`. Mirrors `S3Object.build` in the original: stepping by
    /// `size` from `start` to `end` exclusive (`end` is one-past-the-last
    /// byte to cover, not itself a valid offset).
    fn build(&self, size: u64, start: u64, end: u64) -> Vec<S3ObjectRange> {
        let total = self.ensure_measured();
        let mut ranges = Vec::new();
        let mut offset = start;
        while offset < end {
            let range_end = (offset + size).min(end).saturating_sub(1);
            ranges.push(S3ObjectRange {
                bucket: self.bucket.clone(),
                key: self.key.clone(),
                total,
                start: offset,
                end: range_end,
            });
            offset += size;
        }
        ranges
    }

    /// `[0, total)` split into ranges of at most `size` bytes.
    pub fn split(&self, size: u64) -> Vec<S3ObjectRange> {
        let total = self.ensure_measured();
        self.build(size, 0, total)
    }

    /// Supplemented from the original: split an arbitrary sub-interval
    /// `[start, end)` rather than the whole object.
    pub fn split_between(&self, size: u64, start: u64, end: u64) -> Vec<S3ObjectRange> {
        self.build(size, start, end)
    }

    pub fn between(&self, start: u64, end: u64) -> S3ObjectRange {
        let total = self.ensure_measured();
        S3ObjectRange {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            total,
            start,
            end,
        }
    }
}

impl S3ObjectRange {
    pub fn between(&self, start: u64, end: u64) -> S3ObjectRange {
        S3ObjectRange {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            total: self.total,
            start,
            end,
        }
    }

    pub fn len(&self) -> u64 {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn is_last(&self) -> bool {
        self.end == self.total.saturating_sub(1)
    }
}

impl std::fmt::Display for S3Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

impl std::fmt::Display for S3ObjectRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "s3://{}/{} [{}..={}] of {}",
            self.bucket, self.key, self.start, self.end, self.total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_covers_whole_object_in_contiguous_ranges() {
        let obj = S3Object::with_total("b", "k", 25);
        let ranges = obj.split(10);
        assert_eq!(ranges.len(), 3);
        assert_eq!((ranges[0].start, ranges[0].end), (0, 9));
        assert_eq!((ranges[1].start, ranges[1].end), (10, 19));
        assert_eq!((ranges[2].start, ranges[2].end), (20, 24));
    }

    #[test]
    fn split_between_covers_an_arbitrary_subinterval() {
        let obj = S3Object::with_total("b", "k", 100);
        let ranges = obj.split_between(10, 5, 25);
        assert_eq!(ranges.len(), 2);
        assert_eq!((ranges[0].start, ranges[0].end), (5, 14));
        assert_eq!((ranges[1].start, ranges[1].end), (15, 24));
    }
}
