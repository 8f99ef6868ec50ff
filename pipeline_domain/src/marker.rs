// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `DataMarkerCollection` — `offset -> sort-key` samples encoded as a
//! storage-key query string, produced by `DataMarker`/`MinMax` and consumed
//! by `MergeGroup`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMarker {
    pub offset: u64,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMarkerCollection {
    pub markers: Vec<DataMarker>,
}

impl DataMarkerCollection {
    pub fn new(markers: Vec<DataMarker>) -> Self {
        Self { markers }
    }

    pub fn push(&mut self, offset: u64, key: impl Into<String>) {
        self.markers.push(DataMarker {
            offset,
            key: key.into(),
        });
    }

    /// Canonical `off=key&off=key&...` form encoded into an object's storage
    /// key, e.g. `sort.tmp/0000?0=1&10=1&20=3&30=4&50=5`.
    pub fn queryable(&self) -> String {
        self.markers
            .iter()
            .map(|m| format!("{}={}", m.offset, m.key))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Parses the query-string suffix of an object key back into markers.
    /// Malformed entries are skipped rather than treated as fatal: a shard
    /// missing its marker suffix degrades to "no known samples", not a
    /// pipeline abort.
    pub fn parse(query: &str) -> Self {
        let markers = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| {
                let (offset, key) = pair.split_once('=')?;
                let offset: u64 = offset.parse().ok()?;
                Some(DataMarker {
                    offset,
                    key: key.to_string(),
                })
            })
            .collect();
        Self { markers }
    }

    pub fn first_key(&self) -> Option<&str> {
        self.markers.first().map(|m| m.key.as_str())
    }

    pub fn last_key(&self) -> Option<&str> {
        self.markers.last().map(|m| m.key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_its_canonical_form() {
        let mut collection = DataMarkerCollection::default();
        collection.push(0, "1");
        collection.push(10, "1");
        collection.push(20, "3");
        collection.push(30, "4");
        collection.push(50, "5");
        let encoded = collection.queryable();
        assert_eq!(encoded, "0=1&10=1&20=3&30=4&50=5");
        assert_eq!(DataMarkerCollection::parse(&encoded), collection);
    }
}
