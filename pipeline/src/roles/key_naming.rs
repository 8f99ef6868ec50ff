// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Storage-key derivation (§4.J/§6), grounded in `split_name` from
//! `examples/original_source/src/index.py`.
//!
//! The raw/json/sort prefixes each name a download under a digit-stripped,
//! extension-free subdirectory one level above the literal filename, so
//! e.g. `current24.xml.gz` and `current25.xml.gz` land under the same
//! `.../current/` directory rather than scattering one directory per run.

/// Splits the last path segment's extension(s) off, once.
fn strip_extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((base, _ext)) => base.to_string(),
        None => name.to_string(),
    }
}

/// Inserts a digit-stripped, double-extension-stripped copy of the last
/// path segment as a new directory immediately above it.
///
/// `"enwiki-20201120-stub-meta-current24.xml.gz"` becomes
/// `"enwiki/20201120/stub/meta/current/current24.xml.gz"`.
pub fn split_name(name: &str) -> String {
    let mut rows: Vec<String> = name.replace('-', "/").split('/').map(str::to_string).collect();
    let last = rows.last().cloned().unwrap_or_default();
    let digits_stripped: String = last.chars().filter(|c| !c.is_ascii_digit()).collect();
    let stem = strip_extension(&strip_extension(&digits_stripped));
    let insert_at = rows.len().saturating_sub(1);
    rows.insert(insert_at, stem);
    rows.join("/")
}

/// `raw/{split_name(name)}` — where `worker-ftp` lands a freshly downloaded
/// file.
pub fn raw_key(name: &str) -> String {
    format!("raw/{}", split_name(name))
}

/// `json/{split_name(stem)}.json` where `stem` strips the input filename's
/// two trailing extensions (e.g. `.xml.gz`) before naming, matching
/// `master_get`'s json-branch key (computed from the original filename, not
/// from the already-split raw key).
pub fn json_key_from_name(name: &str) -> String {
    let stem = strip_extension(&strip_extension(name));
    format!("json/{}.json", split_name(&stem))
}

/// `json/{split_name(name)}` — `master_sort`'s json-branch key, computed
/// directly from the already-single-extension json filename.
pub fn json_key_from_json_name(name: &str) -> String {
    format!("json/{}", split_name(name))
}

/// `sort/{split_name(name)}` — `master_sort`'s sort-branch key.
pub fn sort_key_from_json_name(name: &str) -> String {
    format!("sort/{}", split_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_name_inserts_a_digit_stripped_extension_free_subdirectory() {
        assert_eq!(
            split_name("enwiki-20201120-stub-meta-current24.xml.gz"),
            "enwiki/20201120/stub/meta/current/current24.xml.gz"
        );
    }

    #[test]
    fn raw_key_prefixes_the_split_name() {
        assert_eq!(
            raw_key("enwiki-20201120-stub-meta-current24.xml.gz"),
            "raw/enwiki/20201120/stub/meta/current/current24.xml.gz"
        );
    }

    #[test]
    fn json_key_from_name_strips_two_extensions_before_naming() {
        assert_eq!(
            json_key_from_name("enwiki-20201120-stub-meta-current24.xml.gz"),
            "json/enwiki/20201120/stub/meta/current/current24.json"
        );
    }

    #[test]
    fn master_sort_keys_match_the_literal_index_py_example() {
        let name = "enwiki-20201120-stub-meta-current24.json";
        assert_eq!(
            json_key_from_json_name(name),
            "json/enwiki/20201120/stub/meta/current/current24.json"
        );
        assert_eq!(
            sort_key_from_json_name(name),
            "sort/enwiki/20201120/stub/meta/current/current24.json"
        );
    }
}
