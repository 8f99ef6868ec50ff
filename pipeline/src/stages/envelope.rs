// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Opaque envelope stages (§4.E, worker-sort's Lambda round trip), grounded
//! in `examples/original_source/binarian/common/pickle.py`. The Python
//! original base64-encodes a `dill` pickle of the raw item so it survives a
//! Lambda invocation's JSON payload; `dill` has no Rust equivalent, so this
//! serializes through `serde_json` instead and base64-encodes that, giving
//! the same "opaque string-safe envelope" property without a bespoke binary
//! format.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use pipeline_domain::element::{Element, ElementKind};
use pipeline_domain::metrics::{MetadataHandle, Metrics};
use pipeline_domain::pipe::{Pipe, PipeHandle};
use pipeline_domain::stage::{AnyPipe, Stage};

/// Wraps every item as `Element::Text(base64(json(item)))`.
pub struct Serialize {
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
}

impl Default for Serialize {
    fn default() -> Self {
        Self { prev: None, next: None }
    }
}

impl Stage for Serialize {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, _metrics: Metrics, _metadata: MetadataHandle) {
        self.prev = Some(prev.as_item().clone());
        self.next = Some(next.as_item().clone());
    }
    fn changed(&mut self) {
        let prev = self.prev.as_ref().unwrap();
        let next = self.next.as_ref().unwrap();
        while let Some(items) = Pipe::read(prev, 1) {
            let encoded: Vec<Element> = items
                .iter()
                .map(|item| {
                    let json = serde_json::to_vec(item).expect("element is always serializable");
                    Element::Text(BASE64.encode(json))
                })
                .collect();
            Pipe::append(next, encoded);
        }
    }
    fn flush(&mut self) {
        self.changed();
    }
}

/// Inverse of `Serialize`: unwraps `Element::Text(base64(json(item)))` back
/// into the original item. A malformed envelope is fatal (it indicates the
/// remote side sent something this pipeline never produced).
pub struct Deserialize {
    prev: Option<PipeHandle<Element>>,
    next: Option<PipeHandle<Element>>,
}

impl Default for Deserialize {
    fn default() -> Self {
        Self { prev: None, next: None }
    }
}

impl Stage for Deserialize {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Item
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, _metrics: Metrics, _metadata: MetadataHandle) {
        self.prev = Some(prev.as_item().clone());
        self.next = Some(next.as_item().clone());
    }
    fn changed(&mut self) {
        let prev = self.prev.as_ref().unwrap();
        let next = self.next.as_ref().unwrap();
        while let Some(items) = Pipe::read(prev, 1) {
            let decoded: Vec<Element> = items
                .iter()
                .map(|item| {
                    let text = item.as_text().expect("Deserialize expects a base64 envelope");
                    let json = BASE64.decode(text).expect("malformed base64 envelope");
                    serde_json::from_slice(&json).expect("malformed JSON envelope")
                })
                .collect();
            Pipe::append(next, decoded);
        }
    }
    fn flush(&mut self) {
        self.changed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::pipe::new_item_pipe;

    #[test]
    fn serialize_then_deserialize_round_trips_an_item() {
        let prev = new_item_pipe();
        let mid = new_item_pipe();
        let mut ser = Serialize::default();
        ser.bind(
            AnyPipe::Item(prev.clone()),
            AnyPipe::Item(mid.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(&prev, vec![Element::Text("payload".into())]);
        let envelopes = Pipe::read(&mid, -1).unwrap();
        assert!(matches!(&envelopes[0], Element::Text(_)));

        let prev2 = new_item_pipe();
        let next2 = new_item_pipe();
        Pipe::append(&prev2, envelopes);
        let mut de = Deserialize::default();
        de.bind(
            AnyPipe::Item(prev2.clone()),
            AnyPipe::Item(next2.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        de.flush();
        let out = Pipe::read(&next2, -1).unwrap();
        assert_eq!(out[0].as_text(), Some("payload"));
    }
}
