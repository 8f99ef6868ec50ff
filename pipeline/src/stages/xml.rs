// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Streaming XML->JSON reader (§4.F), grounded in
//! `examples/original_source/binarian/formats.py` and
//! `examples/original_source/binarian/formats/convert.py`.
//!
//! The Python original drives `lxml.etree.iterparse` directly over the
//! upstream pipe (treated as a file-like object) and evicts already-closed
//! siblings from the DOM it otherwise retains (`del node.getparent()[0]`) to
//! keep memory bounded. `quick-xml` is a pure pull parser with no retained
//! tree at all, so that eviction has no counterpart here -- there's simply
//! nothing to evict. The row-assembly state machine (promote a leaf
//! placeholder to an object on its first child; coalesce a repeated sibling
//! tag into a list) is ported as-is.

use std::io::{BufReader, Read};
use std::rc::Rc;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde_json::{Map, Value};

use pipeline_domain::element::ElementKind;
use pipeline_domain::metrics::{MetadataHandle, Metrics};
use pipeline_domain::pipe::{Pipe, PipeHandle};
use pipeline_domain::stage::{AnyPipe, Stage};

struct PipeReader {
    pipe: PipeHandle<u8>,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match Pipe::read(&self.pipe, buf.len() as isize) {
            Some(chunk) if !chunk.is_empty() => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                Ok(n)
            }
            _ => Ok(0),
        }
    }
}

enum Frame {
    Row(Map<String, Value>),
    Pending(String),
}

/// One row-tag-bounded parse: accumulates a JSON object per `rowtag`
/// element, emitting its serialized bytes (plus a trailing `\n`) each time
/// one closes.
struct XmlReader {
    rowtag: String,
    coerce: Rc<dyn Fn(Value) -> Value>,
    reader: Reader<BufReader<PipeReader>>,
    buf: Vec<u8>,
    path: Vec<Frame>,
    previous: Vec<String>,
}

impl XmlReader {
    fn new(rowtag: impl Into<String>, coerce: Rc<dyn Fn(Value) -> Value>, prev: PipeHandle<u8>) -> Self {
        let mut reader = Reader::from_reader(BufReader::new(PipeReader { pipe: prev }));
        reader.config_mut().trim_text(true);
        Self {
            rowtag: rowtag.into(),
            coerce,
            reader,
            buf: Vec::new(),
            path: Vec::new(),
            previous: Vec::new(),
        }
    }

    fn local_name(bytes: &[u8]) -> String {
        let name = std::str::from_utf8(bytes).unwrap_or("");
        name.rsplit(':').next().unwrap_or(name).to_string()
    }

    fn handle_start(&mut self, tag: &str) {
        if tag == self.rowtag {
            self.path.clear();
            self.previous.clear();
            self.path.push(Frame::Row(Map::new()));
            return;
        }
        if self.path.is_empty() {
            return;
        }
        if let Some(Frame::Pending(_)) = self.path.last() {
            let top = self.path.pop().unwrap();
            if let Frame::Pending(_) = top {
                self.path.push(Frame::Row(Map::new()));
            }
        }
        self.previous.push(tag.to_string());
        self.path.push(Frame::Pending(String::new()));
    }

    fn handle_text(&mut self, text: &str) {
        if let Some(Frame::Pending(buf)) = self.path.last_mut() {
            buf.push_str(text);
        }
    }

    fn handle_end(&mut self, tag: &str) -> Option<Vec<u8>> {
        if tag == self.rowtag && !self.path.is_empty() {
            let root = self.path.drain(..).next().unwrap();
            self.previous.clear();
            let value = match root {
                Frame::Row(map) => Value::Object(map),
                Frame::Pending(text) => Value::String(text),
            };
            let coerced = (self.coerce)(value);
            let mut data = serde_json::to_vec(&coerced).expect("row is always serializable");
            data.push(b'\n');
            return Some(data);
        }
        if self.path.is_empty() {
            return None;
        }
        let finished = self.path.pop().unwrap();
        let Some(key) = self.previous.pop() else {
            return None;
        };
        let value = match finished {
            Frame::Pending(text) if text.is_empty() => Value::Null,
            Frame::Pending(text) => Value::String(text),
            Frame::Row(map) => Value::Object(map),
        };
        if let Some(Frame::Row(parent)) = self.path.last_mut() {
            match parent.remove(&key) {
                Some(Value::Array(mut items)) => {
                    items.push(value);
                    parent.insert(key, Value::Array(items));
                }
                Some(existing) => {
                    parent.insert(key, Value::Array(vec![existing, value]));
                }
                None => {
                    parent.insert(key, value);
                }
            }
        }
        None
    }

    /// Reads events until either a complete row is ready or `condition`
    /// returns false (back-pressure gate) or the source is exhausted.
    fn tick(&mut self, condition: impl Fn() -> bool) -> Option<Vec<u8>> {
        while condition() {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(_) => return None,
            };
            match event {
                Event::Eof => return None,
                Event::Start(e) => {
                    let tag = Self::local_name(e.name().as_ref());
                    self.handle_start(&tag);
                }
                Event::End(e) => {
                    let tag = Self::local_name(e.name().as_ref());
                    if let Some(data) = self.handle_end(&tag) {
                        return Some(data);
                    }
                }
                Event::Empty(e) => {
                    let tag = Self::local_name(e.name().as_ref());
                    self.handle_start(&tag);
                    if let Some(data) = self.handle_end(&tag) {
                        return Some(data);
                    }
                }
                Event::Text(t) => {
                    if let Ok(text) = t.unescape() {
                        self.handle_text(&text);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Streams an XML byte source, re-emitting each `rowtag` element as one
/// NDJSON line. `coerce` (default: identity) supplements the Python
/// original's bare `json.dumps`, letting a role post-process each row's
/// parsed value (e.g. numeric coercion) before it's re-serialized.
pub struct XmlToJson {
    rowtag: String,
    coerce: Rc<dyn Fn(Value) -> Value>,
    chunksize: usize,
    windowsize: usize,
    reader: Option<XmlReader>,
    prev: Option<PipeHandle<u8>>,
    next: Option<PipeHandle<u8>>,
}

impl XmlToJson {
    pub fn new(rowtag: impl Into<String>) -> Self {
        Self::with_coerce(rowtag, |v| v)
    }

    pub fn with_coerce(rowtag: impl Into<String>, coerce: impl Fn(Value) -> Value + 'static) -> Self {
        Self {
            rowtag: rowtag.into(),
            coerce: Rc::new(coerce),
            chunksize: 32 * 1024 * 1024,
            windowsize: 1024 * 1024,
            reader: None,
            prev: None,
            next: None,
        }
    }

    fn process(&mut self, chunksize: usize, windowsize: usize) {
        let prev = self.prev.as_ref().unwrap().clone();
        let next = self.next.as_ref().unwrap().clone();
        if self.reader.is_none() && Pipe::length_of(&prev) > chunksize {
            self.reader = Some(XmlReader::new(self.rowtag.clone(), Rc::clone(&self.coerce), prev.clone()));
        }
        let Some(reader) = self.reader.as_mut() else {
            return;
        };
        if Pipe::length_of(&prev) <= chunksize {
            return;
        }
        while let Some(data) = reader.tick(|| Pipe::length_of(&prev) > windowsize) {
            Pipe::append(&next, data);
        }
    }
}

impl Stage for XmlToJson {
    fn input_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn output_kind(&self) -> ElementKind {
        ElementKind::Binary
    }
    fn length(&self) -> Option<usize> {
        None
    }
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, _metrics: Metrics, _metadata: MetadataHandle) {
        self.prev = Some(prev.as_binary().clone());
        self.next = Some(next.as_binary().clone());
    }
    fn changed(&mut self) {
        self.process(self.chunksize, self.windowsize);
    }
    fn flush(&mut self) {
        self.process(0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::pipe::new_byte_pipe;

    #[test]
    fn flattens_rows_with_repeated_sibling_tags_into_a_list() {
        let prev = new_byte_pipe();
        let next = new_byte_pipe();
        let mut stage = XmlToJson::new("row");
        stage.bind(
            AnyPipe::Binary(prev.clone()),
            AnyPipe::Binary(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        let xml = b"<root><row><id>1</id><tag>a</tag><tag>b</tag></row></root>".to_vec();
        Pipe::append(&prev, xml);
        stage.flush();
        let out = Pipe::read(&next, -1).unwrap();
        let text = String::from_utf8(out).unwrap();
        let value: Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["id"], Value::String("1".into()));
        assert_eq!(value["tag"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn single_occurrence_fields_stay_scalar() {
        let prev = new_byte_pipe();
        let next = new_byte_pipe();
        let mut stage = XmlToJson::new("row");
        stage.bind(
            AnyPipe::Binary(prev.clone()),
            AnyPipe::Binary(next.clone()),
            Metrics::new("t"),
            pipeline_domain::metrics::Metadata::new(),
        );
        Pipe::append(&prev, b"<root><row><name>only</name></row></root>".to_vec());
        stage.flush();
        let out = Pipe::read(&next, -1).unwrap();
        let text = String::from_utf8(out).unwrap();
        let value: Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["name"], Value::String("only".into()));
    }
}
