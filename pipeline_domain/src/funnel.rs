// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `Funnel` — an ordered stage list splicing pipes end to end.
//!
//! Grounded in `examples/original_source/binarian/engine/funnel.py`. One
//! design decision departs from a literal port: in the Python original each
//! stage's own `bind` calls `prev.subscribe(self.changed)`. Rust's trait
//! objects make a stage handing a closure over *itself* from inside its own
//! `&mut self` method awkward without extra ceremony, so `Funnel::bind`
//! performs the subscription centrally instead, using the `Rc<RefCell<dyn
//! Stage>>` handle it already holds. The externally observable behavior is
//! identical: every `append` on a pipe synchronously invokes its sole
//! downstream stage's `changed`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::element::{Element, ElementKind};
use crate::error::PipelineResult;
use crate::metrics::{MetadataHandle, Metrics};
use crate::pipe::{new_byte_pipe, new_item_pipe, Pipe};
use crate::stage::{check_adjacent, AnyPipe, Stage};

pub type StageHandle = Rc<RefCell<dyn Stage>>;

pub fn stage_handle(stage: impl Stage + 'static) -> StageHandle {
    Rc::new(RefCell::new(stage))
}

fn default_pipe(kind: ElementKind) -> AnyPipe {
    match kind {
        ElementKind::Binary => AnyPipe::Binary(new_byte_pipe()),
        ElementKind::Item => AnyPipe::Item(new_item_pipe()),
    }
}

fn subscribe_any(pipe: &AnyPipe, callback: impl FnMut() + 'static) {
    match pipe {
        AnyPipe::Binary(p) => Pipe::subscribe(p, callback),
        AnyPipe::Item(p) => Pipe::subscribe(p, callback),
    }
}

pub struct Funnel {
    stages: Vec<StageHandle>,
    first: Option<AnyPipe>,
    last: Option<AnyPipe>,
}

impl Funnel {
    pub fn new(stages: Vec<StageHandle>) -> Self {
        Self {
            stages,
            first: None,
            last: None,
        }
    }

    /// Walks the stage list, allocating each intermediate pipe to match the
    /// next stage's declared input, binding the stage, then subscribing it
    /// to fire on every upstream append. `prev` seeds the head pipe; when
    /// absent, a fresh pipe matching the first stage's input kind is
    /// created (mirrors the Python default of a bare `DictPipe()`).
    pub fn bind(
        &mut self,
        metrics: Metrics,
        metadata: MetadataHandle,
        prev: Option<AnyPipe>,
    ) -> PipelineResult<()> {
        let mut prev = match prev {
            Some(p) => p,
            None => {
                let first_kind = self
                    .stages
                    .first()
                    .map(|s| s.borrow().input_kind())
                    .unwrap_or(ElementKind::Item);
                default_pipe(first_kind)
            }
        };
        self.first = Some(prev.clone());

        for stage_rc in &self.stages {
            let (in_kind, out_kind) = {
                let s = stage_rc.borrow();
                (s.input_kind(), s.output_kind())
            };
            check_adjacent(prev.kind(), in_kind)?;

            let next = default_pipe(out_kind);
            {
                let mut s = stage_rc.borrow_mut();
                s.bind(prev.clone(), next.clone(), metrics.clone(), metadata.clone());
            }

            let stage_for_cb = Rc::clone(stage_rc);
            subscribe_any(&prev, move || {
                stage_for_cb.borrow_mut().changed();
            });

            prev = next;
        }

        self.last = Some(prev);
        Ok(())
    }

    pub fn flush(&self) {
        for stage in &self.stages {
            stage.borrow_mut().flush();
        }
    }

    pub fn subscribe(&self, callback: impl FnMut() + 'static) {
        subscribe_any(self.last.as_ref().expect("funnel not bound"), callback);
    }

    pub fn first(&self) -> &AnyPipe {
        self.first.as_ref().expect("funnel not bound")
    }

    pub fn last(&self) -> &AnyPipe {
        self.last.as_ref().expect("funnel not bound")
    }

    pub fn append_bytes(&self, chunk: Vec<u8>) {
        match self.first() {
            AnyPipe::Binary(p) => Pipe::append(p, chunk),
            AnyPipe::Item(_) => panic!("funnel's head pipe is an item pipe, not binary"),
        }
    }

    pub fn append_items(&self, items: Vec<Element>) {
        match self.first() {
            AnyPipe::Item(p) => Pipe::append(p, items),
            AnyPipe::Binary(_) => panic!("funnel's head pipe is binary, not an item pipe"),
        }
    }

    pub fn read_bytes(&self, size: isize) -> Option<Vec<u8>> {
        match self.last() {
            AnyPipe::Binary(p) => Pipe::read(p, size),
            AnyPipe::Item(_) => panic!("funnel's tail pipe is an item pipe, not binary"),
        }
    }

    pub fn read_items(&self, size: isize) -> Option<Vec<Element>> {
        match self.last() {
            AnyPipe::Item(p) => Pipe::read(p, size),
            AnyPipe::Binary(_) => panic!("funnel's tail pipe is binary, not an item pipe"),
        }
    }
}
