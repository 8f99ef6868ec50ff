// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The `Stage` contract and `AnyPipe`, the type-erased handle `Funnel::bind`
//! passes to each stage so the trait stays object-safe across both element
//! kinds.

use crate::element::{Element, ElementKind};
use crate::error::{PipelineError, PipelineResult};
use crate::metrics::{MetadataHandle, Metrics};
use crate::pipe::PipeHandle;

/// A pipe handle of either element kind. Stages unwrap the variant matching
/// their own declared `input_kind`/`output_kind`; `Funnel::bind` has already
/// checked those match before a stage ever sees one, so the `expect`s below
/// signal a genuine construction bug, not a reachable runtime condition.
#[derive(Clone)]
pub enum AnyPipe {
    Binary(PipeHandle<u8>),
    Item(PipeHandle<Element>),
}

impl AnyPipe {
    pub fn kind(&self) -> ElementKind {
        match self {
            AnyPipe::Binary(_) => ElementKind::Binary,
            AnyPipe::Item(_) => ElementKind::Item,
        }
    }

    pub fn as_binary(&self) -> &PipeHandle<u8> {
        match self {
            AnyPipe::Binary(p) => p,
            AnyPipe::Item(_) => panic!("expected a binary pipe, got an item pipe"),
        }
    }

    pub fn as_item(&self) -> &PipeHandle<Element> {
        match self {
            AnyPipe::Item(p) => p,
            AnyPipe::Binary(_) => panic!("expected an item pipe, got a binary pipe"),
        }
    }
}

/// A unit of work with declared input/output element kinds, bound once into
/// a funnel, then driven by `changed` (synchronous "push on append") and
/// `flush` (drain-and-finalize, called in declared order across the whole
/// funnel).
pub trait Stage {
    fn input_kind(&self) -> ElementKind;
    fn output_kind(&self) -> ElementKind;

    /// Registers `prev`/`next` and subscribes to `prev`'s callback if the
    /// stage reacts to new data inline. `Funnel::bind` performs the actual
    /// subscription (see `funnel.rs`) since a stage cannot cheaply hold a
    /// shared handle to itself from within its own `bind`; this method is
    /// still where a stage stores the pipes it will read/write.
    fn bind(&mut self, prev: AnyPipe, next: AnyPipe, metrics: Metrics, metadata: MetadataHandle);

    /// Invoked synchronously whenever `prev` receives new data. Default:
    /// stages that are flush-only (`QuickSort`, `MergeSort`, `WaitAll`, ...)
    /// do nothing here.
    fn changed(&mut self) {}

    /// Drains and finalizes. Called once per stage, in declared (upstream
    /// before downstream) order, by `Funnel::flush`.
    fn flush(&mut self);

    /// Declared length, when known without consuming (used by
    /// `XmlToJson`/`NDJsonMeasure`-style consumers that need to gate on
    /// upstream depth before pulling).
    fn length(&self) -> Option<usize> {
        None
    }
}

/// Checks `Sᵢ.output == Sᵢ₊₁.input` — invariant 2 in `spec.md` §8.
pub fn check_adjacent(upstream: ElementKind, downstream: ElementKind) -> PipelineResult<()> {
    if upstream == downstream {
        Ok(())
    } else {
        Err(PipelineError::IncompatibleStage(format!(
            "upstream stage produces {upstream} but downstream stage expects {downstream}"
        )))
    }
}
