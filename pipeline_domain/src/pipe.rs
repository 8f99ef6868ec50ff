// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `Pipe<T>` — a buffered FIFO with a single synchronous subscriber.
//!
//! Two element kinds flow through the engine: raw bytes (`Pipe<u8>`) and
//! typed items (`Pipe<Element>`). Both share this one implementation; only
//! `find`/`rfind` (delimiter search used by the NDJSON framing stages) are
//! specific to the byte shape.
//!
//! Pipes are always handed around as `Rc<RefCell<Pipe<T>>>` (aliased as
//! [`PipeHandle`]) rather than by value. `append`/`read` are associated
//! functions taking the handle rather than `&mut self` methods: firing the
//! subscriber from inside `append` must first release the borrow taken to
//! mutate `data`, or a stage that reads from the very pipe that just invoked
//! its callback would double-borrow the same `RefCell` and panic. This is
//! the concrete answer to the "re-entrant callbacks" note — reads performed
//! by a callback are safe exactly because the mutation that triggered it has
//! already completed and released its borrow.

use std::cell::RefCell;
use std::rc::Rc;

/// Bytes compact once the consumed head reaches 1 MiB.
pub const BYTE_THRESHOLD: usize = 1 << 20;
/// Items are coarser-grained; compaction kicks in much sooner. The teacher's
/// own `DictPipe`/`BinaryPipe` asymmetry (64 vs 1 MiB) is preserved rather
/// than unified, per Design Notes.
pub const ITEM_THRESHOLD: usize = 64;

pub type PipeHandle<T> = Rc<RefCell<Pipe<T>>>;

pub struct Pipe<T> {
    data: Vec<T>,
    offset: usize,
    threshold: usize,
    callback: Option<Box<dyn FnMut()>>,
}

impl<T> Pipe<T> {
    pub fn with_threshold(threshold: usize) -> PipeHandle<T> {
        Rc::new(RefCell::new(Pipe {
            data: Vec::new(),
            offset: 0,
            threshold,
            callback: None,
        }))
    }

    /// Bytes remaining to be read: `len(data) - offset`.
    pub fn length(&self) -> usize {
        self.data.len() - self.offset
    }

    fn compact_if_needed(&mut self) {
        if self.offset >= self.threshold {
            self.data.drain(0..self.offset);
            self.offset = 0;
        }
    }
}

impl<T: Clone> Pipe<T> {
    /// Registers the sole downstream subscriber. A second call replaces the
    /// first: each pipe carries exactly one callback, matching the single-
    /// consumer ownership model in the data model section.
    pub fn subscribe(handle: &PipeHandle<T>, callback: impl FnMut() + 'static) {
        handle.borrow_mut().callback = Some(Box::new(callback));
    }

    /// Appends `items` then synchronously invokes the subscriber, if any.
    /// Re-entrant `append`/`read` calls from inside the callback (including
    /// on this same pipe) are supported: the mutating borrow is released
    /// before the callback runs.
    pub fn append(handle: &PipeHandle<T>, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        {
            let mut p = handle.borrow_mut();
            p.data.extend(items);
        }
        let cb = handle.borrow_mut().callback.take();
        if let Some(mut cb) = cb {
            cb();
            handle.borrow_mut().callback = Some(cb);
        }
    }

    /// `size < 0` reads everything available. Never blocks; returns `None`
    /// when nothing is available (rather than an empty vec, so callers can
    /// tell "nothing yet" apart from "an empty batch").
    pub fn read(handle: &PipeHandle<T>, size: isize) -> Option<Vec<T>> {
        let mut p = handle.borrow_mut();
        let available = p.length();
        if available == 0 {
            return None;
        }
        let take = if size < 0 {
            available
        } else {
            (size as usize).min(available)
        };
        if take == 0 {
            return None;
        }
        let start = p.offset;
        let end = start + take;
        let result = p.data[start..end].to_vec();
        p.offset = end;
        p.compact_if_needed();
        Some(result)
    }

    pub fn length_of(handle: &PipeHandle<T>) -> usize {
        handle.borrow().length()
    }
}

impl Pipe<u8> {
    /// Index of the first occurrence of `needle` relative to the current
    /// head, or `-1` if absent.
    pub fn find(handle: &PipeHandle<u8>, needle: u8) -> isize {
        let p = handle.borrow();
        match p.data[p.offset..].iter().position(|&b| b == needle) {
            Some(i) => i as isize,
            None => -1,
        }
    }

    /// Index of the last occurrence of `needle` relative to the current
    /// head, or `-1` if absent.
    pub fn rfind(handle: &PipeHandle<u8>, needle: u8) -> isize {
        let p = handle.borrow();
        match p.data[p.offset..].iter().rposition(|&b| b == needle) {
            Some(i) => i as isize,
            None => -1,
        }
    }
}

pub fn new_byte_pipe() -> PipeHandle<u8> {
    Pipe::with_threshold(BYTE_THRESHOLD)
}

pub fn new_item_pipe<T>() -> PipeHandle<T> {
    Pipe::with_threshold(ITEM_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_roundtrip() {
        let pipe = new_byte_pipe();
        Pipe::append(&pipe, b"hello".to_vec());
        Pipe::append(&pipe, b" world".to_vec());
        assert_eq!(Pipe::length_of(&pipe), 11);
        let all = Pipe::read(&pipe, -1).unwrap();
        assert_eq!(all, b"hello world");
        assert_eq!(Pipe::length_of(&pipe), 0);
        assert!(Pipe::read(&pipe, -1).is_none());
    }

    #[test]
    fn compaction_resets_offset_and_preserves_length() {
        let pipe = Pipe::<u8>::with_threshold(4);
        Pipe::append(&pipe, vec![1, 2, 3, 4, 5, 6]);
        let _ = Pipe::read(&pipe, 4).unwrap();
        assert_eq!(pipe.borrow().offset, 0);
        assert_eq!(Pipe::length_of(&pipe), 2);
    }

    #[test]
    fn find_and_rfind_are_head_relative() {
        let pipe = new_byte_pipe();
        Pipe::append(&pipe, b"aa\nbb\ncc".to_vec());
        let _ = Pipe::read(&pipe, 3); // consume "aa\n"
        assert_eq!(Pipe::find(&pipe, b'\n'), 2);
        assert_eq!(Pipe::rfind(&pipe, b'\n'), 2);
        assert_eq!(Pipe::find(&pipe, b'z'), -1);
    }

    #[test]
    fn synchronous_callback_fires_on_every_append() {
        let pipe = new_byte_pipe();
        let seen = Rc::new(RefCell::new(0usize));
        let seen_cb = Rc::clone(&seen);
        Pipe::subscribe(&pipe, move || {
            *seen_cb.borrow_mut() += 1;
        });
        Pipe::append(&pipe, vec![1]);
        Pipe::append(&pipe, vec![2]);
        assert_eq!(*seen.borrow(), 2);
    }

    #[test]
    fn callback_may_reentrantly_read_the_firing_pipe() {
        let pipe = new_byte_pipe();
        let drained = Rc::new(RefCell::new(Vec::new()));
        let drained_cb = Rc::clone(&drained);
        let pipe_cb = Rc::clone(&pipe);
        Pipe::subscribe(&pipe, move || {
            if let Some(chunk) = Pipe::read(&pipe_cb, -1) {
                drained_cb.borrow_mut().extend(chunk);
            }
        });
        Pipe::append(&pipe, vec![9, 8, 7]);
        assert_eq!(*drained.borrow(), vec![9, 8, 7]);
    }
}
