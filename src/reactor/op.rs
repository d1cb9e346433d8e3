use std::{cell::RefCell, io, task::Poll};

use io_uring::squeue;
use slab::Slab;

use super::uring::RingInner;

#[derive(Debug)]
pub(crate) enum OpState {
    Idle,
    InFlight(usize),
    Done(i32),
}

/// A single operation submitted to a [super::uring::Ring].
///
/// The operation is submitted on the first call to [RingOp::submit_or_poll];
/// later calls check whether the kernel has posted a completion for it.
pub(crate) struct RingOp<'a, T> {
    state: OpState,
    ring: &'a RefCell<RingInner<T>>,
}

impl From<&OpState> for Poll<io::Result<i32>> {
    fn from(value: &OpState) -> Self {
        match value {
            OpState::Idle | OpState::InFlight(_) => Poll::Pending,
            OpState::Done(result) => Poll::Ready(if *result < 0 {
                Err(io::Error::from_raw_os_error(result.abs()))
            } else {
                Ok(*result)
            }),
        }
    }
}

impl<'a, T> RingOp<'a, T> {
    pub(super) fn new(ring: &'a RefCell<RingInner<T>>) -> Self {
        Self {
            state: OpState::Idle,
            ring,
        }
    }

    /// Submit the entry produced by `f` if this op hasn't been submitted yet,
    /// otherwise return its result once available. `f` is only called once.
    pub fn submit_or_poll(
        &mut self,
        f: impl FnOnce() -> (squeue::Entry, T),
    ) -> Poll<io::Result<i32>> {
        match self.state {
            OpState::Idle => {
                let (entry, obj) = f();
                match self.ring.borrow_mut().submit(entry, obj) {
                    Ok(slot) => self.state = OpState::InFlight(slot),
                    Err(e) => return Poll::Ready(Err(e)),
                }
            }
            OpState::InFlight(slot) => {
                let mut ring = self.ring.borrow_mut();
                if let Some(res) = ring.results.get(slot) {
                    self.state = OpState::Done(res);
                    ring.results.release(slot);
                }
            }
            OpState::Done(_) => {}
        }

        (&self.state).into()
    }
}

impl<T> Drop for RingOp<'_, T> {
    fn drop(&mut self) {
        if let OpState::InFlight(slot) = self.state {
            self.ring.borrow_mut().results.release(slot);
        }
    }
}

/// Completion results, indexed by the slot handed out at submission.
pub(crate) struct Completions(pub(super) Slab<Completion>);

pub(super) enum Completion {
    Waiting,
    Posted(i32),
    Abandoned,
}

impl Completions {
    pub fn new() -> Self {
        Self(Slab::new())
    }

    pub fn reserve(&mut self) -> usize {
        self.0.insert(Completion::Waiting)
    }

    /// Record the kernel's result. Results for abandoned ops are discarded
    /// immediately.
    pub fn post(&mut self, result: i32, idx: usize) {
        let Some(entry) = self.0.get_mut(idx) else {
            return;
        };

        if matches!(entry, Completion::Abandoned) {
            self.0.remove(idx);
        } else {
            *entry = Completion::Posted(result);
        }
    }

    pub fn get(&self, idx: usize) -> Option<i32> {
        match self.0.get(idx) {
            Some(Completion::Posted(result)) => Some(*result),
            _ => None,
        }
    }

    /// Give up interest in a slot. Frees it now if the result already
    /// arrived, otherwise once it does.
    pub fn release(&mut self, idx: usize) {
        let Some(entry) = self.0.get_mut(idx) else {
            return;
        };

        if matches!(entry, Completion::Posted(_)) {
            self.0.remove(idx);
        } else {
            *entry = Completion::Abandoned;
        }
    }
}
