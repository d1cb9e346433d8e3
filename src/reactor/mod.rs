//! Per-thread io_uring reactor.
//!
//! The executor parks tasks here when it has nothing runnable. Futures obtain
//! a [ReactorOp] via [Reactor::new_op], submit a single operation through it
//! and get their waker back once the kernel completes that operation.
pub(crate) use op::RingOp;
use std::{cell::Cell, io, mem::transmute, task::Waker};
use uring::Ring;

mod op;
mod uring;

/// Submission queue depth of each thread's ring.
pub(crate) const RING_ENTRIES: u32 = 1024;

pub(crate) type ReactorOp = RingOp<'static, Waker>;

pub(crate) struct Reactor {}

thread_local! {
    static REACTOR: Ring<Waker> = Ring::new();
    static RING_USED: Cell<bool> = const { Cell::new(false) };
}

impl Reactor {
    pub fn new_op() -> ReactorOp {
        RING_USED.with(|used| used.set(true));

        // The ring lives as long as the thread and a `RingOp` is `!Send`, so
        // the borrow can never outlive it.
        REACTOR.with(|r| unsafe { transmute(r.new_op()) })
    }

    /// True if no operation is in flight, so [Reactor::react] would block
    /// forever. Never sets up a ring just to answer.
    pub fn is_idle() -> bool {
        !RING_USED.with(Cell::get) || REACTOR.with(|r| r.is_idle())
    }

    /// Wait for at least one completion and wake the tasks that own them.
    pub fn react() -> io::Result<()> {
        let wakers = REACTOR.with(|r| r.react())?;

        log::trace!("reactor woke {} task(s)", wakers.len());

        for waker in wakers.into_iter() {
            waker.wake();
        }

        Ok(())
    }
}
