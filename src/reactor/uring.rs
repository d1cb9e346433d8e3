use std::{cell::RefCell, io};

use io_uring::{squeue, IoUring};
use slab::Slab;

use super::{
    op::{Completions, RingOp},
    RING_ENTRIES,
};

pub struct Ring<T>(RefCell<RingInner<T>>);

impl<T> Ring<T> {
    pub fn new() -> Self {
        Self(RefCell::new(RingInner::new()))
    }

    pub fn new_op(&self) -> RingOp<'_, T> {
        RingOp::new(&self.0)
    }

    pub fn react(&self) -> io::Result<Vec<T>> {
        self.0.borrow_mut().react()
    }

    pub fn is_idle(&self) -> bool {
        self.0.borrow().in_flight.is_empty()
    }
}

pub(super) struct RingInner<T> {
    uring: IoUring,
    in_flight: Slab<(T, usize)>,
    pub results: Completions,
}

impl<T> RingInner<T> {
    pub fn new() -> Self {
        Self {
            uring: IoUring::new(RING_ENTRIES).expect("failed to set up io_uring"),
            in_flight: Slab::new(),
            results: Completions::new(),
        }
    }

    fn push(&mut self, entry: &squeue::Entry) -> io::Result<()> {
        if unsafe { self.uring.submission().push(entry) }.is_ok() {
            return Ok(());
        }

        // Submission queue is full; hand what we have to the kernel and retry.
        self.uring.submit()?;

        unsafe { self.uring.submission().push(entry) }.map_err(io::Error::other)
    }

    pub fn submit(&mut self, entry: squeue::Entry, obj: T) -> io::Result<usize> {
        let key = self.in_flight.vacant_key();

        self.push(&entry.user_data(key as u64))?;

        let result_idx = self.results.reserve();
        self.in_flight.insert((obj, result_idx));

        // Hand the entry to the kernel now rather than at the next react: it
        // copies pointed-to arguments, such as a timeout's timespec, at
        // submission, and the op's owner may be gone by the next react. If
        // this fails the entry stays queued for the next react.
        if let Err(e) = self.uring.submit() {
            log::debug!("deferring submission: {e}");
        }

        Ok(result_idx)
    }

    pub fn react(&mut self) -> io::Result<Vec<T>> {
        match self.uring.submit_and_wait(1) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }

        let in_flight = &mut self.in_flight;
        let results = &mut self.results;

        Ok(self
            .uring
            .completion()
            .filter_map(|cqe| {
                let (obj, result_idx) = in_flight.try_remove(cqe.user_data() as usize)?;
                results.post(cqe.result(), result_idx);

                Some(obj)
            })
            .collect())
    }
}
