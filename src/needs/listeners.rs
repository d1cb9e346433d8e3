use std::task::Waker;

use log::trace;
use slab::Slab;

use super::{Failure, Values};

pub(super) enum Listener<T, E> {
    Keep(Box<dyn FnOnce(&Values<T>)>),
    Fail(Box<dyn FnOnce(&Failure<E>)>),
    Resolve(Box<dyn FnOnce()>),
}

impl<T, E> Listener<T, E> {
    pub fn fire_kept(self, values: &Values<T>) {
        match self {
            Listener::Keep(cb) => cb(values),
            Listener::Resolve(cb) => cb(),
            Listener::Fail(_) => {}
        }
    }

    pub fn fire_failed(self, failure: &Failure<E>) {
        match self {
            Listener::Fail(cb) => cb(failure),
            Listener::Resolve(cb) => cb(),
            Listener::Keep(_) => {}
        }
    }
}

/// Listeners queued while a [super::Needs] is pending, in registration order,
/// plus the wakers of the futures parked on it.
///
/// The queue is consumed by settlement, so no listener can fire twice. A
/// parked waker is keyed so the future that parked it can take it back when
/// it is dropped before settlement.
pub(super) struct Listeners<T, E> {
    queue: Vec<Listener<T, E>>,
    parked: Slab<Waker>,
}

impl<T, E> Default for Listeners<T, E> {
    fn default() -> Self {
        Self {
            queue: Vec::new(),
            parked: Slab::new(),
        }
    }
}

impl<T, E> Listeners<T, E> {
    pub fn push(&mut self, listener: Listener<T, E>) {
        self.queue.push(listener);
    }

    /// Park `waker` until settlement, replacing the one already under `key`.
    pub fn park(&mut self, key: Option<usize>, waker: &Waker) -> usize {
        if let Some(key) = key {
            if let Some(parked) = self.parked.get_mut(key) {
                if !parked.will_wake(waker) {
                    *parked = waker.clone();
                }

                return key;
            }
        }

        self.parked.insert(waker.clone())
    }

    pub fn unpark(&mut self, key: usize) {
        self.parked.try_remove(key);
    }

    #[cfg(test)]
    pub fn counts(&self) -> (usize, usize) {
        (self.queue.len(), self.parked.len())
    }

    pub fn kept(self, values: &Values<T>) {
        trace!(
            "dispatching {} listener(s) on keep, waking {}",
            self.queue.len(),
            self.parked.len()
        );

        for listener in self.queue {
            listener.fire_kept(values);
        }

        wake_all(self.parked);
    }

    pub fn failed(self, failure: &Failure<E>) {
        trace!(
            "dispatching {} listener(s) on fail, waking {}",
            self.queue.len(),
            self.parked.len()
        );

        for listener in self.queue {
            listener.fire_failed(failure);
        }

        wake_all(self.parked);
    }
}

fn wake_all(parked: Slab<Waker>) {
    for (_, waker) in parked {
        waker.wake();
    }
}
