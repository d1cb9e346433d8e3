//! Futures driven by the reactor.
//!
//! The only leaf future the crate needs from the kernel is a timer: the
//! deadline behind [crate::needs::Needs::timeout] is a task sleeping on a
//! [timer::Timer]. Everything else a task waits on is in-process settlement,
//! see [crate::needs::Settled].
pub mod timer;
