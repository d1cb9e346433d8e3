//! Async timer related futures.
//!
//! Timers are implemented with io_uring's `IORING_OP_TIMEOUT`: the kernel
//! posts a completion once the relative timeout elapses. The main use-case for
//! this is to put a task to sleep for a specific period of time.
//!
//! # Example
//! Let's put a task to sleep for 200 milliseconds.
//! ```
//! use needs::futures::timer::Timer;
//! use needs::task::Executor;
//! use std::time::{Duration, Instant};
//!# Executor::block_on(
//! async {
//!     let now = Instant::now();
//!
//!     Timer::sleep(Duration::from_millis(200)).await?;
//!
//!     assert!(now.elapsed() >= Duration::from_millis(200));
//!#     Ok::<(), std::io::Error>(())
//! }
//!# ).unwrap();
//! ```
use std::{
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use io_uring::{opcode, types};

use crate::reactor::{Reactor, ReactorOp};

/// Asynchronous timer.
///
/// This structure is a future that will expire at some point in the future. It
/// can be obtained via the [Timer::sleep] function.
pub struct Timer {
    op: ReactorOp,
    ts: types::Timespec,
}

impl Timer {
    #[must_use]
    /// Put the current task to sleep for the specified duration.
    ///
    /// This function returns a future, that when `.await`ed will suspend the
    /// execution of the current task until the specified duration has elapsed.
    /// At that point the runtime will queue the task for execution. The task
    /// is suspended for *at least* the specified duration; it could sleep for
    /// longer. An `Err` is only returned if the kernel refused the timeout.
    pub fn sleep(d: Duration) -> Self {
        Self {
            op: Reactor::new_op(),
            ts: types::Timespec::from(d),
        }
    }
}

impl Future for Timer {
    type Output = io::Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let ts = &this.ts as *const types::Timespec;

        this.op
            .submit_or_poll(|| (opcode::Timeout::new(ts).build(), cx.waker().clone()))
            .map(|res| match res {
                Ok(_) => Ok(()),
                // A pure timeout completes with -ETIME when it expires.
                Err(e) if e.raw_os_error() == Some(libc::ETIME) => Ok(()),
                Err(e) => Err(e),
            })
    }
}
