use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use log::{error, trace};

use super::{settled::Waiter, Needs};
use crate::futures::timer::Timer;

/// The task behind [Needs::timeout]: races a [Timer] against settlement.
///
/// Whichever comes first ends the task. Dropping the timer early abandons
/// its ring op, the kernel completion is discarded when it arrives.
pub(super) struct Deadline<T, E> {
    waiter: Waiter<T, E>,
    timer: Timer,
}

impl<T, E> Deadline<T, E> {
    pub(super) fn new(needs: Needs<T, E>, after: Duration) -> Self {
        Self {
            waiter: Waiter::new(needs),
            timer: Timer::sleep(after),
        }
    }
}

impl<T: 'static, E: 'static> Future for Deadline<T, E> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if !this.waiter.needs.is_pending() {
            trace!("settled before the deadline");
            return Poll::Ready(());
        }

        match Pin::new(&mut this.timer).poll(cx) {
            Poll::Ready(Ok(())) => {
                this.waiter.needs.expire();
                Poll::Ready(())
            }
            Poll::Ready(Err(e)) => {
                error!("timeout timer failed: {e}");
                Poll::Ready(())
            }
            Poll::Pending => {
                this.waiter.park(cx.waker());
                Poll::Pending
            }
        }
    }
}
