use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, Waker},
};

use super::{Failure, Needs, Outcome, Values};

/// A future that completes once a [Needs] settles.
///
/// Obtained from [Needs::settled] or by `.await`ing a [Needs] directly. It
/// resolves to the collected values if the `Needs` was kept, or to its
/// [Failure] otherwise.
///
/// ```
/// use ::needs::{needs, needs::Needs, task::Executor};
/// use std::time::Duration;
///
/// let n: Needs<u32> = needs!("slow");
/// n.timeout(Duration::from_millis(10));
///
/// let failure = Executor::block_on(async move { n.await }).unwrap_err();
/// assert_eq!(failure.to_string(), "Timed out waiting on slow");
/// ```
pub struct Settled<T, E> {
    waiter: Waiter<T, E>,
}

impl<T, E> Settled<T, E> {
    pub(super) fn new(needs: Needs<T, E>) -> Self {
        Self {
            waiter: Waiter::new(needs),
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Future for Settled<T, E> {
    type Output = Result<Values<T>, Failure<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match this.waiter.needs.outcome() {
            Some(Outcome::Kept(values)) => Poll::Ready(Ok((*values).clone())),
            Some(Outcome::Failed(failure)) => Poll::Ready(Err((*failure).clone())),
            None => {
                this.waiter.park(cx.waker());
                Poll::Pending
            }
        }
    }
}

/// A task parked on a pending [Needs] until it settles.
///
/// Holds at most one waker in the `Needs`, and takes it back on drop.
pub(super) struct Waiter<T, E> {
    pub(super) needs: Needs<T, E>,
    key: Option<usize>,
}

impl<T, E> Waiter<T, E> {
    pub(super) fn new(needs: Needs<T, E>) -> Self {
        Self { needs, key: None }
    }

    pub(super) fn park(&mut self, waker: &Waker) {
        self.key = self.needs.park(self.key, waker);
    }
}

impl<T, E> Drop for Waiter<T, E> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.needs.unpark(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        future::Future,
        pin::pin,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        task::{Context, Poll, Wake, Waker},
    };

    use crate::{needs, needs::Needs};

    #[derive(Default)]
    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn pending_until_kept_then_ready() {
        let n: Needs<i32> = needs!("a");
        let counter = Arc::new(CountingWaker::default());
        let waker = Waker::from(counter.clone());
        let mut cx = Context::from_waker(&waker);

        let mut fut = pin!(n.settled());
        assert!(fut.as_mut().poll(&mut cx).is_pending());
        // Re-polling must not park a second waker.
        assert!(fut.as_mut().poll(&mut cx).is_pending());
        assert_eq!(n.queued(), (0, 1));

        n.keep("a", 4).unwrap();
        assert_eq!(counter.0.load(Ordering::Relaxed), 1);

        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(Ok(values)) => assert_eq!(values.get("a"), Some(&4)),
            _ => panic!("expected kept values"),
        }
    }

    #[test]
    fn ready_immediately_when_failed() {
        let n: Needs<i32> = needs!("a");
        n.fail("gone");

        let waker = Waker::from(Arc::new(CountingWaker::default()));
        let mut cx = Context::from_waker(&waker);

        match pin!(n.settled()).poll(&mut cx) {
            Poll::Ready(Err(failure)) => assert_eq!(failure.to_string(), "gone"),
            _ => panic!("expected the failure"),
        }
    }

    #[test]
    fn dropped_futures_leave_nothing_behind() {
        let n: Needs<i32> = needs!("a");
        let counter = Arc::new(CountingWaker::default());
        let waker = Waker::from(counter.clone());
        let mut cx = Context::from_waker(&waker);

        for _ in 0..10_000 {
            assert!(pin!(n.settled()).poll(&mut cx).is_pending());
        }

        assert_eq!(n.queued(), (0, 0));

        let mut kept = pin!(n.settled());
        assert!(kept.as_mut().poll(&mut cx).is_pending());
        assert_eq!(n.queued(), (0, 1));

        n.keep("a", 1).unwrap();
        assert_eq!(counter.0.load(Ordering::Relaxed), 1);
        assert!(kept.as_mut().poll(&mut cx).is_ready());
    }
}
