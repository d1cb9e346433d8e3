//! Task and execution management
//!
//! This module provides the methods needed to spawn tasks and execute them
//! until completion. The executor is per-thread: each OS thread has its own
//! run queue, wait list and io_uring ring. This means that:
//!
//! 1. The thread upon which a task is spawned is the same thread that will
//!    execute it.
//! 2. Each thread needs to call one of [Executor::block_on] or [Executor::run]
//!    to do any work. Timeouts armed with [crate::needs::Needs::timeout] only
//!    fire while the arming thread runs its executor.
//!
//! # Example
//!
//! Use [Executor::block_on] to obtain the result of a future:
//!
//! ```
//! use ::needs::task::Executor;
//! let x = Executor::block_on(async { 2 + 8 });
//! assert_eq!(x, 10);
//! ```
//!
//! # Threading Model
//!
//! Only a single task executes at once, so tasks can share `!Send` state such
//! as a [crate::needs::Needs] handle:
//!
//! ```
//! use ::needs::{needs, needs::Needs, task::Executor};
//! let n: Needs<i32> = needs!("left", "right");
//! {
//!     let n = n.clone();
//!     Executor::spawn(async move { n.keep("left", 1).unwrap(); });
//! }
//! {
//!     let n = n.clone();
//!     Executor::spawn(async move { n.keep("right", 2).unwrap(); });
//! }
//! let values = Executor::block_on(n.settled()).unwrap();
//! assert_eq!(values.get("left"), Some(&1));
//! assert_eq!(values.get("right"), Some(&2));
//! ```
use std::{
    cell::RefCell,
    collections::VecDeque,
    future::Future,
    pin::Pin,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll, Wake, Waker},
};

use slab::Slab;

use crate::reactor::Reactor;

/// The task is currently being polled.
const RUNNING: usize = usize::MAX;
/// The task sits in the run queue.
const QUEUED: usize = usize::MAX - 1;

/// Where a task currently lives: [RUNNING], [QUEUED] or its key in the wait
/// slab.
struct TaskId {
    slot: AtomicUsize,
    woken: AtomicBool,
}

impl TaskId {
    fn new() -> Self {
        Self {
            slot: AtomicUsize::new(QUEUED),
            woken: AtomicBool::new(false),
        }
    }
}

impl Wake for TaskId {
    fn wake(self: Arc<TaskId>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<TaskId>) {
        match self.slot.load(Ordering::Relaxed) {
            RUNNING => self.woken.store(true, Ordering::Relaxed),
            QUEUED => {}
            slot => EXEC.with(|exec| {
                let mut exec = exec.borrow_mut();
                if let Some(task) = exec.waiting.try_remove(slot) {
                    task.id.slot.store(QUEUED, Ordering::Relaxed);
                    exec.run_q.push_back(task);
                }
            }),
        }
    }
}

struct Task {
    id: Arc<TaskId>,
    future: Pin<Box<dyn Future<Output = ()>>>,
}

/// The async executor.
///
/// A type that is responsible for pushing futures through to
/// completion. You can begin execution of a new task by calling the
/// [Executor::block_on] function.
pub struct Executor {
    waiting: Slab<Task>,
    run_q: VecDeque<Task>,
}

thread_local! {
    static EXEC: RefCell<Executor> = const { RefCell::new(
        Executor {
            waiting: Slab::new(),
            run_q: VecDeque::new(),
        }
    )}
}

struct JoinState<T> {
    output: Option<T>,
    waiter: Option<Waker>,
}

/// A handle to a running task.
///
/// You can call [TaskJoiner::join] from a synchronous context to drive the
/// executor and yield the future's value. If you want to wait for execution to
/// finish from an asynchronous context, use `.await` on the joiner. If the
/// joiner is dropped then execution of the future continues to completion but
/// the return value is lost, aka detach-on-drop.
pub struct TaskJoiner<T> {
    state: Rc<RefCell<JoinState<T>>>,
}

impl<T> TaskJoiner<T> {
    /// Run this thread's executor until the task has finished and return the
    /// value yielded by its future.
    ///
    /// *Note* This function should only be called from synchronous contexts. To
    /// prevent deadlocks in an asynchronous context, use `.await` instead.
    ///
    /// # Panics
    ///
    /// Panics if the executor ran dry without the task finishing, i.e. the
    /// task is waiting on something nothing will ever wake.
    pub fn join(self) -> T {
        if self.state.borrow().output.is_none() {
            Executor::run();
        }

        self.state
            .borrow_mut()
            .output
            .take()
            .expect("task can never complete")
    }
}

impl<T> Future for TaskJoiner<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();

        match state.output.take() {
            Some(value) => Poll::Ready(value),
            None => {
                state.waiter = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl Executor {
    /// Spawn a new future and add it to this thread's run queue. If called from
    /// an already-running asynchronous task, the future will be queued for
    /// execution. If called from a synchronous context, the task will *not* be
    /// executed until [Executor::run] is called.
    ///
    /// A [TaskJoiner] is returned which can be used to wait for completion of
    /// the future `f` and obtain its return value.
    pub fn spawn<Fut, T>(f: Fut) -> TaskJoiner<T>
    where
        Fut: Future<Output = T> + 'static,
        T: 'static,
    {
        let state = Rc::new(RefCell::new(JoinState {
            output: None,
            waiter: None,
        }));
        let task_state = state.clone();

        let fut = async move {
            let value = f.await;
            let waiter = {
                let mut state = task_state.borrow_mut();
                state.output = Some(value);
                state.waiter.take()
            };

            if let Some(waiter) = waiter {
                waiter.wake();
            }
        };

        let task = Task {
            id: Arc::new(TaskId::new()),
            future: Box::pin(fut),
        };

        EXEC.with(|exec| {
            exec.borrow_mut().run_q.push_back(task);
        });

        TaskJoiner { state }
    }

    /// A convenience function for waiting on a future from a synchronous
    /// context. This is the equivalent of calling:
    ///
    /// ```
    /// # use ::needs::task::Executor;
    /// # use std::future::Future;
    /// # fn x<Fut: Future<Output = ()> + 'static>(f: Fut) {
    /// let task = Executor::spawn(f);
    /// Executor::run();
    /// task.join();
    /// # }
    /// ```
    pub fn block_on<Fut, T>(f: Fut) -> T
    where
        Fut: Future<Output = T> + 'static,
        T: 'static,
    {
        let joiner = Self::spawn(f);

        Self::executor_loop();

        joiner.join()
    }

    /// Run the executor for this thread.
    ///
    /// This function will schedule and run all tasks that have been previously
    /// spawned with [Executor::spawn]. *Note* each thread has its own set of
    /// tasks and execution environment. If you call this function, only tasks
    /// that have been spawned on *this* thread will be executed.
    ///
    /// Returns once every task has finished, or once the remaining tasks are
    /// all waiting on something that no pending I/O can wake.
    pub fn run() {
        Self::executor_loop()
    }

    fn executor_loop() {
        EXEC.with(|exec| loop {
            if exec.borrow().run_q.is_empty() {
                if exec.borrow().waiting.is_empty() {
                    return;
                }

                if Reactor::is_idle() {
                    log::warn!(
                        "{} task(s) are waiting but nothing is left to wake them",
                        exec.borrow().waiting.len()
                    );
                    return;
                }

                if let Err(e) = Reactor::react() {
                    panic!("reactor failed: {e}");
                }

                continue;
            }

            let Some(mut task) = exec.borrow_mut().run_q.pop_front() else {
                continue;
            };

            task.id.slot.store(RUNNING, Ordering::Relaxed);
            task.id.woken.store(false, Ordering::Relaxed);

            let waker = Waker::from(task.id.clone());

            let mut cx = Context::from_waker(&waker);

            match task.future.as_mut().poll(&mut cx) {
                Poll::Ready(()) => {}
                Poll::Pending => {
                    let mut exec = exec.borrow_mut();

                    if task.id.woken.swap(false, Ordering::Relaxed) {
                        task.id.slot.store(QUEUED, Ordering::Relaxed);
                        exec.run_q.push_back(task);
                    } else {
                        let slot = exec.waiting.vacant_entry();

                        task.id.slot.store(slot.key(), Ordering::Relaxed);

                        slot.insert(task);
                    }
                }
            }
        });
    }
}
