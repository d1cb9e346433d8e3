//! Barrier-futures over named values.
//!
//! A [Needs] is declared with the names of the values it waits on. Producers
//! fill each slot exactly once with [Needs::keep]; once every slot is filled
//! the `Needs` is *kept* and its `on_keep` listeners receive all the values.
//! Any producer may instead [Needs::fail] the whole thing, and
//! [Needs::timeout] fails it automatically if it is still pending when the
//! deadline passes. Both outcomes are final: later keeps and fails are
//! silently ignored.
//!
//! Listeners registered while pending are queued and fire in registration
//! order at settlement. Listeners registered afterwards fire immediately,
//! inline with the registration call.
//!
//! # Example
//!
//! ```
//! use ::needs::needs;
//! use std::{cell::RefCell, rc::Rc};
//!
//! let seen = Rc::new(RefCell::new(None));
//! let user: ::needs::needs::Needs<String> = needs!("name", "email");
//!
//! {
//!     let seen = seen.clone();
//!     user.on_keep(move |values| {
//!         *seen.borrow_mut() = Some(format!(
//!             "{} <{}>",
//!             values.get("name").unwrap(),
//!             values.get("email").unwrap()
//!         ));
//!     });
//! }
//!
//! user.keep("name", "Ada".to_string())?
//!     .keep("email", "ada@example.com".to_string())?;
//!
//! assert!(user.is_kept());
//! assert_eq!(seen.borrow().as_deref(), Some("Ada <ada@example.com>"));
//! # Ok::<(), ::needs::needs::UsageError>(())
//! ```
//!
//! A `Needs` can also be `.await`ed from a task, see [Settled].
use std::{cell::RefCell, future::IntoFuture, rc::Rc, task::Waker, time::Duration};

use log::debug;

use crate::task::Executor;

pub use self::{
    error::{Failure, UsageError},
    settled::Settled,
    take::KeyMap,
    values::Values,
};
use self::{
    deadline::Deadline,
    listeners::{Listener, Listeners},
    slots::SlotRegistry,
};

mod deadline;
mod error;
mod listeners;
mod settled;
mod slots;
mod take;
mod values;

/// Declare a [Needs] from a list of slot names.
///
/// `needs!()` declares nothing and is kept immediately.
///
/// ```
/// use ::needs::needs;
/// let n: ::needs::needs::Needs<i32> = needs!("foo", "bar");
/// n.keep("foo", 1)?.keep("bar", 2)?;
/// assert!(n.is_kept());
/// # Ok::<(), ::needs::needs::UsageError>(())
/// ```
#[macro_export]
macro_rules! needs {
    () => {
        $crate::needs::Needs::new(::std::iter::empty::<&str>())
    };
    ($($name:expr),+ $(,)?) => {
        $crate::needs::Needs::new([$($name),+])
    };
}

enum Status<T, E> {
    Pending {
        values: Values<T>,
        listeners: Listeners<T, E>,
    },
    Kept(Rc<Values<T>>),
    Failed(Rc<Failure<E>>),
}

enum Outcome<T, E> {
    Kept(Rc<Values<T>>),
    Failed(Rc<Failure<E>>),
}

impl<T, E> Status<T, E> {
    fn outcome(&self) -> Option<Outcome<T, E>> {
        match self {
            Status::Pending { .. } => None,
            Status::Kept(values) => Some(Outcome::Kept(values.clone())),
            Status::Failed(failure) => Some(Outcome::Failed(failure.clone())),
        }
    }

    fn keep(&mut self) -> Option<(Rc<Values<T>>, Listeners<T, E>)> {
        let Status::Pending { values, listeners } = self else {
            return None;
        };

        let values = Rc::new(std::mem::take(values));
        let listeners = std::mem::take(listeners);

        *self = Status::Kept(values.clone());

        Some((values, listeners))
    }

    fn fail(&mut self, failure: Failure<E>) -> Option<(Rc<Failure<E>>, Listeners<T, E>)> {
        let Status::Pending { listeners, .. } = self else {
            return None;
        };

        let failure = Rc::new(failure);
        let listeners = std::mem::take(listeners);

        *self = Status::Failed(failure.clone());

        Some((failure, listeners))
    }
}

struct Inner<T, E> {
    slots: SlotRegistry,
    status: Status<T, E>,
}

/// A settleable future over a set of named values.
///
/// `Needs` is a cheap handle: clones share the same slots, values and
/// listeners. It is `!Send`, all of its work happens on one thread.
///
/// See the [module-level documentation](self) for more information.
pub struct Needs<T, E = String> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

impl<T, E> Clone for Needs<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Needs<T, String> {
    /// Declare the slot names this `Needs` waits on, failing with `String`
    /// reasons. Use [Needs::declare] for another reason type.
    ///
    /// Duplicate names collapse into one slot. With no names at all the
    /// `Needs` is kept immediately, with no values.
    pub fn new<I>(names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self::declare(names)
    }
}

impl<T: 'static, E: 'static> Needs<T, E> {
    /// Like [Needs::new], for any failure reason type `E`.
    pub fn declare<I>(names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let slots = SlotRegistry::new(names);

        let status = if slots.is_empty() {
            Status::Kept(Rc::new(Values::default()))
        } else {
            Status::Pending {
                values: Values::default(),
                listeners: Listeners::default(),
            }
        };

        Self {
            inner: Rc::new(RefCell::new(Inner { slots, status })),
        }
    }

    /// Call `f` with this `Needs` straight away, for wiring it up inline.
    pub fn run(&self, f: impl FnOnce(&Self)) -> &Self {
        f(self);
        self
    }

    /// Fill the slot `name`.
    ///
    /// `value` may be `None`, which fills the slot with no value. Filling the
    /// last empty slot keeps the `Needs` and fires its `on_keep` and
    /// `on_resolve` listeners before returning.
    ///
    /// Filling a slot that was never declared, or one that is already
    /// filled, is an error even once the `Needs` has settled. Otherwise a
    /// keep on a settled `Needs` does nothing.
    pub fn keep(&self, name: &str, value: impl Into<Option<T>>) -> Result<&Self, UsageError> {
        let settled = {
            let mut inner = self.inner.borrow_mut();
            let idx = inner.slots.check(name)?;

            let Inner { slots, status } = &mut *inner;
            let Status::Pending { values, .. } = status else {
                return Ok(self);
            };

            slots.fill(idx);
            values.insert(name.to_owned(), value.into());

            if !slots.all_filled() {
                return Ok(self);
            }

            status.keep()
        };

        if let Some((values, listeners)) = settled {
            debug!("kept with {} value(s)", values.len());
            listeners.kept(&values);
        }

        Ok(self)
    }

    /// Fail the `Needs` with `reason`. Does nothing if it has already settled.
    pub fn fail(&self, reason: impl Into<E>) -> &Self {
        self.settle_failed(Failure::Reason(reason.into()))
    }

    /// Fail the `Needs` without a reason, see [Failure::Unspecified].
    pub fn fail_unspecified(&self) -> &Self {
        self.settle_failed(Failure::Unspecified)
    }

    fn settle_failed(&self, failure: Failure<E>) -> &Self {
        let settled = self.inner.borrow_mut().status.fail(failure);

        if let Some((failure, listeners)) = settled {
            debug!("failed: {}", failure_kind(&failure));
            listeners.failed(&failure);
        }

        self
    }

    /// Fail the `Needs` if it is still pending once `after` has elapsed.
    ///
    /// The deadline is a task on this thread's [Executor]; it only fires
    /// while the executor runs. The failure is [Failure::TimedOut], naming
    /// the slots that were still empty. Settling first ends the deadline
    /// task straight away, so it neither fires nor keeps the executor busy.
    pub fn timeout(&self, after: Duration) -> &Self {
        Executor::spawn(Deadline::new(self.clone(), after));
        self
    }

    fn expire(&self) {
        let waiting = {
            let inner = self.inner.borrow();
            if !matches!(inner.status, Status::Pending { .. }) {
                return;
            }

            inner.slots.unfilled()
        };

        debug!("timed out waiting on {waiting:?}");

        self.settle_failed(Failure::TimedOut { waiting });
    }

    fn on(&self, listener: Listener<T, E>) -> &Self {
        let outcome = {
            let mut inner = self.inner.borrow_mut();
            if let Status::Pending { listeners, .. } = &mut inner.status {
                listeners.push(listener);
                return self;
            }

            inner.status.outcome()
        };

        match outcome {
            Some(Outcome::Kept(values)) => listener.fire_kept(&values),
            Some(Outcome::Failed(failure)) => listener.fire_failed(&failure),
            None => {}
        }

        self
    }

    /// Call `cb` with every value once all slots are filled.
    pub fn on_keep(&self, cb: impl FnOnce(&Values<T>) + 'static) -> &Self {
        self.on(Listener::Keep(Box::new(cb)))
    }

    /// Call `cb` with the failure if this `Needs` fails.
    pub fn on_fail(&self, cb: impl FnOnce(&Failure<E>) + 'static) -> &Self {
        self.on(Listener::Fail(Box::new(cb)))
    }

    /// Call `cb` once this `Needs` settles, whichever way.
    pub fn on_resolve(&self, cb: impl FnOnce() + 'static) -> &Self {
        self.on(Listener::Resolve(Box::new(cb)))
    }

    /// Await settlement. Equivalent to `.await`ing a clone of the handle.
    pub fn settled(&self) -> Settled<T, E> {
        Settled::new(self.clone())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.inner.borrow().status, Status::Pending { .. })
    }

    pub fn is_kept(&self) -> bool {
        matches!(self.inner.borrow().status, Status::Kept(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.inner.borrow().status, Status::Failed(_))
    }

    /// Whether `name` has been filled.
    pub fn has(&self, name: &str) -> bool {
        self.inner.borrow().slots.is_filled(name)
    }

    /// The collected values, once kept.
    pub fn values(&self) -> Option<Rc<Values<T>>> {
        match &self.inner.borrow().status {
            Status::Kept(values) => Some(values.clone()),
            _ => None,
        }
    }

    /// The failure, once failed.
    pub fn failure(&self) -> Option<Rc<Failure<E>>> {
        match &self.inner.borrow().status {
            Status::Failed(failure) => Some(failure.clone()),
            _ => None,
        }
    }

    /// Every declared slot name, in declaration order.
    pub fn needed(&self) -> Vec<String> {
        self.inner.borrow().slots.names().map(str::to_owned).collect()
    }

    /// The slots still empty, in declaration order.
    pub fn waiting_on(&self) -> Vec<String> {
        self.inner.borrow().slots.unfilled()
    }

    fn outcome(&self) -> Option<Outcome<T, E>> {
        self.inner.borrow().status.outcome()
    }
}

impl<T, E> Needs<T, E> {
    /// Park `waker` until settlement, reusing `key` if it is still parked.
    /// Returns `None` once settled.
    fn park(&self, key: Option<usize>, waker: &Waker) -> Option<usize> {
        match &mut self.inner.borrow_mut().status {
            Status::Pending { listeners, .. } => Some(listeners.park(key, waker)),
            _ => None,
        }
    }

    fn unpark(&self, key: usize) {
        if let Status::Pending { listeners, .. } = &mut self.inner.borrow_mut().status {
            listeners.unpark(key);
        }
    }

    /// Queued listeners and parked wakers.
    #[cfg(test)]
    fn queued(&self) -> (usize, usize) {
        match &self.inner.borrow().status {
            Status::Pending { listeners, .. } => listeners.counts(),
            _ => (0, 0),
        }
    }
}

fn failure_kind<E>(failure: &Failure<E>) -> &'static str {
    match failure {
        Failure::Unspecified => "unspecified",
        Failure::Reason(_) => "reason given",
        Failure::TimedOut { .. } => "timed out",
    }
}

impl<T: Clone + 'static, E: Clone + 'static> IntoFuture for Needs<T, E> {
    type Output = Result<Values<T>, Failure<E>>;
    type IntoFuture = Settled<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        Settled::new(self)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        rc::Rc,
        time::{Duration, Instant},
    };

    use anyhow::Result;

    use super::{Failure, Needs, UsageError};
    use crate::{futures::timer::Timer, task::Executor};

    type Log = Rc<RefCell<Vec<String>>>;

    fn record<T: std::fmt::Debug + 'static>(n: &Needs<T>, log: &Log, tag: &'static str) {
        let l = log.clone();
        n.on_keep(move |v| l.borrow_mut().push(format!("{tag} keep {v:?}")));
        let l = log.clone();
        n.on_fail(move |f| l.borrow_mut().push(format!("{tag} fail {f}")));
        let l = log.clone();
        n.on_resolve(move || l.borrow_mut().push(format!("{tag} resolve")));
    }

    #[test]
    fn empty_is_kept_immediately() {
        let n: Needs<i32> = needs!();
        let log = Log::default();

        assert!(n.is_kept());
        record(&n, &log, "late");

        assert_eq!(
            *log.borrow(),
            vec!["late keep Values({})".to_string(), "late resolve".to_string()]
        );
        assert!(n.values().unwrap().is_empty());
    }

    #[test]
    fn keeps_once_all_filled() -> Result<()> {
        let n: Needs<i32> = needs!("a", "b");
        let hits = Rc::new(RefCell::new(Vec::new()));

        {
            let hits = hits.clone();
            n.on_keep(move |v| {
                hits.borrow_mut()
                    .push((v.get("a").copied(), v.get("b").copied()))
            });
        }

        n.keep("a", 1)?;
        assert!(n.is_pending());
        assert!(hits.borrow().is_empty());
        assert_eq!(n.waiting_on(), vec!["b"]);

        n.keep("b", 2)?;
        assert!(n.is_kept());
        assert_eq!(*hits.borrow(), vec![(Some(1), Some(2))]);

        Ok(())
    }

    #[test]
    fn keep_twice_is_usage_error() -> Result<()> {
        let n: Needs<i32> = needs!("a", "b");

        n.keep("a", 1)?;
        assert_eq!(
            n.keep("a", 2).err(),
            Some(UsageError::AlreadyKept("a".into()))
        );

        n.keep("b", 3)?;
        assert_eq!(
            n.keep("b", 3).err(),
            Some(UsageError::AlreadyKept("b".into()))
        );
        assert_eq!(n.values().unwrap().get("a"), Some(&1));

        Ok(())
    }

    #[test]
    fn keep_undeclared_is_usage_error() {
        let n: Needs<i32> = needs!("a");

        assert_eq!(
            n.keep("nope", 1).err(),
            Some(UsageError::NotNeeded("nope".into()))
        );
        assert!(n.is_pending());
    }

    #[test]
    fn keep_without_value() -> Result<()> {
        let n: Needs<i32> = needs!("a", "b");

        n.keep("a", None)?.keep("b", 5)?;

        let values = n.values().unwrap();
        assert!(values.contains("a"));
        assert_eq!(values.get("a"), None);
        assert_eq!(values.get("b"), Some(&5));

        Ok(())
    }

    #[test]
    fn duplicate_names_need_one_fill() -> Result<()> {
        let n: Needs<i32> = needs!("a", "a");

        assert_eq!(n.needed(), vec!["a"]);
        n.keep("a", 1)?;
        assert!(n.is_kept());

        Ok(())
    }

    #[test]
    fn fail_is_final() -> Result<()> {
        let n: Needs<i32> = needs!("a", "b");
        let log = Log::default();
        record(&n, &log, "q");

        n.keep("a", 1)?;
        n.fail("x");
        assert!(n.is_failed());

        n.fail("y");
        n.keep("b", 2)?;
        assert!(n.is_failed());
        assert!(!n.is_kept());
        assert!(!n.has("b"));
        assert_eq!(*n.failure().unwrap(), Failure::Reason("x".to_string()));

        // Refilling a slot filled before the failure is still misuse.
        assert_eq!(
            n.keep("a", 1).err(),
            Some(UsageError::AlreadyKept("a".into()))
        );

        assert_eq!(*log.borrow(), vec!["q fail x", "q resolve"]);

        Ok(())
    }

    #[test]
    fn fail_without_reason() {
        let n: Needs<i32> = needs!("a");
        let reason = Rc::new(RefCell::new(None));

        {
            let reason = reason.clone();
            n.on_fail(move |f| *reason.borrow_mut() = Some(f.to_string()));
        }
        n.fail_unspecified();

        assert_eq!(reason.borrow().as_deref(), Some("Unspecified error."));
    }

    #[test]
    fn custom_reason_type() {
        #[derive(Debug, Clone, PartialEq)]
        struct Code(u16);

        let n: Needs<(), Code> = Needs::declare(["a"]);
        n.fail(Code(503));

        assert_eq!(n.failure().unwrap().reason(), Some(&Code(503)));
    }

    #[test]
    fn keep_after_kept_does_not_refire() -> Result<()> {
        let n: Needs<i32> = needs!("a");
        let log = Log::default();
        record(&n, &log, "q");

        n.keep("a", 1)?;
        n.fail("too late");

        assert!(n.is_kept());
        assert!(n.failure().is_none());
        assert_eq!(*log.borrow(), vec!["q keep Values({\"a\": Some(1)})", "q resolve"]);

        Ok(())
    }

    #[test]
    fn late_listeners_fire_inline() -> Result<()> {
        let n: Needs<i32> = needs!("a");
        n.keep("a", 1)?;

        let log = Log::default();
        record(&n, &log, "late");
        record(&n, &log, "later");

        assert_eq!(
            *log.borrow(),
            vec![
                "late keep Values({\"a\": Some(1)})",
                "late resolve",
                "later keep Values({\"a\": Some(1)})",
                "later resolve",
            ]
        );

        let failed: Needs<i32> = needs!("a");
        failed.fail("nope");

        let log = Log::default();
        record(&failed, &log, "late");
        assert_eq!(*log.borrow(), vec!["late fail nope", "late resolve"]);

        Ok(())
    }

    #[test]
    fn listeners_fire_in_registration_order() -> Result<()> {
        let n: Needs<()> = needs!("a");
        let order = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let o = order.clone();
            n.on_resolve(move || o.borrow_mut().push(format!("resolve {i}")));
            let o = order.clone();
            n.on_keep(move |_| o.borrow_mut().push(format!("keep {i}")));
            let o = order.clone();
            n.on_fail(move |_| o.borrow_mut().push(format!("fail {i}")));
        }

        n.keep("a", ())?;

        assert_eq!(
            *order.borrow(),
            vec!["resolve 0", "keep 0", "resolve 1", "keep 1", "resolve 2", "keep 2"]
        );

        Ok(())
    }

    #[test]
    fn listener_can_reenter() -> Result<()> {
        let n: Needs<i32> = needs!("a");
        let log = Log::default();

        {
            let n2 = n.clone();
            let log = log.clone();
            n.on_keep(move |_| {
                n2.fail("ignored");
                let log = log.clone();
                n2.on_resolve(move || log.borrow_mut().push("nested".into()));
            });
        }

        n.keep("a", 1)?;

        assert!(n.is_kept());
        assert_eq!(*log.borrow(), vec!["nested"]);

        Ok(())
    }

    #[test]
    fn run_passes_self() {
        let n: Needs<i32> = needs!("a");

        n.run(|n| {
            n.keep("a", 3).unwrap();
        });

        assert_eq!(n.values().unwrap().get("a"), Some(&3));
    }

    #[test]
    fn timeout_names_unfilled_slots() -> Result<()> {
        let n: Needs<i32> = needs!("foo", "bar", "baz");
        let reason = Rc::new(RefCell::new(None));

        {
            let reason = reason.clone();
            n.on_fail(move |f| *reason.borrow_mut() = Some(f.to_string()));
        }

        n.keep("bar", 1)?;

        let before = Instant::now();
        n.timeout(Duration::from_millis(50));
        Executor::run();

        assert!(before.elapsed() >= Duration::from_millis(45));
        assert!(n.is_failed());
        assert!(n.failure().unwrap().is_timeout());
        assert_eq!(
            reason.borrow().as_deref(),
            Some("Timed out waiting on foo and baz")
        );

        Ok(())
    }

    #[test]
    fn timeout_after_keep_is_noop() {
        let n: Needs<i32> = needs!("a", "b");
        n.timeout(Duration::from_millis(100));

        {
            let n = n.clone();
            Executor::spawn(async move {
                n.keep("a", 1).unwrap();
                Timer::sleep(Duration::from_millis(20)).await.unwrap();
                n.keep("b", 2).unwrap();
            });
        }

        Executor::run();

        assert!(n.is_kept());
        assert!(n.failure().is_none());
    }

    #[test]
    fn await_settlement() {
        let n: Needs<i32> = needs!("a", "b");

        {
            let n = n.clone();
            Executor::spawn(async move {
                Timer::sleep(Duration::from_millis(20)).await.unwrap();
                n.keep("a", 1).unwrap().keep("b", 2).unwrap();
            });
        }

        let values = Executor::block_on(async move { n.await }).unwrap();
        assert_eq!(values.get("a"), Some(&1));
        assert_eq!(values.get("b"), Some(&2));
    }

    #[test]
    fn await_timeout() {
        let n: Needs<i32> = needs!("slow");
        n.timeout(Duration::from_millis(30));

        let failure = Executor::block_on(n.settled()).unwrap_err();
        assert_eq!(
            failure,
            Failure::TimedOut {
                waiting: vec!["slow".into()]
            }
        );
    }

    #[test]
    fn keep_ends_timeout_early() {
        let n: Needs<i32> = needs!("a");
        n.timeout(Duration::from_millis(1500));

        {
            let n = n.clone();
            Executor::spawn(async move {
                n.keep("a", 1).unwrap();
            });
        }

        let before = Instant::now();
        let values = Executor::block_on(n.settled()).unwrap();

        assert!(before.elapsed() < Duration::from_millis(500));
        assert_eq!(values.get("a"), Some(&1));
        assert_eq!(n.queued(), (0, 0));
    }

    #[test]
    fn fail_ends_timeout_early() {
        let n: Needs<i32> = needs!("a");
        n.timeout(Duration::from_millis(1500));

        {
            let n = n.clone();
            Executor::spawn(async move {
                Timer::sleep(Duration::from_millis(10)).await.unwrap();
                n.fail("gave up");
            });
        }

        let before = Instant::now();
        Executor::run();

        assert!(before.elapsed() < Duration::from_millis(500));
        assert_eq!(*n.failure().unwrap(), Failure::Reason("gave up".to_string()));
    }
}
