//! # `needs`: barrier-futures over named values
//!
//! A [needs::Needs] stands for a *set* of named values that will become
//! available at some point. The consumer declares up front which slots it
//! needs; producers fill them independently. It settles as kept once every
//! slot has been filled exactly once, or as failed if a producer fails it or
//! its deadline passes first. One `Needs` can take the values of another,
//! optionally renaming them, which lets a coarse result be assembled from
//! several finer ones.
//!
//! Everything is single-threaded: a `Needs` is a `!Send` handle and its
//! listeners run on the thread that settles it. Deadlines run on the small
//! per-thread executor in [task], which sleeps on io_uring timers from
//! [futures::timer].
//!
//! ## Example
//!
//! Two tasks each produce part of a result; the third waits for both:
//!
//! ```
//! use ::needs::{needs, needs::Needs, futures::timer::Timer, task::Executor};
//! use std::time::Duration;
//!
//! let page: Needs<String> = needs!("header", "body");
//! page.timeout(Duration::from_millis(500));
//!
//! for (slot, delay) in [("header", 20), ("body", 10)] {
//!     let page = page.clone();
//!     Executor::spawn(async move {
//!         Timer::sleep(Duration::from_millis(delay)).await.unwrap();
//!         page.keep(slot, format!("<{slot}>")).unwrap();
//!     });
//! }
//!
//! let values = Executor::block_on(page.settled()).unwrap();
//! assert_eq!(values.get("header").map(String::as_str), Some("<header>"));
//! ```
pub mod futures;
pub mod needs;
pub(crate) mod reactor;
pub mod task;
