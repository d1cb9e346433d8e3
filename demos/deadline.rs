use std::time::Duration;

use clap::Parser;
use needs::{futures::timer::Timer, needs::Needs, task::Executor};

/// Race a set of slow producers against a deadline.
///
/// Slot `n` is filled after `n * step` milliseconds. Whatever is still empty
/// when the deadline passes is reported in the failure.
#[derive(Parser, Debug)]
struct Args {
    /// Slot names to wait on.
    #[arg(required = true)]
    slots: Vec<String>,

    /// Delay between consecutive producers, in milliseconds.
    #[arg(short, long, default_value_t = 100)]
    step_ms: u64,

    /// Deadline in milliseconds.
    #[arg(short, long, default_value_t = 250)]
    timeout_ms: u64,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let needs: Needs<u64> = Needs::new(args.slots.clone());
    needs
        .timeout(Duration::from_millis(args.timeout_ms))
        .on_keep(|values| println!("all {} slots filled", values.len()))
        .on_fail(|failure| println!("{failure}"));

    for (i, slot) in args.slots.into_iter().enumerate() {
        let needs = needs.clone();
        let delay = (i as u64 + 1) * args.step_ms;

        Executor::spawn(async move {
            if Timer::sleep(Duration::from_millis(delay)).await.is_ok() {
                // Duplicate slot names on the command line share one slot.
                let _ = needs.keep(&slot, delay);
            }
        });
    }

    Executor::run();
}
