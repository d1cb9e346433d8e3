use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use log::{debug, error};
use needs::{futures::timer::Timer, needs::Needs, task::Executor};

/// Assemble one result from several upstream producers.
///
/// Each upstream is a `Needs` filled by its own task after a delay. The
/// downstream `Needs` takes what it wants from each of them, renaming the
/// avatar slot on the way.
#[derive(Parser, Debug)]
struct Args {
    /// Milliseconds the profile producer takes.
    #[arg(long, default_value_t = 200)]
    profile_ms: u64,

    /// Milliseconds the feed producer takes.
    #[arg(long, default_value_t = 100)]
    feed_ms: u64,

    /// Give up on the page after this many milliseconds.
    #[arg(short, long, default_value_t = 1000)]
    timeout_ms: u64,
}

fn produce(needs: &Needs<String>, after: Duration, values: &'static [(&'static str, &'static str)]) {
    let needs = needs.clone();

    Executor::spawn(async move {
        let produced = async {
            Timer::sleep(after).await?;

            for (slot, value) in values {
                debug!("producing {slot}");
                needs.keep(slot, value.to_string())?;
            }

            Ok::<(), anyhow::Error>(())
        };

        if let Err(e) = produced.await {
            error!("producer failed: {e:#}");
        }
    });
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let profile = Needs::new(["user", "image"]);
    let feed = Needs::new(["posts"]);

    let page = Needs::new(["user", "avatar", "posts"]);
    page.take_with(&profile, [("image", "avatar")])
        .take(&feed)
        .timeout(Duration::from_millis(args.timeout_ms))
        .on_resolve(|| println!("page settled"));

    produce(
        &profile,
        Duration::from_millis(args.profile_ms),
        &[("user", "ada"), ("image", "ada.png")],
    );
    produce(&feed, Duration::from_millis(args.feed_ms), &[("posts", "3 new posts")]);

    match Executor::block_on(page.settled()) {
        Ok(values) => {
            for (slot, value) in values.iter() {
                println!("{slot}: {}", value.map(String::as_str).unwrap_or("<none>"));
            }
            Ok(())
        }
        Err(failure) => bail!("page failed: {failure}"),
    }
}
