//! This example demonstrates the three flavours of memoization: a plain
//! single-threaded wrapper, a thread-safe one and a bounded, expiring one.
//!
//! Run with `RUST_LOG=recall=trace cargo run --example basic` to watch hits,
//! misses and evictions.

use std::thread;
use std::time::Duration;

use recall::{memoize, wrap, wrap_sync, Config};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // A plain cache that keeps everything.
    let double = wrap(|x: &u32| 2 * x, Config::new());
    double.call(2); // [Miss] The cache is empty.
    double.call(4); // [Miss] Different number.
    double.call(2); // [Hit] Same number as initially.
    println!("double: {:?}", double.stats());

    // A cache shared between threads.
    let length = wrap_sync(|s: &String| s.chars().count(), Config::new());
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| length.call("Grüße".into()));
        }
    });
    println!("length: {:?}", length.stats());

    // A cache that holds at most two results, each for at most a second.
    let config: Config = "capacity = 2, expiration = 1s".parse().expect("valid configuration");
    let negate = wrap(|x: &i64| -x, config);
    negate.call(1); // [Miss]
    negate.call(2); // [Miss]
    negate.call(3); // [Miss] Evicts 1.
    negate.call(1); // [Miss] Evicts 2.
    thread::sleep(Duration::from_millis(1100));
    negate.call(1); // [Miss] Expired.
    println!("negate: {:?}", negate.stats());

    // The attribute works on free functions.
    sum(2, 4); // [Miss] The cache is empty.
    sum(2, 3); // [Miss] Different numbers.
    sum(2, 3); // [Hit]  Same numbers
}

/// Compute the sum of two numbers.
#[memoize(capacity = 16)]
fn sum(a: u32, b: u32) -> u32 {
    a + b
}
