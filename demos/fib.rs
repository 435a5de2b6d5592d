//! Memoizing a self-referential function.

use recall::{Config, Recursive};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let fib = Recursive::new(
        |fib: &dyn Fn(u64) -> u64, n: &u64| {
            if *n <= 2 { 1 } else { fib(n - 1) + fib(n - 2) }
        },
        Config::new(),
    );

    for n in [3, 10, 50, 90] {
        println!("fib({n}) = {}", fib.call(n));
    }

    println!("{:?}", fib.stats());
}
