//! Run with `cargo test --all-features`.

use std::cell::Cell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use quickcheck_macros::quickcheck;
use recall::{memoize, wrap, Config, ManualClock, Memoized, Recursive, SyncMemoized};
use serial_test::serial;

macro_rules! test {
    (miss: $call:expr, $result:expr) => {{
        assert_eq!($call, $result);
        assert!(!recall::internal::last_was_hit());
    }};
    (hit: $call:expr, $result:expr) => {{
        assert_eq!($call, $result);
        assert!(recall::internal::last_was_hit());
    }};
}

/// Test basic memoization through the attribute.
#[test]
#[serial]
fn test_basic() {
    #[memoize]
    fn empty() -> String {
        format!("The world is {}", "big")
    }

    #[memoize]
    fn double(x: u32) -> u32 {
        2 * x
    }

    #[memoize]
    fn sum(a: u32, b: u32) -> u32 {
        a + b
    }

    #[memoize]
    fn fib(n: u32) -> u32 {
        if n <= 2 { 1 } else { fib(n - 1) + fib(n - 2) }
    }

    #[memoize]
    fn sum_iter(n: u32) -> u32 {
        (0..n).sum()
    }

    test!(miss: empty(), "The world is big");
    test!(hit: empty(), "The world is big");
    test!(hit: empty(), "The world is big");

    test!(miss: double(2), 4);
    test!(miss: double(4), 8);
    test!(hit: double(2), 4);

    test!(miss: sum(2, 4), 6);
    test!(miss: sum(2, 3), 5);
    test!(hit: sum(2, 3), 5);
    test!(miss: sum(4, 2), 6);

    test!(miss: fib(5), 5);
    test!(hit: fib(3), 2);
    test!(miss: fib(8), 21);
    test!(hit: fib(7), 13);

    test!(miss: sum_iter(1000), 499500);
    test!(hit: sum_iter(1000), 499500);
}

/// Test that an unbounded wrapper runs the function once per input.
#[test]
#[serial]
fn test_unbounded_wrapper() {
    let calls = Cell::new(0);
    let double = wrap(
        |x: &i64| {
            calls.set(calls.get() + 1);
            x * 2
        },
        Config::new(),
    );

    test!(miss: double.call(5), 10);
    assert_eq!(calls.get(), 1);
    test!(hit: double.call(5), 10);
    assert_eq!(calls.get(), 1);
    test!(miss: double.call(7), 14);
    assert_eq!(calls.get(), 2);
}

/// Test that recursive calls go through the cache.
#[test]
#[serial]
fn test_recursive_fibonacci() {
    let calls = Cell::new(0);
    let fib = Recursive::new(
        |fib: &dyn Fn(u32) -> u32, n: &u32| {
            calls.set(calls.get() + 1);
            if *n <= 2 { 1 } else { fib(n - 1) + fib(n - 2) }
        },
        Config::new(),
    );

    test!(miss: fib.call(3), 2);
    assert_eq!(calls.get(), 3);
    test!(hit: fib.call(3), 2);
    assert_eq!(calls.get(), 3);
    test!(miss: fib.call(10), 55);
    assert_eq!(calls.get(), 10);
}

/// Test that caching one input does not affect another.
#[test]
#[serial]
fn test_inputs_are_independent() {
    let seen = std::cell::RefCell::new(vec![]);
    let upper = wrap(
        |s: &String| {
            seen.borrow_mut().push(s.clone());
            s.to_uppercase()
        },
        Config::new(),
    );

    test!(miss: upper.call("a".into()), "A");
    test!(miss: upper.call("b".into()), "B");
    test!(hit: upper.call("a".into()), "A");
    assert_eq!(*seen.borrow(), ["a", "b"]);
}

/// Test that entries expire after going unused.
#[test]
#[serial]
fn test_sliding_expiration() {
    let clock = ManualClock::new();
    let negate = wrap(
        |x: &i32| -x,
        Config::new()
            .with_expiration(Duration::from_secs(60))
            .with_clock(clock.clone()),
    );

    test!(miss: negate.call(1), -1);
    clock.advance(Duration::from_secs(45));
    test!(hit: negate.call(1), -1);
    clock.advance(Duration::from_secs(45));
    test!(hit: negate.call(1), -1);
    clock.advance(Duration::from_secs(61));
    test!(miss: negate.call(1), -1);
    test!(hit: negate.call(1), -1);
    assert_eq!(negate.stats().expirations, 1);
}

/// Test that the least recently used entry is evicted first.
#[test]
#[serial]
fn test_capacity_evicts_least_recently_used() {
    let calls = Cell::new(0);
    let id = wrap(
        |x: &u8| {
            calls.set(calls.get() + 1);
            *x
        },
        Config::new().with_capacity(3),
    );

    test!(miss: id.call(1), 1);
    test!(miss: id.call(2), 2);
    test!(miss: id.call(3), 3);
    test!(hit: id.call(1), 1);
    test!(miss: id.call(4), 4);
    assert_eq!(id.len(), 3);
    assert!(!id.contains(&2));
    test!(hit: id.call(1), 1);
    test!(hit: id.call(3), 3);
    test!(miss: id.call(2), 2);
    assert!(!id.contains(&4));
    assert_eq!(calls.get(), 5);
    assert_eq!(id.stats().evictions, 2);
}

/// Test that a result heavier than the capacity is returned but not retained.
#[test]
#[serial]
fn test_oversized_results_are_returned() {
    let bytes = wrap(|n: &usize| vec![0u8; *n], Config::new().with_capacity(64))
        .with_weigher(|_, bytes: &Vec<u8>| bytes.len() as u64);

    test!(miss: bytes.call(32).len(), 32);
    test!(miss: bytes.call(100).len(), 100);
    test!(miss: bytes.call(100).len(), 100);
    test!(hit: bytes.call(32).len(), 32);
    assert_eq!(bytes.weight(), 32);
    assert_eq!(bytes.stats().rejections, 2);
}

/// Test that failures are never memoized.
#[test]
#[serial]
fn test_failures_are_retried() {
    let attempts = Cell::new(0);
    let parse = Memoized::fallible(
        |s: &String| {
            attempts.set(attempts.get() + 1);
            s.parse::<i32>()
        },
        Config::new(),
    );

    assert!(parse.try_call("x".into()).is_err());
    assert!(parse.try_call("x".into()).is_err());
    assert_eq!(attempts.get(), 2);
    assert!(parse.is_empty());

    assert_eq!(parse.try_call("12".into()), Ok(12));
    assert_eq!(parse.try_call("12".into()), Ok(12));
    assert!(recall::internal::last_was_hit());
    assert_eq!(attempts.get(), 3);
}

/// Test retention options on the attribute.
#[test]
#[serial]
fn test_attribute_options() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    #[memoize(capacity = 2)]
    fn triple(x: u64) -> u64 {
        CALLS.fetch_add(1, Ordering::SeqCst);
        3 * x
    }

    static CLOCK: LazyLock<ManualClock> = LazyLock::new(ManualClock::new);

    #[memoize(expiration = Duration::from_millis(100), clock = CLOCK.clone())]
    fn label(x: u64) -> String {
        format!("#{x}")
    }

    test!(miss: triple(1), 3);
    test!(miss: triple(2), 6);
    test!(miss: triple(3), 9);
    test!(miss: triple(1), 3);
    test!(hit: triple(3), 9);
    assert_eq!(CALLS.load(Ordering::SeqCst), 4);

    test!(miss: label(1), "#1");
    CLOCK.advance(Duration::from_millis(100));
    test!(hit: label(1), "#1");
    CLOCK.advance(Duration::from_millis(101));
    test!(miss: label(1), "#1");
}

/// Test that memoized functions can be called from many threads.
#[test]
#[serial]
fn test_threads_share_results() {
    let calls = AtomicUsize::new(0);
    let square = SyncMemoized::new(
        |x: &u64| {
            calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            x * x
        },
        Config::new().with_capacity(100),
    );

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for x in 0..20 {
                    assert_eq!(square.call(x), x * x);
                }
            });
        }
    });

    assert_eq!(calls.load(Ordering::SeqCst), 20);
    assert_eq!(square.len(), 20);
}

/// A memoized function always agrees with the function it wraps and runs it
/// at most once per distinct input.
#[quickcheck]
fn prop_agrees_with_function(capacity: u8, inputs: Vec<u16>) -> bool {
    let calls = Cell::new(0);
    let hash = Memoized::new(
        |x: &u16| {
            calls.set(calls.get() + 1);
            u32::from(*x).wrapping_mul(2654435761)
        },
        Config::new().with_capacity(u64::from(capacity)),
    );

    let distinct: HashSet<_> = inputs.iter().copied().collect();
    let agrees = inputs
        .iter()
        .all(|&x| hash.call(x) == u32::from(x).wrapping_mul(2654435761));

    let bounded = capacity == 0 || hash.len() <= usize::from(capacity);
    let once = capacity != 0 || calls.get() == distinct.len();
    agrees && bounded && once
}
