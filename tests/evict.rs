use std::sync::atomic::{AtomicUsize, Ordering};

use recall::memoize;

static CALLS: AtomicUsize = AtomicUsize::new(0);

fn calls() -> usize {
    CALLS.load(Ordering::SeqCst)
}

#[test]
fn test_evict() {
    square(1); // [Miss]
    square(1); // [Hit]
    square(2); // [Miss]
    square(1); // [Hit]
    assert_eq!(calls(), 2);
    square(3); // [Miss] Evicts 2, the least recently used.
    square(1); // [Hit]
    assert_eq!(calls(), 3);
    square(2); // [Miss] Evicts 3.
    square(3); // [Miss] Evicts 1.
    square(1); // [Miss]
    assert_eq!(calls(), 6);
}

#[memoize(capacity = 2)]
fn square(x: u32) -> u32 {
    CALLS.fetch_add(1, Ordering::SeqCst);
    x * x
}
