//! Hooks for observing cache behaviour from tests.

use std::cell::Cell;

thread_local! {
    /// Outcome of the most recent memoized call that finished on this thread.
    static LAST_OUTCOME: Cell<Option<bool>> = const { Cell::new(None) };
}

/// Whether the most recent memoized call on this thread was served from a
/// cache.
///
/// Nested calls finish before the call that issued them, so after a
/// recursive call this reflects the outermost one.
pub fn last_was_hit() -> bool {
    LAST_OUTCOME.with(|cell| cell.get()).unwrap_or(false)
}

/// Whether any memoized call finished on this thread yet.
pub fn any_call_finished() -> bool {
    LAST_OUTCOME.with(|cell| cell.get()).is_some()
}

pub(crate) fn register_hit() {
    LAST_OUTCOME.with(|cell| cell.set(Some(true)))
}

pub(crate) fn register_miss() {
    LAST_OUTCOME.with(|cell| cell.set(Some(false)))
}
