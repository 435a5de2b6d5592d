//! Memoization of pure functions with bounded, expiring caches.
//!
//! Wrapping a deterministic, side-effect free function makes repeated calls
//! with an equal input reuse the first call's result:
//!
//! ```
//! use std::time::Duration;
//! use recall::{wrap, Config};
//!
//! let double = wrap(
//!     |x: &u32| x * 2,
//!     Config::new()
//!         .with_capacity(1024)
//!         .with_expiration(Duration::from_secs(60)),
//! );
//!
//! assert_eq!(double.call(5), 10); // Executes the closure.
//! assert_eq!(double.call(5), 10); // Reuses the result.
//! ```
//!
//! - [`Memoized`] and [`Recursive`] are for use on a single thread.
//! - [`SyncMemoized`] and [`SyncRecursive`] can be shared between threads.
//!   Concurrent calls with an equal input compute the result only once.
//! - The [`memoize`] attribute turns a free function into a memoized one.
//!
//! Results are retained until they are evicted to make room for others, as
//! governed by the [`Config`]'s capacity, or until they go unused for longer
//! than its expiration window. Errors returned by fallible functions are never
//! retained.

mod clock;
mod config;
mod lru;
mod memoize;
mod stats;
mod sync;
#[cfg(feature = "testing")]
mod testing;

pub use crate::clock::{Clock, SystemClock};
pub use crate::config::{Config, ConfigError};
pub use crate::memoize::{wrap, Memoized, Recursive};
pub use crate::stats::Stats;
pub use crate::sync::{wrap_sync, SyncMemoized, SyncRecursive};

#[cfg(feature = "testing")]
pub use crate::clock::ManualClock;

#[cfg(feature = "macros")]
pub use recall_macros::memoize;

/// These are implementation details. Do not rely on them!
#[doc(hidden)]
pub mod internal {
    pub use std::sync::LazyLock;

    #[cfg(feature = "testing")]
    pub use crate::testing::{any_call_finished, last_was_hit};

    /// Ensure a type is suitable as the input of a memoized free function.
    pub fn assert_memoizable<T: std::hash::Hash + Eq + Clone + Send + 'static>() {}

    /// Ensure a type is suitable as the output of a memoized free function.
    pub fn assert_output<T: Clone + Send + 'static>() {}
}
