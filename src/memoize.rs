use std::cell::RefCell;
use std::convert::Infallible;
use std::fmt::{self, Debug, Formatter};
use std::hash::Hash;

use crate::config::Config;
use crate::lru::{Insertion, Lookup, Lru};
use crate::stats::{Counters, Stats};

/// Generates the inspection methods shared by all memoized wrappers. Each
/// wrapper forwards to its `cache` field.
macro_rules! cache_accessors {
    ($($bounds:tt)*) => {
        /// Counters for hits, misses and dropped entries.
        pub fn stats(&self) -> $crate::Stats {
            self.cache.stats()
        }

        /// The configuration the cache was built with.
        pub fn config(&self) -> &$crate::Config {
            self.cache.config()
        }

        /// The number of retained results.
        ///
        /// Expired results are only dropped when they are looked up or
        /// purged, so they may still be counted here.
        pub fn len(&self) -> usize {
            self.cache.len()
        }

        /// Whether no results are retained.
        pub fn is_empty(&self) -> bool {
            self.cache.is_empty()
        }

        /// The summed weight of all retained results.
        pub fn weight(&self) -> u64 {
            self.cache.weight()
        }

        /// Whether a live result is retained for the input. This does not
        /// count as a use.
        pub fn contains(&self, input: &In) -> bool
        where
            $($bounds)*
        {
            self.cache.contains(input)
        }

        /// Forget the result for one input. Returns whether there was one.
        pub fn invalidate(&self, input: &In) -> bool
        where
            $($bounds)*
        {
            self.cache.invalidate(input)
        }

        /// Drop all expired results now instead of on their next lookup.
        pub fn purge_expired(&self) -> usize
        where
            $($bounds)*
        {
            self.cache.purge_expired()
        }

        /// Forget all results.
        pub fn clear(&self) {
            self.cache.clear()
        }
    };
}

pub(crate) use cache_accessors;

/// Update the counters after an insertion.
pub(crate) fn record_insertion(counters: &Counters, insertion: Insertion, weight: u64) {
    match insertion {
        Insertion::Retained { evicted: 0 } => {}
        Insertion::Retained { evicted } => {
            tracing::debug!(evicted, weight, "evicted least recently used results");
            counters.evicted(evicted);
        }
        Insertion::Rejected => {
            tracing::debug!(weight, "result is heavier than the capacity, not retaining it");
            counters.rejected();
        }
    }
}

type Weigher<In, Out> = Box<dyn Fn(&In, &Out) -> u64>;

/// A cache for a single memoized function on a single thread.
///
/// The store is never borrowed while the memoized function runs, so the
/// function may call back into the same cache.
pub(crate) struct LocalCache<In, Out> {
    lru: RefCell<Lru<In, Out>>,
    config: Config,
    weigher: Option<Weigher<In, Out>>,
    counters: Counters,
}

impl<In, Out> LocalCache<In, Out> {
    fn new(config: Config) -> Self {
        Self {
            lru: RefCell::new(Lru::with_config(&config)),
            config,
            weigher: None,
            counters: Counters::default(),
        }
    }

    pub fn stats(&self) -> Stats {
        self.counters.snapshot()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.lru.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.borrow().is_empty()
    }

    pub fn weight(&self) -> u64 {
        self.lru.borrow().weight()
    }

    pub fn clear(&self) {
        self.lru.borrow_mut().clear();
    }
}

impl<In, Out> LocalCache<In, Out>
where
    In: Hash + Eq + Clone,
{
    pub fn contains(&self, input: &In) -> bool {
        self.lru.borrow().contains(input, self.config.now())
    }

    pub fn invalidate(&self, input: &In) -> bool {
        self.lru.borrow_mut().remove(input).is_some()
    }

    pub fn purge_expired(&self) -> usize {
        let purged = self.lru.borrow_mut().purge_expired(self.config.now());
        if purged > 0 {
            tracing::debug!(purged, "purged expired results");
            self.counters.expired(purged);
        }
        purged
    }
}

impl<In, Out> LocalCache<In, Out>
where
    In: Hash + Eq + Clone,
    Out: Clone,
{
    /// Return the cached output for the input or compute and retain it.
    ///
    /// Errors from `compute` are passed through and nothing is retained.
    fn get_or_try_insert<E>(
        &self,
        input: In,
        compute: impl FnOnce(&In) -> Result<Out, E>,
    ) -> Result<Out, E> {
        let cached = match self.lru.borrow_mut().get(&input, self.config.now()) {
            Lookup::Hit(output) => Some(output.clone()),
            Lookup::Expired => {
                self.counters.expired(1);
                None
            }
            Lookup::Missing => None,
        };

        if let Some(output) = cached {
            tracing::trace!("memoized call hit");
            self.counters.hit();

            #[cfg(feature = "testing")]
            crate::testing::register_hit();

            return Ok(output);
        }

        tracing::trace!("memoized call missed");
        self.counters.miss();

        let output = compute(&input)?;

        let weight = self.weigher.as_ref().map_or(1, |weigh| weigh(&input, &output));
        let insertion = {
            let mut lru = self.lru.borrow_mut();
            lru.insert(input, output.clone(), weight, self.config.now())
        };
        record_insertion(&self.counters, insertion, weight);

        #[cfg(feature = "testing")]
        crate::testing::register_miss();

        Ok(output)
    }
}

/// A memoized function for use on a single thread.
///
/// ```
/// use recall::{Config, Memoized};
///
/// let double = Memoized::new(|x: &u32| x * 2, Config::new());
/// assert_eq!(double.call(5), 10);
/// assert_eq!(double.call(5), 10);
/// assert_eq!(double.stats().misses, 1);
/// ```
pub struct Memoized<In, Out, F> {
    func: F,
    cache: LocalCache<In, Out>,
}

/// Memoize a function for use on a single thread.
pub fn wrap<In, Out, F>(func: F, config: Config) -> Memoized<In, Out, F>
where
    In: Hash + Eq + Clone,
    Out: Clone,
    F: Fn(&In) -> Out,
{
    Memoized::new(func, config)
}

impl<In, Out, F> Memoized<In, Out, F> {
    /// Memoize an infallible function.
    pub fn new(func: F, config: Config) -> Self
    where
        F: Fn(&In) -> Out,
    {
        Self { func, cache: LocalCache::new(config) }
    }

    /// Memoize a fallible function. Only successful results are retained.
    pub fn fallible<E>(func: F, config: Config) -> Self
    where
        F: Fn(&In) -> Result<Out, E>,
    {
        Self { func, cache: LocalCache::new(config) }
    }

    /// Weigh each result for capacity accounting instead of counting every
    /// result as one.
    pub fn with_weigher(mut self, weigher: impl Fn(&In, &Out) -> u64 + 'static) -> Self {
        self.cache.weigher = Some(Box::new(weigher));
        self
    }

    cache_accessors!(In: Hash + Eq + Clone);
}

impl<In, Out, F> Memoized<In, Out, F>
where
    In: Hash + Eq + Clone,
    Out: Clone,
{
    /// Call the function or reuse a retained result.
    pub fn call(&self, input: In) -> Out
    where
        F: Fn(&In) -> Out,
    {
        let result = self
            .cache
            .get_or_try_insert(input, |input| Ok::<_, Infallible>((self.func)(input)));
        match result {
            Ok(output) => output,
            Err(never) => match never {},
        }
    }

    /// Call the fallible function or reuse a retained result.
    ///
    /// An error is returned as is and the next call with the same input runs
    /// the function again.
    pub fn try_call<E>(&self, input: In) -> Result<Out, E>
    where
        F: Fn(&In) -> Result<Out, E>,
    {
        self.cache.get_or_try_insert(input, |input| (self.func)(input))
    }
}

impl<In, Out, F> Debug for Memoized<In, Out, F> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("config", self.config())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// A memoized recursive function for use on a single thread.
///
/// The body receives a handle through which it recurses. Recursive calls go
/// through the cache just like outer ones.
///
/// ```
/// use recall::{Config, Recursive};
///
/// let fib = Recursive::new(
///     |fib: &dyn Fn(u64) -> u64, n: &u64| {
///         if *n <= 2 { 1 } else { fib(n - 1) + fib(n - 2) }
///     },
///     Config::new(),
/// );
///
/// assert_eq!(fib.call(90), 2880067194370816120);
/// ```
pub struct Recursive<In, Out, F> {
    body: F,
    cache: LocalCache<In, Out>,
}

impl<In, Out, F> Recursive<In, Out, F>
where
    F: Fn(&dyn Fn(In) -> Out, &In) -> Out,
{
    /// Memoize a recursive function.
    pub fn new(body: F, config: Config) -> Self {
        Self { body, cache: LocalCache::new(config) }
    }

    /// Weigh each result for capacity accounting.
    pub fn with_weigher(mut self, weigher: impl Fn(&In, &Out) -> u64 + 'static) -> Self {
        self.cache.weigher = Some(Box::new(weigher));
        self
    }
}

impl<In, Out, F> Recursive<In, Out, F> {
    cache_accessors!(In: Hash + Eq + Clone);
}

impl<In, Out, F> Recursive<In, Out, F>
where
    In: Hash + Eq + Clone,
    Out: Clone,
    F: Fn(&dyn Fn(In) -> Out, &In) -> Out,
{
    /// Call the function or reuse a retained result.
    pub fn call(&self, input: In) -> Out {
        let recurse: &dyn Fn(In) -> Out = &|input| self.call(input);
        let result = self
            .cache
            .get_or_try_insert(input, |input| Ok::<_, Infallible>((self.body)(recurse, input)));
        match result {
            Ok(output) => output,
            Err(never) => match never {},
        }
    }
}

impl<In, Out, F> Debug for Recursive<In, Out, F> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Recursive")
            .field("config", self.config())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
