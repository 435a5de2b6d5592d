use std::convert::Infallible;
use std::fmt::{self, Debug, Formatter};
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::config::Config;
use crate::lru::{Lookup, Lru};
use crate::memoize::{cache_accessors, record_insertion};
use crate::stats::{Counters, Stats};

type Weigher<In, Out> = Box<dyn Fn(&In, &Out) -> u64 + Send + Sync>;

/// A cache for a single memoized function, shared between threads.
///
/// The lock only guards the bookkeeping. It is released while the memoized
/// function runs, so calls with different inputs proceed in parallel. Calls
/// with an input whose result is currently being computed wait for that
/// computation instead of starting their own.
pub(crate) struct SharedCache<In, Out> {
    state: Mutex<State<In, Out>>,
    config: Config,
    weigher: Option<Weigher<In, Out>>,
    counters: Counters,
}

struct State<In, Out> {
    /// Retained results.
    lru: Lru<In, Out>,
    /// Computations in progress, by input.
    flights: FxHashMap<In, Arc<Flight<Out>>>,
}

/// A computation in progress.
struct Flight<Out> {
    outcome: Mutex<Outcome<Out>>,
    landed: Condvar,
}

enum Outcome<Out> {
    Pending,
    Done(Out),
    /// The computation returned an error or panicked.
    Failed,
}

impl<Out> Flight<Out> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(Outcome::Pending),
            landed: Condvar::new(),
        }
    }

    fn land(&self, outcome: Outcome<Out>) {
        *self.outcome.lock() = outcome;
        self.landed.notify_all();
    }
}

impl<Out: Clone> Flight<Out> {
    /// Block until the computation finishes. Returns `None` if it failed.
    fn wait(&self) -> Option<Out> {
        let mut outcome = self.outcome.lock();
        while matches!(*outcome, Outcome::Pending) {
            self.landed.wait(&mut outcome);
        }

        match &*outcome {
            Outcome::Done(output) => Some(output.clone()),
            _ => None,
        }
    }
}

/// Marks the flight of the current leader as failed unless it is disarmed,
/// including when the memoized function panics.
struct Landing<'a, In: Hash + Eq, Out> {
    cache: &'a SharedCache<In, Out>,
    input: &'a In,
    flight: Arc<Flight<Out>>,
    armed: bool,
}

impl<In: Hash + Eq, Out> Landing<'_, In, Out> {
    fn disarm(mut self) -> Arc<Flight<Out>> {
        self.armed = false;
        Arc::clone(&self.flight)
    }
}

impl<In: Hash + Eq, Out> Drop for Landing<'_, In, Out> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.state.lock().flights.remove(self.input);
            self.flight.land(Outcome::Failed);
        }
    }
}

impl<In, Out> SharedCache<In, Out> {
    fn new(config: Config) -> Self {
        Self {
            state: Mutex::new(State {
                lru: Lru::with_config(&config),
                flights: FxHashMap::default(),
            }),
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
        self.state.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().lru.is_empty()
    }

    pub fn weight(&self) -> u64 {
        self.state.lock().lru.weight()
    }

    /// Computations in progress are not affected.
    pub fn clear(&self) {
        self.state.lock().lru.clear();
    }

    fn record_hit(&self) {
        tracing::trace!("memoized call hit");
        self.counters.hit();

        #[cfg(feature = "testing")]
        crate::testing::register_hit();
    }
}

impl<In, Out> SharedCache<In, Out>
where
    In: Hash + Eq + Clone,
{
    pub fn contains(&self, input: &In) -> bool {
        self.state.lock().lru.contains(input, self.config.now())
    }

    pub fn invalidate(&self, input: &In) -> bool {
        self.state.lock().lru.remove(input).is_some()
    }

    pub fn purge_expired(&self) -> usize {
        let purged = self.state.lock().lru.purge_expired(self.config.now());
        if purged > 0 {
            tracing::debug!(purged, "purged expired results");
            self.counters.expired(purged);
        }
        purged
    }
}

impl<In, Out> SharedCache<In, Out>
where
    In: Hash + Eq + Clone,
    Out: Clone,
{
    /// Return the cached output for the input or compute and retain it.
    ///
    /// If another thread is already computing the output for an equal input,
    /// this waits for it. Should that computation fail, every waiting caller
    /// retries on its own.
    fn get_or_try_insert<E>(
        &self,
        input: In,
        compute: impl FnOnce(&In) -> Result<Out, E>,
    ) -> Result<Out, E> {
        let flight = loop {
            let pending = {
                let mut state = self.state.lock();
                match state.lru.get(&input, self.config.now()) {
                    Lookup::Hit(output) => {
                        self.record_hit();
                        return Ok(output.clone());
                    }
                    Lookup::Expired => self.counters.expired(1),
                    Lookup::Missing => {}
                }

                match state.flights.get(&input) {
                    Some(pending) => Arc::clone(pending),
                    None => {
                        let flight = Arc::new(Flight::new());
                        state.flights.insert(input.clone(), Arc::clone(&flight));
                        break flight;
                    }
                }
            };

            tracing::trace!("waiting for a concurrent call with the same input");
            if let Some(output) = pending.wait() {
                self.record_hit();
                return Ok(output);
            }

            tracing::trace!("concurrent call with the same input failed, retrying");
        };

        tracing::trace!("memoized call missed");
        self.counters.miss();

        let landing = Landing { cache: self, input: &input, flight, armed: true };
        let output = compute(&input)?;
        let weight = self.weigher.as_ref().map_or(1, |weigh| weigh(&input, &output));
        let flight = landing.disarm();

        let insertion = {
            let mut state = self.state.lock();
            state.flights.remove(&input);
            state.lru.insert(input, output.clone(), weight, self.config.now())
        };

        flight.land(Outcome::Done(output.clone()));
        record_insertion(&self.counters, insertion, weight);

        #[cfg(feature = "testing")]
        crate::testing::register_miss();

        Ok(output)
    }
}

/// A memoized function that can be shared between threads.
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use recall::{Config, SyncMemoized};
///
/// let square = Arc::new(SyncMemoized::new(|x: &u64| x * x, Config::new()));
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let square = Arc::clone(&square);
///         thread::spawn(move || square.call(12))
///     })
///     .collect();
///
/// for handle in handles {
///     assert_eq!(handle.join().unwrap(), 144);
/// }
/// assert_eq!(square.stats().misses, 1);
/// ```
pub struct SyncMemoized<In, Out, F> {
    func: F,
    cache: SharedCache<In, Out>,
}

/// Memoize a function for use from multiple threads.
pub fn wrap_sync<In, Out, F>(func: F, config: Config) -> SyncMemoized<In, Out, F>
where
    In: Hash + Eq + Clone,
    Out: Clone,
    F: Fn(&In) -> Out,
{
    SyncMemoized::new(func, config)
}

impl<In, Out, F> SyncMemoized<In, Out, F> {
    /// Memoize an infallible function.
    pub fn new(func: F, config: Config) -> Self
    where
        F: Fn(&In) -> Out,
    {
        Self { func, cache: SharedCache::new(config) }
    }

    /// Memoize a fallible function. Only successful results are retained.
    pub fn fallible<E>(func: F, config: Config) -> Self
    where
        F: Fn(&In) -> Result<Out, E>,
    {
        Self { func, cache: SharedCache::new(config) }
    }

    /// Weigh each result for capacity accounting instead of counting every
    /// result as one.
    pub fn with_weigher(
        mut self,
        weigher: impl Fn(&In, &Out) -> u64 + Send + Sync + 'static,
    ) -> Self {
        self.cache.weigher = Some(Box::new(weigher));
        self
    }

    cache_accessors!(In: Hash + Eq + Clone);
}

impl<In, Out, F> SyncMemoized<In, Out, F>
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
    pub fn try_call<E>(&self, input: In) -> Result<Out, E>
    where
        F: Fn(&In) -> Result<Out, E>,
    {
        self.cache.get_or_try_insert(input, |input| (self.func)(input))
    }
}

impl<In, Out, F> Debug for SyncMemoized<In, Out, F> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("SyncMemoized")
            .field("config", self.config())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// A memoized recursive function that can be shared between threads.
pub struct SyncRecursive<In, Out, F> {
    body: F,
    cache: SharedCache<In, Out>,
}

impl<In, Out, F> SyncRecursive<In, Out, F>
where
    F: Fn(&dyn Fn(In) -> Out, &In) -> Out,
{
    /// Memoize a recursive function.
    pub fn new(body: F, config: Config) -> Self {
        Self { body, cache: SharedCache::new(config) }
    }

    /// Weigh each result for capacity accounting.
    pub fn with_weigher(
        mut self,
        weigher: impl Fn(&In, &Out) -> u64 + Send + Sync + 'static,
    ) -> Self {
        self.cache.weigher = Some(Box::new(weigher));
        self
    }
}

impl<In, Out, F> SyncRecursive<In, Out, F> {
    cache_accessors!(In: Hash + Eq + Clone);
}

impl<In, Out, F> SyncRecursive<In, Out, F>
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

impl<In, Out, F> Debug for SyncRecursive<In, Out, F> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("SyncRecursive")
            .field("config", self.config())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
