use std::fmt::{self, Debug, Formatter};
use std::num::NonZeroU64;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};

/// Retention policy of a memoized function's cache.
///
/// The default configuration retains every result forever. A capacity bounds
/// the summed weight of retained results and an expiration evicts results that
/// have not been used for a while.
///
/// ```
/// use std::time::Duration;
/// use recall::Config;
///
/// let config = Config::new()
///     .with_capacity(128)
///     .with_expiration(Duration::from_secs(30));
///
/// let parsed: Config = "capacity = 128, expiration = 30s".parse().unwrap();
/// assert_eq!(config.capacity(), parsed.capacity());
/// assert_eq!(config.expiration(), parsed.expiration());
/// ```
#[derive(Clone)]
pub struct Config {
    /// Maximum summed weight of all retained entries.
    capacity: Option<NonZeroU64>,
    /// Sliding expiration window.
    expiration: Option<Duration>,
    /// Where the current time comes from.
    clock: Arc<dyn Clock>,
}

impl Config {
    /// An unbounded, never expiring configuration.
    pub fn new() -> Self {
        Self {
            capacity: None,
            expiration: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Bound the summed weight of retained entries.
    ///
    /// A capacity of zero means unbounded.
    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = NonZeroU64::new(capacity);
        self
    }

    /// Evict entries that have not been accessed within `expiration`.
    ///
    /// A zero duration means entries never expire.
    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = (!expiration.is_zero()).then_some(expiration);
        self
    }

    /// Read time from a different clock.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The capacity, if bounded.
    pub fn capacity(&self) -> Option<u64> {
        self.capacity.map(NonZeroU64::get)
    }

    /// The expiration window, if any.
    pub fn expiration(&self) -> Option<Duration> {
        self.expiration
    }

    /// Whether neither a capacity nor an expiration is set.
    pub fn is_unbounded(&self) -> bool {
        self.capacity.is_none() && self.expiration.is_none()
    }

    /// The current time according to the configured clock.
    pub(crate) fn now(&self) -> Instant {
        self.clock.now()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Config")
            .field("capacity", &self.capacity())
            .field("expiration", &self.expiration)
            .field("clock", &self.clock)
            .finish()
    }
}

/// An invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("capacity must not be negative, found `{0}`")]
    NegativeCapacity(String),
    #[error("invalid capacity `{0}`")]
    InvalidCapacity(String),
    #[error("expiration must not be negative, found `{0}`")]
    NegativeExpiration(String),
    #[error("invalid duration `{0}`, expected an integer with a unit (ns, us, ms, s, m, h)")]
    InvalidDuration(String),
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    #[error("option `{0}` is given more than once")]
    DuplicateOption(String),
    #[error("expected `key = value`, found `{0}`")]
    Malformed(String),
}

/// Parses the textual form `capacity = 100, expiration = 250ms`.
///
/// Both options are optional. `capacity = unbounded` and `expiration = never`
/// spell out the defaults.
impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Config::new();
        let mut seen_capacity = false;
        let mut seen_expiration = false;

        for part in s.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            let Some((key, value)) = part.split_once('=') else {
                return Err(ConfigError::Malformed(part.into()));
            };

            let (key, value) = (key.trim(), value.trim());
            match key {
                "capacity" => {
                    if std::mem::replace(&mut seen_capacity, true) {
                        return Err(ConfigError::DuplicateOption(key.into()));
                    }
                    config = config.with_capacity(parse_capacity(value)?);
                }
                "expiration" => {
                    if std::mem::replace(&mut seen_expiration, true) {
                        return Err(ConfigError::DuplicateOption(key.into()));
                    }
                    config = config.with_expiration(parse_expiration(value)?);
                }
                _ => return Err(ConfigError::UnknownOption(key.into())),
            }
        }

        Ok(config)
    }
}

fn parse_capacity(value: &str) -> Result<u64, ConfigError> {
    if value == "unbounded" {
        return Ok(0);
    }

    match value.parse::<i128>() {
        Ok(n) if n < 0 => Err(ConfigError::NegativeCapacity(value.into())),
        Ok(n) => u64::try_from(n).map_err(|_| ConfigError::InvalidCapacity(value.into())),
        Err(_) => Err(ConfigError::InvalidCapacity(value.into())),
    }
}

fn parse_expiration(value: &str) -> Result<Duration, ConfigError> {
    if value == "never" {
        return Ok(Duration::ZERO);
    }

    if value.starts_with('-') {
        return Err(ConfigError::NegativeExpiration(value.into()));
    }

    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration(value.into()))
}

/// Parse an integer followed by a unit, like `250ms` or `2 h`.
fn parse_duration(value: &str) -> Option<Duration> {
    let split = value.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = value.split_at(split);
    let n: u64 = digits.parse().ok()?;
    Some(match unit.trim() {
        "ns" => Duration::from_nanos(n),
        "us" | "µs" => Duration::from_micros(n),
        "ms" => Duration::from_millis(n),
        "s" => Duration::from_secs(n),
        "m" => Duration::from_secs(n.checked_mul(60)?),
        "h" => Duration::from_secs(n.checked_mul(3600)?),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_means_unbounded() {
        let config = Config::new().with_capacity(0).with_expiration(Duration::ZERO);
        assert!(config.is_unbounded());
        assert_eq!(config.capacity(), None);
        assert_eq!(config.expiration(), None);
    }

    #[test]
    fn test_parse() {
        let config: Config = "capacity=3, expiration = 250ms".parse().unwrap();
        assert_eq!(config.capacity(), Some(3));
        assert_eq!(config.expiration(), Some(Duration::from_millis(250)));

        let config: Config = "expiration=2 h".parse().unwrap();
        assert_eq!(config.capacity(), None);
        assert_eq!(config.expiration(), Some(Duration::from_secs(7200)));

        let config: Config = "capacity = unbounded, expiration = never".parse().unwrap();
        assert!(config.is_unbounded());

        let config: Config = "".parse().unwrap();
        assert!(config.is_unbounded());
    }

    #[test]
    fn test_parse_errors() {
        let err = |s: &str| s.parse::<Config>().unwrap_err();
        assert_eq!(err("capacity=-1"), ConfigError::NegativeCapacity("-1".into()));
        assert_eq!(err("capacity=lots"), ConfigError::InvalidCapacity("lots".into()));
        assert_eq!(
            err("expiration=-5s"),
            ConfigError::NegativeExpiration("-5s".into())
        );
        assert_eq!(err("expiration=5"), ConfigError::InvalidDuration("5".into()));
        assert_eq!(err("expiration=5 days"), ConfigError::InvalidDuration("5 days".into()));
        assert_eq!(err("size=5"), ConfigError::UnknownOption("size".into()));
        assert_eq!(
            err("capacity=1,capacity=2"),
            ConfigError::DuplicateOption("capacity".into())
        );
        assert_eq!(err("capacity"), ConfigError::Malformed("capacity".into()));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ConfigError::NegativeCapacity("-1".into()).to_string(),
            "capacity must not be negative, found `-1`"
        );
    }
}
