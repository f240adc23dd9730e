//! Cache configuration, defaults, and TTL sentinels.
//!
//! `CacheConfig` follows zero-value defaulting: a field left at its zero
//! value (`0`, `Duration::ZERO`, `""`, `None`) means "use the default", so
//! callers override only what they care about via struct-update syntax:
//!
//! ```
//! use shardcache::config::CacheConfig;
//!
//! let config = CacheConfig {
//!     segment_count: 16,
//!     ..CacheConfig::default()
//! };
//! assert_eq!(config.segment_capacity, 0); // defaults to 1000 at build time
//! ```
//!
//! The only input that fails construction outright is a segment count that is
//! not a power of two (the shard mask requires one). Everything else is
//! silently defaulted, including an unrecognized eviction-policy name: such a
//! cache is built and stores items, but `get` exposes none of them.
//!
//! ## TTL sentinels
//!
//! Per-entry lifetimes are expressed with [`Ttl`] rather than a bare
//! duration, so "use the cache default" and "never expire" are distinct
//! intents at the call site. `Ttl::After(Duration::ZERO)` behaves as
//! [`Ttl::Never`], as does [`Ttl::Default`] when the cache-wide default is
//! zero.

use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;
use crate::hash::{fnv32_factory, HashFactory};

/// Default number of segments (shards). Must stay a power of two.
pub const DEFAULT_SEGMENT_COUNT: usize = 512;
/// Default per-segment item capacity.
pub const DEFAULT_SEGMENT_CAPACITY: usize = 1000;
/// Default eviction policy name.
pub const DEFAULT_EVICTION_POLICY: &str = "LRU";

/// Per-entry time-to-live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Expire after the cache-wide default TTL (never, if that default is
    /// zero).
    Default,
    /// Never expire.
    Never,
    /// Expire after the given duration. `Duration::ZERO` behaves as
    /// [`Ttl::Never`].
    After(Duration),
}

impl Ttl {
    /// Resolves this sentinel to an absolute expiration in nanoseconds since
    /// the UNIX epoch; 0 means "never expires".
    pub(crate) fn expiration_from(self, now: u64, default_ttl: Duration) -> u64 {
        match self {
            Ttl::Never => 0,
            Ttl::Default => deadline(now, default_ttl),
            Ttl::After(span) => deadline(now, span),
        }
    }
}

impl From<Duration> for Ttl {
    fn from(span: Duration) -> Self {
        if span.is_zero() {
            Ttl::Never
        } else {
            Ttl::After(span)
        }
    }
}

fn deadline(now: u64, span: Duration) -> u64 {
    if span.is_zero() {
        return 0;
    }
    let span = u64::try_from(span.as_nanos()).unwrap_or(u64::MAX);
    now.saturating_add(span)
}

/// Eviction policy resolved from the configured name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Policy {
    Lru,
    Fifo,
    /// Unknown policy name. The cache stores items but serves no reads.
    Unrecognized,
}

impl Policy {
    pub(crate) fn parse(name: &str) -> Policy {
        match name {
            "LRU" => Policy::Lru,
            "FIFO" => Policy::Fifo,
            _ => Policy::Unrecognized,
        }
    }
}

/// Configuration for [`Cache::new`](crate::cache::Cache::new).
#[derive(Clone)]
pub struct CacheConfig {
    /// Number of segments; 0 defaults to [`DEFAULT_SEGMENT_COUNT`]. The
    /// effective count must be a power of two or construction fails.
    pub segment_count: usize,
    /// Maximum item count per segment (not for the cache as a whole); 0
    /// defaults to [`DEFAULT_SEGMENT_CAPACITY`].
    pub segment_capacity: usize,
    /// TTL applied to entries set with [`Ttl::Default`]. `Duration::ZERO`
    /// means such entries never expire.
    pub default_ttl: Duration,
    /// Hasher used to route keys to segments; `None` selects FNV-1 32-bit.
    pub hash_factory: Option<HashFactory>,
    /// Eviction policy name: `"LRU"`, `"FIFO"`, or `""` for the default.
    /// Any other name builds a cache whose `get` serves nothing.
    pub eviction_policy: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            segment_count: 0,
            segment_capacity: 0,
            default_ttl: Duration::ZERO,
            hash_factory: None,
            eviction_policy: String::new(),
        }
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("segment_count", &self.segment_count)
            .field("segment_capacity", &self.segment_capacity)
            .field("default_ttl", &self.default_ttl)
            .field("hash_factory", &self.hash_factory.as_ref().map(|_| "<fn>"))
            .field("eviction_policy", &self.eviction_policy)
            .finish()
    }
}

/// Configuration with defaults applied and the policy name parsed.
pub(crate) struct ResolvedConfig {
    pub(crate) segment_count: usize,
    pub(crate) segment_capacity: usize,
    pub(crate) default_ttl: Duration,
    pub(crate) hash_factory: HashFactory,
    pub(crate) policy: Policy,
}

impl fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("segment_count", &self.segment_count)
            .field("segment_capacity", &self.segment_capacity)
            .field("default_ttl", &self.default_ttl)
            .field("hash_factory", &"<fn>")
            .field("policy", &self.policy)
            .finish()
    }
}

impl CacheConfig {
    pub(crate) fn resolve(self) -> Result<ResolvedConfig, ConfigError> {
        let segment_count = if self.segment_count == 0 {
            DEFAULT_SEGMENT_COUNT
        } else {
            self.segment_count
        };
        if !segment_count.is_power_of_two() {
            return Err(ConfigError::new("cache segment count must be a power of 2"));
        }

        let segment_capacity = if self.segment_capacity == 0 {
            DEFAULT_SEGMENT_CAPACITY
        } else {
            self.segment_capacity
        };

        let policy_name = if self.eviction_policy.is_empty() {
            DEFAULT_EVICTION_POLICY
        } else {
            &self.eviction_policy
        };

        Ok(ResolvedConfig {
            segment_count,
            segment_capacity,
            default_ttl: self.default_ttl,
            hash_factory: self.hash_factory.unwrap_or_else(fnv32_factory),
            policy: Policy::parse(policy_name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_fields_take_defaults() {
        let resolved = CacheConfig::default().resolve().unwrap();
        assert_eq!(resolved.segment_count, DEFAULT_SEGMENT_COUNT);
        assert_eq!(resolved.segment_capacity, DEFAULT_SEGMENT_CAPACITY);
        assert_eq!(resolved.default_ttl, Duration::ZERO);
        assert_eq!(resolved.policy, Policy::Lru);
    }

    #[test]
    fn explicit_fields_survive_resolution() {
        let resolved = CacheConfig {
            segment_count: 8,
            segment_capacity: 64,
            default_ttl: Duration::from_secs(30),
            hash_factory: None,
            eviction_policy: "FIFO".into(),
        }
        .resolve()
        .unwrap();
        assert_eq!(resolved.segment_count, 8);
        assert_eq!(resolved.segment_capacity, 64);
        assert_eq!(resolved.default_ttl, Duration::from_secs(30));
        assert_eq!(resolved.policy, Policy::Fifo);
    }

    #[test]
    fn non_power_of_two_segment_count_is_rejected() {
        for count in [3, 7, 100, 513] {
            let err = CacheConfig {
                segment_count: count,
                ..CacheConfig::default()
            }
            .resolve()
            .unwrap_err();
            assert!(err.message().contains("power of 2"));
        }

        // 1 is a power of two and therefore valid.
        assert!(CacheConfig {
            segment_count: 1,
            ..CacheConfig::default()
        }
        .resolve()
        .is_ok());
    }

    #[test]
    fn unknown_policy_name_resolves_to_unrecognized() {
        let resolved = CacheConfig {
            eviction_policy: "CLOCK".into(),
            ..CacheConfig::default()
        }
        .resolve()
        .unwrap();
        assert_eq!(resolved.policy, Policy::Unrecognized);

        // Policy names are case-sensitive.
        assert_eq!(Policy::parse("lru"), Policy::Unrecognized);
    }

    #[test]
    fn ttl_resolution() {
        let now = 1_000_000;
        let default = Duration::from_nanos(500);

        assert_eq!(Ttl::Never.expiration_from(now, default), 0);
        assert_eq!(Ttl::Default.expiration_from(now, default), 1_000_500);
        assert_eq!(
            Ttl::After(Duration::from_nanos(10)).expiration_from(now, default),
            1_000_010
        );

        // Zero spans mean "never expires" everywhere.
        assert_eq!(Ttl::Default.expiration_from(now, Duration::ZERO), 0);
        assert_eq!(
            Ttl::After(Duration::ZERO).expiration_from(now, default),
            0
        );
    }

    #[test]
    fn duration_converts_to_ttl() {
        assert_eq!(Ttl::from(Duration::ZERO), Ttl::Never);
        assert_eq!(
            Ttl::from(Duration::from_secs(5)),
            Ttl::After(Duration::from_secs(5))
        );
    }
}
