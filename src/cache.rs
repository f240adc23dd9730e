//! Shard router and public cache surface.
//!
//! [`Cache`] owns a fixed, power-of-two number of independent segments and
//! routes every operation to exactly one of them by hashing the key:
//!
//! ```text
//!   set("user:7", v)                    Cache
//!        │              ┌────────────────────────────────────┐
//!        ▼              │ hash_factory() ─► write(key bytes) │
//!   fresh 32-bit hasher │ index = digest & (segments − 1)    │
//!        │              └────────────────────────────────────┘
//!        ▼
//!   segments[index].set(...)    (other segments untouched)
//! ```
//!
//! Operations on different segments never contend; operations on the same
//! segment serialize through that segment's lock. The only cross-segment
//! routines are the bulk ones (`item_count`, `items`, `flush`), and they
//! visit segments one at a time, never holding two segment locks at once.
//!
//! ## Example Usage
//!
//! ```
//! use shardcache::cache::Cache;
//! use shardcache::config::{CacheConfig, Ttl};
//!
//! let cache = Cache::new(CacheConfig::default()).unwrap();
//!
//! cache.set("session:1", 42_i64, Ttl::Default);
//! assert_eq!(cache.get("session:1"), Some(42_i64.into()));
//!
//! cache.delete("session:1");
//! assert_eq!(cache.get("session:1"), None);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::config::{CacheConfig, Ttl};
use crate::error::{CacheError, ConfigError};
use crate::hash::HashFactory;
use crate::segment::{Item, Segment, SegmentShared};
use crate::stats::{CacheStats, CacheStatsSnapshot};
use crate::value::Value;

/// Callback invoked with `(key, value)` whenever an entry leaves the cache
/// through manual delete, capacity eviction, or lazy expiration. It does not
/// fire on overwrite or on [`Cache::flush`].
///
/// The callback runs while the affected segment's write lock is held: it must
/// not call back into the cache with a key routed to the same segment, but
/// operations on keys in other segments are safe.
pub type EvictionCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Sharded key/value cache with per-entry TTL and bounded per-segment
/// capacity.
pub struct Cache {
    segments: Box<[Segment]>,
    segment_mask: usize,
    hash_factory: HashFactory,
    shared: Arc<SegmentShared>,
}

impl Cache {
    /// Builds a cache from `config`.
    ///
    /// All segments are allocated up front with the configured capacity. The
    /// only rejected input is an effective segment count that is not a power
    /// of two; see [`CacheConfig`] for the defaulting rules.
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        let resolved = config.resolve()?;
        let shared = Arc::new(SegmentShared {
            policy: resolved.policy,
            default_ttl: resolved.default_ttl,
            on_evicted: RwLock::new(None),
            stats: CacheStats::default(),
        });
        let segments: Box<[Segment]> = (0..resolved.segment_count)
            .map(|_| Segment::new(resolved.segment_capacity, Arc::clone(&shared)))
            .collect();
        Ok(Self {
            segments,
            segment_mask: resolved.segment_count - 1,
            hash_factory: resolved.hash_factory,
            shared,
        })
    }

    fn segment_for(&self, key: &str) -> &Segment {
        let mut hasher = (self.hash_factory)();
        hasher.write(key.as_bytes());
        let index = (hasher.finish32() as usize) & self.segment_mask;
        &self.segments[index]
    }

    /// Stores `value` under `key` with the given TTL, inserting or
    /// overwriting as needed.
    pub fn set(&self, key: &str, value: impl Into<Value>, ttl: Ttl) {
        self.segment_for(key).set(key, value.into(), ttl);
    }

    /// Returns the value for `key`, or `None` when the key is absent or its
    /// entry has expired. Under LRU the entry is promoted; an expired entry
    /// is removed on observation.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.segment_for(key).get(key)
    }

    /// Removes `key`; a no-op when absent.
    pub fn delete(&self, key: &str) {
        self.segment_for(key).delete(key);
    }

    /// Returns the value and its expiration instant (`None` for
    /// never-expiring entries). Unlike [`get`](Cache::get), this neither
    /// promotes nor lazily removes anything.
    pub fn get_with_expiration(&self, key: &str) -> Option<(Value, Option<SystemTime>)> {
        self.segment_for(key).get_with_expiration(key)
    }

    /// Returns the raw stored record for `key`, including its absolute
    /// expiration nanoseconds, whether or not it has already expired.
    pub fn item(&self, key: &str) -> Option<Item> {
        self.segment_for(key).item(key)
    }

    /// Total number of stored items across all segments, expired entries
    /// included. Each segment is counted under its own read lock in turn, so
    /// the total is a moment-in-time approximation under concurrent writes.
    pub fn item_count(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    /// Returns a merged snapshot of all unexpired `(key, value)` pairs.
    /// Expired entries are filtered out but not removed.
    pub fn items(&self) -> HashMap<Arc<str>, Value> {
        let mut merged = HashMap::new();
        for segment in self.segments.iter() {
            segment.collect_unexpired(&mut merged);
        }
        merged
    }

    /// Adds `n` to the numeric value stored under `key`, wrapping on integer
    /// overflow.
    ///
    /// The delta is converted into the stored type, so magnitudes beyond the
    /// `i64` range cannot be expressed for `u64`/`usize` payloads.
    pub fn increment(&self, key: &str, n: i64) -> Result<(), CacheError> {
        self.segment_for(key).increment(key, n)
    }

    /// Subtracts `n` from the numeric value stored under `key`. Unsigned
    /// values refuse to go negative and are left unchanged on failure; signed
    /// values wrap.
    pub fn decrement(&self, key: &str, n: i64) -> Result<(), CacheError> {
        self.segment_for(key).decrement(key, n)
    }

    /// Removes every item from every segment. The eviction callback does not
    /// fire.
    pub fn flush(&self) {
        for segment in self.segments.iter() {
            segment.clear();
        }
    }

    /// Installs (or replaces) the eviction callback.
    pub fn on_evicted<F>(&self, callback: F)
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        *self.shared.on_evicted.write() = Some(Arc::new(callback));
    }

    /// Removes the eviction callback.
    pub fn clear_on_evicted(&self) {
        *self.shared.on_evicted.write() = None;
    }

    /// Captures the cache-wide operation counters.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Number of segments the keyspace is partitioned into.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        for segment in self.segments.iter() {
            segment.debug_validate_invariants();
        }
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("segment_count", &self.segments.len())
            .field("item_count", &self.item_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Ttl;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn single_segment(capacity: usize, policy: &str) -> Cache {
        Cache::new(CacheConfig {
            segment_count: 1,
            segment_capacity: capacity,
            eviction_policy: policy.into(),
            ..CacheConfig::default()
        })
        .unwrap()
    }

    // -- Construction ------------------------------------------------------

    #[test]
    fn default_config_builds_with_512_segments() {
        let cache = Cache::new(CacheConfig::default()).unwrap();
        assert_eq!(cache.segment_count(), 512);
        assert_eq!(cache.item_count(), 0);
    }

    #[test]
    fn non_power_of_two_segment_count_fails() {
        let err = Cache::new(CacheConfig {
            segment_count: 100,
            ..CacheConfig::default()
        })
        .unwrap_err();
        assert!(err.message().contains("power of 2"));
    }

    // -- Routing -----------------------------------------------------------

    #[test]
    fn every_key_routes_to_one_stable_segment() {
        let cache = Cache::new(CacheConfig {
            segment_count: 16,
            ..CacheConfig::default()
        })
        .unwrap();

        for i in 0..200 {
            let key = format!("key{i}");
            cache.set(&key, i as i64, Ttl::Never);
        }
        for i in 0..200 {
            let key = format!("key{i}");
            assert_eq!(cache.get(&key), Some(Value::from(i as i64)));
        }
        assert_eq!(cache.item_count(), 200);
        cache.debug_validate_invariants();
    }

    #[test]
    fn routing_spreads_keys_across_segments() {
        let cache = Cache::new(CacheConfig {
            segment_count: 8,
            ..CacheConfig::default()
        })
        .unwrap();

        let mut used = std::collections::HashSet::new();
        for i in 0..100 {
            let key = format!("key{i}");
            let segment = cache.segment_for(&key) as *const Segment;
            used.insert(segment as usize);
        }
        assert!(used.len() > 1);
    }

    // -- Bulk operations ---------------------------------------------------

    #[test]
    fn items_merges_segments_and_skips_expired() {
        let cache = Cache::new(CacheConfig::default()).unwrap();
        cache.set("a", 1_i64, Ttl::Never);
        cache.set("b", 2_i64, Ttl::Never);
        cache.set("ghost", 3_i64, Ttl::After(Duration::from_nanos(1)));
        std::thread::sleep(Duration::from_millis(1));

        let items = cache.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items.get("a"), Some(&Value::from(1_i64)));
        assert_eq!(items.get("b"), Some(&Value::from(2_i64)));
        assert!(!items.contains_key("ghost"));

        // The expired entry still occupies its slot.
        assert_eq!(cache.item_count(), 3);
    }

    #[test]
    fn flush_empties_every_segment_without_callbacks() {
        let cache = Cache::new(CacheConfig::default()).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        cache.on_evicted(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for i in 0..50 {
            cache.set(&format!("key{i}"), i as i64, Ttl::Never);
        }
        cache.flush();

        assert_eq!(cache.item_count(), 0);
        assert_eq!(cache.items().len(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    // -- Callback slot -----------------------------------------------------

    #[test]
    fn callback_can_be_replaced_and_cleared() {
        let cache = single_segment(10, "LRU");
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first);
        cache.on_evicted(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        cache.set("a", 1_i64, Ttl::Never);
        cache.delete("a");

        let counter = Arc::clone(&second);
        cache.on_evicted(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        cache.set("b", 2_i64, Ttl::Never);
        cache.delete("b");

        cache.clear_on_evicted();
        cache.set("c", 3_i64, Ttl::Never);
        cache.delete("c");

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    // -- Misconfigured policy ----------------------------------------------

    #[test]
    fn unrecognized_policy_cache_exposes_nothing() {
        let cache = single_segment(10, "SECOND-CHANCE");
        cache.set("a", 1_i64, Ttl::Never);

        assert_eq!(cache.get("a"), None);
        // The store itself still works.
        assert_eq!(cache.item_count(), 1);
        assert!(cache.item("a").is_some());
    }

    // -- Stats -------------------------------------------------------------

    #[test]
    fn stats_track_get_and_set_outcomes() {
        let cache = single_segment(10, "LRU");
        cache.set("a", 1_i64, Ttl::Never); // insert
        cache.set("a", 2_i64, Ttl::Never); // update
        cache.get("a"); // hit
        cache.get("missing"); // miss
        cache.delete("a"); // delete

        let stats = cache.stats();
        assert_eq!(stats.inserts, 1);
        assert_eq!(stats.updates, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn stats_track_evictions_and_expirations() {
        let cache = single_segment(2, "LRU");
        cache.set("a", 1_i64, Ttl::Never);
        cache.set("b", 2_i64, Ttl::Never);
        cache.set("c", 3_i64, Ttl::Never); // evicts "a"

        cache.set("t", 4_i64, Ttl::After(Duration::from_nanos(1)));
        std::thread::sleep(Duration::from_millis(1));
        cache.get("t"); // lazy expiration

        let stats = cache.stats();
        assert_eq!(stats.evictions, 2); // "a" by capacity, "b" when "t" arrived
        assert_eq!(stats.expirations, 1);
    }
}
