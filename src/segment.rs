//! Per-shard storage engine.
//!
//! A [`Segment`] owns one partition of the keyspace: a key→item map, an
//! ordering list, and the read/write lock serializing access to both. The
//! router never touches item state directly; every public cache operation
//! lands on exactly one segment.
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │                     Segment                                  │
//!   │                                                              │
//!   │   RwLock<SegmentCore>                Arc<SegmentShared>      │
//!   │   ┌──────────────────────────────┐   ┌────────────────────┐  │
//!   │   │ items: FxHashMap<key, Item>  │   │ policy             │  │
//!   │   │ queue: KeyList               │   │ default_ttl        │  │
//!   │   │ size / capacity              │   │ on_evicted slot    │  │
//!   │   └──────────────────────────────┘   │ stats              │  │
//!   │                                      └────────────────────┘  │
//!   │   Item.node ──► queue node carrying the same key             │
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lock discipline
//!
//! - LRU `get` takes the write lock: promotion reorders the list.
//! - FIFO `get` takes the read lock; only an expired hit upgrades to the
//!   write lock, and re-checks expiration there before removing (a
//!   concurrent `set` may have refreshed the entry in the window).
//! - The eviction callback runs while the write lock is held. It must not
//!   re-enter this segment; calls that route to other segments are safe.
//!
//! ## Expiration
//!
//! Expiration is lazy. An expired entry occupies its slot until a `get`
//! observes it (removal + callback), it is overwritten, or capacity eviction
//! reaches it. Snapshots filter expired entries without removing them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::cache::EvictionCallback;
use crate::config::{Policy, Ttl};
use crate::ds::{KeyList, NodeId};
use crate::error::CacheError;
use crate::stats::CacheStats;
use crate::value::{DeltaError, Value};

/// Current instant as nanoseconds since the UNIX epoch.
pub(crate) fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |since_epoch| since_epoch.as_nanos() as u64)
}

/// A stored cache entry.
#[derive(Debug, Clone)]
pub struct Item {
    /// The stored payload.
    pub value: Value,
    /// Absolute expiration in nanoseconds since the UNIX epoch; 0 means the
    /// item never expires.
    pub expiration: u64,
    node: NodeId,
}

impl Item {
    /// Returns `true` if the item has an expiration and it has passed.
    pub fn is_expired(&self) -> bool {
        self.expired_at(now_nanos())
    }

    pub(crate) fn expired_at(&self, now: u64) -> bool {
        self.expiration != 0 && now > self.expiration
    }

    /// Returns the expiration instant, or `None` for never-expiring items.
    pub fn expires_at(&self) -> Option<SystemTime> {
        if self.expiration == 0 {
            None
        } else {
            Some(UNIX_EPOCH + Duration::from_nanos(self.expiration))
        }
    }
}

/// Router state shared with every segment.
///
/// Segments need the eviction policy, the default TTL, and the eviction
/// callback while holding their own lock; this is the shared immutable handle
/// that carries them. The callback slot has its own lock (the router-level
/// lock of the public contract) so installing a callback never contends with
/// another segment's data plane.
pub(crate) struct SegmentShared {
    pub(crate) policy: Policy,
    pub(crate) default_ttl: Duration,
    pub(crate) on_evicted: RwLock<Option<EvictionCallback>>,
    pub(crate) stats: CacheStats,
}

impl SegmentShared {
    /// Clones the installed callback out of its slot.
    fn callback(&self) -> Option<EvictionCallback> {
        self.on_evicted.read().clone()
    }
}

struct SegmentCore {
    items: FxHashMap<Arc<str>, Item>,
    queue: KeyList,
    size: usize,
    capacity: usize,
}

impl SegmentCore {
    /// Removes a key's map entry and list node. Returns the owned pair so the
    /// caller can fire the eviction callback while still holding the lock.
    fn remove_key(&mut self, key: &str) -> Option<(Arc<str>, Item)> {
        let (key, item) = self.items.remove_entry(key)?;
        self.queue.remove(item.node);
        self.size -= 1;
        Some((key, item))
    }

    /// Removes the entry at the back of the ordering list.
    fn remove_oldest(&mut self) -> Option<(Arc<str>, Item)> {
        let victim = Arc::clone(self.queue.back()?);
        self.remove_key(&victim)
    }
}

enum Lookup {
    Missing,
    Expired,
    Hit(Value),
}

pub(crate) struct Segment {
    core: RwLock<SegmentCore>,
    shared: Arc<SegmentShared>,
}

impl Segment {
    pub(crate) fn new(capacity: usize, shared: Arc<SegmentShared>) -> Self {
        Self {
            core: RwLock::new(SegmentCore {
                items: FxHashMap::default(),
                queue: KeyList::new(),
                size: 0,
                capacity,
            }),
            shared,
        }
    }

    /// Inserts or overwrites `key`. Overwrites keep the existing node
    /// (promoted to the front) and never fire the eviction callback; inserts
    /// may push the segment over capacity, in which case the oldest entries
    /// are evicted under the same write lock.
    pub(crate) fn set(&self, key: &str, value: Value, ttl: Ttl) {
        let expiration = ttl.expiration_from(now_nanos(), self.shared.default_ttl);
        let mut core = self.core.write();

        if let Some(item) = core.items.get_mut(key) {
            item.value = value;
            item.expiration = expiration;
            let node = item.node;
            core.queue.move_to_front(node);
            self.shared.stats.record_update();
            return;
        }

        let key: Arc<str> = Arc::from(key);
        let node = core.queue.push_front(Arc::clone(&key));
        core.items.insert(
            key,
            Item {
                value,
                expiration,
                node,
            },
        );
        core.size += 1;
        self.shared.stats.record_insert();

        while core.size > core.capacity {
            match core.remove_oldest() {
                Some((victim, item)) => {
                    self.shared.stats.record_eviction();
                    self.notify_evicted(&victim, &item.value);
                }
                None => break,
            }
        }
    }

    /// Looks up `key` under the configured policy. Expired entries are
    /// removed on observation and reported as misses.
    pub(crate) fn get(&self, key: &str) -> Option<Value> {
        let now = now_nanos();
        match self.shared.policy {
            Policy::Lru => {
                let mut core = self.core.write();
                let (node, expired) = match core.items.get(key) {
                    Some(item) => (item.node, item.expired_at(now)),
                    None => {
                        self.shared.stats.record_miss();
                        return None;
                    }
                };
                if expired {
                    if let Some((removed, item)) = core.remove_key(key) {
                        self.shared.stats.record_expiration();
                        self.notify_evicted(&removed, &item.value);
                    }
                    self.shared.stats.record_miss();
                    return None;
                }
                core.queue.move_to_front(node);
                self.shared.stats.record_hit();
                core.items.get(key).map(|item| item.value.clone())
            }
            Policy::Fifo => {
                let outcome = {
                    let core = self.core.read();
                    match core.items.get(key) {
                        None => Lookup::Missing,
                        Some(item) if item.expired_at(now) => Lookup::Expired,
                        Some(item) => Lookup::Hit(item.value.clone()),
                    }
                };
                match outcome {
                    Lookup::Missing => {
                        self.shared.stats.record_miss();
                        None
                    }
                    Lookup::Hit(value) => {
                        self.shared.stats.record_hit();
                        Some(value)
                    }
                    Lookup::Expired => {
                        let mut core = self.core.write();
                        // Re-check under the write lock: a concurrent set may
                        // have refreshed the entry while we upgraded.
                        let still_expired =
                            core.items.get(key).is_some_and(|item| item.is_expired());
                        if still_expired {
                            if let Some((removed, item)) = core.remove_key(key) {
                                self.shared.stats.record_expiration();
                                self.notify_evicted(&removed, &item.value);
                            }
                        }
                        self.shared.stats.record_miss();
                        None
                    }
                }
            }
            // Unknown policy name: the segment stores items but serves no
            // reads.
            Policy::Unrecognized => None,
        }
    }

    /// Removes `key`, firing the eviction callback if it was present.
    pub(crate) fn delete(&self, key: &str) {
        let mut core = self.core.write();
        if let Some((removed, item)) = core.remove_key(key) {
            self.shared.stats.record_delete();
            self.notify_evicted(&removed, &item.value);
        }
    }

    /// Read-only lookup returning the value and its expiration instant.
    /// Expired entries report a miss but stay in place, and the ordering list
    /// is untouched regardless of policy.
    pub(crate) fn get_with_expiration(&self, key: &str) -> Option<(Value, Option<SystemTime>)> {
        let core = self.core.read();
        let item = core.items.get(key)?;
        if item.is_expired() {
            return None;
        }
        Some((item.value.clone(), item.expires_at()))
    }

    /// Returns the raw record for `key`, expired or not.
    pub(crate) fn item(&self, key: &str) -> Option<Item> {
        self.core.read().items.get(key).cloned()
    }

    /// Adds `n` to the numeric value stored under `key`.
    pub(crate) fn increment(&self, key: &str, n: i64) -> Result<(), CacheError> {
        self.apply_delta(key, n, Value::increment)
    }

    /// Subtracts `n` from the numeric value stored under `key`.
    pub(crate) fn decrement(&self, key: &str, n: i64) -> Result<(), CacheError> {
        self.apply_delta(key, n, Value::decrement)
    }

    fn apply_delta(
        &self,
        key: &str,
        n: i64,
        op: fn(&mut Value, i64) -> Result<(), DeltaError>,
    ) -> Result<(), CacheError> {
        let mut core = self.core.write();
        let item = match core.items.get_mut(key) {
            Some(item) if !item.is_expired() => item,
            _ => {
                return Err(CacheError::NotFoundOrExpired {
                    key: key.to_owned(),
                })
            }
        };
        op(&mut item.value, n).map_err(|err| match err {
            DeltaError::NotANumber => CacheError::NotANumber {
                key: key.to_owned(),
            },
            DeltaError::WouldUnderflow => CacheError::WouldUnderflow {
                key: key.to_owned(),
            },
        })
    }

    /// Number of stored items, expired entries included.
    pub(crate) fn len(&self) -> usize {
        self.core.read().items.len()
    }

    /// Drops every item without firing callbacks.
    pub(crate) fn clear(&self) {
        let mut core = self.core.write();
        core.items.clear();
        core.queue.clear();
        core.size = 0;
    }

    /// Copies unexpired entries into `out`. Expired entries are filtered from
    /// the snapshot but left in the segment.
    pub(crate) fn collect_unexpired(&self, out: &mut HashMap<Arc<str>, Value>) {
        let core = self.core.read();
        let now = now_nanos();
        for (key, item) in &core.items {
            if !item.expired_at(now) {
                out.insert(Arc::clone(key), item.value.clone());
            }
        }
    }

    fn notify_evicted(&self, key: &str, value: &Value) {
        if let Some(callback) = self.shared.callback() {
            callback(key, value);
        }
    }

    #[cfg(any(test, debug_assertions))]
    pub(crate) fn debug_validate_invariants(&self) {
        let core = self.core.read();
        assert_eq!(core.items.len(), core.size);
        assert_eq!(core.queue.len(), core.size);
        assert!(core.size <= core.capacity);
        for (key, item) in &core.items {
            assert_eq!(core.queue.get(item.node), Some(key));
        }
    }
}
