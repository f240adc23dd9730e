pub use crate::cache::{Cache, EvictionCallback};
pub use crate::config::{CacheConfig, Ttl};
pub use crate::error::{CacheError, ConfigError};
pub use crate::stats::CacheStatsSnapshot;
pub use crate::value::Value;
pub use crate::Item;
