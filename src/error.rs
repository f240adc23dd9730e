//! Error types for the shardcache library.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned when cache configuration parameters are
//!   invalid. The only fatal misconfiguration is a segment count that is not
//!   a power of two; every other malformed input is silently defaulted.
//! - [`CacheError`]: Returned by the numeric operations (`increment` /
//!   `decrement`) when the key is missing, the stored value is not numeric,
//!   or an unsigned decrement would go negative.
//!
//! Errors are returned to the caller; the cache never logs, retries, or
//! panics on them.
//!
//! ## Example Usage
//!
//! ```
//! use shardcache::cache::Cache;
//! use shardcache::config::CacheConfig;
//!
//! // Fallible constructor for user-configurable parameters
//! let bad = Cache::new(CacheConfig {
//!     segment_count: 7,
//!     ..CacheConfig::default()
//! });
//! assert!(bad.is_err());
//! ```

use std::fmt;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by [`Cache::new`](crate::cache::Cache::new). Carries a
/// human-readable description of which parameter failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Error returned by `increment` / `decrement`.
///
/// Each variant carries the key the operation was applied to, so the message
/// is directly actionable for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The key is absent, or present but already past its expiration.
    NotFoundOrExpired { key: String },
    /// The stored value is not one of the supported numeric types.
    NotANumber { key: String },
    /// An unsigned decrement by more than the current value was refused;
    /// the stored value is unchanged.
    WouldUnderflow { key: String },
}

impl CacheError {
    /// Returns the key the failed operation targeted.
    pub fn key(&self) -> &str {
        match self {
            CacheError::NotFoundOrExpired { key }
            | CacheError::NotANumber { key }
            | CacheError::WouldUnderflow { key } => key,
        }
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::NotFoundOrExpired { key } => {
                write!(f, "item {key} not found or expired")
            }
            CacheError::NotANumber { key } => {
                write!(f, "the value for {key} is not a number")
            }
            CacheError::WouldUnderflow { key } => {
                write!(f, "decrement would result in negative value for key {key}")
            }
        }
    }
}

impl std::error::Error for CacheError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
