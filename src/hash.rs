//! 32-bit key-hashing capability used for shard routing.
//!
//! The cache routes every key to a shard by feeding the key's bytes to a
//! fresh single-use 32-bit hasher and masking the digest with
//! `segment_count - 1`. The hasher is a configuration capability: callers may
//! supply any non-cryptographic 32-bit hash through [`HashFactory`]; the
//! default is FNV-1.
//!
//! A new hasher is obtained per routed key. State is never reused across
//! keys, so implementations do not need to be resettable.
//!
//! ## Example Usage
//!
//! ```
//! use shardcache::hash::{Fnv32, KeyHasher32};
//!
//! let mut hasher = Fnv32::new();
//! hasher.write(b"a");
//! assert_eq!(hasher.finish32(), 0x050c_5d7e);
//! ```

use std::sync::Arc;

/// A single-use, stateful 32-bit hasher.
///
/// Mirrors the shape of [`std::hash::Hasher`] but with a 32-bit digest, which
/// is what the shard mask operates on.
pub trait KeyHasher32 {
    /// Feeds bytes into the hasher state.
    fn write(&mut self, bytes: &[u8]);

    /// Returns the 32-bit digest of everything written so far.
    fn finish32(&self) -> u32;
}

/// Factory producing a fresh hasher for each routed key.
pub type HashFactory = Arc<dyn Fn() -> Box<dyn KeyHasher32> + Send + Sync>;

const FNV32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 16_777_619;

/// FNV-1 32-bit streaming hasher (multiply, then xor).
#[derive(Debug, Clone)]
pub struct Fnv32 {
    state: u32,
}

impl Fnv32 {
    /// Creates a hasher seeded with the FNV-1 offset basis.
    pub fn new() -> Self {
        Self {
            state: FNV32_OFFSET_BASIS,
        }
    }
}

impl Default for Fnv32 {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyHasher32 for Fnv32 {
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state = self.state.wrapping_mul(FNV32_PRIME) ^ u32::from(byte);
        }
    }

    fn finish32(&self) -> u32 {
        self.state
    }
}

/// Returns the default [`HashFactory`], producing FNV-1 32-bit hashers.
pub fn fnv32_factory() -> HashFactory {
    Arc::new(|| Box::new(Fnv32::new()))
}
