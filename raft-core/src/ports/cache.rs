// raft-core/src/ports/cache.rs

use std::time::Duration;

/// Expiring key/value facility backing the proof cache.
///
/// Implementations must be atomic per key; no read-modify-write is ever
/// required. A degraded implementation may silently miss on every lookup
/// and drop every write: the proof gate stays functional without it.
pub trait KvCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Best-effort write; errors are absorbed by the implementation.
    fn put(&self, key: &str, value: &str, ttl: Duration);
}
