// raft-core/src/infrastructure/cache.rs

use crate::ports::cache::KvCache;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Default time-to-live for proof verdicts and counterexamples.
pub const PROOF_CACHE_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// Sled-backed expiring key/value store.
///
/// Values are framed as `<expiry_epoch_secs (8 bytes BE)><payload>`.
/// Expired entries read as a miss and are removed lazily. Every failure
/// path degrades to cache-miss semantics; the proof gate never depends on
/// this store being healthy.
pub struct SledCache {
    db: sled::Db,
}

impl SledCache {
    pub fn open(path: &Path) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

impl KvCache for SledCache {
    fn get(&self, key: &str) -> Option<String> {
        let bytes = match self.db.get(key) {
            Ok(Some(v)) => v,
            Ok(None) => return None,
            Err(e) => {
                debug!(error = %e, "cache read failed; treating as miss");
                return None;
            }
        };
        if bytes.len() < 8 {
            return None;
        }
        let mut expiry_raw = [0u8; 8];
        expiry_raw.copy_from_slice(&bytes[..8]);
        let expiry = u64::from_be_bytes(expiry_raw);
        if expiry <= Self::now_secs() {
            let _ = self.db.remove(key);
            return None;
        }
        String::from_utf8(bytes[8..].to_vec()).ok()
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) {
        let expiry = Self::now_secs().saturating_add(ttl.as_secs());
        let mut framed = expiry.to_be_bytes().to_vec();
        framed.extend_from_slice(value.as_bytes());
        if let Err(e) = self.db.insert(key, framed) {
            debug!(error = %e, "cache write dropped");
        }
    }
}

/// Degraded cache: every lookup misses, every write is dropped.
pub struct NoopCache;

impl KvCache for NoopCache {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }
    fn put(&self, _key: &str, _value: &str, _ttl: Duration) {}
}

/// Open the sled cache at `path`, degrading to the no-op cache (with one
/// warning) when the store cannot be opened.
pub fn open_or_noop(path: &Path) -> std::sync::Arc<dyn KvCache> {
    match SledCache::open(path) {
        Ok(cache) => std::sync::Arc::new(cache),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "proof cache unavailable; continuing without");
            std::sync::Arc::new(NoopCache)
        }
    }
}
