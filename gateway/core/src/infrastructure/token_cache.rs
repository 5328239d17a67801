// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # Token Cache
//!
//! Short-TTL memoization of previously validated tokens, so repeated
//! connections with the same credential skip the remote round trip. Entries
//! are keyed by the SHA-256 digest of the token — raw credentials never sit
//! in map keys. Bounded by an LRU with a hard capacity; each entry's TTL is
//! the claimed token expiry capped at a configured maximum.
//!
//! A cache hit is never trusted on its own: the validator always consults the
//! revocation registry first, and revocation evicts the entry.

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::domain::credential::ValidationResult;

/// Digest used as the cache/registry key for a raw token.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

struct CacheEntry {
    result: ValidationResult,
    deadline: Instant,
}

/// LRU + TTL cache of validation results, keyed by token digest.
pub struct TokenCache {
    inner: Mutex<LruCache<String, CacheEntry>>,
    max_ttl: Duration,
}

impl TokenCache {
    pub fn new(capacity: usize, max_ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            max_ttl,
        }
    }

    /// Look up a previously validated token. Expired entries are evicted on
    /// the way out.
    pub fn get(&self, digest: &str) -> Option<ValidationResult> {
        let mut cache = self.inner.lock();
        match cache.get(digest) {
            Some(entry) if entry.deadline > Instant::now() => Some(entry.result.clone()),
            Some(_) => {
                cache.pop(digest);
                None
            }
            None => None,
        }
    }

    /// Cache a successful validation. TTL is the remaining claimed lifetime
    /// capped at `max_ttl`; results that are already expired are not cached.
    pub fn insert(&self, digest: String, result: ValidationResult) {
        let remaining = result.expires_at - chrono::Utc::now();
        let remaining = match remaining.to_std() {
            Ok(d) if !d.is_zero() => d,
            _ => return,
        };
        let ttl = remaining.min(self.max_ttl);
        debug!(ttl_secs = ttl.as_secs(), "caching validated token");
        self.inner.lock().put(
            digest,
            CacheEntry {
                result,
                deadline: Instant::now() + ttl,
            },
        );
    }

    /// Drop a cached entry, e.g. because the token was revoked.
    pub fn invalidate(&self, digest: &str) {
        self.inner.lock().pop(digest);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
