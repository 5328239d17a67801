// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # Revocation Registry
//!
//! Set of revoked token digests. Consulted on every validation — including
//! cache hits — to close the race between caching a result and the token
//! being revoked. During an authority outage this registry is the only
//! revocation coverage the gate has; remote-side revocations issued during
//! the outage are a documented gap of local fallback validation.

use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::info;

use crate::infrastructure::token_cache::{token_digest, TokenCache};

/// Local registry of revoked token digests.
#[derive(Default)]
pub struct RevocationRegistry {
    revoked: RwLock<HashSet<String>>,
}

impl RevocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a raw token as revoked and evict any cached validation for it.
    pub fn revoke_token(&self, token: &str, cache: &TokenCache) {
        let digest = token_digest(token);
        cache.invalidate(&digest);
        let inserted = self.revoked.write().insert(digest);
        if inserted {
            info!(target: "audit", event = "token_revoked", "credential added to revocation registry");
        }
    }

    /// Mark an already-digested token as revoked.
    pub fn revoke_digest(&self, digest: String) {
        self.revoked.write().insert(digest);
    }

    pub fn is_revoked(&self, digest: &str) -> bool {
        self.revoked.read().contains(digest)
    }

    pub fn len(&self) -> usize {
        self.revoked.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.read().is_empty()
    }
}
