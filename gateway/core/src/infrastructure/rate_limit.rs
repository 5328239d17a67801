// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # Rate Limiter
//!
//! Sliding-window request limiter keyed by client identity. Each client keeps
//! the timestamps of its requests inside the window; a request is admitted
//! only while fewer than `max_requests` timestamps remain after pruning.
//!
//! ## Invariants
//!
//! - Exactly `max_requests` admissions fit in any window of `window` length;
//!   request `max_requests + 1` is denied.
//! - Distinct clients never share a window.
//! - Denied requests are not recorded, so they do not extend the lockout.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Per-client sliding-window limiter.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            clients: DashMap::new(),
        }
    }

    /// Admit or deny a request from `client_id`, recording it if admitted.
    pub fn allow(&self, client_id: &str) -> bool {
        let now = Instant::now();
        let mut entry = self
            .clients
            .entry(client_id.to_string())
            .or_insert_with(VecDeque::new);

        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= self.window {
                entry.pop_front();
            } else {
                break;
            }
        }

        if entry.len() as u32 >= self.max_requests {
            debug!(client_id, "rate limit exceeded");
            return false;
        }

        entry.push_back(now);
        true
    }

    /// Drop clients whose entire window has elapsed. Call periodically to
    /// keep memory proportional to recently active clients.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.clients.retain(|_, stamps| {
            stamps
                .back()
                .is_some_and(|last| now.duration_since(*last) < self.window)
        });
    }

    /// Number of clients currently holding window state.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}
