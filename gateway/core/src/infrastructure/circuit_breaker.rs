// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # Circuit Breaker
//!
//! Health tracker around the remote identity authority.
//!
//! ## State Machine
//!
//! ```text
//! Closed ──(failure_count == threshold)──▶ Open
//!   ▲                                       │ cool-down elapses
//!   │ probe succeeds                        ▼
//!   └───────────────────────────────── HalfOpen
//!                                           │ probe fails
//!                                           └──▶ Open (cool-down restarts)
//! ```
//!
//! ## Invariants
//!
//! - `failure_count` resets to zero on any successful call.
//! - Transitions only follow the edges above; there is no terminal state —
//!   the breaker cycles for the process lifetime.
//! - While `Open`, callers must not touch the network; they route to the
//!   local fallback validator instead.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Breaker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through to the remote authority.
    Closed,
    /// The authority is presumed down; calls bypass the network.
    Open,
    /// The cool-down elapsed; the next call is a probe.
    HalfOpen,
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_transition: Instant,
}

/// Consecutive-failure circuit breaker with a timed cool-down.
pub struct CircuitBreaker {
    failure_threshold: u32,
    cool_down: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cool_down: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cool_down,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_transition: Instant::now(),
            }),
        }
    }

    /// Whether the next call may go to the remote authority.
    ///
    /// An `Open` breaker whose cool-down has elapsed transitions to
    /// `HalfOpen` here and admits the call as a probe.
    pub fn should_attempt(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if inner.last_transition.elapsed() >= self.cool_down {
                    inner.state = CircuitState::HalfOpen;
                    inner.last_transition = Instant::now();
                    info!("circuit breaker half-open, probing identity authority");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful remote call: close the breaker, reset the counter.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            info!("circuit breaker closed, identity authority healthy again");
            inner.last_transition = Instant::now();
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
    }

    /// Record a failed remote call (timeout, non-success status, transport
    /// error). May open the breaker.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.last_transition = Instant::now();
                    warn!(
                        failures = inner.failure_count,
                        "circuit breaker opened, routing around identity authority"
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Probe failed: back to open, cool-down restarts.
                inner.state = CircuitState::Open;
                inner.last_transition = Instant::now();
                warn!("circuit breaker probe failed, reopening");
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }
}
