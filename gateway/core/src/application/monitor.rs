// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # Security Monitor
//!
//! Two jobs: heuristic detection of placeholder ("mock") credentials, and a
//! bounded, rate-limited security event pipeline with aggregate metrics and
//! alert callbacks.
//!
//! ## Invariants
//!
//! - The event buffer is a capped ring: once full, the oldest event is
//!   evicted on append. Memory stays bounded under event storms.
//! - Event recording is rate limited per event kind; suppressed events are
//!   counted but not stored or dispatched.
//! - Alert callbacks run isolated: a panicking subscriber cannot suppress
//!   delivery to the remaining subscribers or abort the recording call.
//! - A structurally well-formed three-segment token is never flagged as mock,
//!   regardless of embedded test-like substrings. The heuristics below are a
//!   defense-in-depth signal, not a security boundary on their own.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::domain::config::Environment;
use crate::domain::credential::is_well_formed_token;
use crate::domain::events::{SecurityEvent, SecurityEventKind, Severity};
use crate::infrastructure::rate_limit::RateLimiter;

/// Exact placeholder values that are always flagged outside test
/// environments.
const PLACEHOLDER_LITERALS: &[&str] = &[
    "mock_admin_token",
    "test_token",
    "fake_token",
    "dummy_token",
    "placeholder",
    "example_token",
    "changeme",
];

/// Prefixes that mark a token as a placeholder.
const MOCK_PREFIXES: &[&str] = &[
    "mock_",
    "test_token_",
    "fake_",
    "dummy_",
    "placeholder_",
    "example_",
];

/// Substrings that flag tokens shorter than [`MIN_PLAUSIBLE_TOKEN_LEN`].
const MOCK_SUBSTRINGS: &[&str] = &["mock", "test", "fake", "dummy", "placeholder", "example"];

/// Tokens shorter than this are held to the stricter substring check.
const MIN_PLAUSIBLE_TOKEN_LEN: usize = 16;

/// Per-kind event budget inside [`EVENT_RATE_WINDOW`].
const EVENT_RATE_MAX: u32 = 50;
const EVENT_RATE_WINDOW: Duration = Duration::from_secs(10);

/// How many recent events a metrics snapshot carries.
const RECENT_EVENTS_LIMIT: usize = 50;

/// Subscriber invoked for events at [`Severity::High`] or above.
pub type AlertCallback = Arc<dyn Fn(&SecurityEvent) + Send + Sync>;

/// Read-only snapshot of the monitor's aggregate state.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SecurityMetrics {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub events_by_severity: HashMap<String, u64>,
    pub mock_token_detections: u64,
    pub suppressed_events: u64,
    pub alerting_enabled: bool,
    pub recent_events: Vec<SecurityEvent>,
}

/// Mock-credential detector plus security event sink.
pub struct SecurityMonitor {
    environment: Environment,
    events: Mutex<VecDeque<SecurityEvent>>,
    buffer_capacity: usize,
    event_rate: RateLimiter,
    callbacks: RwLock<Vec<AlertCallback>>,
    alerting_enabled: AtomicBool,
    total_events: AtomicU64,
    mock_token_detections: AtomicU64,
    suppressed_events: AtomicU64,
    by_kind: DashMap<&'static str, u64>,
    by_severity: DashMap<&'static str, u64>,
}

impl SecurityMonitor {
    pub fn new(environment: Environment, buffer_capacity: usize) -> Self {
        Self {
            environment,
            events: Mutex::new(VecDeque::with_capacity(buffer_capacity.min(1024))),
            buffer_capacity: buffer_capacity.max(1),
            event_rate: RateLimiter::new(EVENT_RATE_MAX, EVENT_RATE_WINDOW),
            callbacks: RwLock::new(Vec::new()),
            alerting_enabled: AtomicBool::new(true),
            total_events: AtomicU64::new(0),
            mock_token_detections: AtomicU64::new(0),
            suppressed_events: AtomicU64::new(0),
            by_kind: DashMap::new(),
            by_severity: DashMap::new(),
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Heuristic check for placeholder credentials.
    ///
    /// A well-formed three-segment token is never flagged. Otherwise a token
    /// is flagged if it matches a known placeholder literal, carries a mock
    /// prefix, or is short and contains a test-like substring. In test-like
    /// environments, allow-listed test tokens are exempt.
    pub fn detect_mock_credential(&self, token: &str) -> bool {
        if is_well_formed_token(token) {
            return false;
        }

        let lowered = token.to_ascii_lowercase();

        if self.environment.is_test_like() && matches_test_allowlist(&lowered) {
            return false;
        }

        let flagged = PLACEHOLDER_LITERALS.contains(&lowered.as_str())
            || MOCK_PREFIXES.iter().any(|p| lowered.starts_with(p))
            || (lowered.len() < MIN_PLAUSIBLE_TOKEN_LEN
                && MOCK_SUBSTRINGS.iter().any(|s| lowered.contains(s)));

        if flagged {
            self.mock_token_detections.fetch_add(1, Ordering::Relaxed);
        }
        flagged
    }

    /// Record a security event.
    ///
    /// Applies per-kind rate limiting; suppressed events only bump a counter.
    /// Events at `High` or above additionally fan out to alert callbacks.
    pub fn record(&self, event: SecurityEvent) {
        if !self.event_rate.allow(event.kind.as_str()) {
            self.suppressed_events.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.total_events.fetch_add(1, Ordering::Relaxed);
        *self.by_kind.entry(event.kind.as_str()).or_insert(0) += 1;
        *self.by_severity.entry(event.severity.as_str()).or_insert(0) += 1;

        match event.severity {
            Severity::Low => debug!(
                kind = event.kind.as_str(),
                correlation_id = %event.correlation_id,
                "{}", event.message
            ),
            Severity::Medium => info!(
                kind = event.kind.as_str(),
                correlation_id = %event.correlation_id,
                "{}", event.message
            ),
            Severity::High => warn!(
                kind = event.kind.as_str(),
                correlation_id = %event.correlation_id,
                "{}", event.message
            ),
            Severity::Critical => error!(
                kind = event.kind.as_str(),
                correlation_id = %event.correlation_id,
                "{}", event.message
            ),
        }

        {
            let mut events = self.events.lock();
            if events.len() >= self.buffer_capacity {
                events.pop_front();
            }
            events.push_back(event.clone());
        }

        if event.severity >= Severity::High && self.alerting_enabled.load(Ordering::Relaxed) {
            self.dispatch_alerts(&event);
        }
    }

    /// Convenience constructor + record in one call.
    pub fn log_event(
        &self,
        kind: SecurityEventKind,
        severity: Severity,
        message: impl Into<String>,
        context: HashMap<String, String>,
    ) {
        self.record(SecurityEvent::new(kind, severity, message, context));
    }

    /// Register an alert subscriber for `High`/`Critical` events.
    pub fn register_alert_callback(&self, callback: AlertCallback) {
        self.callbacks.write().push(callback);
    }

    pub fn set_alerting_enabled(&self, enabled: bool) {
        self.alerting_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Snapshot the aggregate counters and the most recent events.
    pub fn metrics(&self) -> SecurityMetrics {
        let recent_events = {
            let events = self.events.lock();
            events
                .iter()
                .rev()
                .take(RECENT_EVENTS_LIMIT)
                .cloned()
                .collect::<Vec<_>>()
        };

        SecurityMetrics {
            total_events: self.total_events.load(Ordering::Relaxed),
            events_by_type: self
                .by_kind
                .iter()
                .map(|e| (e.key().to_string(), *e.value()))
                .collect(),
            events_by_severity: self
                .by_severity
                .iter()
                .map(|e| (e.key().to_string(), *e.value()))
                .collect(),
            mock_token_detections: self.mock_token_detections.load(Ordering::Relaxed),
            suppressed_events: self.suppressed_events.load(Ordering::Relaxed),
            alerting_enabled: self.alerting_enabled.load(Ordering::Relaxed),
            recent_events,
        }
    }

    fn dispatch_alerts(&self, event: &SecurityEvent) {
        let callbacks = self.callbacks.read();
        for callback in callbacks.iter() {
            // One panicking subscriber must not take down the others.
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(event)));
            if outcome.is_err() {
                error!(
                    kind = event.kind.as_str(),
                    "alert callback panicked, continuing with remaining subscribers"
                );
            }
        }
    }
}

/// Test tokens the gate tolerates in development and test environments:
/// `test_` followed by at least eight lowercase alphanumeric or underscore
/// characters.
fn matches_test_allowlist(lowered: &str) -> bool {
    lowered.strip_prefix("test_").is_some_and(|rest| {
        rest.len() >= 8
            && rest
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn monitor(env: Environment) -> SecurityMonitor {
        SecurityMonitor::new(env, 100)
    }

    #[test]
    fn test_placeholder_tokens_flagged_in_production() {
        let monitor = monitor(Environment::Production);
        assert!(monitor.detect_mock_credential("mock_admin_token"));
        assert!(monitor.detect_mock_credential("test_token_abc"));
        assert!(monitor.detect_mock_credential("fake_bearer_xyz"));
        assert!(monitor.detect_mock_credential("dummy_auth_token"));
        assert_eq!(monitor.metrics().mock_token_detections, 4);
    }

    #[test]
    fn test_well_formed_token_never_flagged() {
        let monitor = monitor(Environment::Production);
        // Three base64url segments, despite the test-like payload content.
        assert!(!monitor.detect_mock_credential("dGVzdA.dGVzdA.dGVzdA"));
    }

    #[test]
    fn test_long_random_token_not_flagged() {
        let monitor = monitor(Environment::Production);
        assert!(!monitor.detect_mock_credential("kf93nWm2pQ7xR5tY8uZ1aB4cD6eF0gH9"));
    }

    #[test]
    fn test_short_token_with_test_substring_flagged() {
        let monitor = monitor(Environment::Production);
        assert!(monitor.detect_mock_credential("my-test-key"));
        // Past the length threshold the substring check no longer applies.
        assert!(!monitor.detect_mock_credential("latest-deploy-key-2026-08-fleet"));
    }

    #[test]
    fn test_allowlisted_test_token_exempt_in_test_env() {
        let test_monitor = monitor(Environment::Test);
        assert!(!test_monitor.detect_mock_credential("test_session_user1"));

        // The same token is flagged in production.
        let prod_monitor = monitor(Environment::Production);
        assert!(prod_monitor.detect_mock_credential("test_session_user1"));
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let monitor = SecurityMonitor::new(Environment::Test, 2);
        for i in 0..3 {
            monitor.log_event(
                SecurityEventKind::AuthenticationFailure,
                Severity::Low,
                format!("event {i}"),
                HashMap::new(),
            );
        }

        let metrics = monitor.metrics();
        assert_eq!(metrics.total_events, 3);
        assert_eq!(metrics.recent_events.len(), 2);
        // Newest first; "event 0" was evicted.
        assert_eq!(metrics.recent_events[0].message, "event 2");
        assert_eq!(metrics.recent_events[1].message, "event 1");
    }

    #[test]
    fn test_event_storm_is_rate_limited() {
        let monitor = monitor(Environment::Test);
        for _ in 0..(EVENT_RATE_MAX + 10) {
            monitor.log_event(
                SecurityEventKind::RateLimitExceeded,
                Severity::Medium,
                "storm",
                HashMap::new(),
            );
        }

        let metrics = monitor.metrics();
        assert_eq!(metrics.total_events, u64::from(EVENT_RATE_MAX));
        assert_eq!(metrics.suppressed_events, 10);
    }

    #[test]
    fn test_alert_callbacks_fire_for_high_severity() {
        let monitor = monitor(Environment::Test);
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        monitor.register_alert_callback(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.log_event(
            SecurityEventKind::MockCredentialDetected,
            Severity::High,
            "placeholder credential",
            HashMap::new(),
        );
        monitor.log_event(
            SecurityEventKind::AuthenticationFailure,
            Severity::Low,
            "not alert-worthy",
            HashMap::new(),
        );

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_does_not_suppress_others() {
        let monitor = monitor(Environment::Test);
        let fired = Arc::new(AtomicUsize::new(0));

        monitor.register_alert_callback(Arc::new(|_| panic!("bad subscriber")));
        let counter = Arc::clone(&fired);
        monitor.register_alert_callback(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.log_event(
            SecurityEventKind::ViolationCeilingBreached,
            Severity::Critical,
            "session exceeded violation ceiling",
            HashMap::new(),
        );

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_alerting_can_be_disabled() {
        let monitor = monitor(Environment::Test);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        monitor.register_alert_callback(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.set_alerting_enabled(false);
        monitor.log_event(
            SecurityEventKind::MockCredentialDetected,
            Severity::Critical,
            "no alert expected",
            HashMap::new(),
        );

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!monitor.metrics().alerting_enabled);
    }
}
