// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # Security Events
//!
//! Value objects for the [`crate::application::monitor::SecurityMonitor`]
//! event pipeline. Kinds and severities are closed enums end to end: an
//! unrecognized value is a construction-time (compile-time) error, never a
//! silent fallback to a default category.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Kind of a recorded security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    AuthenticationSuccess,
    AuthenticationFailure,
    MockCredentialDetected,
    RateLimitExceeded,
    RevokedCredentialPresented,
    ViolationRecorded,
    ViolationCeilingBreached,
    CorsRejected,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationSuccess => "authentication_success",
            Self::AuthenticationFailure => "authentication_failure",
            Self::MockCredentialDetected => "mock_credential_detected",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::RevokedCredentialPresented => "revoked_credential_presented",
            Self::ViolationRecorded => "violation_recorded",
            Self::ViolationCeilingBreached => "violation_ceiling_breached",
            Self::CorsRejected => "cors_rejected",
        }
    }
}

impl std::fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event severity, ordered from least to most urgent.
///
/// Events at `High` or above additionally trigger registered alert callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// One recorded security event.
///
/// Stored in an append-only, capped ring buffer (oldest evicted first once
/// full); bounded memory is an invariant of the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub severity: Severity,
    pub message: String,
    pub context: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
}

impl SecurityEvent {
    pub fn new(
        kind: SecurityEventKind,
        severity: Severity,
        message: impl Into<String>,
        context: HashMap<String, String>,
    ) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            context,
            timestamp: Utc::now(),
            correlation_id: Uuid::new_v4(),
        }
    }
}
