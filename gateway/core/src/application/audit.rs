// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # Authentication Audit Logger
//!
//! Emits structured audit records under the `audit` tracing target for every
//! authentication decision. Records never contain raw tokens; credentials
//! appear only as SHA-256 digests.

use tracing::{info, warn};

use crate::domain::error::AuthError;
use crate::domain::session::SessionProfile;

/// Writes authentication decisions to the structured tracing log.
#[derive(Default)]
pub struct AuthAuditLogger {}

impl AuthAuditLogger {
    pub fn new() -> Self {
        Self {}
    }

    /// Record an accepted connection.
    pub fn connection_accepted(&self, profile: &SessionProfile, client_id: &str) {
        info!(
            target: "audit",
            event = "connection_accepted",
            connection_id = %profile.connection_id,
            subject_id = %profile.subject_id,
            auth_method = profile.auth_method.as_str(),
            client_id,
            "realtime connection authenticated"
        );
    }

    /// Record a rejected connection attempt with its internal reason. The
    /// client only ever sees [`AuthError::client_message`].
    pub fn connection_rejected(&self, error: &AuthError, client_id: &str, origin: Option<&str>) {
        warn!(
            target: "audit",
            event = "connection_rejected",
            reason = error.as_str(),
            client_id,
            origin = origin.unwrap_or("-"),
            "realtime connection rejected"
        );
    }

    /// Record a connection closed by the gate (violation ceiling, forced
    /// invalidation).
    pub fn connection_closed(&self, connection_id: &str, reason: &str) {
        info!(
            target: "audit",
            event = "connection_closed",
            connection_id,
            reason,
            "realtime connection closed by gate"
        );
    }
}
