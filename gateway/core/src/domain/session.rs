// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # Session Aggregate
//!
//! Domain model for an authenticated realtime connection.
//!
//! ## Session Lifecycle
//!
//! ```text
//! ConnectionAuthenticator::authenticate (all checks pass)
//!   └─ Session::new(validation_result, carrier, handle)
//!   └─ ConnectionSecurityManager::register(session)
//!         └─ report_violation(..)   ← per observed misbehavior
//!         └─ unregister(..)          ← on disconnect or forced invalidation
//! ```
//!
//! ## Invariants
//!
//! - `connection_id` is unique per registered session.
//! - The connection handle is exclusively owned by the `Session` for its
//!   lifetime; it leaves the session only through
//!   [`crate::application::security_manager::ConnectionSecurityManager::unregister`].
//! - `violation_count` is mutated only by the `ConnectionSecurityManager`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::credential::{CredentialCarrier, ValidationResult};

/// Opaque identifier for one realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Generate a new random connection ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Abstraction over the underlying transport connection.
///
/// Keeps the domain layer free of WebSocket details; the presentation layer
/// provides the concrete implementation. `close` must be safe to call at most
/// once per connection and must not block on the peer.
#[async_trait]
pub trait ConnectionHandle: Send + Sync {
    /// Ask the transport to close the connection with the given close code.
    async fn close(&self, code: u16, reason: &str);
}

/// Kinds of in-session security violations a caller can report.
///
/// Closed enum by design: an unrecognized violation is a compile error at the
/// call site, not a silently miscategorized event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Frame or message violating the realtime protocol contract.
    ProtocolViolation,
    /// Message volume abuse inside an established session.
    MessageFlood,
    /// Action attempted without the required permission.
    UnauthorizedAction,
    /// Payload that failed schema or size validation.
    MalformedPayload,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProtocolViolation => "protocol_violation",
            Self::MessageFlood => "message_flood",
            Self::UnauthorizedAction => "unauthorized_action",
            Self::MalformedPayload => "malformed_payload",
        }
    }
}

/// An authenticated realtime session and its exclusively owned connection
/// handle.
pub struct Session {
    pub connection_id: ConnectionId,
    pub subject_id: String,
    pub permissions: HashSet<String>,
    pub auth_method: CredentialCarrier,
    pub authenticated_at: DateTime<Utc>,
    violation_count: u32,
    handle: Box<dyn ConnectionHandle>,
}

impl Session {
    /// Build a session from a successful validation outcome.
    ///
    /// Callers must only pass results with `valid == true`; the
    /// `ValidationResult` constructor guarantees such results carry a
    /// non-empty subject.
    pub fn new(
        connection_id: ConnectionId,
        result: &ValidationResult,
        auth_method: CredentialCarrier,
        handle: Box<dyn ConnectionHandle>,
    ) -> Self {
        Self {
            connection_id,
            subject_id: result.subject_id.clone(),
            permissions: result.permissions.clone(),
            auth_method,
            authenticated_at: Utc::now(),
            violation_count: 0,
            handle,
        }
    }

    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    /// Increment the violation counter and return the new count.
    ///
    /// Only the `ConnectionSecurityManager` may call this; it is the single
    /// writer of `violation_count`.
    pub(crate) fn record_violation(&mut self) -> u32 {
        self.violation_count += 1;
        self.violation_count
    }

    /// Release the connection handle, consuming the session.
    pub(crate) fn into_handle(self) -> Box<dyn ConnectionHandle> {
        self.handle
    }

    /// Clone-able, serializable view of the session for callers outside the
    /// security manager. Does not expose the connection handle.
    pub fn profile(&self) -> SessionProfile {
        SessionProfile {
            connection_id: self.connection_id,
            subject_id: self.subject_id.clone(),
            permissions: self.permissions.clone(),
            auth_method: self.auth_method,
            authenticated_at: self.authenticated_at,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection_id", &self.connection_id)
            .field("subject_id", &self.subject_id)
            .field("auth_method", &self.auth_method)
            .field("violation_count", &self.violation_count)
            .finish_non_exhaustive()
    }
}

/// Snapshot of a session's identity data, safe to hand to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProfile {
    pub connection_id: ConnectionId,
    pub subject_id: String,
    pub permissions: HashSet<String>,
    pub auth_method: CredentialCarrier,
    pub authenticated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::credential::{ValidationResult, ValidationSource};

    pub(crate) struct NoopHandle;

    #[async_trait]
    impl ConnectionHandle for NoopHandle {
        async fn close(&self, _code: u16, _reason: &str) {}
    }

    fn result() -> ValidationResult {
        let mut perms = HashSet::new();
        perms.insert("read".to_string());
        ValidationResult::authenticated(
            "u1".to_string(),
            None,
            perms,
            Utc::now() + chrono::Duration::hours(1),
            ValidationSource::Remote,
        )
        .unwrap()
    }

    #[test]
    fn test_session_carries_validation_identity() {
        let session = Session::new(
            ConnectionId::new(),
            &result(),
            CredentialCarrier::Header,
            Box::new(NoopHandle),
        );
        assert_eq!(session.subject_id, "u1");
        assert!(session.permissions.contains("read"));
        assert_eq!(session.violation_count(), 0);
    }

    #[test]
    fn test_profile_matches_session() {
        let session = Session::new(
            ConnectionId::new(),
            &result(),
            CredentialCarrier::Subprotocol,
            Box::new(NoopHandle),
        );
        let profile = session.profile();
        assert_eq!(profile.connection_id, session.connection_id);
        assert_eq!(profile.subject_id, "u1");
        assert_eq!(profile.auth_method, CredentialCarrier::Subprotocol);
    }

    #[test]
    fn test_violation_counter_increments() {
        let mut session = Session::new(
            ConnectionId::new(),
            &result(),
            CredentialCarrier::Query,
            Box::new(NoopHandle),
        );
        assert_eq!(session.record_violation(), 1);
        assert_eq!(session.record_violation(), 2);
        assert_eq!(session.violation_count(), 2);
    }
}
