// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # Connection Security Manager
//!
//! Registry of live authenticated sessions and the single writer of each
//! session's violation counter.
//!
//! ## Invariants
//!
//! - A session is valid only while registered and its violation count is at
//!   or below the configured ceiling.
//! - Unregistration is idempotent and clears the violation history along with
//!   the session.
//! - The connection handle leaves the registry only through
//!   [`ConnectionSecurityManager::unregister`]; callers that receive it are
//!   expected to close the underlying connection.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::application::monitor::SecurityMonitor;
use crate::domain::events::{SecurityEventKind, Severity};
use crate::domain::session::{ConnectionHandle, ConnectionId, Session, SessionProfile, ViolationKind};

/// Result of reporting a violation against a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationOutcome {
    /// No session is registered under that connection ID.
    NotRegistered,
    /// Violation recorded; the session remains within the ceiling.
    Recorded(u32),
    /// The session has exceeded the ceiling. The caller should close it.
    CeilingExceeded(u32),
}

/// Live-session registry with a per-session violation ceiling.
pub struct ConnectionSecurityManager {
    sessions: DashMap<ConnectionId, Session>,
    violation_ceiling: u32,
    monitor: Arc<SecurityMonitor>,
}

impl ConnectionSecurityManager {
    pub fn new(violation_ceiling: u32, monitor: Arc<SecurityMonitor>) -> Self {
        Self {
            sessions: DashMap::new(),
            violation_ceiling,
            monitor,
        }
    }

    /// Register an authenticated session and return its profile.
    pub fn register(&self, session: Session) -> SessionProfile {
        let profile = session.profile();
        info!(
            connection_id = %profile.connection_id,
            subject_id = %profile.subject_id,
            "session registered"
        );
        self.sessions.insert(profile.connection_id, session);
        profile
    }

    /// Remove a session, returning its connection handle for the caller to
    /// close. Idempotent: a second call for the same ID returns `None`.
    pub fn unregister(&self, connection_id: ConnectionId) -> Option<Box<dyn ConnectionHandle>> {
        let (_, session) = self.sessions.remove(&connection_id)?;
        info!(
            connection_id = %connection_id,
            subject_id = %session.subject_id,
            violations = session.violation_count(),
            "session unregistered"
        );
        Some(session.into_handle())
    }

    /// Record a violation against a session.
    ///
    /// Does not close the connection itself; a [`ViolationOutcome::CeilingExceeded`]
    /// return tells the caller to unregister and close.
    pub fn report_violation(
        &self,
        connection_id: ConnectionId,
        kind: ViolationKind,
        details: &str,
    ) -> ViolationOutcome {
        let (count, subject_id) = match self.sessions.get_mut(&connection_id) {
            Some(mut session) => (session.record_violation(), session.subject_id.clone()),
            None => return ViolationOutcome::NotRegistered,
        };

        let mut context = HashMap::new();
        context.insert("connection_id".to_string(), connection_id.to_string());
        context.insert("subject_id".to_string(), subject_id);
        context.insert("violation_kind".to_string(), kind.as_str().to_string());
        context.insert("violation_count".to_string(), count.to_string());

        if count > self.violation_ceiling {
            self.monitor.log_event(
                SecurityEventKind::ViolationCeilingBreached,
                Severity::High,
                format!("session exceeded violation ceiling: {details}"),
                context,
            );
            ViolationOutcome::CeilingExceeded(count)
        } else {
            self.monitor.log_event(
                SecurityEventKind::ViolationRecorded,
                Severity::Medium,
                format!("violation recorded: {details}"),
                context,
            );
            ViolationOutcome::Recorded(count)
        }
    }

    /// Whether a session is registered and within its violation ceiling.
    pub fn is_valid(&self, connection_id: ConnectionId) -> bool {
        self.sessions
            .get(&connection_id)
            .is_some_and(|session| session.violation_count() <= self.violation_ceiling)
    }

    /// Snapshot a registered session's identity data.
    pub fn profile(&self, connection_id: ConnectionId) -> Option<SessionProfile> {
        self.sessions
            .get(&connection_id)
            .map(|session| session.profile())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
