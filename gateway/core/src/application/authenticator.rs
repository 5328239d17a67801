// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # Connection Authenticator
//!
//! Single entry point for every incoming realtime connection. Runs the gate
//! sequence in strict order; any failing step is a terminal rejection and no
//! partial session is ever registered.
//!
//! ```text
//! authenticate(handshake, handle)
//!   1. origin check          → CorsRejected
//!   2. rate limiter          → RateLimited
//!   3. credential extraction → MissingCredential
//!   4. token validation      → Malformed / Expired / Revoked / Unavailable
//!   5. mock-credential check → MalformedCredential (production only)
//!   6. session registration  → SessionProfile
//! ```
//!
//! Rate limiting runs before validation so abusive clients never spend
//! validation cost, and before extraction so credential-less floods are
//! throttled too.

use std::collections::HashMap;
use std::sync::Arc;

use crate::application::audit::AuthAuditLogger;
use crate::application::monitor::SecurityMonitor;
use crate::application::security_manager::ConnectionSecurityManager;
use crate::domain::config::GateConfig;
use crate::domain::credential::{CredentialCarrier, ValidationResult};
use crate::domain::error::AuthError;
use crate::domain::events::{SecurityEventKind, Severity};
use crate::domain::session::{ConnectionHandle, ConnectionId, Session, SessionProfile};
use crate::infrastructure::extract::{extract_credential, HandshakeRequest};
use crate::infrastructure::rate_limit::RateLimiter;
use crate::infrastructure::validator::TokenValidator;

/// Orchestrates the per-connection authentication sequence.
pub struct ConnectionAuthenticator {
    allowed_origins: Vec<String>,
    rate_limiter: RateLimiter,
    validator: TokenValidator,
    monitor: Arc<SecurityMonitor>,
    manager: Arc<ConnectionSecurityManager>,
    audit: AuthAuditLogger,
}

impl ConnectionAuthenticator {
    pub fn new(
        config: &GateConfig,
        validator: TokenValidator,
        monitor: Arc<SecurityMonitor>,
        manager: Arc<ConnectionSecurityManager>,
    ) -> Self {
        Self {
            allowed_origins: config.allowed_origins.clone(),
            rate_limiter: RateLimiter::new(
                config.rate_limit.max_requests as u32,
                config.rate_limit.window,
            ),
            validator,
            monitor,
            manager,
            audit: AuthAuditLogger::new(),
        }
    }

    /// Run the full gate sequence for one connection attempt.
    ///
    /// On success the session owns `handle` until unregistration. On failure
    /// the handle is dropped unused; the caller still holds the transport and
    /// is responsible for closing it with
    /// [`AuthError::close_code`] / [`AuthError::client_message`].
    pub async fn authenticate(
        &self,
        request: &HandshakeRequest,
        handle: Box<dyn ConnectionHandle>,
    ) -> Result<SessionProfile, AuthError> {
        match self.run_checks(request).await {
            Ok((result, carrier)) => {
                let session = Session::new(ConnectionId::new(), &result, carrier, handle);
                let profile = self.manager.register(session);
                self.monitor.log_event(
                    SecurityEventKind::AuthenticationSuccess,
                    Severity::Low,
                    format!("connection authenticated via {}", carrier.as_str()),
                    event_context(request, [("subject_id", profile.subject_id.as_str())]),
                );
                self.audit.connection_accepted(&profile, &request.client_id);
                Ok(profile)
            }
            Err(error) => {
                self.record_rejection(request, &error);
                self.audit
                    .connection_rejected(&error, &request.client_id, request.origin.as_deref());
                Err(error)
            }
        }
    }

    /// Steps 1–5 of the sequence; step 6 happens in [`Self::authenticate`].
    async fn run_checks(
        &self,
        request: &HandshakeRequest,
    ) -> Result<(ValidationResult, CredentialCarrier), AuthError> {
        if !self.origin_allowed(request.origin.as_deref()) {
            return Err(AuthError::CorsRejected);
        }

        if !self.rate_limiter.allow(&request.client_id) {
            return Err(AuthError::RateLimited);
        }

        let credential = extract_credential(request).ok_or(AuthError::MissingCredential)?;

        let result = match self.validator.validate(&credential.token).await {
            Ok(result) => result,
            Err(error) => {
                // Still worth an alert when the rejected token was a
                // placeholder on a production ingress.
                self.flag_if_mock(request, &credential.token);
                return Err(error);
            }
        };

        if self.flag_if_mock(request, &credential.token)
            && !self.monitor.environment().is_test_like()
        {
            return Err(AuthError::MalformedCredential);
        }

        Ok((result, credential.carrier))
    }

    fn origin_allowed(&self, origin: Option<&str>) -> bool {
        // An empty allow list means origin enforcement is delegated upstream.
        if self.allowed_origins.is_empty() {
            return true;
        }
        let Some(origin) = origin else {
            return false;
        };
        self.allowed_origins
            .iter()
            .any(|pattern| origin_matches(pattern, origin))
    }

    fn flag_if_mock(&self, request: &HandshakeRequest, token: &str) -> bool {
        if !self.monitor.detect_mock_credential(token) {
            return false;
        }
        self.monitor.log_event(
            SecurityEventKind::MockCredentialDetected,
            Severity::High,
            "placeholder credential presented on realtime ingress",
            event_context(request, std::iter::empty::<(&str, &str)>()),
        );
        true
    }

    fn record_rejection(&self, request: &HandshakeRequest, error: &AuthError) {
        let (kind, severity) = match error {
            AuthError::CorsRejected => (SecurityEventKind::CorsRejected, Severity::Medium),
            AuthError::RateLimited => (SecurityEventKind::RateLimitExceeded, Severity::Medium),
            AuthError::RevokedCredential => {
                (SecurityEventKind::RevokedCredentialPresented, Severity::High)
            }
            AuthError::ServiceUnavailable(_) | AuthError::InternalValidatorError(_) => {
                (SecurityEventKind::AuthenticationFailure, Severity::Medium)
            }
            _ => (SecurityEventKind::AuthenticationFailure, Severity::Low),
        };
        self.monitor.log_event(
            kind,
            severity,
            format!("connection rejected: {}", error.as_str()),
            event_context(request, [("reason", error.as_str())]),
        );
    }
}

fn event_context<'a>(
    request: &HandshakeRequest,
    extra: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> HashMap<String, String> {
    let mut context = HashMap::new();
    context.insert("client_id".to_string(), request.client_id.clone());
    if let Some(origin) = &request.origin {
        context.insert("origin".to_string(), origin.clone());
    }
    for (key, value) in extra {
        context.insert(key.to_string(), value.to_string());
    }
    context
}

/// Origin allow-list matching with `*.domain` wildcard support. A wildcard
/// pattern matches the bare domain and any subdomain, for any scheme or port.
fn origin_matches(pattern: &str, origin: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return origin_host(origin)
            .is_some_and(|host| host == suffix || host.ends_with(&format!(".{suffix}")));
    }
    pattern.trim_end_matches('/') == origin.trim_end_matches('/')
}

fn origin_host(origin: &str) -> Option<&str> {
    let rest = origin.split_once("://").map_or(origin, |(_, rest)| rest);
    let host = rest.split(['/', ':']).next()?;
    (!host.is_empty()).then_some(host)
}
