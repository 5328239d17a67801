// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # Credential Value Objects
//!
//! A [`Credential`] is a bearer token together with the transport carrier it
//! arrived on. A [`ValidationResult`] is the normalized outcome of checking
//! that token against the identity authority (or the local fallback key).
//!
//! ## Invariants
//!
//! - A `ValidationResult` with `valid == true` always carries a non-empty
//!   `subject_id`. This is enforced at construction time by
//!   [`ValidationResult::authenticated`]; there is no other way to build a
//!   valid result.
//! - Structural well-formedness ([`is_well_formed_token`]) is a pure local
//!   check. Tokens that fail it must never be sent to the network.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::error::AuthError;

/// The transport carrier a bearer credential was extracted from.
///
/// Carriers are tried in declaration order: header first, query last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialCarrier {
    /// `Authorization: Bearer <token>` header.
    Header,
    /// WebSocket subprotocol value `jwt.<base64url-no-padding(token)>`.
    Subprotocol,
    /// `token` query parameter (lowest priority; constrained clients).
    Query,
}

impl CredentialCarrier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Subprotocol => "subprotocol",
            Self::Query => "query",
        }
    }
}

/// A raw bearer token plus the carrier it was found on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub carrier: CredentialCarrier,
}

impl Credential {
    pub fn new(token: impl Into<String>, carrier: CredentialCarrier) -> Self {
        Self {
            token: token.into(),
            carrier,
        }
    }
}

/// Which validation path produced a [`ValidationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSource {
    /// The remote identity authority answered.
    Remote,
    /// A previously validated result was served from the token cache.
    Cache,
    /// Offline signature/expiry verification while the authority was
    /// unreachable. Cannot see remote-side revocations.
    LocalFallback,
}

/// Normalized outcome of token validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub subject_id: String,
    pub email: Option<String>,
    pub permissions: HashSet<String>,
    pub expires_at: DateTime<Utc>,
    pub source: ValidationSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    /// Build a successful validation result.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InternalValidatorError`] if `subject_id` is empty;
    /// a valid result without a subject would violate the domain invariant.
    pub fn authenticated(
        subject_id: String,
        email: Option<String>,
        permissions: HashSet<String>,
        expires_at: DateTime<Utc>,
        source: ValidationSource,
    ) -> Result<Self, AuthError> {
        if subject_id.trim().is_empty() {
            return Err(AuthError::InternalValidatorError(
                "validator produced a valid result with an empty subject".to_string(),
            ));
        }
        Ok(Self {
            valid: true,
            subject_id,
            email,
            permissions,
            expires_at,
            source,
            error: None,
        })
    }

    /// Re-tag this result with a different source (used when a remote result
    /// is later served from the cache).
    pub fn with_source(mut self, source: ValidationSource) -> Self {
        self.source = source;
        self
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Structural well-formedness check: three dot-separated, non-empty,
/// base64url-decodable (no padding) segments.
///
/// This is deliberately not a signature check. It exists to keep garbage off
/// the network path and to stop the mock-credential heuristics from flagging
/// real tokens.
pub fn is_well_formed_token(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return false;
    }
    segments
        .iter()
        .all(|s| !s.is_empty() && URL_SAFE_NO_PAD.decode(s).is_ok())
}
