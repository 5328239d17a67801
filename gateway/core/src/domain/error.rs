// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # Authentication Error Taxonomy
//!
//! The closed set of reasons a realtime connection attempt can be rejected.
//! Every variant maps to a WebSocket close code and to a client-safe message.
//! Structural detail (signature mismatch vs. malformed encoding) is not
//! disclosed to clients; both collapse to a generic "authentication error".
//!
//! This subsystem performs no automatic retry: all variants except
//! `ServiceUnavailable` are terminal for the attempt, and `ServiceUnavailable`
//! is surfaced only after both the remote authority and the local fallback
//! have failed.

use thiserror::Error;

/// WebSocket close code for policy violations (authentication, CORS,
/// malformed input).
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// WebSocket close code for unexpected internal errors.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Rejection reasons for a realtime connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No bearer credential in any supported carrier.
    #[error("no credential found in header, subprotocol, or query")]
    MissingCredential,

    /// The token is structurally broken or its signature did not verify.
    /// Resolved locally; never reaches the network.
    #[error("credential is malformed or failed verification")]
    MalformedCredential,

    /// The token's expiry has passed.
    #[error("credential has expired")]
    ExpiredCredential,

    /// The token is present in the revocation registry.
    #[error("credential has been revoked")]
    RevokedCredential,

    /// Both the remote identity authority and the local fallback failed.
    #[error("identity authority unavailable: {0}")]
    ServiceUnavailable(String),

    /// The client exceeded the connection-attempt rate limit.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The connection origin is not in the allow list.
    #[error("origin not allowed")]
    CorsRejected,

    /// An unexpected validator failure. Never caused by client input alone.
    #[error("internal validator error: {0}")]
    InternalValidatorError(String),
}

impl AuthError {
    /// The WebSocket close code for this rejection.
    ///
    /// `RateLimited` maps to 1008 when the rejection happens after the
    /// upgrade; the HTTP surface answers 429 before upgrading instead.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::InternalValidatorError(_) => CLOSE_INTERNAL_ERROR,
            _ => CLOSE_POLICY_VIOLATION,
        }
    }

    /// Message safe to return to the client.
    ///
    /// Specific where disclosure is harmless, generic where detail would aid
    /// an attacker (revocation status, signature vs. structure).
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::MissingCredential => "no credential found",
            Self::MalformedCredential | Self::RevokedCredential => "authentication error",
            Self::ExpiredCredential => "credential expired",
            Self::ServiceUnavailable(_) => "authentication temporarily unavailable",
            Self::RateLimited => "rate limit exceeded",
            Self::CorsRejected => "origin not allowed",
            Self::InternalValidatorError(_) => "internal error",
        }
    }

    /// Stable label for audit logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::MalformedCredential => "malformed_credential",
            Self::ExpiredCredential => "expired_credential",
            Self::RevokedCredential => "revoked_credential",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::RateLimited => "rate_limited",
            Self::CorsRejected => "cors_rejected",
            Self::InternalValidatorError(_) => "internal_validator_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_codes() {
        assert_eq!(AuthError::MissingCredential.close_code(), 1008);
        assert_eq!(AuthError::CorsRejected.close_code(), 1008);
        assert_eq!(
            AuthError::InternalValidatorError("boom".to_string()).close_code(),
            1011
        );
    }

    #[test]
    fn test_client_messages_do_not_leak_detail() {
        // Revoked and malformed must be indistinguishable to the client.
        assert_eq!(
            AuthError::RevokedCredential.client_message(),
            AuthError::MalformedCredential.client_message()
        );
        assert_eq!(AuthError::MissingCredential.client_message(), "no credential found");
    }
}
