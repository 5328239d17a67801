// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # Token Validator
//!
//! Orchestrates cache, revocation registry, circuit-breaker-guarded remote
//! validation, and local fallback into one normalized result.
//!
//! ```text
//! validate(token)
//!   1. structural check            ← malformed tokens never reach the network
//!   2. revocation registry        ← always, including on cache hits
//!   3. token cache
//!   4. breaker closed/half-open → remote authority
//!        success → cache + return (source=remote)
//!        failure → record breaker failure, try local fallback
//!      breaker open → local fallback only
//! ```
//!
//! `ServiceUnavailable` surfaces only when both the remote path and the local
//! fallback have failed.

use tracing::{debug, warn};

use crate::domain::config::GateConfig;
use crate::domain::credential::{is_well_formed_token, ValidationResult, ValidationSource};
use crate::domain::error::AuthError;
use crate::infrastructure::circuit_breaker::CircuitBreaker;
use crate::infrastructure::local_fallback::{FallbackError, LocalFallbackValidator};
use crate::infrastructure::remote::{AuthorityResponse, RemoteValidator};
use crate::infrastructure::revocation::RevocationRegistry;
use crate::infrastructure::token_cache::{token_digest, TokenCache};

/// Composite validator: cache → revocation → (remote | fallback).
pub struct TokenValidator {
    cache: TokenCache,
    revocations: RevocationRegistry,
    remote: RemoteValidator,
    breaker: CircuitBreaker,
    fallback: LocalFallbackValidator,
}

impl TokenValidator {
    pub fn new(
        cache: TokenCache,
        revocations: RevocationRegistry,
        remote: RemoteValidator,
        breaker: CircuitBreaker,
        fallback: LocalFallbackValidator,
    ) -> Self {
        Self {
            cache,
            revocations,
            remote,
            breaker,
            fallback,
        }
    }

    /// Wire up a validator from configuration.
    pub fn from_config(config: &GateConfig) -> anyhow::Result<Self> {
        let remote = RemoteValidator::new(
            config.authority.endpoint.clone(),
            config.authority.service_id.clone(),
            config.resolved_service_secret()?,
            config.authority.timeout,
        )?;
        Ok(Self::new(
            TokenCache::new(config.token_cache.capacity, config.token_cache.max_ttl),
            RevocationRegistry::new(),
            remote,
            CircuitBreaker::new(
                config.circuit_breaker.failure_threshold,
                config.circuit_breaker.cool_down,
            ),
            LocalFallbackValidator::new(config.fallback_verification_key_pem.as_deref())?,
        ))
    }

    /// Validate a bearer token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MalformedCredential`] — structural reject or failed
    ///   signature; resolved without any network call for structural cases.
    /// - [`AuthError::RevokedCredential`] — token digest is in the registry.
    /// - [`AuthError::ExpiredCredential`] — authority or fallback says expired.
    /// - [`AuthError::ServiceUnavailable`] — remote and fallback both failed.
    pub async fn validate(&self, token: &str) -> Result<ValidationResult, AuthError> {
        if !is_well_formed_token(token) {
            return Err(AuthError::MalformedCredential);
        }

        let digest = token_digest(token);

        // Revocation is checked before trusting anything, cache hits included.
        if self.revocations.is_revoked(&digest) {
            self.cache.invalidate(&digest);
            return Err(AuthError::RevokedCredential);
        }

        if let Some(hit) = self.cache.get(&digest) {
            debug!("token served from validation cache");
            return Ok(hit.with_source(ValidationSource::Cache));
        }

        if self.breaker.should_attempt() {
            match self.remote.validate(token).await {
                Ok(response) => {
                    self.breaker.record_success();
                    let result = self.accept_authority_verdict(response)?;
                    self.cache.insert(digest, result.clone());
                    Ok(result)
                }
                Err(e) => {
                    warn!(error = %e, "remote validation failed, attempting local fallback");
                    self.breaker.record_failure();
                    self.validate_via_fallback(token, &digest, e.to_string())
                }
            }
        } else {
            debug!("circuit breaker open, validating via local fallback");
            self.validate_via_fallback(token, &digest, "circuit breaker open".to_string())
        }
    }

    /// Revoke a raw token: registry insert plus cache eviction.
    pub fn revoke(&self, token: &str) {
        self.revocations.revoke_token(token, &self.cache);
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn accept_authority_verdict(
        &self,
        response: AuthorityResponse,
    ) -> Result<ValidationResult, AuthError> {
        if !response.valid {
            // The authority answered with a definitive rejection. Expired and
            // revoked verdicts keep their specific kind; anything else is a
            // generic credential rejection.
            let reason = response.error.unwrap_or_default();
            return Err(match reason.as_str() {
                "expired" => AuthError::ExpiredCredential,
                "revoked" => AuthError::RevokedCredential,
                _ => AuthError::MalformedCredential,
            });
        }

        let subject_id = response.user_id.unwrap_or_default();
        let expires_at = match response.expires_at {
            Some(ts) => chrono::DateTime::from_timestamp(ts, 0).ok_or_else(|| {
                AuthError::InternalValidatorError("authority returned out-of-range expiry".to_string())
            })?,
            None => chrono::Utc::now() + chrono::Duration::seconds(DEFAULT_RESULT_LIFETIME_SECS),
        };

        ValidationResult::authenticated(
            subject_id,
            response.email,
            response.permissions.into_iter().collect(),
            expires_at,
            ValidationSource::Remote,
        )
    }

    fn validate_via_fallback(
        &self,
        token: &str,
        digest: &str,
        remote_reason: String,
    ) -> Result<ValidationResult, AuthError> {
        match self.fallback.verify(token) {
            Ok(result) => {
                self.cache.insert(digest.to_string(), result.clone());
                Ok(result)
            }
            Err(FallbackError::Expired) => Err(AuthError::ExpiredCredential),
            Err(FallbackError::InvalidToken(_)) => Err(AuthError::MalformedCredential),
            Err(FallbackError::Unavailable) => Err(AuthError::ServiceUnavailable(remote_reason)),
        }
    }
}

/// Lifetime in seconds assumed for authority verdicts that omit `expires_at`.
const DEFAULT_RESULT_LIFETIME_SECS: i64 = 300;
