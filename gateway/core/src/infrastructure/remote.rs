// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # Remote Validator
//!
//! Network client for the external identity authority. Sends the token plus
//! the gate's service identity headers and returns the authority's structured
//! verdict. Every transport failure, timeout, or non-success HTTP status is
//! reported as a [`RemoteValidatorError`] so the circuit breaker can count it;
//! a timed-out call is never left pending.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure talking to the identity authority. All variants count as circuit
/// breaker failures.
#[derive(Debug, Error)]
pub enum RemoteValidatorError {
    #[error("identity authority request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("identity authority returned status {0}")]
    UnexpectedStatus(u16),

    #[error("could not decode identity authority response: {0}")]
    Decode(String),
}

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    token: &'a str,
}

/// The authority's structured verdict.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorityResponse {
    pub valid: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Expiry as seconds since the Unix epoch.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// HTTP client for the identity authority's token-validation endpoint.
pub struct RemoteValidator {
    client: reqwest::Client,
    endpoint: String,
    service_id: String,
    service_secret: String,
}

impl RemoteValidator {
    /// Build a validator with a bounded request timeout (default 5s at the
    /// config layer).
    pub fn new(
        endpoint: impl Into<String>,
        service_id: impl Into<String>,
        service_secret: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            service_id: service_id.into(),
            service_secret: service_secret.into(),
        })
    }

    /// Ask the authority to validate `token`.
    ///
    /// # Errors
    ///
    /// Any [`RemoteValidatorError`] must be recorded as a breaker failure by
    /// the caller. A response with `valid == false` is *not* an error here —
    /// the authority answered; the verdict is the caller's to interpret.
    pub async fn validate(&self, token: &str) -> Result<AuthorityResponse, RemoteValidatorError> {
        debug!(endpoint = %self.endpoint, "validating token against identity authority");
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Service-ID", &self.service_id)
            .header("X-Service-Secret", &self.service_secret)
            .json(&ValidateRequest { token })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoteValidatorError::Timeout
                } else {
                    RemoteValidatorError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteValidatorError::UnexpectedStatus(status.as_u16()));
        }

        response
            .json::<AuthorityResponse>()
            .await
            .map_err(|e| RemoteValidatorError::Decode(e.to_string()))
    }
}
