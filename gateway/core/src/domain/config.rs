// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0

//! # Gate Configuration
//!
//! Configuration schema for the realtime ingress gate: origin allow list,
//! connection-attempt rate limiting, remote identity authority endpoint and
//! service identity, circuit breaker tuning, local fallback key, token cache
//! sizing, and the per-session violation ceiling. YAML-loadable with serde
//! defaults; validated at load.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Deployment environment the gate runs in.
///
/// Mock-credential detection treats `Development` and `Test` as allowed
/// environments for allow-listed test tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Development,
    Test,
}

impl Environment {
    pub fn is_test_like(&self) -> bool {
        matches!(self, Self::Development | Self::Test)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::Production
    }
}

/// Top-level configuration for the realtime gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Deployment environment.
    #[serde(default)]
    pub environment: Environment,

    /// Allowed connection origins. Supports `*.domain` wildcards.
    /// An empty list allows any origin (intended for private deployments
    /// behind an ingress that enforces origins itself).
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Connection-attempt rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    /// Remote identity authority.
    pub authority: AuthorityConfig,

    /// Circuit breaker around the remote authority.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    /// Token cache sizing.
    #[serde(default)]
    pub token_cache: TokenCacheSettings,

    /// PEM-encoded RSA public key for offline fallback verification.
    /// When absent, fallback is unavailable and authority outages surface
    /// as `ServiceUnavailable`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_verification_key_pem: Option<String>,

    /// Violations a session may accumulate before `is_valid` reports false.
    #[serde(default = "default_violation_ceiling")]
    pub violation_ceiling: u32,

    /// Security-event ring buffer capacity.
    #[serde(default = "default_event_buffer_capacity")]
    pub event_buffer_capacity: usize,
}

/// Sliding-window rate limit for connection attempts, per client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Maximum attempts within the window.
    #[serde(default = "default_rate_limit_max")]
    pub max_requests: usize,

    /// Trailing window duration.
    #[serde(with = "humantime_serde", default = "default_rate_limit_window")]
    pub window: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: default_rate_limit_max(),
            window: default_rate_limit_window(),
        }
    }
}

/// Remote identity authority endpoint and service identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Token validation endpoint, e.g. `https://id.internal/v1/tokens/validate`.
    pub endpoint: String,

    /// Service identity sent as `X-Service-ID`.
    pub service_id: String,

    /// Service secret sent as `X-Service-Secret` (supports `env:VAR_NAME`).
    pub service_secret: String,

    /// Request timeout. Timed-out calls count as circuit breaker failures.
    #[serde(with = "humantime_serde", default = "default_authority_timeout")]
    pub timeout: Duration,
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before the breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time the breaker stays open before probing again.
    #[serde(with = "humantime_serde", default = "default_cool_down")]
    pub cool_down: Duration,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cool_down: default_cool_down(),
        }
    }
}

/// Token cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCacheSettings {
    /// Maximum cached validation results.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Upper bound on any entry's lifetime, regardless of claimed expiry.
    #[serde(with = "humantime_serde", default = "default_cache_max_ttl")]
    pub max_ttl: Duration,
}

impl Default for TokenCacheSettings {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            max_ttl: default_cache_max_ttl(),
        }
    }
}

fn default_rate_limit_max() -> usize {
    30
}

fn default_rate_limit_window() -> Duration {
    Duration::from_secs(60)
}

fn default_authority_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cool_down() -> Duration {
    Duration::from_secs(30)
}

fn default_cache_capacity() -> usize {
    10_000
}

fn default_cache_max_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_violation_ceiling() -> u32 {
    5
}

fn default_event_buffer_capacity() -> usize {
    1000
}

impl GateConfig {
    /// Parse a YAML document and validate it.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would disable enforcement outright.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.authority.endpoint.trim().is_empty() {
            anyhow::bail!("authority.endpoint must not be empty");
        }
        if self.authority.service_id.trim().is_empty() {
            anyhow::bail!("authority.service_id must not be empty");
        }
        if self.rate_limit.max_requests == 0 {
            anyhow::bail!("rate_limit.max_requests must be greater than zero");
        }
        if self.circuit_breaker.failure_threshold == 0 {
            anyhow::bail!("circuit_breaker.failure_threshold must be greater than zero");
        }
        if self.token_cache.capacity == 0 {
            anyhow::bail!("token_cache.capacity must be greater than zero");
        }
        if self.event_buffer_capacity == 0 {
            anyhow::bail!("event_buffer_capacity must be greater than zero");
        }
        Ok(())
    }

    /// Resolve `env:VAR_NAME` indirection in the service secret.
    pub fn resolved_service_secret(&self) -> anyhow::Result<String> {
        match self.authority.service_secret.strip_prefix("env:") {
            Some(var) => std::env::var(var)
                .map_err(|_| anyhow::anyhow!("environment variable '{}' not set", var)),
            None => Ok(self.authority.service_secret.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = r#"
environment: test
authority:
  endpoint: "https://id.internal/v1/tokens/validate"
  service_id: "relay-gate"
  service_secret: "s3cret"
"#;

    #[test]
    fn test_minimal_config_applies_defaults() {
        let config = GateConfig::from_yaml(MINIMAL_YAML).unwrap();
        assert_eq!(config.environment, Environment::Test);
        assert_eq!(config.rate_limit.max_requests, 30);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.authority.timeout, Duration::from_secs(5));
        assert_eq!(config.violation_ceiling, 5);
        assert!(config.allowed_origins.is_empty());
    }

    #[test]
    fn test_humantime_durations_parse() {
        let yaml = r#"
authority:
  endpoint: "https://id.internal/validate"
  service_id: "relay-gate"
  service_secret: "x"
  timeout: 2s
rate_limit:
  max_requests: 10
  window: 30s
circuit_breaker:
  failure_threshold: 3
  cool_down: 1m
"#;
        let config = GateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.authority.timeout, Duration::from_secs(2));
        assert_eq!(config.rate_limit.window, Duration::from_secs(30));
        assert_eq!(config.circuit_breaker.cool_down, Duration::from_secs(60));
    }

    #[test]
    fn test_rejects_empty_endpoint() {
        let yaml = r#"
authority:
  endpoint: ""
  service_id: "relay-gate"
  service_secret: "x"
"#;
        assert!(GateConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_rejects_zero_rate_limit() {
        let yaml = r#"
authority:
  endpoint: "https://id.internal/validate"
  service_id: "relay-gate"
  service_secret: "x"
rate_limit:
  max_requests: 0
"#;
        assert!(GateConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_service_secret_env_indirection() {
        std::env::set_var("GATE_TEST_SECRET", "from-env");
        let yaml = r#"
authority:
  endpoint: "https://id.internal/validate"
  service_id: "relay-gate"
  service_secret: "env:GATE_TEST_SECRET"
"#;
        let config = GateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.resolved_service_secret().unwrap(), "from-env");
        std::env::remove_var("GATE_TEST_SECRET");
    }
}
