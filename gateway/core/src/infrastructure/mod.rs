// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0

pub mod circuit_breaker;
pub mod extract;
pub mod local_fallback;
pub mod rate_limit;
pub mod remote;
pub mod revocation;
pub mod token_cache;
pub mod validator;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use extract::{extract_credential, HandshakeRequest};
pub use rate_limit::RateLimiter;
pub use validator::TokenValidator;
