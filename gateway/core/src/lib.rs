// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # Relay Gate Core
//!
//! Authentication and connection-security core for Relay's realtime
//! (WebSocket) ingress. Every incoming connection passes through the
//! [`application::authenticator::ConnectionAuthenticator`] pipeline before a
//! session is admitted:
//!
//! ```text
//! incoming handshake
//!   1. origin check
//!   2. RateLimiter::allow
//!   3. extract_credential (header → subprotocol → query)
//!   4. TokenValidator::validate (cache → revocation → remote | fallback)
//!   5. SecurityMonitor::detect_mock_credential
//!   6. ConnectionSecurityManager::register
//! ```
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Realtime connection gating

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
