// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Application layer: the authentication orchestrator, session registry,
//! security monitor, and audit logging.

pub mod audit;
pub mod authenticator;
pub mod monitor;
pub mod security_manager;

pub use audit::AuthAuditLogger;
pub use authenticator::ConnectionAuthenticator;
pub use monitor::{AlertCallback, SecurityMetrics, SecurityMonitor};
pub use security_manager::{ConnectionSecurityManager, ViolationOutcome};
