// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: configuration, credential and session models, the error
//! taxonomy, and security event value objects.

pub mod config;
pub mod credential;
pub mod error;
pub mod events;
pub mod session;

pub use config::{Environment, GateConfig};
pub use credential::{Credential, CredentialCarrier, ValidationResult, ValidationSource};
pub use error::AuthError;
pub use events::{SecurityEvent, SecurityEventKind, Severity};
pub use session::{ConnectionHandle, ConnectionId, Session, SessionProfile, ViolationKind};
