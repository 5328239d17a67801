// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Presentation layer: the HTTP/WebSocket ingress surface.

pub mod ws;

pub use ws::{app, AppState};
