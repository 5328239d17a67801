// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # Credential Extraction
//!
//! Pulls a bearer credential out of a realtime handshake. Three carriers are
//! tried in priority order:
//!
//! 1. `Authorization: Bearer <token>` header
//! 2. WebSocket subprotocol value `jwt.<base64url-no-padding(token)>`
//! 3. `token` query parameter
//!
//! Extraction is a pure function of the handshake: no side effects, no
//! network. Decoded subprotocol tokens are checked for leading/trailing
//! malformation (whitespace, control characters) before being accepted.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use std::collections::HashMap;

use crate::domain::credential::{Credential, CredentialCarrier};

/// Transport-level view of an incoming connection handshake.
///
/// Header names are expected lowercased (the presentation layer normalizes
/// them); query keys are taken as sent.
#[derive(Debug, Clone, Default)]
pub struct HandshakeRequest {
    /// `Origin` header, if the client sent one.
    pub origin: Option<String>,
    /// Client identity used for rate limiting (peer address or forwarded-for).
    pub client_id: String,
    /// Request headers, names lowercased.
    pub headers: HashMap<String, String>,
    /// Offered WebSocket subprotocols, in client order.
    pub subprotocols: Vec<String>,
    /// Query parameters.
    pub query: HashMap<String, String>,
}

/// Try each carrier in priority order; `None` if no carrier holds a token.
pub fn extract_credential(request: &HandshakeRequest) -> Option<Credential> {
    from_authorization_header(request)
        .or_else(|| from_subprotocol(request))
        .or_else(|| from_query(request))
}

fn from_authorization_header(request: &HandshakeRequest) -> Option<Credential> {
    let value = request.headers.get("authorization")?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(Credential::new(token, CredentialCarrier::Header))
}

fn from_subprotocol(request: &HandshakeRequest) -> Option<Credential> {
    for offered in &request.subprotocols {
        let encoded = match offered.trim().strip_prefix("jwt.") {
            Some(e) if !e.is_empty() => e,
            _ => continue,
        };
        let bytes = match URL_SAFE_NO_PAD.decode(encoded) {
            Ok(b) => b,
            Err(_) => continue,
        };
        let token = match String::from_utf8(bytes) {
            Ok(t) => t,
            Err(_) => continue,
        };
        if is_clean_token(&token) {
            return Some(Credential::new(token, CredentialCarrier::Subprotocol));
        }
    }
    None
}

fn from_query(request: &HandshakeRequest) -> Option<Credential> {
    let token = request.query.get("token")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(Credential::new(token, CredentialCarrier::Query))
}

/// A decoded token must not carry leading/trailing whitespace or embedded
/// control characters; either indicates tampering or a broken encoder.
fn is_clean_token(token: &str) -> bool {
    !token.is_empty()
        && token.trim() == token
        && !token.chars().any(|c| c.is_control() || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> HandshakeRequest {
        HandshakeRequest {
            client_id: "10.0.0.1".to_string(),
            ..Default::default()
        }
    }

    fn encode_subprotocol(token: &str) -> String {
        format!("jwt.{}", URL_SAFE_NO_PAD.encode(token.as_bytes()))
    }

    #[test]
    fn test_header_carrier_wins() {
        let mut req = request();
        req.headers
            .insert("authorization".to_string(), "Bearer abc.def.ghi".to_string());
        req.subprotocols.push(encode_subprotocol("sub.proto.token"));
        req.query.insert("token".to_string(), "query-token".to_string());

        let cred = extract_credential(&req).unwrap();
        assert_eq!(cred.token, "abc.def.ghi");
        assert_eq!(cred.carrier, CredentialCarrier::Header);
    }

    #[test]
    fn test_header_scheme_is_case_insensitive() {
        let mut req = request();
        req.headers
            .insert("authorization".to_string(), "bearer tok.en.sig".to_string());
        assert_eq!(extract_credential(&req).unwrap().token, "tok.en.sig");
    }

    #[test]
    fn test_non_bearer_scheme_is_ignored() {
        let mut req = request();
        req.headers
            .insert("authorization".to_string(), "Basic dXNlcjpwYXNz".to_string());
        assert!(extract_credential(&req).is_none());
    }

    #[test]
    fn test_subprotocol_carrier() {
        let mut req = request();
        req.subprotocols.push("graphql-ws".to_string());
        req.subprotocols.push(encode_subprotocol("abc.def.ghi"));

        let cred = extract_credential(&req).unwrap();
        assert_eq!(cred.token, "abc.def.ghi");
        assert_eq!(cred.carrier, CredentialCarrier::Subprotocol);
    }

    #[test]
    fn test_subprotocol_rejects_malformed_payload() {
        let mut req = request();
        // Decodes to a token with trailing whitespace.
        req.subprotocols.push(encode_subprotocol("abc.def.ghi "));
        assert!(extract_credential(&req).is_none());

        // Not valid base64url at all.
        let mut req = request();
        req.subprotocols.push("jwt.!!!not-base64!!!".to_string());
        assert!(extract_credential(&req).is_none());
    }

    #[test]
    fn test_query_carrier_is_last_resort() {
        let mut req = request();
        req.query.insert("token".to_string(), "query.tok.en".to_string());

        let cred = extract_credential(&req).unwrap();
        assert_eq!(cred.token, "query.tok.en");
        assert_eq!(cred.carrier, CredentialCarrier::Query);
    }

    #[test]
    fn test_no_credential_anywhere() {
        assert!(extract_credential(&request()).is_none());
    }
}
