// Copyright (c) 2026 Relay Labs, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! # WebSocket Ingress
//!
//! HTTP surface of the gate. `GET /ws` runs the full authentication sequence
//! before any session traffic flows; `GET /security/metrics` exposes the
//! monitor's aggregate snapshot.
//!
//! Rejection surfaces:
//! - Rate-limited attempts are answered `429 Too Many Requests` before the
//!   upgrade completes.
//! - Every other rejection completes the upgrade and immediately sends a
//!   close frame carrying the error's close code and client-safe message.
//! - An accepted connection enters the session loop; when the gate closes it
//!   (violation ceiling, forced invalidation) the close frame travels through
//!   the session's [`ConnectionHandle`].

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::application::audit::AuthAuditLogger;
use crate::application::authenticator::ConnectionAuthenticator;
use crate::application::monitor::SecurityMonitor;
use crate::application::security_manager::{ConnectionSecurityManager, ViolationOutcome};
use crate::domain::config::GateConfig;
use crate::domain::error::{AuthError, CLOSE_POLICY_VIOLATION};
use crate::domain::session::{ConnectionHandle, ConnectionId, SessionProfile, ViolationKind};
use crate::infrastructure::extract::HandshakeRequest;
use crate::infrastructure::validator::TokenValidator;

/// Shared state behind the ingress router.
pub struct AppState {
    pub authenticator: ConnectionAuthenticator,
    pub monitor: Arc<SecurityMonitor>,
    pub manager: Arc<ConnectionSecurityManager>,
    audit: AuthAuditLogger,
}

impl AppState {
    /// Wire the full gate from configuration.
    pub fn from_config(config: &GateConfig) -> anyhow::Result<Arc<Self>> {
        config.validate()?;
        let monitor = Arc::new(SecurityMonitor::new(
            config.environment,
            config.event_buffer_capacity,
        ));
        let manager = Arc::new(ConnectionSecurityManager::new(
            config.violation_ceiling,
            Arc::clone(&monitor),
        ));
        let validator = TokenValidator::from_config(config)?;
        let authenticator = ConnectionAuthenticator::new(
            config,
            validator,
            Arc::clone(&monitor),
            Arc::clone(&manager),
        );
        Ok(Arc::new(Self {
            authenticator,
            monitor,
            manager,
            audit: AuthAuditLogger::new(),
        }))
    }

    /// Record a violation against a live session and enforce the ceiling.
    ///
    /// A session past its ceiling is unregistered, closed through its
    /// connection handle with close code 1008, and the closure is written to
    /// the audit log.
    pub async fn report_violation(
        &self,
        connection_id: ConnectionId,
        kind: ViolationKind,
        details: &str,
    ) -> ViolationOutcome {
        let outcome = self.manager.report_violation(connection_id, kind, details);
        if let ViolationOutcome::CeilingExceeded(_) = outcome {
            if let Some(handle) = self.manager.unregister(connection_id) {
                handle
                    .close(CLOSE_POLICY_VIOLATION, "violation ceiling exceeded")
                    .await;
                self.audit
                    .connection_closed(&connection_id.to_string(), "violation_ceiling_exceeded");
            }
        }
        outcome
    }
}

/// Build the ingress router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/security/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

async fn ws_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let request = handshake_from_parts(&headers, query);

    // Echo a `jwt.*` subprotocol offer on the 101 response. RFC 6455 clients
    // abort the handshake when an offered subprotocol is not selected.
    let jwt_offers: Vec<String> = request
        .subprotocols
        .iter()
        .filter(|p| p.starts_with("jwt."))
        .cloned()
        .collect();
    let ws = ws.protocols(jwt_offers);

    let (close_tx, close_rx) = mpsc::channel::<CloseCommand>(1);
    let handle = Box::new(WsConnectionHandle { tx: close_tx });

    match state.authenticator.authenticate(&request, handle).await {
        Ok(profile) => {
            // If the client vanishes before the upgrade completes, the session
            // loop never runs; the failed-upgrade callback releases the
            // registration so the registry does not accumulate dead sessions.
            let connection_id = profile.connection_id;
            let registry = Arc::clone(&state);
            ws.on_failed_upgrade(move |_| {
                registry.manager.unregister(connection_id);
            })
            .on_upgrade(move |socket| session_loop(socket, profile, close_rx, state))
        }
        // Rate-limit breaches are answered before the upgrade, with HTTP 429.
        Err(AuthError::RateLimited) => {
            (StatusCode::TOO_MANY_REQUESTS, AuthError::RateLimited.client_message()).into_response()
        }
        // Everything else completes the upgrade and closes immediately so the
        // client receives a proper close code instead of an opaque HTTP error.
        Err(error) => ws.on_upgrade(move |mut socket| async move {
            let frame = CloseFrame {
                code: error.close_code(),
                reason: Utf8Bytes::from_static(error.client_message()),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
        }),
    }
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.metrics())
}

/// Pump one authenticated session until the peer disconnects or the gate
/// orders a close through the session's connection handle.
async fn session_loop(
    mut socket: WebSocket,
    profile: SessionProfile,
    mut close_rx: mpsc::Receiver<CloseCommand>,
    state: Arc<AppState>,
) {
    loop {
        tokio::select! {
            command = close_rx.recv() => {
                if let Some(command) = command {
                    let frame = CloseFrame {
                        code: command.code,
                        reason: command.reason.into(),
                    };
                    let _ = socket.send(Message::Close(Some(frame))).await;
                }
                break;
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Payload routing belongs to the realtime service
                        // behind the gate; the gate only polices the session.
                    }
                    Some(Err(e)) => {
                        debug!(connection_id = %profile.connection_id, error = %e, "socket error");
                        break;
                    }
                }
            }
        }
    }
    state.manager.unregister(profile.connection_id);
}

struct CloseCommand {
    code: u16,
    reason: String,
}

/// Close-signal half of a live WebSocket session. The socket itself stays
/// with the session loop; the handle only carries the order to shut down.
struct WsConnectionHandle {
    tx: mpsc::Sender<CloseCommand>,
}

#[async_trait]
impl ConnectionHandle for WsConnectionHandle {
    async fn close(&self, code: u16, reason: &str) {
        let _ = self
            .tx
            .send(CloseCommand {
                code,
                reason: reason.to_string(),
            })
            .await;
    }
}

/// Build the transport-neutral handshake view from HTTP request parts.
///
/// Header names arrive lowercased from the HTTP layer. Client identity for
/// rate limiting prefers `x-forwarded-for` (first hop), then `x-real-ip`.
fn handshake_from_parts(headers: &HeaderMap, query: HashMap<String, String>) -> HandshakeRequest {
    let mut header_map = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            header_map.insert(name.as_str().to_string(), value.to_string());
        }
    }

    let client_id = header_map
        .get("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| header_map.get("x-real-ip").cloned())
        .unwrap_or_else(|| "unknown".to_string());

    let subprotocols = header_map
        .get("sec-websocket-protocol")
        .map(|v| {
            v.split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default();

    HandshakeRequest {
        origin: header_map.get("origin").cloned(),
        client_id,
        headers: header_map,
        subprotocols,
        query,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::domain::config::{
        AuthorityConfig, CircuitBreakerSettings, Environment, RateLimitSettings, TokenCacheSettings,
    };

    fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        headers
    }

    #[test]
    fn test_handshake_prefers_forwarded_for() {
        let headers = header_map(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.2"),
            ("x-real-ip", "10.0.0.2"),
            ("origin", "https://app.example.com"),
        ]);
        let request = handshake_from_parts(&headers, HashMap::new());
        assert_eq!(request.client_id, "203.0.113.7");
        assert_eq!(request.origin.as_deref(), Some("https://app.example.com"));
    }

    #[test]
    fn test_handshake_falls_back_to_real_ip_then_unknown() {
        let headers = header_map(&[("x-real-ip", "198.51.100.4")]);
        let request = handshake_from_parts(&headers, HashMap::new());
        assert_eq!(request.client_id, "198.51.100.4");

        let request = handshake_from_parts(&HeaderMap::new(), HashMap::new());
        assert_eq!(request.client_id, "unknown");
    }

    #[test]
    fn test_handshake_splits_subprotocols() {
        let headers = header_map(&[("sec-websocket-protocol", "graphql-ws, jwt.dG9rZW4")]);
        let request = handshake_from_parts(&headers, HashMap::new());
        assert_eq!(
            request.subprotocols,
            vec!["graphql-ws".to_string(), "jwt.dG9rZW4".to_string()]
        );
    }

    fn test_state_with_endpoint(endpoint: &str) -> Arc<AppState> {
        let config = GateConfig {
            environment: Environment::Test,
            allowed_origins: Vec::new(),
            rate_limit: RateLimitSettings {
                max_requests: 5,
                window: Duration::from_secs(60),
            },
            authority: AuthorityConfig {
                endpoint: endpoint.to_string(),
                service_id: "relay-gate".to_string(),
                service_secret: "s3cret".to_string(),
                timeout: Duration::from_secs(1),
            },
            circuit_breaker: CircuitBreakerSettings::default(),
            token_cache: TokenCacheSettings::default(),
            fallback_verification_key_pem: None,
            violation_ceiling: 5,
            event_buffer_capacity: 100,
        };
        AppState::from_config(&config).unwrap()
    }

    fn test_state() -> Arc<AppState> {
        // The authority endpoint is never contacted by these tests.
        test_state_with_endpoint("http://127.0.0.1:9/validate")
    }

    #[tokio::test]
    async fn test_metrics_endpoint_serves_snapshot() {
        let router = app(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/security/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ws_route_requires_upgrade() {
        let router = app(test_state());
        let response = router
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        // A plain GET without the upgrade handshake is refused by the
        // extractor before any gate logic runs.
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
    }

    #[tokio::test]
    async fn test_healthz() {
        let router = app(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    const VALID_BODY: &str =
        r#"{"valid":true,"user_id":"u1","permissions":["read"],"expires_at":4102444800}"#;

    async fn spawn_app(state: Arc<AppState>) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app(state)).await.unwrap();
        });
        addr
    }

    fn upgrade_request(addr: std::net::SocketAddr, extra_headers: &str) -> String {
        format!(
            "GET /ws HTTP/1.1\r\n\
             Host: {addr}\r\n\
             Connection: Upgrade\r\n\
             Upgrade: websocket\r\n\
             Sec-WebSocket-Version: 13\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             {extra_headers}\r\n"
        )
    }

    #[tokio::test]
    async fn test_accepted_subprotocol_offer_is_echoed() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/validate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(VALID_BODY)
            .create_async()
            .await;

        let state = test_state_with_endpoint(&format!("{}/validate", server.url()));
        let addr = spawn_app(Arc::clone(&state)).await;

        // base64url of "abc.def.ghi", carried as a subprotocol offer.
        let offer = "jwt.YWJjLmRlZi5naGk";
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = upgrade_request(addr, &format!("Sec-WebSocket-Protocol: {offer}\r\n"));
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }

        let response = String::from_utf8_lossy(&buf).to_lowercase();
        assert!(response.starts_with("http/1.1 101"), "response: {response}");
        // The 101 must select the offered subprotocol or RFC 6455 clients
        // fail the handshake.
        assert!(
            response.contains(&format!("sec-websocket-protocol: {}", offer.to_lowercase())),
            "response: {response}"
        );
    }

    #[tokio::test]
    async fn test_session_released_when_client_drops_mid_handshake() {
        use tokio::io::AsyncWriteExt;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/validate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(VALID_BODY)
            .create_async()
            .await;

        let state = test_state_with_endpoint(&format!("{}/validate", server.url()));
        let addr = spawn_app(Arc::clone(&state)).await;

        {
            let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
            let request = upgrade_request(addr, "Authorization: Bearer abc.def.ghi\r\n");
            stream.write_all(request.as_bytes()).await.unwrap();
            // Drop without ever reading the 101.
        }

        // Authentication registers the session before the upgrade completes;
        // the vanished client must release it rather than leak it.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let metrics = state.monitor.metrics();
            let authenticated = metrics
                .events_by_type
                .get("authentication_success")
                .copied()
                .unwrap_or(0);
            if authenticated == 1 && state.manager.session_count() == 0 {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "session leaked after client dropped mid-handshake"
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    #[tokio::test]
    async fn test_ceiling_breach_closes_through_the_handle() {
        use crate::domain::credential::{CredentialCarrier, ValidationResult, ValidationSource};
        use crate::domain::session::Session;
        use chrono::Utc;
        use std::collections::HashSet;

        struct RecordingHandle {
            tx: mpsc::UnboundedSender<(u16, String)>,
        }

        #[async_trait]
        impl ConnectionHandle for RecordingHandle {
            async fn close(&self, code: u16, reason: &str) {
                let _ = self.tx.send((code, reason.to_string()));
            }
        }

        let state = test_state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = ValidationResult::authenticated(
            "u1".to_string(),
            None,
            HashSet::new(),
            Utc::now() + chrono::Duration::hours(1),
            ValidationSource::Remote,
        )
        .unwrap();
        let id = ConnectionId::new();
        state.manager.register(Session::new(
            id,
            &result,
            CredentialCarrier::Header,
            Box::new(RecordingHandle { tx }),
        ));

        // Ceiling is 5: five violations stay within it.
        for _ in 0..5 {
            let outcome = state
                .report_violation(id, ViolationKind::ProtocolViolation, "bad frame")
                .await;
            assert!(matches!(outcome, ViolationOutcome::Recorded(_)));
        }
        assert_eq!(state.manager.session_count(), 1);

        let outcome = state
            .report_violation(id, ViolationKind::ProtocolViolation, "bad frame")
            .await;
        assert_eq!(outcome, ViolationOutcome::CeilingExceeded(6));

        // The session is gone and the close order went through the handle.
        assert_eq!(state.manager.session_count(), 0);
        let (code, reason) = rx.recv().await.unwrap();
        assert_eq!(code, CLOSE_POLICY_VIOLATION);
        assert_eq!(reason, "violation ceiling exceeded");
    }
}
