//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use relay_core::{ConnectionId, RelayError, Result};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::{WS_HANDSHAKE_REJECTIONS_TOTAL, render};
use crate::origin::OriginPolicy;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::hub::{BroadcastHub, Dispatcher};
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Publishing side of the broadcast hub.
    pub hub: BroadcastHub,
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Handshake origin policy.
    pub origins: Arc<OriginPolicy>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Tracks session tasks so shutdown can wait for them.
    pub sessions: TaskTracker,
    /// One permit per allowed connection, held for the life of a session.
    pub slots: Arc<Semaphore>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    registry: Arc<ConnectionRegistry>,
    hub: BroadcastHub,
    dispatcher: Dispatcher,
    shutdown: Arc<ShutdownCoordinator>,
    sessions: TaskTracker,
    slots: Arc<Semaphore>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl RelayServer {
    /// Create a new server. The config is passed through
    /// [`ServerConfig::clamped`].
    pub fn new(config: ServerConfig) -> Self {
        let config = config.clamped();
        let slots = Arc::new(Semaphore::new(config.max_connections));
        let registry = Arc::new(ConnectionRegistry::new());
        let (hub, dispatcher) =
            BroadcastHub::new(Arc::clone(&registry), config.inbound_queue_capacity);
        Self {
            config: Arc::new(config),
            registry,
            hub,
            dispatcher,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            sessions: TaskTracker::new(),
            slots,
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from this Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            origins: Arc::new(OriginPolicy::from_list(&self.config.allowed_origins)),
            shutdown: Arc::clone(&self.shutdown),
            sessions: self.sessions.clone(),
            slots: Arc::clone(&self.slots),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        let ws_path = self.config.ws_path.as_str();
        let mut router = Router::new().route(ws_path, get(ws_handler));
        if ws_path != "/health" {
            router = router.route("/health", get(health_handler));
        }
        if ws_path != "/metrics" {
            router = router.route("/metrics", get(metrics_handler));
        }
        router.layer(TraceLayer::new_for_http()).with_state(state)
    }

    /// Live connections.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Bind the listener, start the dispatcher and serve.
    ///
    /// Fails with [`RelayError::Bind`] if the address cannot be bound.
    pub async fn start(self) -> Result<ServerHandle> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let dispatch_task = tokio::spawn(self.dispatcher.run(token.clone()));

        let serve_token = token.clone();
        let server_task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { serve_token.cancelled().await })
                .await;
            if let Err(e) = result {
                let err = RelayError::Serve(e);
                error!(error = %err, kind = err.error_kind(), "server stopped");
            }
        });

        info!(
            %local_addr,
            ws_path = %self.config.ws_path,
            "relay listening"
        );

        Ok(ServerHandle {
            local_addr,
            registry: self.registry,
            shutdown: self.shutdown,
            sessions: self.sessions,
            shutdown_timeout: self.config.shutdown_timeout,
            tasks: vec![dispatch_task, server_task],
        })
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    sessions: TaskTracker,
    shutdown_timeout: std::time::Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Live connections.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Stop accepting, stop the dispatcher, close every connection and wait
    /// for tasks up to the configured shutdown timeout.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn shutdown(self) -> bool {
        info!("shutting down");
        self.shutdown.shutdown();

        let drained = self.registry.drain();
        for conn in &drained {
            let _ = conn.close();
        }
        info!(closed = drained.len(), "closed all connections");

        let _ = self.sessions.close();
        let sessions = self.sessions.clone();
        let mut tasks = self.tasks;
        tasks.push(tokio::spawn(async move { sessions.wait().await }));

        let completed = self
            .shutdown
            .graceful_shutdown(tasks, self.shutdown_timeout)
            .await;
        info!(completed, "shutdown finished");
        completed
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.registry.len()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn reject(status: StatusCode, reason: &'static str) -> Response {
    counter!(WS_HANDSHAKE_REJECTIONS_TOTAL, "reason" => reason).increment(1);
    (status, reason).into_response()
}

/// GET {ws_path}: WebSocket upgrade.
///
/// Origin and capacity are checked before the upgrade itself, so refused
/// requests never reach the registry. A connection slot is reserved here and
/// released when the session ends; if the upgrade fails the slot is dropped
/// with the callback.
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let origin = match headers.get(header::ORIGIN).map(|v| v.to_str()) {
        None => None,
        Some(Ok(origin)) => Some(origin),
        Some(Err(_)) => {
            warn!("handshake rejected: unreadable origin header");
            return reject(StatusCode::FORBIDDEN, "origin not allowed");
        }
    };
    if !state.origins.allows(origin) {
        warn!(origin, "handshake rejected: origin not allowed");
        return reject(StatusCode::FORBIDDEN, "origin not allowed");
    }

    let Ok(slot) = Arc::clone(&state.slots).try_acquire_owned() else {
        warn!(
            connections = state.registry.len(),
            max = state.config.max_connections,
            "handshake rejected: connection limit reached"
        );
        return reject(StatusCode::SERVICE_UNAVAILABLE, "too many connections");
    };

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!(
                status = %rejection.status(),
                reason = %rejection.body_text(),
                "handshake rejected: not a websocket upgrade"
            );
            counter!(WS_HANDSHAKE_REJECTIONS_TOTAL, "reason" => "invalid_upgrade").increment(1);
            return rejection.into_response();
        }
    };

    let config = Arc::clone(&state.config);
    ws.max_message_size(config.max_message_size)
        .on_failed_upgrade(|e| warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| {
            let id = ConnectionId::new();
            let task = session::run_connection(
                socket,
                id,
                state.hub.clone(),
                config,
                state.shutdown.token(),
            );
            let tracked = state.sessions.track_future(task);
            async move {
                let _ = tracked.await;
                drop(slot);
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    use crate::websocket::connection::ClientConnection;

    fn make_server() -> RelayServer {
        RelayServer::new(ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        })
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let resp = server.router().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_counts_registered_connections() {
        let server = make_server();
        let (conn, _rx) = ClientConnection::channel(ConnectionId::from_raw("c1"), 4);
        let _ = server.registry().add(conn);

        let resp = server.router().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(body_json(resp).await["connections"], 1);
    }

    #[tokio::test]
    async fn plain_get_on_ws_path_is_rejected() {
        let server = make_server();
        let resp = server.router().oneshot(get_request("/ws")).await.unwrap();
        assert!(resp.status().is_client_error(), "got {}", resp.status());
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn post_on_ws_path_not_allowed() {
        let server = make_server();
        let req = Request::builder()
            .method("POST")
            .uri("/ws")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn disallowed_origin_forbidden() {
        let server = RelayServer::new(ServerConfig {
            allowed_origins: vec!["https://chat.example".into()],
            ..ServerConfig::default()
        });
        let req = Request::builder()
            .uri("/ws")
            .header(header::ORIGIN, "https://evil.example")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn allowed_origin_passes_origin_check() {
        let server = RelayServer::new(ServerConfig {
            allowed_origins: vec!["https://chat.example".into()],
            ..ServerConfig::default()
        });
        let req = Request::builder()
            .uri("/ws")
            .header(header::ORIGIN, "https://chat.example")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        // Reaches the upgrade check, which fails without upgrade headers.
        assert_ne!(resp.status(), StatusCode::FORBIDDEN);
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn over_capacity_unavailable() {
        let server = RelayServer::new(ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        });
        let _held = Arc::clone(&server.slots).try_acquire_owned().unwrap();

        let resp = server.router().oneshot(get_request("/ws")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn refused_upgrade_releases_its_slot() {
        let server = RelayServer::new(ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        });
        for _ in 0..3 {
            let resp = server.router().oneshot(get_request("/ws")).await.unwrap();
            assert_ne!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
        assert_eq!(server.slots.available_permits(), 1);
    }

    #[test]
    fn zero_heartbeat_interval_clamped_on_new() {
        let server = RelayServer::new(ServerConfig {
            heartbeat_interval: std::time::Duration::ZERO,
            ..ServerConfig::default()
        });
        assert!(!server.config.heartbeat_interval.is_zero());
    }

    #[tokio::test]
    async fn custom_ws_path_routed() {
        let server = RelayServer::new(ServerConfig {
            ws_path: "/chat".into(),
            ..ServerConfig::default()
        });
        let resp = server.router().oneshot(get_request("/ws")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = server.router().oneshot(get_request("/chat")).await.unwrap();
        assert!(resp.status().is_client_error());
        assert_ne!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_without_recorder_not_found() {
        let server = make_server();
        let resp = server.router().oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_handle_renders() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let server = make_server().with_metrics(handle);
        let resp = server.router().oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/plain"));
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let resp = server.router().oneshot(get_request("/nonexistent")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_binds_ephemeral_port_and_shuts_down() {
        let handle = make_server().start().await.unwrap();
        assert_ne!(handle.local_addr().port(), 0);
        assert!(handle.shutdown().await);
    }

    #[tokio::test]
    async fn bind_failure_is_fatal_error() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let server = RelayServer::new(ServerConfig {
            host: "127.0.0.1".into(),
            port,
            ..ServerConfig::default()
        });
        let err = server.start().await.err().unwrap();
        assert!(err.is_fatal());
        assert!(matches!(err, RelayError::Bind { .. }));
    }
}
