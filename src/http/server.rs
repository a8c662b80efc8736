//! HTTP server setup and the multiwatch endpoint.
//!
//! # Responsibilities
//! - Create the Axum router and bind it to the listener (plain or TLS)
//! - Extract what a session needs from the inbound request
//! - Complete the client WebSocket upgrade once the dial phase succeeds
//! - Spawn the kind discovery refresher
//!
//! # Design Decisions
//! - The upgrade response is produced only after at least one backend dial
//!   succeeded; pre-upgrade failures surface as HTTP 500
//! - The backend-negotiated Sec-WebSocket-Protocol and Set-Cookie headers
//!   are copied onto the upgrade response

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::catalog::{discovery, HttpNamespaceLister, KindCatalog, KindDiscovery, NamespaceLister};
use crate::config::ProxyConfig;
use crate::proxy::{ClientSocket, RequestContext, WatchAggregator, WsDialer, MAX_MESSAGE_SIZE};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<WatchAggregator<WsDialer>>,
    /// Whether the listener terminates TLS; drives X-Forwarded-Proto.
    pub secure: bool,
}

/// HTTP server hosting the aggregating watch endpoint.
pub struct HttpServer {
    config: ProxyConfig,
    target: Url,
    kinds: Arc<KindCatalog>,
    namespaces: Arc<dyn NamespaceLister>,
}

impl HttpServer {
    /// Create a new server wired against the configured upstream target.
    pub fn new(config: ProxyConfig) -> Result<Self, url::ParseError> {
        let target: Url = config.upstream.target.parse()?;
        let namespaces: Arc<dyn NamespaceLister> = Arc::new(HttpNamespaceLister::new(&target)?);
        Ok(Self {
            config,
            target,
            kinds: Arc::new(KindCatalog::new()),
            namespaces,
        })
    }

    /// Substitute the namespace lister (tests, single-tenant deployments).
    pub fn with_namespace_lister(mut self, namespaces: Arc<dyn NamespaceLister>) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// Shared handle to the kind catalog.
    pub fn kind_catalog(&self) -> Arc<KindCatalog> {
        Arc::clone(&self.kinds)
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, target = %self.target, "HTTP server starting");

        let refresh_secs = self.config.upstream.discovery_interval_secs;
        if refresh_secs > 0 {
            let _refresher = discovery::spawn_refresh(
                KindDiscovery::new(self.target.clone()),
                Arc::clone(&self.kinds),
                Duration::from_secs(refresh_secs),
            );
        }

        let aggregator = WatchAggregator::new(
            self.target.clone(),
            WsDialer,
            Arc::clone(&self.kinds),
            Arc::clone(&self.namespaces),
        )
        .trace_frames(self.config.observability.trace_frames);

        let state = AppState {
            aggregator: Arc::new(aggregator),
            secure: self.config.listener.tls.is_some(),
        };
        let app = Self::build_router(state).into_make_service_with_connect_info::<SocketAddr>();

        match &self.config.listener.tls {
            Some(tls) => {
                let tls_config =
                    super::tls::load_tls_config(tls.cert_path.as_ref(), tls.key_path.as_ref())
                        .await?;
                let handle = axum_server::Handle::new();
                tokio::spawn({
                    let handle = handle.clone();
                    async move {
                        shutdown_signal().await;
                        handle.graceful_shutdown(Some(Duration::from_secs(10)));
                    }
                });
                axum_server::from_tcp_rustls(listener.into_std()?, tls_config)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
            None => {
                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown_signal())
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/proxy/multiwatch", get(multiwatch))
            .route("/healthz", get(health))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }
}

/// Aggregating watch handler.
///
/// Dials every watchable kind first; the client connection is upgraded only
/// once the first backend stream is up.
async fn multiwatch(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    // absent or unparseable resourceVersion falls back to 0
    let resource_version = params
        .get("resourceVersion")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let ctx = RequestContext {
        headers,
        remote_addr,
        secure: state.secure,
        resource_version,
    };

    match state.aggregator.establish(&ctx).await {
        Ok(session) => {
            let session_id = Uuid::new_v4();
            tracing::info!(
                session_id = %session_id,
                remote_addr = %remote_addr,
                backends = session.backends(),
                resource_version,
                "upgrading aggregated watch session"
            );
            let negotiated = session.upgrade.clone();
            let mut response = ws
                .max_message_size(MAX_MESSAGE_SIZE)
                .on_upgrade(move |socket| {
                    session
                        .run(ClientSocket::new(socket))
                        .instrument(tracing::info_span!("watch_session", session_id = %session_id))
                });
            negotiated.apply(response.headers_mut());
            response
        }
        Err(err) => {
            tracing::error!(
                remote_addr = %remote_addr,
                error = %err,
                "failed to establish aggregated watch session"
            );
            err.into_response()
        }
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install Ctrl+C handler");
        return;
    }
    tracing::info!("Shutdown signal received");
}
