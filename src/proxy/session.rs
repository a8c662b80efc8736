//! Watch aggregation sessions.
//!
//! # Responsibilities
//! - Drive one inbound request through the full session lifecycle:
//!   validate → prepare headers → list namespaces → dial every watch path →
//!   hand back everything the upgraded client connection needs
//! - Apply the Forbidden-expansion retry policy
//! - Cascade teardown to every backend reader when the client writer ends
//!
//! # Data Flow
//! ```text
//! kind catalog ──► path generator ──► path queue ──► dial loop
//!                                          ▲             │
//!                                          └── Forbidden expansion
//!                                                        │
//!                        backend readers (N) ◄───────────┘
//!                                │
//!                                ▼
//!                         outbound queue ──► client writer ──► client
//! ```
//!
//! # Design Decisions
//! - The dial loop finishes before the client upgrade completes; the
//!   outbound queue buffers (and backpressures) frames read in the interim
//! - Zero successful dials fail the request with a server error instead of
//!   upgrading a connection that could never carry a frame
//! - Dial loop completion = generator finished AND expansion pushes flushed
//!   AND queue empty; pending paths are never lost

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{Sink, Stream};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use url::Url;

use super::backend;
use super::client;
use super::headers::{self, Director, UpgradeHeaders};
use super::paths::{self, WatchPath};
use super::transport::{Dialer, Frame, StreamError};
use super::{OUTBOUND_QUEUE_CAPACITY, PATH_QUEUE_CAPACITY};
use crate::catalog::{KindCatalog, NamespaceError, NamespaceLister};
use crate::observability::metrics;

/// Produces the backend URL for one watch path at one resource version.
pub type BackendUrlFn =
    Box<dyn Fn(&WatchPath, u64) -> Result<Url, url::ParseError> + Send + Sync>;

/// What the engine needs from the inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub headers: HeaderMap,
    pub remote_addr: SocketAddr,
    /// Whether the inbound connection arrived over TLS.
    pub secure: bool,
    /// Starting cursor, pinned for every backend dial of the session.
    pub resource_version: u64,
}

/// Session-fatal conditions, all surfaced before the client upgrade.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("backend url factory is not configured")]
    MissingBackendFn,

    #[error("invalid backend url: {0}")]
    BackendUrl(#[from] url::ParseError),

    #[error("failed to list namespaces: {0}")]
    Namespaces(#[from] NamespaceError),

    #[error("no upstream watch stream could be established")]
    NoBackends,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("internal server error ({self})"),
        )
            .into_response()
    }
}

/// Aggregates every watchable kind's backend stream into one session.
pub struct WatchAggregator<D> {
    backend: Option<BackendUrlFn>,
    dialer: D,
    kinds: Arc<KindCatalog>,
    namespaces: Arc<dyn NamespaceLister>,
    director: Option<Box<Director>>,
    trace_frames: bool,
}

impl<D: Dialer> WatchAggregator<D> {
    /// New aggregator rewriting watch paths onto the target's scheme and
    /// host.
    pub fn new(
        target: Url,
        dialer: D,
        kinds: Arc<KindCatalog>,
        namespaces: Arc<dyn NamespaceLister>,
    ) -> Self {
        Self {
            backend: Some(backend_url_fn(target)),
            dialer,
            kinds,
            namespaces,
            director: None,
            trace_frames: false,
        }
    }

    /// Replace (or remove) the backend URL factory.
    pub fn backend_url_fn(mut self, backend: Option<BackendUrlFn>) -> Self {
        self.backend = backend;
        self
    }

    /// Install a hook that may add or overwrite outbound dial headers.
    pub fn director(
        mut self,
        director: impl Fn(&HeaderMap, &mut HeaderMap) + Send + Sync + 'static,
    ) -> Self {
        self.director = Some(Box::new(director));
        self
    }

    /// Log every dial and forwarded frame.
    pub fn trace_frames(mut self, on: bool) -> Self {
        self.trace_frames = on;
        self
    }

    /// Run the dial phase of a session: enumerate watch paths, dial each
    /// backend, spawn a reader per live stream.
    ///
    /// Succeeds once at least one backend stream is up, returning everything
    /// the upgraded client connection will be driven with. Frames read
    /// before the upgrade wait in the outbound queue.
    pub async fn establish(
        &self,
        ctx: &RequestContext,
    ) -> Result<EstablishedSession, SessionError> {
        let backend_url = self.backend.as_ref().ok_or(SessionError::MissingBackendFn)?;
        let dial_headers = headers::dial_headers(
            &ctx.headers,
            ctx.remote_addr,
            ctx.secure,
            self.director.as_deref(),
        );
        let namespaces = self.namespaces.list().await?;

        let (path_tx, mut path_rx) = mpsc::channel(PATH_QUEUE_CAPACITY);
        let mut generator = paths::spawn_generator(Arc::clone(&self.kinds), path_tx.clone());
        let mut generator_done = false;
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

        let mut stops = Vec::new();
        let mut upgrade: Option<UpgradeHeaders> = None;
        // expansion pushes run detached so a burst larger than the queue
        // cannot deadlock the dial loop
        let mut expansions = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                Some(path) = path_rx.recv() => {
                    let url = backend_url(&path, ctx.resource_version)?;
                    if self.trace_frames {
                        tracing::info!(url = %url, "adding watch backend");
                    }
                    match self.dialer.dial(url.clone(), dial_headers.clone()).await {
                        Ok((stream, response)) => {
                            if upgrade.is_none() {
                                upgrade = Some(UpgradeHeaders::from_dial(&response));
                            }
                            stops.push(backend::spawn(
                                url.to_string(),
                                stream,
                                outbound_tx.clone(),
                                self.trace_frames,
                            ));
                        }
                        Err(err) if err.is_forbidden() && !path.is_namespaced() => {
                            tracing::debug!(
                                path = %path,
                                "forbidden at cluster scope, retrying per namespace"
                            );
                            let expanded = path.for_namespaces(&namespaces);
                            let tx = path_tx.clone();
                            expansions.spawn(async move {
                                for namespaced in expanded {
                                    if tx.send(namespaced).await.is_err() {
                                        break;
                                    }
                                }
                            });
                        }
                        Err(err) => {
                            // this kind is unavailable for the session
                            metrics::dial_failed();
                            tracing::debug!(url = %url, error = %err, "skipping watch backend");
                        }
                    }
                }
                _ = &mut generator, if !generator_done => generator_done = true,
                Some(_) = expansions.join_next(), if !expansions.is_empty() => {}
            }
            if generator_done && expansions.is_empty() && path_rx.is_empty() {
                break;
            }
        }
        drop(path_tx);

        let upgrade = upgrade.ok_or(SessionError::NoBackends)?;
        metrics::session_established(stops.len());
        tracing::debug!(backends = stops.len(), "watch session established");

        Ok(EstablishedSession {
            outbound: outbound_rx,
            stops,
            upgrade,
            trace_frames: self.trace_frames,
        })
    }
}

/// A session whose dial phase completed with at least one live backend.
#[derive(Debug)]
pub struct EstablishedSession {
    outbound: mpsc::Receiver<Frame>,
    stops: Vec<backend::StopSignal>,
    /// Headers negotiated by the first successful backend dial, to be
    /// applied to the client upgrade response.
    pub upgrade: UpgradeHeaders,
    trace_frames: bool,
}

impl EstablishedSession {
    /// Number of live backend streams feeding this session.
    pub fn backends(&self) -> usize {
        self.stops.len()
    }

    /// Drive the upgraded client connection until it terminates, then fire
    /// every stop signal exactly once.
    pub async fn run<C>(self, client: C)
    where
        C: Stream<Item = Result<Frame, StreamError>>
            + Sink<Frame, Error = StreamError>
            + Send
            + Unpin
            + 'static,
    {
        let end = client::run(client, self.outbound, self.trace_frames).await;
        metrics::session_ended(end.label());
        tracing::debug!(
            reason = %end,
            readers = self.stops.len(),
            "watch session ended, stopping backend readers"
        );
        for stop in self.stops {
            stop.fire();
        }
    }
}

fn backend_url_fn(target: Url) -> BackendUrlFn {
    Box::new(move |path, resource_version| {
        let scheme = match target.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        let host = target.host_str().unwrap_or_default();
        let port = target
            .port()
            .map(|p| format!(":{p}"))
            .unwrap_or_default();
        Url::parse(&format!(
            "{scheme}://{host}{port}/{path}?watch=true&resourceVersion={resource_version}",
            path = path.as_str().trim_start_matches('/'),
        ))
    })
}
