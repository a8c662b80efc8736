//! Frame-level transport contracts.
//!
//! # Responsibilities
//! - Define the frame type the aggregation engine moves around
//! - Define the `Dialer` capability for opening backend watch streams
//! - Adapt tungstenite (backend side) and axum (client side) sockets to the
//!   frame-level `Stream`/`Sink` shape the engine consumes
//!
//! # Design Decisions
//! - The engine never touches a concrete socket type; tests substitute fakes
//! - Handshake rejections keep their HTTP status so the dial loop can detect
//!   Forbidden responses
//! - Payloads stay opaque: data frames are forwarded byte-identical

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::extract::ws::{Message as ClientMessage, WebSocket};
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use futures_util::{Sink, Stream};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message as BackendMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

/// A single frame on a duplex streaming connection.
///
/// Payloads are opaque bytes; the proxy never parses them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close,
}

impl Frame {
    /// True for frames that carry watch payloads (as opposed to control
    /// traffic).
    pub fn is_data(&self) -> bool {
        matches!(self, Frame::Text(_) | Frame::Binary(_))
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(t) => t.len(),
            Frame::Binary(b) | Frame::Ping(b) | Frame::Pong(b) => b.len(),
            Frame::Close => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Error produced by a frame stream after the handshake succeeded.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct StreamError(Box<dyn std::error::Error + Send + Sync>);

impl StreamError {
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

impl From<tungstenite::Error> for StreamError {
    fn from(err: tungstenite::Error) -> Self {
        Self::new(err)
    }
}

impl From<axum::Error> for StreamError {
    fn from(err: axum::Error) -> Self {
        Self::new(err)
    }
}

/// Error produced while opening a backend watch stream.
#[derive(Debug, Error)]
pub enum DialError {
    /// The backend answered the handshake with a non-switching status.
    #[error("backend rejected handshake: {status}")]
    Rejected { status: StatusCode, body: String },

    /// The connection could not be established at all.
    #[error("dial failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl DialError {
    /// True when the backend refused the stream for authorization reasons,
    /// which makes the path a candidate for per-namespace expansion.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, DialError::Rejected { status, .. } if *status == StatusCode::FORBIDDEN)
    }
}

/// Headers the backend negotiated during the dial handshake.
#[derive(Debug, Clone)]
pub struct DialResponse {
    pub headers: HeaderMap,
}

/// Capability for opening a duplex watch stream to a backend URL.
///
/// Injected at construction so tests can substitute fakes; the production
/// implementation is [`WsDialer`].
pub trait Dialer: Send + Sync + 'static {
    type Stream: Stream<Item = Result<Frame, StreamError>> + Send + Unpin + 'static;

    fn dial(
        &self,
        url: Url,
        headers: HeaderMap,
    ) -> impl std::future::Future<Output = Result<(Self::Stream, DialResponse), DialError>> + Send;
}

/// WebSocket dialer backed by tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct WsDialer;

impl Dialer for WsDialer {
    type Stream = BackendSocket;

    async fn dial(
        &self,
        url: Url,
        headers: HeaderMap,
    ) -> Result<(Self::Stream, DialResponse), DialError> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| DialError::Transport(Box::new(e)))?;
        request.headers_mut().extend(headers);

        match connect_async(request).await {
            Ok((socket, response)) => {
                let negotiated = DialResponse {
                    headers: response.headers().clone(),
                };
                Ok((BackendSocket { inner: socket }, negotiated))
            }
            Err(tungstenite::Error::Http(response)) => {
                let status = response.status();
                let body = response
                    .into_body()
                    .map(|b| String::from_utf8_lossy(&b).into_owned())
                    .unwrap_or_default();
                Err(DialError::Rejected { status, body })
            }
            Err(err) => Err(DialError::Transport(Box::new(err))),
        }
    }
}

/// Read side of one backend watch stream, adapted to [`Frame`]s.
///
/// Dropping the socket closes the underlying connection.
pub struct BackendSocket {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Stream for BackendSocket {
    type Item = Result<Frame, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            return match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(message)) => match backend_frame(message) {
                    Some(frame) => Poll::Ready(Some(Ok(frame))),
                    // raw frames are not surfaced at this layer
                    None => continue,
                },
                Some(Err(err)) => Poll::Ready(Some(Err(err.into()))),
                None => Poll::Ready(None),
            };
        }
    }
}

fn backend_frame(message: BackendMessage) -> Option<Frame> {
    match message {
        BackendMessage::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
        BackendMessage::Binary(payload) => Some(Frame::Binary(payload)),
        BackendMessage::Ping(payload) => Some(Frame::Ping(payload)),
        BackendMessage::Pong(payload) => Some(Frame::Pong(payload)),
        BackendMessage::Close(_) => Some(Frame::Close),
        BackendMessage::Frame(_) => None,
    }
}

/// The upgraded client connection, adapted to [`Frame`]s.
pub struct ClientSocket {
    inner: WebSocket,
}

impl ClientSocket {
    pub fn new(socket: WebSocket) -> Self {
        Self { inner: socket }
    }
}

impl Stream for ClientSocket {
    type Item = Result<Frame, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
            Some(Ok(message)) => Poll::Ready(Some(Ok(client_frame(message)))),
            Some(Err(err)) => Poll::Ready(Some(Err(err.into()))),
            None => Poll::Ready(None),
        }
    }
}

impl Sink<Frame> for ClientSocket {
    type Error = StreamError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner).poll_ready(cx).map_err(Into::into)
    }

    fn start_send(mut self: Pin<&mut Self>, frame: Frame) -> Result<(), Self::Error> {
        Pin::new(&mut self.inner)
            .start_send(client_message(frame))
            .map_err(Into::into)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner).poll_flush(cx).map_err(Into::into)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner).poll_close(cx).map_err(Into::into)
    }
}

fn client_frame(message: ClientMessage) -> Frame {
    match message {
        ClientMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
        ClientMessage::Binary(payload) => Frame::Binary(payload),
        ClientMessage::Ping(payload) => Frame::Ping(payload),
        ClientMessage::Pong(payload) => Frame::Pong(payload),
        ClientMessage::Close(_) => Frame::Close,
    }
}

fn client_message(frame: Frame) -> ClientMessage {
    match frame {
        Frame::Text(text) => ClientMessage::Text(text.into()),
        Frame::Binary(payload) => ClientMessage::Binary(payload),
        Frame::Ping(payload) => ClientMessage::Ping(payload),
        Frame::Pong(payload) => ClientMessage::Pong(payload),
        Frame::Close => ClientMessage::Close(None),
    }
}
