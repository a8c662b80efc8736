//! Client writer: the single consumer of the outbound queue.
//!
//! # Responsibilities
//! - Multiplex aggregated watch frames with keepalive traffic onto the
//!   client connection
//! - Run the nested reader that enforces the client liveness deadline and
//!   answers client pings
//! - Emit exactly one terminal signal; it is the sole trigger for session
//!   teardown
//!
//! # Design Decisions
//! - One `select!` blocks across all event sources instead of busy-polling;
//!   `biased` keeps the pong > data > ping priority
//! - Every write is bounded by [`WRITE_WAIT`]; every client read by
//!   [`PONG_WAIT`] (any inbound frame, pong included, re-arms the deadline)
//! - Pending pongs are capacity 1: a second ping while one pong is queued is
//!   dropped

use std::fmt;

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::transport::{Frame, StreamError};
use super::{PING_PERIOD, PONG_WAIT, WRITE_WAIT};
use crate::observability::metrics;

/// Terminal signal of a client writer. Exactly one is produced per session.
#[derive(Debug)]
pub enum SessionEnd {
    /// The client closed the connection cleanly.
    ClosedByClient,
    /// Reading from the client failed.
    ClientRead(StreamError),
    /// Writing to the client failed.
    ClientWrite(StreamError),
    /// Nothing was read from the client within the liveness window.
    IdleTimeout,
    /// A single write did not complete within the write deadline.
    WriteTimeout,
}

impl SessionEnd {
    pub fn label(&self) -> &'static str {
        match self {
            SessionEnd::ClosedByClient => "closed",
            SessionEnd::ClientRead(_) => "client_read_error",
            SessionEnd::ClientWrite(_) => "client_write_error",
            SessionEnd::IdleTimeout => "idle_timeout",
            SessionEnd::WriteTimeout => "write_timeout",
        }
    }
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::ClosedByClient => write!(f, "client connection closed normally"),
            SessionEnd::ClientRead(err) => write!(f, "client read failed: {err}"),
            SessionEnd::ClientWrite(err) => write!(f, "client write failed: {err}"),
            SessionEnd::IdleTimeout => write!(f, "client went silent past the liveness window"),
            SessionEnd::WriteTimeout => write!(f, "client write deadline exceeded"),
        }
    }
}

/// Drive the client connection until it terminates.
///
/// Consumes the outbound queue; when the last backend reader drops its
/// sender the queue closes and the session idles on keepalive alone.
pub async fn run<C>(client: C, mut outbound: mpsc::Receiver<Frame>, trace_frames: bool) -> SessionEnd
where
    C: Stream<Item = Result<Frame, StreamError>>
        + Sink<Frame, Error = StreamError>
        + Send
        + Unpin
        + 'static,
{
    let (mut sink, stream) = client.split();

    let (pong_tx, mut pong_rx) = mpsc::channel::<Bytes>(1);
    let (end_tx, mut end_rx) = mpsc::channel::<SessionEnd>(1);
    tokio::spawn(read_client(stream, pong_tx, end_tx, trace_frames));

    let mut ping = time::interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let end = loop {
        tokio::select! {
            biased;
            // a pong owed to the client takes precedence over data
            Some(payload) = pong_rx.recv() => {
                if trace_frames {
                    tracing::info!("writing pong to client");
                }
                if let Err(end) = write_frame(&mut sink, Frame::Pong(payload)).await {
                    break end;
                }
            }
            // the nested reader ended: its verdict is the session's verdict
            end = end_rx.recv() => {
                break end.unwrap_or(SessionEnd::ClosedByClient);
            }
            // aggregated watch frames
            Some(frame) = outbound.recv() => {
                if trace_frames {
                    tracing::info!(bytes = frame.len(), "writing frame to client");
                }
                metrics::frame_forwarded(frame.len());
                if let Err(end) = write_frame(&mut sink, frame).await {
                    break end;
                }
            }
            // keepalive
            _ = ping.tick() => {
                if trace_frames {
                    tracing::info!("writing ping to client");
                }
                if let Err(end) = write_frame(&mut sink, Frame::Ping(Bytes::new())).await {
                    break end;
                }
            }
        }
    };

    let _ = sink.close().await;
    end
}

async fn write_frame<S>(sink: &mut S, frame: Frame) -> Result<(), SessionEnd>
where
    S: Sink<Frame, Error = StreamError> + Unpin,
{
    match time::timeout(WRITE_WAIT, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(SessionEnd::ClientWrite(err)),
        Err(_) => Err(SessionEnd::WriteTimeout),
    }
}

/// Nested reader draining client-originated frames.
///
/// Each blocking read re-arms the liveness deadline; pings from the client
/// queue a pong for the writer, everything else is read and discarded.
async fn read_client<S>(
    mut stream: S,
    pongs: mpsc::Sender<Bytes>,
    end: mpsc::Sender<SessionEnd>,
    trace_frames: bool,
) where
    S: Stream<Item = Result<Frame, StreamError>> + Send + Unpin + 'static,
{
    let verdict = loop {
        match time::timeout(PONG_WAIT, stream.next()).await {
            Ok(Some(Ok(frame))) => {
                if trace_frames {
                    tracing::info!(frame = ?frame, "read frame from client");
                }
                match frame {
                    Frame::Ping(payload) => {
                        // capacity 1: drop when a pong is already pending
                        let _ = pongs.try_send(payload);
                    }
                    Frame::Close => break SessionEnd::ClosedByClient,
                    // pongs and stray data re-arm the deadline by arriving
                    _ => {}
                }
            }
            Ok(Some(Err(err))) => break SessionEnd::ClientRead(err),
            Ok(None) => break SessionEnd::ClosedByClient,
            Err(_) => break SessionEnd::IdleTimeout,
        }
    };
    let _ = end.send(verdict).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    /// In-memory duplex client connection for driving the writer.
    struct FakeClient {
        incoming: mpsc::Receiver<Result<Frame, StreamError>>,
        written: mpsc::UnboundedSender<Frame>,
    }

    struct FakeRemote {
        incoming: mpsc::Sender<Result<Frame, StreamError>>,
        written: mpsc::UnboundedReceiver<Frame>,
    }

    fn fake_client() -> (FakeClient, FakeRemote) {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            FakeClient {
                incoming: in_rx,
                written: out_tx,
            },
            FakeRemote {
                incoming: in_tx,
                written: out_rx,
            },
        )
    }

    impl Stream for FakeClient {
        type Item = Result<Frame, StreamError>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.incoming.poll_recv(cx)
        }
    }

    impl Sink<Frame> for FakeClient {
        type Error = StreamError;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, frame: Frame) -> Result<(), Self::Error> {
            self.written
                .send(frame)
                .map_err(|_| StreamError::new("write side closed"))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_outbound_frames_verbatim() {
        let (client, mut remote) = fake_client();
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(run(client, rx, false));

        let payload = r#"{"type":"ADDED","object":{"kind":"Pod"}}"#;
        tx.send(Frame::Text(payload.to_owned())).await.unwrap();

        let written = remote.written.recv().await.unwrap();
        assert_eq!(written, Frame::Text(payload.to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn pings_before_the_liveness_window_lapses() {
        let (client, mut remote) = fake_client();
        let (_tx, rx) = mpsc::channel(32);

        tokio::spawn(run(client, rx, false));

        // with no traffic at all, the first frame out is a keepalive ping,
        // due strictly before PONG_WAIT elapses
        let before = Instant::now();
        let written = remote.written.recv().await.unwrap();
        assert_eq!(written, Frame::Ping(Bytes::new()));
        assert!(before.elapsed() >= PING_PERIOD);
        assert!(before.elapsed() < PONG_WAIT);
    }

    #[tokio::test(start_paused = true)]
    async fn answers_client_ping_with_matching_payload() {
        let (client, mut remote) = fake_client();
        let (_tx, rx) = mpsc::channel(32);

        tokio::spawn(run(client, rx, false));

        let payload = Bytes::from_static(b"are-you-there");
        remote
            .incoming
            .send(Ok(Frame::Ping(payload.clone())))
            .await
            .unwrap();

        let written = remote.written.recv().await.unwrap();
        assert_eq!(written, Frame::Pong(payload));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_ends_the_session_with_idle_timeout() {
        let (client, _remote) = fake_client();
        let (_tx, rx) = mpsc::channel(32);

        let end = run(client, rx, false).await;

        assert!(matches!(end, SessionEnd::IdleTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn pongs_keep_a_silent_session_alive() {
        let (client, mut remote) = fake_client();
        let (_tx, rx) = mpsc::channel(32);

        let writer = tokio::spawn(run(client, rx, false));

        // answer every ping for a few keepalive rounds
        for _ in 0..4 {
            loop {
                match remote.written.recv().await.unwrap() {
                    Frame::Ping(_) => break,
                    _ => continue,
                }
            }
            remote
                .incoming
                .send(Ok(Frame::Pong(Bytes::new())))
                .await
                .unwrap();
        }
        assert!(!writer.is_finished());

        // stop answering: the liveness deadline must now end the session
        let end = writer.await.unwrap();
        assert!(matches!(end, SessionEnd::IdleTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn client_close_frame_ends_cleanly() {
        let (client, remote) = fake_client();
        let (_tx, rx) = mpsc::channel(32);

        let writer = tokio::spawn(run(client, rx, false));
        remote.incoming.send(Ok(Frame::Close)).await.unwrap();

        let end = tokio::time::timeout(Duration::from_secs(60), writer)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(end, SessionEnd::ClosedByClient));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_outbound_queue_does_not_end_the_session() {
        let (client, mut remote) = fake_client();
        let (tx, rx) = mpsc::channel(32);

        let writer = tokio::spawn(run(client, rx, false));

        tx.send(Frame::Text("last".to_owned())).await.unwrap();
        drop(tx); // every backend reader is gone

        assert_eq!(
            remote.written.recv().await.unwrap(),
            Frame::Text("last".to_owned())
        );
        // the session idles on keepalive instead of terminating
        let written = remote.written.recv().await.unwrap();
        assert_eq!(written, Frame::Ping(Bytes::new()));
        assert!(!writer.is_finished());
    }
}
