//! Backend reader: one task per upstream watch stream.
//!
//! # Responsibilities
//! - Forward every data frame from one backend stream into the shared
//!   outbound queue
//! - Close the stream when the session's stop signal fires
//!
//! # Design Decisions
//! - The bounded outbound queue is the backpressure point: a reader that
//!   outpaces the client writer blocks on send instead of dropping frames
//! - A read failure ends only this reader; the session keeps running on the
//!   remaining streams (fail-soft)

use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};

use super::transport::{Frame, StreamError};
use crate::observability::metrics;

/// One-shot signal telling a backend reader to close its stream.
///
/// Consumed on fire, so it cannot fire twice.
#[derive(Debug)]
pub struct StopSignal(oneshot::Sender<()>);

impl StopSignal {
    pub fn fire(self) {
        // the reader may already be gone; that is fine
        let _ = self.0.send(());
    }
}

/// Spawn the reader for one freshly dialed backend stream.
pub fn spawn<S>(
    url: String,
    stream: S,
    outbound: mpsc::Sender<Frame>,
    trace_frames: bool,
) -> StopSignal
where
    S: Stream<Item = Result<Frame, StreamError>> + Send + Unpin + 'static,
{
    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(read_backend(url, stream, outbound, stop_rx, trace_frames));
    StopSignal(stop_tx)
}

async fn read_backend<S>(
    url: String,
    mut stream: S,
    outbound: mpsc::Sender<Frame>,
    mut stop: oneshot::Receiver<()>,
    trace_frames: bool,
) where
    S: Stream<Item = Result<Frame, StreamError>> + Send + Unpin + 'static,
{
    metrics::backend_stream_opened();
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => {
                tracing::debug!(url = %url, "closing backend watch stream");
                break;
            }
            item = stream.next() => match item {
                Some(Ok(frame)) if frame.is_data() => {
                    if trace_frames {
                        tracing::info!(url = %url, bytes = frame.len(), "frame from backend");
                    }
                    if outbound.send(frame).await.is_err() {
                        // writer is gone, the session is over
                        break;
                    }
                }
                Some(Ok(_)) => {} // backend control traffic is not forwarded
                Some(Err(err)) => {
                    tracing::warn!(url = %url, error = %err, "backend read failed");
                    break;
                }
                None => {
                    tracing::debug!(url = %url, "backend closed the watch stream");
                    break;
                }
            }
        }
    }
    metrics::backend_stream_closed();
    // dropping the stream closes the underlying connection
}
