//! Watch aggregation subsystem.
//!
//! # Data Flow
//! ```text
//! inbound upgrade request
//!     → session.rs (lifecycle: headers, namespaces, dial loop, teardown)
//!     → paths.rs (one watch path per watchable kind + expansion)
//!     → transport.rs (dial + frame adapters)
//!     → backend.rs (N readers → shared outbound queue)
//!     → client.rs (single writer + keepalive → client connection)
//! ```
//!
//! # Design Decisions
//! - Message passing only across task boundaries: a bounded queue for data,
//!   a one-shot signal per backend for cancellation
//! - Frames from different backends interleave by arrival; per-backend
//!   order is preserved

use std::time::Duration;

pub mod backend;
pub mod client;
pub mod headers;
pub mod paths;
pub mod session;
pub mod transport;

pub use client::SessionEnd;
pub use headers::UpgradeHeaders;
pub use session::{EstablishedSession, RequestContext, SessionError, WatchAggregator};
pub use transport::{ClientSocket, Dialer, Frame, WsDialer};

/// Time allowed for one write to the client to complete.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Time allowed between reads from the client before the session is
/// considered dead.
pub const PONG_WAIT: Duration = Duration::from_secs(30);

/// Keepalive ping interval. Must stay below [`PONG_WAIT`].
pub const PING_PERIOD: Duration = Duration::from_millis(PONG_WAIT.as_millis() as u64 * 9 / 10);

/// Maximum message size accepted from the client.
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Frames buffered between the backend readers and the client writer.
/// Producers block when full.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 32;

/// Watch paths buffered between the generator and the dial loop; sized for
/// Forbidden-expansion bursts.
pub const PATH_QUEUE_CAPACITY: usize = 50;
