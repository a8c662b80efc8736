//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, multiwatch endpoint)
//!     → proxy::session (dial phase, pre-upgrade errors)
//!     → WebSocket upgrade (only after the first backend dial succeeds)
//!     → proxy::client (session runs on the upgraded connection)
//! ```

pub mod server;
pub mod tls;

pub use server::HttpServer;
