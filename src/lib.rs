//! watchmux — a streaming reverse proxy that aggregates many upstream
//! per-kind watch streams into a single client WebSocket.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌────────────────────────────────────────────────┐
//!                    │                   WATCHMUX                     │
//!                    │                                                │
//!  Client            │  ┌────────┐   ┌─────────┐   ┌──────────────┐  │
//!  ─── upgrade ──────┼─▶│  http  │──▶│ proxy:: │──▶│   catalog    │  │
//!                    │  │ server │   │ session │   │ kinds + ns   │  │
//!                    │  └────────┘   └────┬────┘   └──────────────┘  │
//!                    │                    │ dial per watchable kind   │
//!                    │                    ▼                           │
//!                    │            ┌──────────────┐                    │     Upstream
//!                    │            │   backend    │◀───────────────────┼──── watch
//!                    │            │ readers (N)  │                    │     streams
//!                    │            └──────┬───────┘                    │
//!                    │                   ▼                            │
//!  Client            │  ┌────────┐  ┌──────────┐                     │
//!  ◀── frames ───────┼──│ client │◀─│ outbound │                     │
//!                    │  │ writer │  │  queue   │                     │
//!                    │  └────────┘  └──────────┘                     │
//!                    └────────────────────────────────────────────────┘
//! ```
//!
//! One inbound request becomes one ephemeral session: every kind that
//! supports watching is dialed on the upstream, frames fan in through a
//! bounded queue, and a single writer multiplexes them (plus keepalive)
//! onto the client connection.

// Core subsystems
pub mod catalog;
pub mod config;
pub mod http;
pub mod proxy;

// Cross-cutting concerns
pub mod observability;

pub use config::ProxyConfig;
pub use http::HttpServer;
pub use proxy::WatchAggregator;
