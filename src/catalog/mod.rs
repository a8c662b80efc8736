//! Upstream resource metadata subsystem.
//!
//! # Data Flow
//! ```text
//! upstream discovery documents
//!     → discovery.rs (fetch & translate)
//!     → kinds.rs (locked snapshot of kind descriptors)
//!     → proxy::paths (watch path per watchable kind)
//!
//! upstream namespace list
//!     → namespaces.rs (fetched once per session)
//!     → proxy::session (Forbidden-expansion)
//! ```
//!
//! # Design Decisions
//! - The aggregation engine sees only snapshots and traits, never upstream
//!   HTTP details
//! - Session code takes the catalog read lock exactly once, for enumeration

pub mod discovery;
pub mod kinds;
pub mod namespaces;

pub use discovery::KindDiscovery;
pub use kinds::{KindCatalog, KindDescriptor};
pub use namespaces::{HttpNamespaceLister, NamespaceError, NamespaceLister, StaticNamespaces};
