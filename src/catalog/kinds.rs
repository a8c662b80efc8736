//! Kind catalog: the read-locked snapshot of watchable resource kinds.
//!
//! # Responsibilities
//! - Hold the current set of kind descriptors behind a read/write lock
//! - Decide which kinds support the "watch" verb
//! - Produce the initial (non-namespaced) watch path for each kind
//!
//! # Design Decisions
//! - Consumers take a point-in-time snapshot under a short-lived read lock;
//!   the lock is never held across I/O
//! - Whole-set replacement only; the discovery refresher swaps the snapshot
//!   atomically rather than editing it in place

use std::sync::RwLock;

use crate::proxy::paths::WatchPath;

/// Verb a kind must advertise to be eligible for stream aggregation.
const WATCH_VERB: &str = "watch";

/// Descriptor of one resource kind exposed by the upstream API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindDescriptor {
    /// Kind name, e.g. `Pod`.
    pub kind: String,
    /// Plural resource name used in paths, e.g. `pods`.
    pub plural: String,
    /// API base the kind is served under, e.g. `/api/v1` or `/apis/apps/v1`.
    pub api_base: String,
    /// Whether the kind is namespace-scoped upstream.
    pub namespaced: bool,
    /// Capability verbs the upstream advertises for this kind.
    pub verbs: Vec<String>,
}

impl KindDescriptor {
    /// True iff the kind's verb set includes "watch".
    pub fn watchable(&self) -> bool {
        self.verbs.iter().any(|verb| verb == WATCH_VERB)
    }

    /// The cluster-scoped watch path for this kind.
    pub fn watch_path(&self) -> WatchPath {
        WatchPath::new(format!(
            "{}/watch/{}",
            self.api_base.trim_end_matches('/'),
            self.plural
        ))
    }
}

/// Locked, read-iterable snapshot of the known kinds.
#[derive(Debug, Default)]
pub struct KindCatalog {
    kinds: RwLock<Vec<KindDescriptor>>,
}

impl KindCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kinds(kinds: Vec<KindDescriptor>) -> Self {
        Self {
            kinds: RwLock::new(kinds),
        }
    }

    /// Swap in a freshly discovered kind set.
    pub fn replace(&self, kinds: Vec<KindDescriptor>) {
        let mut guard = self.kinds.write().expect("kind catalog lock poisoned");
        *guard = kinds;
    }

    /// Watch paths for every kind that supports watching, in catalog order.
    ///
    /// The read lock is held only while collecting.
    pub fn watch_paths(&self) -> Vec<WatchPath> {
        let kinds = self.kinds.read().expect("kind catalog lock poisoned");
        kinds
            .iter()
            .filter(|kind| kind.watchable())
            .map(KindDescriptor::watch_path)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.kinds.read().expect("kind catalog lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
