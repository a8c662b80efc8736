//! Watch path generation.
//!
//! # Responsibilities
//! - Represent one kind's (optionally namespace-scoped) watch endpoint
//! - Enumerate the kind catalog into a stream of initial watch paths
//! - Synthesize namespace-qualified paths when a cluster-scoped watch is
//!   refused
//!
//! # Design Decisions
//! - The generator signals completion by finishing its task (channel senders
//!   drop); consumers wait on "next path or generator done" instead of
//!   polling
//! - The catalog read lock is released before the first send

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::catalog::KindCatalog;

/// Marker separating the collection prefix from the resource suffix in a
/// watch path.
const WATCH_MARKER: &str = "/watch/";

/// Backend endpoint identifier for one kind's change-notification stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchPath(String);

impl WatchPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True once the path is scoped to a single namespace; namespaced paths
    /// are never expanded again.
    pub fn is_namespaced(&self) -> bool {
        self.0.contains("/namespaces/")
    }

    /// Synthesize one namespace-qualified path per namespace by splitting at
    /// the watch marker. Returns nothing when the path has no marker.
    pub fn for_namespaces(&self, namespaces: &[String]) -> Vec<WatchPath> {
        let Some((prefix, suffix)) = self.0.split_once(WATCH_MARKER) else {
            return Vec::new();
        };
        namespaces
            .iter()
            .map(|ns| WatchPath(format!("{prefix}/watch/namespaces/{ns}/{suffix}")))
            .collect()
    }
}

impl fmt::Display for WatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Enumerate the catalog's watchable kinds into the shared path queue.
///
/// The snapshot is taken under the catalog's read lock and the lock is
/// released before anything is sent. Completion of the returned task is the
/// generator's "permanently done" signal.
pub fn spawn_generator(
    catalog: Arc<KindCatalog>,
    paths: mpsc::Sender<WatchPath>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let watchable = catalog.watch_paths();
        tracing::debug!(count = watchable.len(), "enumerated watchable kinds");
        for path in watchable {
            if paths.send(path).await.is_err() {
                // consumer went away; nothing left to feed
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::KindDescriptor;

    fn kind(name: &str, plural: &str, verbs: &[&str]) -> KindDescriptor {
        KindDescriptor {
            kind: name.to_owned(),
            plural: plural.to_owned(),
            api_base: "/api/v1".to_owned(),
            namespaced: true,
            verbs: verbs.iter().map(|v| (*v).to_owned()).collect(),
        }
    }

    #[tokio::test]
    async fn generates_one_path_per_watchable_kind() {
        let catalog = Arc::new(KindCatalog::with_kinds(vec![
            kind("Pod", "pods", &["get", "list", "watch"]),
            kind("Secret", "secrets", &["get", "list"]),
        ]));
        let (tx, mut rx) = mpsc::channel(8);

        spawn_generator(catalog, tx).await.unwrap();

        let mut produced = Vec::new();
        while let Ok(path) = rx.try_recv() {
            produced.push(path);
        }
        assert_eq!(produced, vec![WatchPath::new("/api/v1/watch/pods")]);
    }

    #[test]
    fn namespace_expansion_splits_at_watch_marker() {
        let path = WatchPath::new("/api/v1/watch/pods");
        let namespaces = vec!["default".to_owned(), "kube-system".to_owned()];

        let expanded = path.for_namespaces(&namespaces);

        assert_eq!(
            expanded,
            vec![
                WatchPath::new("/api/v1/watch/namespaces/default/pods"),
                WatchPath::new("/api/v1/watch/namespaces/kube-system/pods"),
            ]
        );
        assert!(expanded.iter().all(WatchPath::is_namespaced));
        assert!(!path.is_namespaced());
    }

    #[test]
    fn paths_without_marker_do_not_expand() {
        let path = WatchPath::new("/api/v1/pods");
        assert!(path.for_namespaces(&["default".to_owned()]).is_empty());
    }
}
