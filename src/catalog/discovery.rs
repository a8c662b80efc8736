//! Kind discovery against the upstream API.
//!
//! # Responsibilities
//! - Fetch the upstream's resource lists (core group plus named groups)
//! - Translate them into [`KindDescriptor`]s and swap them into the catalog
//! - Run a periodic refresh so new kinds become watchable without a restart
//!
//! # Design Decisions
//! - A group that fails to answer is skipped, not fatal; the catalog keeps
//!   whatever the other groups returned
//! - Subresources (`pods/status`) are filtered out; they are not watchable
//!   collections

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use url::Url;

use super::kinds::{KindCatalog, KindDescriptor};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("discovery request returned {0}")]
    Status(StatusCode),

    #[error("invalid discovery url: {0}")]
    Url(#[from] url::ParseError),
}

/// Periodically rebuilds the kind catalog from upstream discovery documents.
#[derive(Debug, Clone)]
pub struct KindDiscovery {
    client: reqwest::Client,
    target: Url,
}

impl KindDiscovery {
    pub fn new(target: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            target,
        }
    }

    /// Fetch all resource lists and replace the catalog snapshot.
    /// Returns the number of kinds discovered.
    pub async fn refresh(&self, catalog: &KindCatalog) -> Result<usize, DiscoveryError> {
        let mut kinds = Vec::new();

        let core: ApiResourceList = self.fetch("/api/v1").await?;
        kinds.extend(descriptors_from("/api/v1", core));

        match self.fetch::<ApiGroupList>("/apis").await {
            Ok(groups) => {
                for group in groups.groups {
                    let Some(version) = group.preferred_version else {
                        continue;
                    };
                    let base = format!("/apis/{}", version.group_version);
                    match self.fetch::<ApiResourceList>(&base).await {
                        Ok(list) => kinds.extend(descriptors_from(&base, list)),
                        Err(err) => {
                            tracing::warn!(group = %base, error = %err, "skipping api group")
                        }
                    }
                }
            }
            Err(err) => tracing::warn!(error = %err, "api group list unavailable"),
        }

        let count = kinds.len();
        catalog.replace(kinds);
        Ok(count)
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, DiscoveryError> {
        let url = self.target.join(path)?;
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(DiscoveryError::Status(response.status()));
        }
        Ok(response.json().await?)
    }
}

/// Spawn the periodic refresh loop. The first refresh runs immediately so a
/// freshly started proxy can serve sessions as soon as the upstream answers.
pub fn spawn_refresh(
    discovery: KindDiscovery,
    catalog: Arc<KindCatalog>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match discovery.refresh(&catalog).await {
                Ok(count) => tracing::debug!(kinds = count, "kind catalog refreshed"),
                Err(err) => tracing::warn!(error = %err, "kind discovery failed"),
            }
        }
    })
}

fn descriptors_from(base: &str, list: ApiResourceList) -> Vec<KindDescriptor> {
    list.resources
        .into_iter()
        .filter(|resource| !resource.name.contains('/'))
        .map(|resource| KindDescriptor {
            kind: resource.kind,
            plural: resource.name,
            api_base: base.to_owned(),
            namespaced: resource.namespaced,
            verbs: resource.verbs,
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ApiResourceList {
    #[serde(default)]
    resources: Vec<ApiResource>,
}

#[derive(Debug, Deserialize)]
struct ApiResource {
    name: String,
    kind: String,
    #[serde(default)]
    namespaced: bool,
    #[serde(default)]
    verbs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiGroupList {
    #[serde(default)]
    groups: Vec<ApiGroup>,
}

#[derive(Debug, Deserialize)]
struct ApiGroup {
    #[serde(rename = "preferredVersion")]
    preferred_version: Option<GroupVersion>,
}

#[derive(Debug, Deserialize)]
struct GroupVersion {
    #[serde(rename = "groupVersion")]
    group_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_list_maps_to_descriptors() {
        let doc = r#"{
            "kind": "APIResourceList",
            "groupVersion": "v1",
            "resources": [
                {"name": "pods", "kind": "Pod", "namespaced": true,
                 "verbs": ["get", "list", "watch"]},
                {"name": "pods/status", "kind": "Pod", "namespaced": true,
                 "verbs": ["get"]},
                {"name": "namespaces", "kind": "Namespace", "namespaced": false,
                 "verbs": ["get", "list", "watch"]}
            ]
        }"#;
        let list: ApiResourceList = serde_json::from_str(doc).unwrap();

        let descriptors = descriptors_from("/api/v1", list);

        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].plural, "pods");
        assert!(descriptors[0].watchable());
        assert_eq!(descriptors[1].kind, "Namespace");
        assert!(!descriptors[1].namespaced);
    }

    #[test]
    fn group_list_exposes_preferred_versions() {
        let doc = r#"{
            "groups": [
                {"name": "apps", "preferredVersion": {"groupVersion": "apps/v1", "version": "v1"}},
                {"name": "empty"}
            ]
        }"#;
        let groups: ApiGroupList = serde_json::from_str(doc).unwrap();

        let versions: Vec<_> = groups
            .groups
            .into_iter()
            .filter_map(|g| g.preferred_version)
            .map(|v| v.group_version)
            .collect();
        assert_eq!(versions, vec!["apps/v1"]);
    }
}
