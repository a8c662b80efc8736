//! Namespace enumeration.
//!
//! The aggregation engine only needs "the current set of namespaces or an
//! error", fetched once per session; everything else about namespaces is the
//! upstream's business. The trait keeps the engine testable with a static
//! set.

use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("namespace request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("namespace request returned {0}")]
    Status(StatusCode),
}

/// Capability for listing the upstream's current namespaces.
pub trait NamespaceLister: Send + Sync {
    fn list(&self) -> BoxFuture<'_, Result<Vec<String>, NamespaceError>>;
}

/// Fixed namespace set, for tests and single-tenant deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticNamespaces {
    names: Vec<String>,
}

impl StaticNamespaces {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl NamespaceLister for StaticNamespaces {
    fn list(&self) -> BoxFuture<'_, Result<Vec<String>, NamespaceError>> {
        Box::pin(async move { Ok(self.names.clone()) })
    }
}

/// Namespace lister querying the upstream API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpNamespaceLister {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpNamespaceLister {
    pub fn new(target: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: target.join("/api/v1/namespaces")?,
        })
    }
}

impl NamespaceLister for HttpNamespaceLister {
    fn list(&self) -> BoxFuture<'_, Result<Vec<String>, NamespaceError>> {
        Box::pin(async move {
            let response = self.client.get(self.endpoint.clone()).send().await?;
            if !response.status().is_success() {
                return Err(NamespaceError::Status(response.status()));
            }
            let list: NamespaceList = response.json().await?;
            Ok(list
                .items
                .into_iter()
                .map(|item| item.metadata.name)
                .collect())
        })
    }
}

#[derive(Debug, Deserialize)]
struct NamespaceList {
    #[serde(default)]
    items: Vec<NamespaceItem>,
}

#[derive(Debug, Deserialize)]
struct NamespaceItem {
    metadata: ObjectMeta,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_lister_returns_configured_names() {
        let lister = StaticNamespaces::new(["default", "kube-system"]);
        let names = lister.list().await.unwrap();
        assert_eq!(names, vec!["default", "kube-system"]);
    }

    #[test]
    fn namespace_list_document_parses() {
        let doc = r#"{
            "kind": "NamespaceList",
            "items": [
                {"metadata": {"name": "default"}},
                {"metadata": {"name": "kube-system"}}
            ]
        }"#;
        let list: NamespaceList = serde_json::from_str(doc).unwrap();
        let names: Vec<_> = list.items.into_iter().map(|i| i.metadata.name).collect();
        assert_eq!(names, vec!["default", "kube-system"]);
    }

    #[test]
    fn empty_document_yields_no_namespaces() {
        let list: NamespaceList = serde_json::from_str("{}").unwrap();
        assert!(list.items.is_empty());
    }
}
