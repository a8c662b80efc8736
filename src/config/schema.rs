//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the aggregating watch proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Upstream API server the watch streams are dialed against.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Upstream API server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the API server (http or https); watch streams dial the
    /// same host over ws/wss.
    pub target: String,

    /// Seconds between kind discovery refreshes. 0 disables discovery (the
    /// catalog is then populated by the embedder).
    pub discovery_interval_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            target: "https://127.0.0.1:6443".to_string(),
            discovery_interval_secs: 300,
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Expose a Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Bind address of the metrics endpoint.
    pub metrics_address: String,

    /// Log every dial and forwarded frame. Verbose; debugging only.
    pub trace_frames: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
            trace_frames: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_complete() {
        let config = ProxyConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert!(config.listener.tls.is_none());
        assert_eq!(config.upstream.target, "https://127.0.0.1:6443");
        assert!(!config.observability.trace_frames);
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [upstream]
            target = "https://kubernetes.default.svc"
            "#,
        )
        .unwrap();
        assert_eq!(config.upstream.target, "https://kubernetes.default.svc");
        assert_eq!(config.upstream.discovery_interval_secs, 300);
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn tls_section_parses() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "0.0.0.0:8443"

            [listener.tls]
            cert_path = "/etc/proxy/tls.crt"
            key_path = "/etc/proxy/tls.key"
            "#,
        )
        .unwrap();
        let tls = config.listener.tls.unwrap();
        assert_eq!(tls.cert_path, "/etc/proxy/tls.crt");
        assert_eq!(tls.key_path, "/etc/proxy/tls.key");
    }
}
