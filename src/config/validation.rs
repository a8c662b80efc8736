//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check addresses parse and the upstream target is a usable URL
//! - Validate TLS file settings
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    InvalidBindAddress(String),
    InvalidTarget(String),
    UnsupportedTargetScheme(String),
    EmptyTlsPath(&'static str),
    InvalidMetricsAddress(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidBindAddress(addr) => {
                write!(f, "listener.bind_address '{addr}' is not a socket address")
            }
            ValidationError::InvalidTarget(target) => {
                write!(f, "upstream.target '{target}' is not a valid URL")
            }
            ValidationError::UnsupportedTargetScheme(scheme) => {
                write!(f, "upstream.target scheme '{scheme}' is not http(s) or ws(s)")
            }
            ValidationError::EmptyTlsPath(field) => {
                write!(f, "listener.tls.{field} must not be empty")
            }
            ValidationError::InvalidMetricsAddress(addr) => {
                write!(
                    f,
                    "observability.metrics_address '{addr}' is not a socket address"
                )
            }
        }
    }
}

/// Validate the configuration, collecting every problem.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    match config.upstream.target.parse::<Url>() {
        Ok(url) => {
            if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
                errors.push(ValidationError::UnsupportedTargetScheme(
                    url.scheme().to_owned(),
                ));
            } else if url.host_str().is_none() {
                errors.push(ValidationError::InvalidTarget(
                    config.upstream.target.clone(),
                ));
            }
        }
        Err(_) => errors.push(ValidationError::InvalidTarget(
            config.upstream.target.clone(),
        )),
    }

    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::EmptyTlsPath("cert_path"));
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::EmptyTlsPath("key_path"));
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
