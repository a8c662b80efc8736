//! Header preparation for backend dials and the client upgrade.
//!
//! # Responsibilities
//! - Copy the handshake-relevant inbound headers onto every backend dial
//! - Maintain the X-Forwarded-For chain and synthesize X-Forwarded-Proto
//! - Apply the optional director hook for deployment-specific headers
//! - Carry the backend-negotiated headers back onto the client upgrade

use std::net::SocketAddr;

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, ORIGIN, SET_COOKIE};

use super::transport::DialResponse;

/// Hook that may add or overwrite outbound dial headers. Receives the
/// inbound request headers and the prepared outbound set.
pub type Director = dyn Fn(&HeaderMap, &mut HeaderMap) + Send + Sync;

fn sec_websocket_protocol() -> HeaderName {
    HeaderName::from_static("sec-websocket-protocol")
}

fn x_forwarded_for() -> HeaderName {
    HeaderName::from_static("x-forwarded-for")
}

fn x_forwarded_proto() -> HeaderName {
    HeaderName::from_static("x-forwarded-proto")
}

/// Build the header set sent on every backend dial of a session.
pub fn dial_headers(
    inbound: &HeaderMap,
    remote_addr: SocketAddr,
    secure: bool,
    director: Option<&Director>,
) -> HeaderMap {
    let mut outbound = HeaderMap::new();

    if let Some(origin) = inbound.get(ORIGIN) {
        outbound.insert(ORIGIN, origin.clone());
    }
    for protocol in inbound.get_all(sec_websocket_protocol()) {
        outbound.append(sec_websocket_protocol(), protocol.clone());
    }
    for cookie in inbound.get_all(COOKIE) {
        outbound.append(COOKIE, cookie.clone());
    }

    // Fold any prior X-Forwarded-For entries into one value and append the
    // caller's address, reverse-proxy style.
    let client_ip = remote_addr.ip().to_string();
    let prior: Vec<&str> = inbound
        .get_all(x_forwarded_for())
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    let chain = if prior.is_empty() {
        client_ip
    } else {
        format!("{}, {}", prior.join(", "), client_ip)
    };
    if let Ok(value) = HeaderValue::from_str(&chain) {
        outbound.insert(x_forwarded_for(), value);
    }

    outbound.insert(
        x_forwarded_proto(),
        HeaderValue::from_static(if secure { "https" } else { "http" }),
    );

    if let Some(director) = director {
        director(inbound, &mut outbound);
    }

    outbound
}

/// Headers carried from the first successful backend handshake onto the
/// client upgrade response.
#[derive(Debug, Clone, Default)]
pub struct UpgradeHeaders {
    pub protocol: Option<HeaderValue>,
    pub set_cookie: Option<HeaderValue>,
}

impl UpgradeHeaders {
    pub fn from_dial(response: &DialResponse) -> Self {
        Self {
            protocol: response.headers.get(sec_websocket_protocol()).cloned(),
            set_cookie: response.headers.get(SET_COOKIE).cloned(),
        }
    }

    /// Copy the negotiated headers onto the upgrade response.
    pub fn apply(&self, headers: &mut HeaderMap) {
        if let Some(protocol) = &self.protocol {
            headers.insert(sec_websocket_protocol(), protocol.clone());
        }
        if let Some(cookie) = &self.set_cookie {
            headers.insert(SET_COOKIE, cookie.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "203.0.113.7:52000".parse().unwrap()
    }

    #[test]
    fn copies_handshake_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert(ORIGIN, HeaderValue::from_static("https://console.example"));
        inbound.append(
            sec_websocket_protocol(),
            HeaderValue::from_static("base64.binary.k8s.io"),
        );
        inbound.append(
            sec_websocket_protocol(),
            HeaderValue::from_static("v4.channel.k8s.io"),
        );
        inbound.append(COOKIE, HeaderValue::from_static("session=abc"));

        let outbound = dial_headers(&inbound, addr(), false, None);

        assert_eq!(outbound.get(ORIGIN).unwrap(), "https://console.example");
        let protocols: Vec<_> = outbound.get_all(sec_websocket_protocol()).iter().collect();
        assert_eq!(protocols.len(), 2);
        assert_eq!(outbound.get(COOKIE).unwrap(), "session=abc");
    }

    #[test]
    fn appends_caller_to_forwarded_chain() {
        let mut inbound = HeaderMap::new();
        inbound.insert(x_forwarded_for(), HeaderValue::from_static("198.51.100.1"));

        let outbound = dial_headers(&inbound, addr(), false, None);

        assert_eq!(
            outbound.get(x_forwarded_for()).unwrap(),
            "198.51.100.1, 203.0.113.7"
        );
    }

    #[test]
    fn starts_forwarded_chain_when_absent() {
        let outbound = dial_headers(&HeaderMap::new(), addr(), false, None);
        assert_eq!(outbound.get(x_forwarded_for()).unwrap(), "203.0.113.7");
    }

    #[test]
    fn forwarded_proto_tracks_listener_tls() {
        let plain = dial_headers(&HeaderMap::new(), addr(), false, None);
        assert_eq!(plain.get(x_forwarded_proto()).unwrap(), "http");

        let tls = dial_headers(&HeaderMap::new(), addr(), true, None);
        assert_eq!(tls.get(x_forwarded_proto()).unwrap(), "https");
    }

    #[test]
    fn director_may_overwrite_headers() {
        let director = |_inbound: &HeaderMap, out: &mut HeaderMap| {
            out.insert(
                HeaderName::from_static("authorization"),
                HeaderValue::from_static("Bearer token"),
            );
        };

        let outbound = dial_headers(&HeaderMap::new(), addr(), false, Some(&director));

        assert_eq!(outbound.get("authorization").unwrap(), "Bearer token");
    }

    #[test]
    fn upgrade_headers_keep_only_negotiated_values() {
        let mut headers = HeaderMap::new();
        headers.insert(
            sec_websocket_protocol(),
            HeaderValue::from_static("v4.channel.k8s.io"),
        );
        headers.insert(SET_COOKIE, HeaderValue::from_static("backend=1"));
        headers.insert(ORIGIN, HeaderValue::from_static("https://upstream"));
        let response = DialResponse { headers };

        let upgrade = UpgradeHeaders::from_dial(&response);
        let mut applied = HeaderMap::new();
        upgrade.apply(&mut applied);

        assert_eq!(applied.len(), 2);
        assert_eq!(
            applied.get(sec_websocket_protocol()).unwrap(),
            "v4.channel.k8s.io"
        );
        assert_eq!(applied.get(SET_COOKIE).unwrap(), "backend=1");
    }
}
