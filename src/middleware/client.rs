use axum::http::HeaderMap;
use std::net::SocketAddr;

use crate::config;

/// Address used to key unlock throttling. Forwarding headers are only honoured
/// when the deployment says a trusted proxy sets them.
pub fn client_address(headers: &HeaderMap, peer: SocketAddr) -> String {
    client_address_with(headers, peer, config::config().security.trust_proxy_headers)
}

fn client_address_with(headers: &HeaderMap, peer: SocketAddr, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(addr) = forwarded {
            return addr.to_string();
        }
        if let Some(addr) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
            return addr.trim().to_string();
        }
    }
    peer.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "192.0.2.7:51000".parse().unwrap()
    }

    #[test]
    fn ignores_forwarded_for_unless_trusted() {
        let mut h = HeaderMap::new();
        h.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        assert_eq!(client_address_with(&h, peer(), false), "192.0.2.7");
        assert_eq!(client_address_with(&h, peer(), true), "203.0.113.9");
    }

    #[test]
    fn falls_back_to_real_ip_then_peer() {
        let mut h = HeaderMap::new();
        assert_eq!(client_address_with(&h, peer(), true), "192.0.2.7");
        h.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(client_address_with(&h, peer(), true), "198.51.100.4");
    }
}
