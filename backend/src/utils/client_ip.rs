use std::{convert::Infallible, net::SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};

/// Network address of the caller, as best it can be determined.
///
/// The first hop of `X-Forwarded-For` wins, then `X-Real-IP`, then the TCP
/// peer address when the server was started with connect info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub Option<String>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = extract_ip(&parts.headers).or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });
        Ok(ClientIp(ip))
    }
}

pub fn extract_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        return value
            .split(',')
            .next()
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty());
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    #[test]
    fn forwarded_for_first_hop_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1, 10.0.0.2"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.9.9.9"));

        assert_eq!(extract_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn real_ip_used_without_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static(" 8.8.4.4 "));

        assert_eq!(extract_ip(&headers).as_deref(), Some("8.8.4.4"));
    }

    #[test]
    fn blank_forwarded_for_yields_none() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" , 10.0.0.1"));

        assert_eq!(extract_ip(&headers), None);
    }

    #[tokio::test]
    async fn extractor_falls_back_to_peer_address() {
        let mut request = Request::builder().uri("/").body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([198, 51, 100, 4], 51000))));
        let (mut parts, _) = request.into_parts();

        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();

        assert_eq!(ip.as_deref(), Some("198.51.100.4"));
    }

    #[tokio::test]
    async fn extractor_yields_none_without_any_source() {
        let request = Request::builder().uri("/").body(()).unwrap();
        let (mut parts, _) = request.into_parts();

        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();

        assert_eq!(ip, None);
    }
}
