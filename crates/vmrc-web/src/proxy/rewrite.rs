//! Rewriting an inbound ticket request into the request sent to the backend.

use std::net::IpAddr;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::uri::PathAndQuery;
use axum::http::{Request, Uri};
use vmrc_core::BackendAddr;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that describe one connection and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// A request ready to be written to a console backend.
#[derive(Debug)]
pub struct Outbound<B> {
    /// Origin-form request; the backend authority travels in `Host`.
    pub request: Request<B>,
    /// `host:port` the request must be sent to.
    pub authority: String,
    /// Whether the request asks to switch to a persistent stream.
    pub upgrade: bool,
}

/// Returns `true` if the request carries a protocol upgrade.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    connection_upgrade && headers.contains_key(header::UPGRADE)
}

/// Removes hop-by-hop headers, keeping the upgrade pair when `keep_upgrade`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap, keep_upgrade: bool) {
    let upgrade_value = headers.get(header::UPGRADE).cloned();
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    if keep_upgrade {
        if let Some(value) = upgrade_value {
            headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
            headers.insert(header::UPGRADE, value);
        }
    }
}

/// Retargets `req` at `backend`.
///
/// The path and query are kept (console backends expect `/ticket/<id>`);
/// `Host` becomes the backend authority; an empty `User-Agent` is supplied
/// when the client sent none; the client address is appended to
/// `X-Forwarded-For`.
pub fn rewrite<B>(
    req: Request<B>,
    backend: &BackendAddr,
    client_ip: Option<IpAddr>,
) -> Outbound<B> {
    let authority = backend.authority();
    let upgrade = is_upgrade_request(req.headers());
    let (mut parts, body) = req.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    parts.uri = Uri::from(path_and_query);

    strip_hop_by_hop(&mut parts.headers, upgrade);

    if let Ok(host) = HeaderValue::from_str(&authority) {
        parts.headers.insert(header::HOST, host);
    }
    if !parts.headers.contains_key(header::USER_AGENT) {
        parts
            .headers
            .insert(header::USER_AGENT, HeaderValue::from_static(""));
    }
    if let Some(ip) = client_ip {
        let forwarded = match parts
            .headers
            .get(&X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
        {
            Some(prior) => format!("{prior}, {ip}"),
            None => ip.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded) {
            parts.headers.insert(X_FORWARDED_FOR, value);
        }
    }

    Outbound {
        request: Request::from_parts(parts, body),
        authority,
        upgrade,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> axum::http::request::Builder {
        Request::builder().uri(uri).header(header::HOST, "gateway.example.com:8081")
    }

    #[test]
    fn targets_backend_authority() {
        let req = request("/ticket/abc123").body(()).unwrap();
        let out = rewrite(req, &BackendAddr::new("10.0.0.5", 903), None);

        assert_eq!(out.authority, "10.0.0.5:903");
        assert_eq!(out.request.headers()[header::HOST], "10.0.0.5:903");
        assert_eq!(out.request.uri(), "/ticket/abc123");
        assert!(!out.upgrade);
    }

    #[test]
    fn keeps_path_and_query() {
        let req = Request::builder()
            .uri("http://gateway.example.com/ticket/abc123?encoding=binary")
            .body(())
            .unwrap();
        let out = rewrite(req, &BackendAddr::new("10.0.0.5", 903), None);

        assert_eq!(out.request.uri(), "/ticket/abc123?encoding=binary");
    }

    #[test]
    fn supplies_empty_user_agent() {
        let req = request("/ticket/abc123").body(()).unwrap();
        let out = rewrite(req, &BackendAddr::new("10.0.0.5", 903), None);
        assert_eq!(out.request.headers()[header::USER_AGENT], "");

        let req = request("/ticket/abc123")
            .header(header::USER_AGENT, "Mozilla/5.0")
            .body(())
            .unwrap();
        let out = rewrite(req, &BackendAddr::new("10.0.0.5", 903), None);
        assert_eq!(out.request.headers()[header::USER_AGENT], "Mozilla/5.0");
    }

    #[test]
    fn keeps_upgrade_headers_on_upgrade() {
        let req = request("/ticket/abc123")
            .header(header::CONNECTION, "keep-alive, Upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_PROTOCOL, "binary")
            .body(())
            .unwrap();
        let out = rewrite(req, &BackendAddr::new("10.0.0.5", 903), None);

        assert!(out.upgrade);
        let headers = out.request.headers();
        assert_eq!(headers[header::CONNECTION], "upgrade");
        assert_eq!(headers[header::UPGRADE], "websocket");
        assert_eq!(headers[header::SEC_WEBSOCKET_PROTOCOL], "binary");
    }

    #[test]
    fn strips_hop_by_hop_headers() {
        let req = request("/ticket/abc123")
            .header(header::CONNECTION, "keep-alive")
            .header("keep-alive", "timeout=5")
            .header(header::PROXY_AUTHORIZATION, "Basic Zm9v")
            .header(header::TE, "trailers")
            .body(())
            .unwrap();
        let out = rewrite(req, &BackendAddr::new("10.0.0.5", 903), None);

        let headers = out.request.headers();
        assert!(!headers.contains_key(header::CONNECTION));
        assert!(!headers.contains_key("keep-alive"));
        assert!(!headers.contains_key(header::PROXY_AUTHORIZATION));
        assert!(!headers.contains_key(header::TE));
    }

    #[test]
    fn upgrade_header_without_connection_token_is_dropped() {
        let req = request("/ticket/abc123")
            .header(header::UPGRADE, "websocket")
            .body(())
            .unwrap();
        let out = rewrite(req, &BackendAddr::new("10.0.0.5", 903), None);

        assert!(!out.upgrade);
        assert!(!out.request.headers().contains_key(header::UPGRADE));
    }

    #[test]
    fn appends_forwarded_for() {
        let ip: IpAddr = "203.0.113.7".parse().unwrap();

        let req = request("/ticket/abc123").body(()).unwrap();
        let out = rewrite(req, &BackendAddr::new("10.0.0.5", 903), Some(ip));
        assert_eq!(out.request.headers()["x-forwarded-for"], "203.0.113.7");

        let req = request("/ticket/abc123")
            .header("x-forwarded-for", "198.51.100.1")
            .body(())
            .unwrap();
        let out = rewrite(req, &BackendAddr::new("10.0.0.5", 903), Some(ip));
        assert_eq!(
            out.request.headers()["x-forwarded-for"],
            "198.51.100.1, 203.0.113.7"
        );
    }

    #[test]
    fn ipv6_backend_gets_bracketed_host() {
        let req = request("/ticket/abc123").body(()).unwrap();
        let out = rewrite(req, &BackendAddr::new("fd00::5", 903), None);
        assert_eq!(out.authority, "[fd00::5]:903");
    }
}
