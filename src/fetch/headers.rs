//! Outbound request header construction.
//!
//! [`build_outbound_headers`] layers the configured default headers under the
//! target's own headers, strips hop-by-hop headers, sets `Host` from the
//! target URL, and pins the identifying `User-Agent`.

use std::sync::LazyLock;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use super::target::{FetchTarget, PayloadFormat};

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-authorization",
        "proxy-authenticate",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

pub fn build_outbound_headers(
    target: &FetchTarget,
    defaults: &HeaderMap,
    user_agent: &HeaderValue,
) -> HeaderMap {
    let mut headers = defaults.clone();

    // Target headers replace defaults of the same name entirely.
    for name in target.headers().keys() {
        headers.remove(name);
        for value in target.headers().get_all(name) {
            headers.append(name.clone(), value.clone());
        }
    }

    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }

    let url = target.url();
    if let Some(host) = url.host_str() {
        let host_value = url
            .port()
            .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));
        if let Ok(val) = HeaderValue::from_str(&host_value) {
            headers.insert(header::HOST, val);
        }
    }

    headers.insert(header::USER_AGENT, user_agent.clone());

    if target.format() == PayloadFormat::Json && !headers.contains_key(header::ACCEPT) {
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ua() -> HeaderValue {
        HeaderValue::from_static("fanfetch/test")
    }

    #[test]
    fn strips_hop_by_hop() {
        let target = FetchTarget::from_parts(
            "http://target:8080/a",
            [("connection", "keep-alive"), ("x-tenant", "7")],
            PayloadFormat::Raw,
        )
        .unwrap();
        let result = build_outbound_headers(&target, &HeaderMap::new(), &ua());

        assert!(result.get("connection").is_none());
        assert_eq!(result.get("x-tenant").unwrap(), "7");
    }

    #[test]
    fn sets_host_with_explicit_port() {
        let target = FetchTarget::parse("http://backend:9090/path", PayloadFormat::Raw).unwrap();
        let result = build_outbound_headers(&target, &HeaderMap::new(), &ua());
        assert_eq!(result.get("host").unwrap(), "backend:9090");

        let target = FetchTarget::parse("https://backend/path", PayloadFormat::Raw).unwrap();
        let result = build_outbound_headers(&target, &HeaderMap::new(), &ua());
        assert_eq!(result.get("host").unwrap(), "backend");
    }

    #[test]
    fn user_agent_cannot_be_overridden() {
        let target = FetchTarget::from_parts(
            "http://target/a",
            [("user-agent", "curl/8")],
            PayloadFormat::Raw,
        )
        .unwrap();
        let result = build_outbound_headers(&target, &HeaderMap::new(), &ua());
        assert_eq!(result.get("user-agent").unwrap(), "fanfetch/test");
    }

    #[test]
    fn target_headers_override_defaults() {
        let mut defaults = HeaderMap::new();
        defaults.insert("x-env", HeaderValue::from_static("prod"));
        defaults.insert("x-team", HeaderValue::from_static("core"));

        let target =
            FetchTarget::from_parts("http://target/a", [("x-env", "staging")], PayloadFormat::Raw)
                .unwrap();
        let result = build_outbound_headers(&target, &defaults, &ua());

        assert_eq!(result.get("x-env").unwrap(), "staging");
        assert_eq!(result.get_all("x-env").iter().count(), 1);
        assert_eq!(result.get("x-team").unwrap(), "core");
    }

    #[test]
    fn json_targets_ask_for_json() {
        let target = FetchTarget::parse("http://target/a", PayloadFormat::Json).unwrap();
        let result = build_outbound_headers(&target, &HeaderMap::new(), &ua());
        assert_eq!(result.get("accept").unwrap(), "application/json");

        let target = FetchTarget::from_parts(
            "http://target/a",
            [("accept", "application/vnd.api+json")],
            PayloadFormat::Json,
        )
        .unwrap();
        let result = build_outbound_headers(&target, &HeaderMap::new(), &ua());
        assert_eq!(result.get("accept").unwrap(), "application/vnd.api+json");
    }
}
