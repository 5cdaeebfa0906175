//! The network side of a fetch: one HTTP GET, no retries, no breaker.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, Method};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};

use crate::error::FetchError;
use crate::server::HttpClient;

use super::headers::build_outbound_headers;
use super::target::FetchTarget;

/// A successful (2xx) upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Bytes,
}

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Perform a single GET for `target`.
    ///
    /// Non-2xx statuses are [`FetchError::UpstreamStatus`]; connection and
    /// body-read failures are [`FetchError::Transport`].
    async fn get(&self, target: &FetchTarget) -> Result<UpstreamResponse, FetchError>;
}

/// [`Upstream`] backed by the pooled hyper client.
pub struct HyperUpstream {
    client: HttpClient,
    user_agent: HeaderValue,
    default_headers: HeaderMap,
    attempt_timeout: Duration,
}

impl HyperUpstream {
    #[must_use]
    pub const fn new(
        client: HttpClient,
        user_agent: HeaderValue,
        default_headers: HeaderMap,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            client,
            user_agent,
            default_headers,
            attempt_timeout,
        }
    }

    async fn send(&self, target: &FetchTarget) -> Result<UpstreamResponse, FetchError> {
        let headers = build_outbound_headers(target, &self.default_headers, &self.user_agent);

        let mut builder = hyper::Request::builder()
            .method(Method::GET)
            .uri(target.url().as_str());
        for (key, value) in &headers {
            builder = builder.header(key, value);
        }
        let request = builder
            .body(Full::new(Bytes::new()))
            .map_err(|e| FetchError::transport(&e))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| FetchError::transport(&e))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| FetchError::Transport {
                message: format!("body read error: {e}"),
            })?
            .to_bytes();

        if status.is_success() {
            Ok(UpstreamResponse {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(FetchError::UpstreamStatus {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl Upstream for HyperUpstream {
    async fn get(&self, target: &FetchTarget) -> Result<UpstreamResponse, FetchError> {
        tokio::time::timeout(self.attempt_timeout, self.send(target))
            .await
            .unwrap_or_else(|_| {
                Err(FetchError::Transport {
                    message: format!(
                        "no response within {}ms",
                        self.attempt_timeout.as_millis()
                    ),
                })
            })
    }
}
