//! Immutable fetch target identity.
//!
//! A [`FetchTarget`] is a URL, the caller-supplied headers, and the payload
//! format the caller expects back. Two values derived at construction time
//! key the process-wide state:
//!
//! - the **fingerprint** keys the response cache. It is a SHA-256 digest of
//!   the normalized URL, the headers sorted by name, and the format, so header
//!   ordering never splits a cache line and distinct requests never share one.
//! - the **endpoint** (`scheme://host:port`) keys the circuit breaker, so every
//!   path on an upstream shares one health record.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::DispatchError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Any body is accepted as-is.
    #[default]
    Raw,
    /// The body must parse as JSON, otherwise the fetch fails with a decode error.
    Json,
}

impl PayloadFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchTarget {
    url: Url,
    headers: HeaderMap,
    format: PayloadFormat,
    fingerprint: String,
    endpoint: String,
}

impl FetchTarget {
    /// Build a target from an already-parsed URL.
    ///
    /// Only `http` and `https` URLs with a host are accepted.
    pub fn new(url: Url, headers: HeaderMap, format: PayloadFormat) -> Result<Self, DispatchError> {
        let invalid = |reason: &str| DispatchError::InvalidTarget {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(invalid(&format!(
                "unsupported scheme '{scheme}' (expected http or https)"
            )));
        }
        let Some(host) = url.host_str() else {
            return Err(invalid("URL has no host"));
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("URL has no port"))?;

        let endpoint = format!("{scheme}://{host}:{port}");
        let fingerprint = fingerprint(&url, &headers, format);

        Ok(Self {
            url,
            headers,
            format,
            fingerprint,
            endpoint,
        })
    }

    /// Parse a URL string into a target without extra headers.
    pub fn parse(raw: &str, format: PayloadFormat) -> Result<Self, DispatchError> {
        let url = Url::parse(raw).map_err(|e| DispatchError::InvalidTarget {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        Self::new(url, HeaderMap::new(), format)
    }

    /// Parse a URL plus string header pairs, as they arrive in a JSON request.
    pub fn from_parts<'a, I>(raw: &str, headers: I, format: PayloadFormat) -> Result<Self, DispatchError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let url = Url::parse(raw).map_err(|e| DispatchError::InvalidTarget {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let invalid = |what: &str| DispatchError::InvalidTarget {
                url: raw.to_string(),
                reason: format!("invalid header {what} for '{name}'"),
            };
            let name_parsed = name
                .parse::<HeaderName>()
                .map_err(|_| invalid("name"))?;
            let value_parsed = HeaderValue::from_str(value).map_err(|_| invalid("value"))?;
            map.append(name_parsed, value_parsed);
        }

        Self::new(url, map, format)
    }

    pub const fn url(&self) -> &Url {
        &self.url
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub const fn format(&self) -> PayloadFormat {
        self.format
    }

    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn fingerprint(url: &Url, headers: &HeaderMap, format: PayloadFormat) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(format.as_str().as_bytes());

    // HeaderName is already lower-case; values keep their insertion order
    // within a name, which is significant for repeated headers.
    let mut names: Vec<&HeaderName> = headers.keys().collect();
    names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    for name in names {
        for value in headers.get_all(name) {
            hasher.update([0]);
            hasher.update(name.as_str().as_bytes());
            hasher.update([b':']);
            hasher.update(value.as_bytes());
        }
    }

    format!("{:x}", hasher.finalize())
}
