//! Serde data structures for the fanfetch configuration file.
//!
//! [`Config`] is the root, with one section per component: [`CacheSection`],
//! [`BreakerSection`], [`RetrySection`], [`RateLimitSection`] and
//! [`FetchSection`]. Every field has a default, so an empty file is a valid
//! configuration. All types use `deny_unknown_fields` for strict parsing.
//! Durations are plain milliseconds on the wire; the `*()` accessors turn
//! them into the runtime types the components take.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::breaker::BreakerConfig;
use crate::ratelimit::RateLimitConfig;
use crate::retry::RetryPolicy;

const fn default_ttl_ms() -> u64 {
    300_000
}

const fn default_failure_threshold() -> u32 {
    3
}

const fn default_cooldown_ms() -> u64 {
    60_000
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    100
}

const fn default_max_backoff_ms() -> u64 {
    2_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_requests_per_second() -> f64 {
    10.0
}

const fn default_burst() -> u32 {
    20
}

const fn default_max_targets() -> usize {
    10
}

const fn default_deadline_ms() -> u64 {
    5_000
}

const fn default_attempt_timeout_ms() -> u64 {
    1_500
}

pub fn default_user_agent() -> String {
    format!("fanfetch/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub breaker: BreakerSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub rate_limit: RateLimitSection,

    #[serde(default)]
    pub fetch: FetchSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
        }
    }
}

impl CacheSection {
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerSection {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl BreakerSection {
    pub const fn to_breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_millis(self.cooldown_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetrySection {
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.multiplier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSection {
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
        }
    }
}

impl RateLimitSection {
    pub const fn to_limiter_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: self.requests_per_second,
            burst: self.burst,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FetchSection {
    #[serde(default = "default_max_targets")]
    pub max_targets: usize,

    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Added to every outbound request; target headers win on conflict.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            max_targets: default_max_targets(),
            deadline_ms: default_deadline_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            user_agent: default_user_agent(),
            headers: BTreeMap::new(),
        }
    }
}

impl FetchSection {
    pub const fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub const fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// The configured default headers. Entries that are not valid HTTP
    /// headers are skipped; validation reports them before startup.
    #[must_use]
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (key, value) in &self.headers {
            match (key.parse::<HeaderName>(), HeaderValue::from_str(value)) {
                (Ok(name), Ok(val)) => {
                    map.insert(name, val);
                }
                _ => {
                    tracing::warn!(header = %key, "invalid header name or value in fetch.headers, skipping");
                }
            }
        }
        map
    }

    #[must_use]
    pub fn user_agent_value(&self) -> HeaderValue {
        HeaderValue::from_str(&self.user_agent).unwrap_or_else(|_| {
            tracing::warn!(user_agent = %self.user_agent, "invalid fetch.user_agent, using default");
            HeaderValue::from_str(&default_user_agent())
                .unwrap_or_else(|_| HeaderValue::from_static("fanfetch"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.retry.policy(), RetryPolicy::default());
        assert_eq!(config.breaker.to_breaker_config(), BreakerConfig::default());
        assert_eq!(
            config.rate_limit.to_limiter_config(),
            RateLimitConfig::default()
        );
        assert_eq!(config.fetch.deadline(), Duration::from_secs(5));
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"retry": {"max_attempts": 5}}"#).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 100);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_json::from_str::<Config>(r#"{"cache": {"ttl": 5}}"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn header_map_skips_invalid_entries() {
        let mut section = FetchSection::default();
        section.headers.insert("x-team".into(), "core".into());
        section.headers.insert("bad header".into(), "v".into());
        let map = section.header_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("x-team").unwrap(), "core");
    }
}
