//! Configuration validation with detailed error reporting.
//!
//! [`validate`] checks a parsed [`Config`] for values the components cannot
//! run with (zero durations, a shrinking backoff, an empty bucket, an
//! attempt timeout longer than the call deadline, malformed headers) and
//! returns every problem at once as [`ValidationError`] values with
//! per-field suggestions. [`retry_budget_warning`] flags configurations that
//! are legal but whose retry schedule cannot fit inside the deadline.

use axum::http::{HeaderName, HeaderValue};

use super::model::Config;
use crate::error::ValidationError;

fn error(section: &str, field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        section: section.into(),
        field: field.into(),
        message: message.into(),
        suggestion: None,
    }
}

fn with_suggestion(mut err: ValidationError, suggestion: impl Into<String>) -> ValidationError {
    err.suggestion = Some(suggestion.into());
    err
}

/// Validate a single outbound header pair. Returns `Ok(())` or a
/// human-readable error.
pub fn validate_header(name: &str, value: &str) -> Result<(), String> {
    if name.parse::<HeaderName>().is_err() {
        return Err(format!("'{name}' is not a valid header name"));
    }
    if HeaderValue::from_str(value).is_err() {
        return Err(format!("value for '{name}' is not a valid header value"));
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.cache.ttl_ms == 0 {
        errors.push(with_suggestion(
            error("cache", "ttl_ms", "must be greater than 0"),
            "300000 keeps entries for five minutes",
        ));
    }

    let breaker = &config.breaker;
    if breaker.failure_threshold == 0 {
        errors.push(error(
            "breaker",
            "failure_threshold",
            "must be at least 1",
        ));
    }
    if breaker.cooldown_ms == 0 {
        errors.push(error("breaker", "cooldown_ms", "must be greater than 0"));
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        errors.push(with_suggestion(
            error("retry", "max_attempts", "must be at least 1"),
            "1 disables retries",
        ));
    }
    if retry.initial_backoff_ms == 0 {
        errors.push(error(
            "retry",
            "initial_backoff_ms",
            "must be greater than 0",
        ));
    }
    if retry.max_backoff_ms < retry.initial_backoff_ms {
        errors.push(error(
            "retry",
            "max_backoff_ms",
            format!(
                "must not be below initial_backoff_ms ({})",
                retry.initial_backoff_ms
            ),
        ));
    }
    if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
        errors.push(with_suggestion(
            error("retry", "multiplier", "must be a finite number of at least 1.0"),
            "use 2.0 for doubling",
        ));
    }

    let rate = &config.rate_limit;
    if !rate.requests_per_second.is_finite() || rate.requests_per_second <= 0.0 {
        errors.push(error(
            "rate_limit",
            "requests_per_second",
            "must be a positive number",
        ));
    }
    if rate.burst == 0 {
        errors.push(with_suggestion(
            error("rate_limit", "burst", "must be at least 1"),
            "a burst of 0 rejects every request",
        ));
    }

    let fetch = &config.fetch;
    if fetch.max_targets == 0 {
        errors.push(error("fetch", "max_targets", "must be at least 1"));
    }
    if fetch.deadline_ms == 0 {
        errors.push(error("fetch", "deadline_ms", "must be greater than 0"));
    }
    if fetch.attempt_timeout_ms == 0 {
        errors.push(error(
            "fetch",
            "attempt_timeout_ms",
            "must be greater than 0",
        ));
    } else if fetch.attempt_timeout_ms > fetch.deadline_ms {
        errors.push(with_suggestion(
            error(
                "fetch",
                "attempt_timeout_ms",
                format!("must not exceed deadline_ms ({})", fetch.deadline_ms),
            ),
            format!("try {}", fetch.deadline_ms / 2),
        ));
    }
    if HeaderValue::from_str(&fetch.user_agent).is_err() || fetch.user_agent.is_empty() {
        errors.push(error(
            "fetch",
            "user_agent",
            "must be a non-empty, valid header value",
        ));
    }
    for (name, value) in &fetch.headers {
        if let Err(msg) = validate_header(name, value) {
            errors.push(error("fetch", "headers", msg));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// A warning when one target's worst-case schedule (every attempt running
/// to its timeout, plus every backoff wait) outlasts the per-call deadline,
/// meaning later attempts can never run.
#[must_use]
pub fn retry_budget_warning(config: &Config) -> Option<String> {
    let policy = config.retry.policy();
    let attempts = policy.max_attempts.max(1);
    let backoff = policy.worst_case_delay();
    let worst_case = config.fetch.attempt_timeout() * attempts + backoff;
    let deadline = config.fetch.deadline();
    (worst_case > deadline).then(|| {
        format!(
            "worst-case retry schedule ({}ms: {attempts} attempts of up to {}ms plus {}ms backoff) \
             exceeds fetch deadline ({}ms); later attempts will be cut off",
            worst_case.as_millis(),
            config.fetch.attempt_timeout_ms,
            backoff.as_millis(),
            deadline.as_millis()
        )
    })
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let mut lines = vec![
        format!("  cache:      ttl {}ms", config.cache.ttl_ms),
        format!(
            "  breaker:    opens after {} failures, cooldown {}ms",
            config.breaker.failure_threshold, config.breaker.cooldown_ms
        ),
        format!(
            "  retry:      {} attempts, backoff {}ms..{}ms x{}",
            config.retry.max_attempts,
            config.retry.initial_backoff_ms,
            config.retry.max_backoff_ms,
            config.retry.multiplier
        ),
        format!(
            "  rate_limit: {} req/s, burst {}",
            config.rate_limit.requests_per_second, config.rate_limit.burst
        ),
        format!(
            "  fetch:      up to {} targets, deadline {}ms, attempt timeout {}ms",
            config.fetch.max_targets, config.fetch.deadline_ms, config.fetch.attempt_timeout_ms
        ),
    ];
    if !config.fetch.headers.is_empty() {
        let names: Vec<&str> = config.fetch.headers.keys().map(String::as_str).collect();
        lines.push(format!("    headers: {}", names.join(", ")));
    }
    if let Some(warning) = retry_budget_warning(config) {
        lines.push(format!("\n  warning: {warning}"));
    }

    format!("{path} is valid\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
        assert!(retry_budget_warning(&Config::default()).is_none());
    }

    #[test]
    fn reports_every_problem_at_once() {
        let mut config = Config::default();
        config.cache.ttl_ms = 0;
        config.retry.multiplier = 0.5;
        config.rate_limit.burst = 0;
        config.fetch.max_targets = 0;

        let errors = validate(&config).unwrap_err();
        let fields: Vec<String> = errors
            .iter()
            .map(|e| format!("{}.{}", e.section, e.field))
            .collect();
        assert_eq!(
            fields,
            vec![
                "cache.ttl_ms",
                "retry.multiplier",
                "rate_limit.burst",
                "fetch.max_targets"
            ]
        );
    }

    #[test]
    fn attempt_timeout_above_deadline_fails() {
        let mut config = Config::default();
        config.fetch.deadline_ms = 1000;
        config.fetch.attempt_timeout_ms = 3000;
        let errors = validate(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.field == "attempt_timeout_ms" && e.suggestion.as_deref() == Some("try 500")));
    }

    #[test]
    fn shrinking_backoff_window_fails() {
        let mut config = Config::default();
        config.retry.initial_backoff_ms = 500;
        config.retry.max_backoff_ms = 100;
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "max_backoff_ms"));
    }

    #[test]
    fn non_finite_rate_fails() {
        let mut config = Config::default();
        config.rate_limit.requests_per_second = f64::NAN;
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "requests_per_second"));
    }

    #[test]
    fn invalid_default_header_fails() {
        let mut config = Config::default();
        config
            .fetch
            .headers
            .insert("bad header".into(), "x".into());
        let errors = validate(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.message.contains("not a valid header name")));
    }

    #[test]
    fn warns_when_backoff_outlasts_deadline() {
        let mut config = Config::default();
        config.retry.max_attempts = 6;
        config.retry.initial_backoff_ms = 1000;
        config.retry.max_backoff_ms = 4000;
        config.fetch.deadline_ms = 5000;
        config.fetch.attempt_timeout_ms = 1000;
        assert!(validate(&config).is_ok());
        let warning = retry_budget_warning(&config).unwrap();
        assert!(warning.contains("exceeds fetch deadline (5000ms)"));
    }

    #[test]
    fn attempt_timeouts_count_towards_budget() {
        // 3 x 2000ms attempts + 300ms backoff = 6300ms, no single part above 5000ms
        let mut config = Config::default();
        config.fetch.attempt_timeout_ms = 2000;
        let warning = retry_budget_warning(&config).unwrap();
        assert!(warning.starts_with("worst-case retry schedule (6300ms"));

        config.fetch.attempt_timeout_ms = 1500;
        assert!(retry_budget_warning(&config).is_none());
    }

    #[test]
    fn report_mentions_every_section() {
        let report = format_validation_report("fanfetch.yaml", &Config::default());
        assert!(report.starts_with("fanfetch.yaml is valid"));
        for section in ["cache:", "breaker:", "retry:", "rate_limit:", "fetch:"] {
            assert!(report.contains(section), "missing {section}");
        }
    }
}
