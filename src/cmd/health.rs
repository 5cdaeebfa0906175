//! `fanfetch health`: check the health of a running instance.
//!
//! Sends a `GET /health` request to the specified URL and displays the
//! checks, counters and breaker states as text, or the raw JSON.

use http_body_util::BodyExt;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::cli::HealthArgs;
use crate::error::FanfetchError;
use crate::health::HealthResponse;

pub async fn execute(args: HealthArgs) -> Result<(), FanfetchError> {
    let url = format!("{}/health", args.url.trim_end_matches('/'));
    let uri: hyper::Uri =
        url.parse().map_err(
            |e: hyper::http::uri::InvalidUri| FanfetchError::UriParse {
                source: Box::new(e),
            },
        )?;

    let connector = hyper_util::client::legacy::connect::HttpConnector::new();
    let client = Client::builder(TokioExecutor::new()).build(connector);

    let req = hyper::Request::builder()
        .uri(uri)
        .body(http_body_util::Full::new(bytes::Bytes::new()))
        .map_err(|e| FanfetchError::HttpRequest {
            source: Box::new(e),
        })?;

    let response = tokio::time::timeout(std::time::Duration::from_secs(10), client.request(req))
        .await
        .map_err(|_| FanfetchError::HttpRequest {
            source: "health check timed out after 10s".into(),
        })?
        .map_err(|e| FanfetchError::HttpRequest {
            source: Box::new(e),
        })?;

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| FanfetchError::HttpRequest {
            source: Box::new(e),
        })?
        .to_bytes();

    if args.json {
        println!("{}", String::from_utf8_lossy(&body));
        return if status.is_success() {
            Ok(())
        } else {
            Err(FanfetchError::HealthCheckFailed(status))
        };
    }

    let health = match serde_json::from_slice::<HealthResponse>(&body) {
        Ok(health) => health,
        Err(e) => {
            eprintln!("Failed to parse health response: {e}");
            println!("{}", String::from_utf8_lossy(&body));
            return if status.is_success() {
                Ok(())
            } else {
                Err(FanfetchError::HealthCheckFailed(status))
            };
        }
    };

    print_report(&args.url, &health);

    if status.is_success() {
        Ok(())
    } else {
        Err(FanfetchError::HealthCheckFailed(status))
    }
}

fn print_report(url: &str, health: &HealthResponse) {
    let mark = if health.status == "healthy" {
        "\u{2713}"
    } else {
        "\u{2717}"
    };
    println!("{mark} fanfetch is {} ({url})", health.status);
    println!("  uptime:         {}", format_uptime(health.uptime_seconds));
    println!(
        "  config:         {} ({}, loaded {}s ago)",
        health.config.source, health.config.version, health.config.loaded_ago_seconds
    );
    println!(
        "  limits:         {} targets, {}ms deadline, {}ms cache ttl",
        health.config.max_targets, health.config.deadline_ms, health.config.cache_ttl_ms
    );
    println!(
        "  requests:       {} dispatched, {} rate limited, {} invalid",
        health.stats.requests_dispatched,
        health.stats.requests_rejected,
        health.stats.requests_invalid
    );
    println!(
        "  targets:        {} succeeded, {} failed, {} from cache",
        health.stats.targets_succeeded, health.stats.targets_failed, health.stats.targets_cached
    );
    println!("  cache entries:  {}", health.stats.cache_entries);
    for (name, check) in &health.checks {
        match &check.error {
            None => println!("  check {name}:    ok"),
            Some(e) => println!("  check {name}:    FAILED ({e})"),
        }
    }
    for breaker in &health.breakers {
        println!(
            "  breaker:        {} {} ({} failures, {}ms in state)",
            breaker.endpoint, breaker.state, breaker.failures, breaker.since_transition_ms
        );
    }
}

fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m 5s");
        assert_eq!(format_uptime(3_725), "1h 2m 5s");
    }
}
