//! fanfetch is a concurrent HTTP fetch aggregator.
//!
//! A single call names several upstream URLs; fanfetch fetches them in
//! parallel under one deadline and returns every result in request order.
//! Each fetch is served from a TTL cache when fresh, otherwise goes through
//! a per-endpoint circuit breaker and an exponential-backoff retry loop.
//! Callers are admitted by a per-client token bucket.
//!
//! # Architecture
//!
//! - [`api`] -- `/fetch` handlers, response bodies and status mapping.
//! - [`breaker`] -- Per-endpoint circuit breaker and its registry.
//! - [`cache`] -- TTL cache with a background sweeper.
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, init, validate, health).
//! - [`config`] -- Configuration model, validation and file loading via the
//!   [`ConfigSource`](config::ConfigSource) trait.
//! - [`error`] -- Error types using `thiserror`.
//! - [`fetch`] -- Targets, call contexts, the upstream client and the
//!   fan-out [`Orchestrator`](fetch::Orchestrator).
//! - [`health`] -- `GET /health` endpoint handler returning runtime diagnostics.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`metrics`] -- `GET /metrics` counters and readings.
//! - [`middleware`] -- Per-client admission control for `/fetch`.
//! - [`ratelimit`] -- Token buckets keyed by client.
//! - [`retry`] -- Backoff policy and the retry executor.
//! - [`server`] -- Axum server setup, shared application state, HTTP client, and
//!   graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |
//! | `file-backends` | All file formats |
//! | `full` | All features |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod api;
pub mod breaker;
pub mod cache;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod fetch;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod ratelimit;
pub mod retry;
pub mod server;
