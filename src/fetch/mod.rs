//! Fan-out fetch engine.
//!
//! - [`target`] -- immutable target identity (URL, headers, format) with its
//!   cache fingerprint and breaker endpoint.
//! - [`context`] -- the per-call deadline and cancellation shared by every task.
//! - [`headers`] -- outbound header construction.
//! - [`upstream`] -- the single-attempt HTTP GET behind the [`Upstream`](upstream::Upstream) trait.
//! - [`outcome`] -- per-target outcomes and the ordered aggregate.
//! - [`orchestrator`] -- cache lookup, concurrent `retry(breaker(upstream))`
//!   tasks, and in-order fan-in.

pub mod context;
pub mod headers;
pub mod orchestrator;
pub mod outcome;
pub mod target;
pub mod upstream;

pub use context::FetchContext;
pub use orchestrator::Orchestrator;
pub use outcome::{AggregateResult, AggregateStatus, FetchOutcome, FetchSource};
pub use target::{FetchTarget, PayloadFormat};
