//! Tower middleware layers.
//!
//! [`rate_limit`] assigns the request id and applies per-client admission
//! control in front of the fetch routes.

pub mod rate_limit;
