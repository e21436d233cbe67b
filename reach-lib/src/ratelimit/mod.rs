//! Rate limiting, concurrency control and retries for one dispatch.
//!
//! This module keeps the remote service from being over-queried: it bounds
//! the number of attempts started within any rolling window of a period, the
//! number of attempts in flight, and the number of retries per record.
//!
//! # Architecture
//!
//! - [`RateLimitConfig`]: Limits and retry budget, validated against the platform ceiling
//! - [`RateGate`]: Enforces the limits and drives the retry loop for each record

mod config;
mod gate;
mod window;

pub use config::{
    RateLimitConfig, DEFAULT_MAX_CALLS_PER_PERIOD, DEFAULT_MAX_CONCURRENT, DEFAULT_PERIOD,
    DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_LIMIT, MAX_QUERIES_PER_SECOND,
};
pub use gate::RateGate;
