//! Resilience patterns for calls to venues.
//!
//! Exponential backoff with jitter, shared by the venue HTTP client (reads
//! only), the adapter connection keeper and execution-report retries.

mod backoff;

pub use backoff::{ExponentialBackoff, RetryConfig};
