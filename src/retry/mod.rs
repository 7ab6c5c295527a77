//! Retry policy for failed operations.
//!
//! [`ExponentialBackoff`] holds the pure decision logic: method safety,
//! `Retry-After` hints, status classification and the backoff sequence.
//! [`ExponentialBackoffRetryStrategy`] wraps it with tokio timers so callers
//! can await the wait and abandon it with [`RetryStrategy::cancel`].

mod backoff;
mod strategy;

pub use backoff::*;
pub use strategy::*;
