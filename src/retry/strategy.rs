//! Retry strategy with tokio timers.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use log::debug;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use super::backoff::{ExponentialBackoff, RetryDecision, RetryOptions};
use crate::core::PlatformError;

/// Decides whether a failed operation may be attempted again.
pub trait RetryStrategy: Send {
    /// Check `error`.
    ///
    /// Returns a timer that completes once the operation may be retried, or
    /// the original error if it must not be.
    fn check_if_retryable(&mut self, error: PlatformError) -> Result<RetryTimer, PlatformError>;

    /// Make every outstanding timer inert. Cancelled timers never complete.
    fn cancel(&mut self);

    /// Start a fresh failure sequence.
    fn reset(&mut self);
}

/// Completes after a granted retry's wait has elapsed.
#[derive(Debug)]
pub struct RetryTimer {
    wait: Duration,
    fired: Option<oneshot::Receiver<()>>,
}

impl RetryTimer {
    /// How long the timer waits.
    pub fn wait(&self) -> Duration {
        self.wait
    }
}

impl Future for RetryTimer {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let Some(fired) = self.fired.as_mut() else {
            return Poll::Pending;
        };
        match Pin::new(fired).poll(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(()),
            Poll::Ready(Err(_)) => {
                // Timer task aborted by cancel().
                self.fired = None;
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// [`ExponentialBackoff`] with its waits scheduled on the tokio runtime.
#[derive(Debug)]
pub struct ExponentialBackoffRetryStrategy {
    backoff: ExponentialBackoff,
    timers: Vec<AbortHandle>,
}

impl ExponentialBackoffRetryStrategy {
    /// Create a strategy.
    pub fn new(options: RetryOptions) -> Self {
        Self {
            backoff: ExponentialBackoff::new(options),
            timers: Vec::new(),
        }
    }

    /// Underlying decision state.
    pub fn backoff(&self) -> &ExponentialBackoff {
        &self.backoff
    }

    /// Number of timers that have neither fired nor been cancelled.
    pub fn pending_timers(&mut self) -> usize {
        self.timers.retain(|timer| !timer.is_finished());
        self.timers.len()
    }
}

impl RetryStrategy for ExponentialBackoffRetryStrategy {
    fn check_if_retryable(&mut self, error: PlatformError) -> Result<RetryTimer, PlatformError> {
        let wait = match self.backoff.should_retry(error) {
            RetryDecision::Retry(wait) => wait,
            RetryDecision::DoNotRetry(error) => return Err(error),
        };

        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let _ = tx.send(());
        });
        self.timers.retain(|timer| !timer.is_finished());
        self.timers.push(task.abort_handle());

        Ok(RetryTimer {
            wait,
            fired: Some(rx),
        })
    }

    fn cancel(&mut self) {
        debug!("cancelling {} retry timers", self.timers.len());
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }

    fn reset(&mut self) {
        self.backoff.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ErrorResponse, Headers};
    use tokio::time::{timeout, Instant};

    fn strategy(method: &str) -> ExponentialBackoffRetryStrategy {
        ExponentialBackoffRetryStrategy::new(RetryOptions::new(method))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_wait() {
        let mut strategy = strategy("GET");
        let start = Instant::now();

        let timer = strategy
            .check_if_retryable(PlatformError::network("down"))
            .unwrap();
        assert_eq!(timer.wait(), Duration::from_millis(1000));
        timer.await;

        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert_eq!(strategy.backoff().retry_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_grow_and_reset() {
        let mut strategy = strategy("SUBSCRIBE");
        let mut waits = Vec::new();
        for _ in 0..5 {
            let timer = strategy
                .check_if_retryable(PlatformError::network("down"))
                .unwrap();
            waits.push(timer.wait().as_millis());
        }
        assert_eq!(waits, vec![1000, 2000, 4000, 5000, 5000]);

        strategy.reset();
        let timer = strategy
            .check_if_retryable(PlatformError::network("down"))
            .unwrap();
        assert_eq!(timer.wait(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_retryable_returns_original() {
        let mut strategy = strategy("POST");
        let error = PlatformError::Server(ErrorResponse::new(
            400,
            Headers::new(),
            serde_json::json!({"error": "bad_request"}),
        ));

        let result = strategy.check_if_retryable(error.clone());
        assert_eq!(result.unwrap_err(), error);
        assert_eq!(strategy.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_leaves_timers_inert() {
        let mut strategy = strategy("GET");
        let first = strategy
            .check_if_retryable(PlatformError::network("a"))
            .unwrap();
        let second = strategy
            .check_if_retryable(PlatformError::network("b"))
            .unwrap();
        assert_eq!(strategy.pending_timers(), 2);

        strategy.cancel();

        assert!(timeout(Duration::from_secs(60), first).await.is_err());
        assert!(timeout(Duration::from_secs(60), second).await.is_err());
        assert_eq!(strategy.pending_timers(), 0);
    }
}
