//! Request-scoped deadline with an attached cancellation token.
//!
//! Every operation that may block (preflight, generation call, backoff wait)
//! takes a `&Deadline` and races its future against it, so expiry aborts at
//! the next suspension point instead of after the current sleep completes.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline exceeded")]
pub struct DeadlineExceeded;

#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    token: CancellationToken,
}

impl Deadline {
    /// Deadline `timeout` from now with a fresh cancellation token.
    pub fn after(timeout: Duration) -> Self {
        Self::with_token(timeout, CancellationToken::new())
    }

    pub fn with_token(timeout: Duration, token: CancellationToken) -> Self {
        Self {
            at: Instant::now() + timeout,
            token,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Cancels the deadline early. Pending `run`/`sleep` calls return
    /// `DeadlineExceeded`.
    #[cfg(test)]
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn check(&self) -> Result<(), DeadlineExceeded> {
        if self.is_expired() {
            Err(DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Drives `fut` to completion unless the deadline expires or the token is
    /// cancelled first. Checks before polling, so an already-expired deadline
    /// never starts the operation.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, DeadlineExceeded>
    where
        F: Future,
    {
        self.check()?;

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(DeadlineExceeded),
            _ = sleep_until(self.at) => Err(DeadlineExceeded),
            out = fut => Ok(out),
        }
    }

    /// Cancellable sleep. Returns early with `DeadlineExceeded` when the
    /// deadline falls inside the requested delay.
    pub async fn sleep(&self, delay: Duration) -> Result<(), DeadlineExceeded> {
        self.run(sleep(delay)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_is_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        assert_eq!(deadline.check(), Err(DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_completes_before_deadline() {
        let deadline = Deadline::after(Duration::from_secs(1));
        let out = deadline.run(async { 7 }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_aborts_at_deadline() {
        let deadline = Deadline::after(Duration::from_millis(300));
        let start = Instant::now();

        let result = deadline.sleep(Duration::from_secs(10)).await;

        assert_eq!(result, Err(DeadlineExceeded));
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_within_deadline() {
        let deadline = Deadline::after(Duration::from_secs(1));
        let start = Instant::now();

        deadline.sleep(Duration::from_millis(200)).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(200));
        assert_eq!(deadline.remaining(), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_pending_sleep() {
        let deadline = Deadline::after(Duration::from_secs(60));
        let canceller = deadline.clone();

        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        assert_eq!(
            deadline.sleep(Duration::from_secs(30)).await,
            Err(DeadlineExceeded)
        );
        assert_eq!(start.elapsed(), Duration::from_millis(50));
        assert!(deadline.is_expired());
    }
}
