//! Backoff for idempotent gateway requests.
//!
//! Reads, receipt lookups, and block scans are safe to repeat. Submissions,
//! deployments, and funding are not: a lost response may belong to a
//! transaction that was mined anyway, so `rpc` never routes them here.
//!
//! Only connection failures and timeouts are retried. A JSON-RPC error rides
//! inside a successful HTTP response and is final.

use std::future::Future;
use std::time::Duration;

/// Retry schedule for idempotent requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadRetry {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Delay before the first retry; doubled for each one after.
    pub base_delay: Duration,
}

impl Default for ReadRetry {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl ReadRetry {
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }

    /// Send through `f`, repeating on transient transport failures.
    pub async fn send<F, Fut>(&self, rpc_method: &str, f: F) -> Result<reqwest::Response, reqwest::Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Err(e) if is_transient(&e) && attempt < self.retries => {
                    let delay = self.delay(attempt);
                    attempt += 1;
                    tracing::warn!(
                        rpc_method,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "gateway unreachable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout()
}
