use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adwright_core::config::AppConfig;
use adwright_core::domain::submission::ExternalOutcome;
use tokio::sync::Notify;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
            call_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_retries: config.retry.max_retries,
            base_delay_ms: config.retry.base_delay_ms,
            max_delay_ms: config.retry.max_delay_ms,
            call_timeout: Duration::from_millis(config.services.call_timeout_ms),
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortReason {
    Cancel,
    Restart,
}

impl AbortReason {
    fn encode(self) -> u8 {
        match self {
            Self::Cancel => 1,
            Self::Restart => 2,
        }
    }

    fn decode(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Cancel),
            2 => Some(Self::Restart),
            _ => None,
        }
    }
}

/// Shared handle that interrupts a pending retry loop.
///
/// Clones observe the same flag. The first reason triggered wins until `reset`.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal {
    inner: Arc<AbortInner>,
}

#[derive(Debug, Default)]
struct AbortInner {
    reason: AtomicU8,
    notify: Notify,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self, reason: AbortReason) {
        let _ = self.inner.reason.compare_exchange(
            0,
            reason.encode(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.inner.notify.notify_waiters();
    }

    pub fn reason(&self) -> Option<AbortReason> {
        AbortReason::decode(self.inner.reason.load(Ordering::SeqCst))
    }

    pub fn is_triggered(&self) -> bool {
        self.reason().is_some()
    }

    /// Re-arms the signal for the next external call.
    pub fn reset(&self) {
        self.inner.reason.store(0, Ordering::SeqCst);
    }

    pub async fn triggered(&self) -> AbortReason {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(reason) = self.reason() {
                return reason;
            }
            notified.await;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// Success, a terminal failure, or the last transient failure once retries ran out.
    Finished { value: T, attempts: u32 },
    TimedOut { attempts: u32 },
    Aborted { reason: AbortReason, attempts: u32 },
}

/// Runs `call` until it yields a non-transient answer, each attempt bounded by
/// the policy timeout. Transient failures and timeouts back off exponentially.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    abort: &AbortSignal,
    operation: &'static str,
    mut call: F,
) -> RetryOutcome<T>
where
    T: ExternalOutcome,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
{
    let mut attempt = 0_u32;
    loop {
        let attempts = attempt + 1;
        if let Some(reason) = abort.reason() {
            return RetryOutcome::Aborted { reason, attempts: attempt };
        }

        let result = tokio::select! {
            biased;
            reason = abort.triggered() => {
                info!(event_name = "agent.retry.aborted", operation, attempt, ?reason, "external call aborted");
                return RetryOutcome::Aborted { reason, attempts };
            }
            result = tokio::time::timeout(policy.call_timeout, call(attempt)) => result,
        };

        let exhausted = attempt >= policy.max_retries;
        match result {
            Ok(value) if !value.is_transient_failure() => {
                return RetryOutcome::Finished { value, attempts };
            }
            Ok(value) if exhausted => {
                warn!(
                    event_name = "agent.retry.exhausted",
                    operation,
                    attempts,
                    "transient failures exhausted the retry budget"
                );
                return RetryOutcome::Finished { value, attempts };
            }
            Err(_) if exhausted => {
                warn!(
                    event_name = "agent.retry.exhausted",
                    operation,
                    attempts,
                    "timeouts exhausted the retry budget"
                );
                return RetryOutcome::TimedOut { attempts };
            }
            Ok(value) => {
                warn!(
                    event_name = "agent.retry.transient_failure",
                    operation,
                    attempt,
                    max_retries = policy.max_retries,
                    code = ?value.failure_code(),
                    "transient failure; retrying"
                );
            }
            Err(_) => {
                warn!(
                    event_name = "agent.retry.timeout",
                    operation,
                    attempt,
                    max_retries = policy.max_retries,
                    timeout_ms = policy.call_timeout.as_millis() as u64,
                    "external call timed out; retrying"
                );
            }
        }

        let delay = policy.backoff(attempt);
        if !delay.is_zero() {
            tokio::select! {
                biased;
                reason = abort.triggered() => {
                    return RetryOutcome::Aborted { reason, attempts };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
        attempt += 1;
    }
}
