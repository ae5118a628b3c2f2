//! Poll a collaborator until it answers or a deadline passes.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

/// Deadline used when `timeout` does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// How long to wait for a collaborator and how often to probe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl ReadyPolicy {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }
}

impl Default for ReadyPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(3000),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("timed out after {elapsed:?} waiting for {name} (last error: {last_error})")]
    TimedOut {
        name: String,
        elapsed: Duration,
        last_error: String,
    },
}

/// Call `probe` until it succeeds, sleeping `poll_interval` between attempts.
///
/// The first probe runs immediately. Fails with [`WaitError::TimedOut`] once
/// `timeout` has elapsed without a success.
pub async fn until_ready<T, E, F, Fut>(
    name: &str,
    policy: ReadyPolicy,
    mut probe: F,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let started = Instant::now();
    let deadline = started
        .checked_add(policy.timeout)
        .unwrap_or_else(|| started + FAR_FUTURE);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let last_error = match tokio::time::timeout_at(deadline, probe()).await {
            Ok(Ok(value)) => {
                if attempts > 1 {
                    info!(name, attempts, "collaborator ready");
                }
                return Ok(value);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "probe did not complete before the deadline".to_string(),
        };

        let now = Instant::now();
        let next = now.checked_add(policy.poll_interval);
        if !matches!(next, Some(next) if next <= deadline) {
            return Err(WaitError::TimedOut {
                name: name.to_string(),
                elapsed: now - started,
                last_error,
            });
        }

        debug!(name, attempts, error = %last_error, "collaborator not ready, retrying");
        tokio::time::sleep(policy.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> ReadyPolicy {
        ReadyPolicy::new(Duration::from_millis(10), Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_ready_on_first_probe() {
        let value = until_ready("svc", fast(), || async { Ok::<_, String>(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_ready_after_failures() {
        let calls = AtomicU32::new(0);
        let value = until_ready("svc", fast(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(format!("attempt {} refused", n))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_times_out_with_last_error() {
        let policy = ReadyPolicy::new(Duration::from_millis(10), Duration::from_millis(60));
        let err = until_ready("clamd", policy, || async { Err::<(), _>("connection refused") })
            .await
            .unwrap_err();

        match err {
            WaitError::TimedOut {
                name, last_error, ..
            } => {
                assert_eq!(name, "clamd");
                assert_eq!(last_error, "connection refused");
            }
        }
    }

    #[tokio::test]
    async fn test_unbounded_timeout_does_not_overflow() {
        let policy = ReadyPolicy::new(Duration::from_millis(5), Duration::from_secs(u64::MAX));
        let calls = AtomicU32::new(0);
        let value = until_ready("svc", policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err("refused")
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_huge_poll_interval_times_out_instead_of_sleeping() {
        let policy = ReadyPolicy::new(Duration::from_secs(u64::MAX), Duration::from_millis(50));
        let err = until_ready("svc", policy, || async { Err::<(), _>("refused") }).await;
        assert!(matches!(err, Err(WaitError::TimedOut { .. })));
    }

    #[tokio::test]
    async fn test_hanging_probe_is_bounded_by_timeout() {
        let policy = ReadyPolicy::new(Duration::from_millis(10), Duration::from_millis(50));
        let started = std::time::Instant::now();
        let result = until_ready("stuck", policy, || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), String>(())
        })
        .await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
