//! Cancellable fixed-delay retry.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `false` when cancelled.
pub async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Run `op` until it succeeds, waiting `delay` after each failure.
///
/// `op` receives the zero-based attempt number. Returns `None` if `cancel`
/// fires before a success; there is no attempt limit.
pub async fn retry_until_ok<T, E, F, Fut>(
    cancel: &CancellationToken,
    delay: Duration,
    what: &str,
    mut op: F,
) -> Option<T>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return None;
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = op(attempt) => result,
        };

        match result {
            Ok(value) => return Some(value),
            Err(e) => {
                attempt += 1;
                warn!(
                    error = %e,
                    what = what,
                    retry = attempt,
                    delay_secs = delay.as_secs(),
                    "Attempt failed, retrying"
                );
                if !sleep_or_cancel(cancel, delay).await {
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_retries_until_success() {
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        let result = retry_until_ok(&cancel, Duration::from_millis(1), "flaky", |attempt| {
            seen.push(attempt);
            async move {
                if attempt < 3 {
                    Err("not yet")
                } else {
                    Ok(attempt * 2)
                }
            }
        })
        .await;

        assert_eq!(result, Some(6));
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cancel_between_retries() {
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        let result: Option<()> = retry_until_ok(&cancel, Duration::from_millis(1), "doomed", |attempt| {
            if attempt == 2 {
                canceller.cancel();
            }
            async { Err::<(), _>("always") }
        })
        .await;

        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_sleep_or_cancel() {
        let cancel = CancellationToken::new();
        assert!(sleep_or_cancel(&cancel, Duration::from_millis(1)).await);
        cancel.cancel();
        assert!(!sleep_or_cancel(&cancel, Duration::from_secs(3600)).await);
    }
}
