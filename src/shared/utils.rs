//! Read policy helpers: per-read timeout and bounded retry

use crate::shared::errors::ReadError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Which error a timed-out read maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadKind {
    Entity,
    Price,
}

impl ReadKind {
    fn timeout_error(&self, label: &str) -> ReadError {
        match self {
            ReadKind::Entity => ReadError::EntityUnreachable(format!("{}: read timed out", label)),
            ReadKind::Price => ReadError::PriceUnavailable(format!("{}: read timed out", label)),
        }
    }
}

/// Timeout/retry policy applied to every on-chain read
#[derive(Debug, Clone)]
pub struct ReadPolicy {
    pub timeout: Duration,
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            attempts: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Run a read under the given policy. A hang maps to the taxonomy error for
/// `kind` instead of blocking indefinitely; transient failures are retried
/// with jittered backoff.
pub async fn with_read_policy<T, F, Fut>(
    policy: &ReadPolicy,
    kind: ReadKind,
    label: &str,
    mut op: F,
) -> Result<T, ReadError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ReadError>>,
{
    let attempts = policy.attempts.max(1);
    let mut last_err = kind.timeout_error(label);

    for attempt in 1..=attempts {
        match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => last_err = err,
            Err(_) => last_err = kind.timeout_error(label),
        }

        if attempt < attempts {
            let jitter = rand::thread_rng().gen_range(0..=policy.backoff.as_millis() as u64 / 2);
            let delay = policy.backoff + Duration::from_millis(jitter);
            debug!("read {} failed ({}), retry {}/{}", label, last_err, attempt + 1, attempts);
            tokio::time::sleep(delay).await;
        }
    }

    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let policy = ReadPolicy {
            timeout: Duration::from_millis(100),
            attempts: 3,
            backoff: Duration::from_millis(1),
        };

        let result = with_read_policy(&policy, ReadKind::Entity, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ReadError::EntityUnreachable("flaky".into()))
                } else {
                    Ok(7u64)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_hang_maps_to_taxonomy_error() {
        let policy = ReadPolicy {
            timeout: Duration::from_millis(10),
            attempts: 1,
            backoff: Duration::from_millis(1),
        };

        let result: Result<u64, _> = with_read_policy(&policy, ReadKind::Price, "slow", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        })
        .await;

        match result {
            Err(ReadError::PriceUnavailable(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected PriceUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exhausted_attempts_return_last_error() {
        let policy = ReadPolicy {
            timeout: Duration::from_millis(50),
            attempts: 2,
            backoff: Duration::from_millis(1),
        };

        let result: Result<u64, _> =
            with_read_policy(&policy, ReadKind::Entity, "down", || async {
                Err(ReadError::EntityUnreachable("rpc down".into()))
            })
            .await;

        match result {
            Err(ReadError::EntityUnreachable(msg)) => assert_eq!(msg, "rpc down"),
            other => panic!("expected EntityUnreachable, got {:?}", other),
        }
    }
}
