use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DeployError, DeployResult};

/// Bounded polling with exponential backoff.
///
/// Block production is not signalled back to the client, every wait on the
/// chain (inclusion, relay, unbonding) re-checks a condition with this policy
/// and gives up with [`DeployError::Timeout`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    pub interval_ms: u64,
    pub max_interval_ms: u64,
    pub backoff: f64,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            interval_ms: 500,
            max_interval_ms: 5_000,
            backoff: 1.5,
            max_attempts: 60,
        }
    }
}

impl PollPolicy {
    pub fn fixed(interval_ms: u64, max_attempts: u32) -> Self {
        PollPolicy {
            interval_ms,
            max_interval_ms: interval_ms,
            backoff: 1.0,
            max_attempts,
        }
    }

    /// Wait before the next check, `attempt` counts from 0
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff.max(1.0).powi(attempt.min(64) as i32);
        let ms = (self.interval_ms as f64 * factor).min(self.max_interval_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

/// Calls `check` until it yields `Some`, an error, or the attempts run out.
pub async fn poll_until<T, F, Fut>(policy: &PollPolicy, what: &str, mut check: F) -> DeployResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = DeployResult<Option<T>>>,
{
    for attempt in 0..policy.max_attempts {
        if let Some(found) = check(attempt).await? {
            return Ok(found);
        }
        if attempt + 1 == policy.max_attempts {
            break;
        }
        let delay = policy.delay(attempt);
        debug!(target: "poll", what, attempt, ?delay, "not ready");
        tokio::time::sleep(delay).await;
    }
    Err(DeployError::Timeout {
        what: what.to_string(),
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn backoff_is_capped() {
        let policy = PollPolicy {
            interval_ms: 100,
            max_interval_ms: 1_000,
            backoff: 2.0,
            max_attempts: 10,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
        assert_eq!(policy.delay(4), Duration::from_millis(1_000));
        assert_eq!(policy.delay(40), Duration::from_millis(1_000));
    }

    #[test]
    fn fixed_policy_never_grows() {
        let policy = PollPolicy::fixed(20, 3);
        assert_eq!(policy.delay(0), policy.delay(2));
    }

    #[tokio::test]
    async fn returns_once_condition_holds() {
        let policy = PollPolicy::fixed(1, 10);
        let found = poll_until(&policy, "third attempt", |attempt| async move {
            Ok((attempt == 2).then_some(attempt))
        })
        .await
        .unwrap();
        assert_eq!(found, 2);
    }

    #[tokio::test]
    async fn gives_up_with_timeout() {
        let policy = PollPolicy::fixed(1, 4);
        let err = poll_until(&policy, "never", |_| async { Ok(None::<()>) })
            .await
            .unwrap_err();
        assert_matches!(err, DeployError::Timeout { attempts: 4, .. });
    }

    #[tokio::test]
    async fn no_wait_after_last_attempt() {
        let policy = PollPolicy::fixed(5_000, 1);
        let started = std::time::Instant::now();
        let err = poll_until(&policy, "once", |_| async { Ok(None::<()>) })
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Timeout { attempts: 1, .. }));
        assert!(started.elapsed() < Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn errors_stop_polling() {
        let policy = PollPolicy::fixed(1, 4);
        let err = poll_until(&policy, "broken", |_| async {
            Err::<Option<()>, _>(DeployError::Relay("down".into()))
        })
        .await
        .unwrap_err();
        assert_matches!(err, DeployError::Relay(_));
    }
}
