use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Bounded retry with a fixed backoff between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Why a retried operation gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed transiently
    Exhausted { attempts: u32, last: E },
    /// A non-transient failure ended the loop early
    Fatal { attempts: u32, error: E },
}

/// Run `op` until it succeeds, fails non-transiently, or the policy's attempts run out.
/// `op` receives the 1-based attempt number.
pub async fn retry_transient<T, E, F, Fut, P>(
    policy: RetryPolicy,
    is_transient: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if !is_transient(&error) => {
                return Err(RetryError::Fatal {
                    attempts: attempt,
                    error,
                })
            }
            Err(last) if attempt >= max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last,
                })
            }
            Err(error) => {
                debug!(attempt, error = %error, "transient failure, backing off");
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
        }
    }
}
