//! Bounded retry primitive: check, sleep a fixed interval, repeat until a
//! terminal state or the attempt budget runs out.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// How often and how many times to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }
}

/// What one check observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    /// Terminal success.
    Done(T),
    /// Not there yet, check again after the interval.
    Pending,
    /// Terminal failure, no further checks.
    Failed(String),
}

#[derive(Debug, PartialEq, Eq)]
pub enum PollError<E> {
    /// A check reported a terminal failure state.
    Failed(String),
    /// Every attempt came back pending.
    Exhausted { attempts: u32 },
    /// The surrounding operation was abandoned.
    Cancelled,
    /// The check itself errored (network, decode).
    Check(E),
}

/// Run `check` until it reports a terminal state, at most `policy.max_attempts`
/// times. `check` receives the 1-based attempt number.
///
/// The sleep between attempts races `cancel`, so shutdown never waits out an
/// interval. No sleep follows the last attempt.
pub async fn poll_until<T, E, F, Fut>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<T, PollError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollStep<T>, E>>,
{
    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        match check(attempt).await.map_err(PollError::Check)? {
            PollStep::Done(value) => return Ok(value),
            PollStep::Failed(reason) => return Err(PollError::Failed(reason)),
            PollStep::Pending => {}
        }

        if attempt < policy.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }

    Err(PollError::Exhausted {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), max_attempts)
    }

    #[tokio::test]
    async fn stops_on_first_done() {
        let calls = AtomicU32::new(0);
        let out: Result<u32, PollError<()>> = poll_until(&fast(5), &CancellationToken::new(), |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(if n == 2 {
                    PollStep::Done(n)
                } else {
                    PollStep::Pending
                })
            }
        })
        .await;
        assert_eq!(out, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn check_error_aborts() {
        let out: Result<(), PollError<&str>> =
            poll_until(&fast(5), &CancellationToken::new(), |_| async { Err("boom") }).await;
        assert_eq!(out, Err(PollError::Check("boom")));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_long_sleep() {
        let cancel = CancellationToken::new();
        let policy = PollPolicy::new(Duration::from_secs(3600), 3);
        let canceller = cancel.clone();
        let out: Result<(), PollError<()>> = poll_until(&policy, &cancel, |_| {
            canceller.cancel();
            async { Ok(PollStep::Pending) }
        })
        .await;
        assert_eq!(out, Err(PollError::Cancelled));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(PollPolicy::new(Duration::ZERO, 0).max_attempts, 1);
    }
}
