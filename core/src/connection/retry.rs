//! Retry policy and the executor shared by connect, send and communicate
//!
//! Every retried operation runs the same loop: bound each try with the
//! per-attempt timeout, flip the connection state to connected on success,
//! sleep the cooldown between failures, and on the last failure flip the
//! state to disconnected and hand back the original transport error inside a
//! [`ConnectionFault`].

use super::fault::{ConnectionFault, PolicyError};
use super::state::ConnectionState;
use crate::transport::TransportError;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// `(attempts, cooldown, timeout)` governing one retried call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    cooldown: Duration,
    timeout: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, cooldown: Duration, timeout: Duration) -> Result<Self, PolicyError> {
        if timeout.is_zero() {
            return Err(PolicyError::ZeroTimeout);
        }
        Ok(Self {
            attempts,
            cooldown,
            timeout,
        })
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connect tries exactly `attempts` times
    pub fn connect_tries(&self) -> u32 {
        self.attempts
    }

    /// Send and communicate try `attempts + 1` times
    pub fn exchange_tries(&self) -> u32 {
        self.attempts.saturating_add(1)
    }

    /// Same policy with a different attempt count
    pub fn with_attempts(self, attempts: u32) -> Self {
        Self { attempts, ..self }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            cooldown: Duration::from_secs(1),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Which retried operation is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Send,
    Communicate,
}

impl Operation {
    pub fn tries(&self, policy: &RetryPolicy) -> u32 {
        match self {
            Operation::Connect => policy.connect_tries(),
            Operation::Send | Operation::Communicate => policy.exchange_tries(),
        }
    }

    fn failure_message(&self) -> &'static str {
        match self {
            Operation::Connect => "connection failed",
            Operation::Send => "sending message has failed",
            Operation::Communicate => "communication has failed",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Connect => write!(f, "connect"),
            Operation::Send => write!(f, "send"),
            Operation::Communicate => write!(f, "communicate"),
        }
    }
}

/// Run `step` under `policy`, updating `state` on success and exhaustion.
///
/// `step` receives the 1-based attempt number. Capability mismatches
/// (`TransportError::Unsupported`) fail immediately and leave the state as is.
pub(crate) async fn execute<R, F, Fut>(
    operation: Operation,
    policy: &RetryPolicy,
    state: &ConnectionState,
    mut step: F,
) -> Result<R, ConnectionFault>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<R, TransportError>>,
{
    let tries = operation.tries(policy);
    if tries == 0 {
        state.set_connected(false);
        return Err(ConnectionFault::without_attempt(
            operation.failure_message(),
            policy.attempts(),
        ));
    }

    for attempt in 1..=tries {
        let result = match tokio::time::timeout(policy.timeout(), step(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(policy.timeout())),
        };

        match result {
            Ok(value) => {
                state.set_connected(true);
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => {
                warn!("{} rejected without retry: {}", operation, err);
                return Err(ConnectionFault::exhausted(attempt, err));
            }
            Err(err) if attempt == tries => {
                warn!("{} failed after {} attempt(s): {}", operation, attempt, err);
                state.set_connected(false);
                return Err(ConnectionFault::exhausted(attempt, err));
            }
            Err(err) => {
                debug!(
                    "{} attempt {}/{} failed: {}; retrying in {:?}",
                    operation,
                    attempt,
                    tries,
                    err,
                    policy.cooldown()
                );
                tokio::time::sleep(policy.cooldown()).await;
            }
        }
    }

    Err(ConnectionFault::without_attempt(
        operation.failure_message(),
        tries,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(200)).unwrap()
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert_eq!(
            RetryPolicy::new(1, Duration::ZERO, Duration::ZERO),
            Err(PolicyError::ZeroTimeout)
        );
    }

    #[test]
    fn test_try_counts_are_asymmetric() {
        let policy = fast(3);
        assert_eq!(Operation::Connect.tries(&policy), 3);
        assert_eq!(Operation::Send.tries(&policy), 4);
        assert_eq!(Operation::Communicate.tries(&policy), 4);
        assert_eq!(fast(u32::MAX).exchange_tries(), u32::MAX);
    }

    #[tokio::test]
    async fn test_zero_connect_attempts_makes_no_attempt() {
        let state = ConnectionState::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let fault = execute(Operation::Connect, &fast(0), &state, move |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TransportError>(())
        })
        .await
        .unwrap_err();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(fault.attempts_made, 0);
        assert_eq!(fault.message, "connection failed");
    }

    #[tokio::test]
    async fn test_zero_send_attempts_still_tries_once() {
        let state = ConnectionState::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;
        execute(Operation::Send, &fast(0), &state, move |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TransportError>(())
        })
        .await
        .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(state.is_connected());
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let state = ConnectionState::new();
        state.set_connected(true);
        let fault = execute(Operation::Communicate, &fast(2), &state, |attempt| async move {
            Err::<(), _>(TransportError::PeerReset(format!("attempt {}", attempt)))
        })
        .await
        .unwrap_err();

        assert_eq!(fault.attempts_made, 3);
        assert_eq!(
            fault.last_error(),
            Some(&TransportError::PeerReset("attempt 3".to_string()))
        );
        assert!(!state.is_connected());
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let state = ConnectionState::new();
        let policy =
            RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(10)).unwrap();
        let fault = execute(Operation::Connect, &policy, &state, |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, TransportError>(())
        })
        .await
        .unwrap_err();

        assert_eq!(
            fault.last_error(),
            Some(&TransportError::Timeout(Duration::from_millis(10)))
        );
    }

    #[tokio::test]
    async fn test_unsupported_is_not_retried() {
        let state = ConnectionState::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let fault = execute(Operation::Communicate, &fast(5), &state, move |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(TransportError::Unsupported("receive"))
        })
        .await
        .unwrap_err();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(fault.attempts_made, 1);
    }

    #[tokio::test]
    async fn test_success_after_failures() {
        let state = ConnectionState::new();
        let value = execute(Operation::Send, &fast(3), &state, |attempt| async move {
            if attempt < 3 {
                Err(TransportError::NotConnected)
            } else {
                Ok(attempt)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert!(state.is_connected());
    }
}
