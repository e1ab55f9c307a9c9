//! Bounded delivery retry.
//!
//! Delivering to a context that has no listener yet fails with
//! [`DeliveryError::NoReceiver`]. That one failure kind triggers a single
//! re-injection of the receiving side, a short pause and one more attempt.
//! Anything else, or a second failure, drops the message with a warning.
//! There is no open-ended retry loop.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Default pause between re-injection and the retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Why a delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Nobody is listening on the other end.
    #[error("no receiver for message")]
    NoReceiver,

    /// The receiver answered with an error.
    #[error("receiver rejected message: {0}")]
    Rejected(String),

    /// Write, read or encoding failure on the channel itself.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Re-establishing the receiver failed.
    #[error("re-injection failed: {0}")]
    Reinjection(String),
}

/// Something that can carry one message type to one receiver.
#[async_trait]
pub trait Courier: Send + Sync {
    type Message: Send + Sync;
    type Reply: Send;

    /// Attempts a single delivery.
    async fn deliver(&self, message: &Self::Message) -> Result<Self::Reply, DeliveryError>;

    /// Re-establishes the receiving side after `NoReceiver`.
    async fn reinject(&self) -> Result<(), DeliveryError>;
}

/// How many times a `NoReceiver` failure is retried, and after what pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Single attempt, no re-injection.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }
}

/// Final result of a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<R> {
    Delivered(R),
    Dropped { reason: DeliveryError },
}

impl<R> Delivery<R> {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }

    pub fn into_result(self) -> Result<R, DeliveryError> {
        match self {
            Self::Delivered(reply) => Ok(reply),
            Self::Dropped { reason } => Err(reason),
        }
    }
}

/// Delivers `message`, re-injecting and retrying on `NoReceiver` as the
/// policy allows.
pub async fn deliver_with_retry<C>(
    courier: &C,
    message: &C::Message,
    policy: RetryPolicy,
) -> Delivery<C::Reply>
where
    C: Courier + ?Sized,
{
    let mut retries = 0u32;
    loop {
        match courier.deliver(message).await {
            Ok(reply) => return Delivery::Delivered(reply),
            Err(DeliveryError::NoReceiver) if retries < policy.max_retries => {
                retries += 1;
                debug!(retry = retries, "No receiver, re-injecting before retry");
                if let Err(e) = courier.reinject().await {
                    warn!(error = %e, "Re-injection failed, dropping message");
                    return Delivery::Dropped { reason: e };
                }
                sleep(policy.delay).await;
            }
            Err(e) => {
                warn!(error = %e, retries, "Delivery failed, dropping message");
                return Delivery::Dropped { reason: e };
            }
        }
    }
}

/// Single attempt without re-injection. Failures are logged at debug.
pub async fn deliver_best_effort<C>(courier: &C, message: &C::Message) -> Delivery<C::Reply>
where
    C: Courier + ?Sized,
{
    match courier.deliver(message).await {
        Ok(reply) => Delivery::Delivered(reply),
        Err(e) => {
            debug!(error = %e, "Best-effort delivery failed");
            Delivery::Dropped { reason: e }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Courier that replays a script of results.
    struct Scripted {
        results: Mutex<VecDeque<Result<u32, DeliveryError>>>,
        reinject_result: Result<(), DeliveryError>,
        attempts: AtomicUsize,
        reinjections: AtomicUsize,
    }

    impl Scripted {
        fn new(results: Vec<Result<u32, DeliveryError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                reinject_result: Ok(()),
                attempts: AtomicUsize::new(0),
                reinjections: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Courier for Scripted {
        type Message = &'static str;
        type Reply = u32;

        async fn deliver(&self, _message: &Self::Message) -> Result<u32, DeliveryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(DeliveryError::NoReceiver))
        }

        async fn reinject(&self) -> Result<(), DeliveryError> {
            self.reinjections.fetch_add(1, Ordering::SeqCst);
            self.reinject_result.clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_succeeds() {
        let courier = Scripted::new(vec![Ok(7)]);
        let result = deliver_with_retry(&courier, &"msg", RetryPolicy::default()).await;
        assert_eq!(result, Delivery::Delivered(7));
        assert_eq!(courier.reinjections.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_receiver_reinjects_once_then_succeeds() {
        let courier = Scripted::new(vec![Err(DeliveryError::NoReceiver), Ok(1)]);
        let result = deliver_with_retry(&courier, &"msg", RetryPolicy::default()).await;
        assert!(result.is_delivered());
        assert_eq!(courier.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(courier.reinjections.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_failure_drops() {
        let courier = Scripted::new(vec![
            Err(DeliveryError::NoReceiver),
            Err(DeliveryError::NoReceiver),
            Ok(3),
        ]);
        let result = deliver_with_retry(&courier, &"msg", RetryPolicy::default()).await;
        assert_eq!(
            result,
            Delivery::Dropped {
                reason: DeliveryError::NoReceiver
            }
        );
        assert_eq!(courier.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(courier.reinjections.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let courier = Scripted::new(vec![Err(DeliveryError::Transport("broken pipe".into()))]);
        let result = deliver_with_retry(&courier, &"msg", RetryPolicy::default()).await;
        assert!(!result.is_delivered());
        assert_eq!(courier.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(courier.reinjections.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reinjection_drops_without_retry() {
        let mut courier = Scripted::new(vec![Err(DeliveryError::NoReceiver), Ok(1)]);
        courier.reinject_result = Err(DeliveryError::Reinjection("gone".into()));
        let result = deliver_with_retry(&courier, &"msg", RetryPolicy::default()).await;
        assert!(matches!(
            result,
            Delivery::Dropped {
                reason: DeliveryError::Reinjection(_)
            }
        ));
        assert_eq!(courier.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_effort_never_reinjects() {
        let courier = Scripted::new(vec![Err(DeliveryError::NoReceiver)]);
        let result = deliver_best_effort(&courier, &"msg").await;
        assert!(!result.is_delivered());
        assert_eq!(courier.reinjections.load(Ordering::SeqCst), 0);
    }
}
