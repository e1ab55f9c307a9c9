//! Start/stop fan-out to page contexts.
//!
//! The coordinator actor only flips its flag; the fan-out happens here,
//! outside the actor, so a slow or missing page never holds up the log.
//! Every context gets its own task. Start signals go through the bounded
//! re-injection retry; stop signals are a single best-effort attempt.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use flowrec_core::ContextId;
use flowrec_protocol::{
    deliver_best_effort, deliver_with_retry, CoordinatorMessage, Courier, Delivery,
    DeliveryError, RetryPolicy,
};

use crate::coordinator::KnownContext;

/// Where page contexts live, from the coordinator's point of view.
#[async_trait]
pub trait PageHost: Send + Sync + 'static {
    /// Every context the coordinator knows about, reachable or not.
    async fn contexts(&self) -> Vec<KnownContext>;

    /// Push `message` to one context.
    ///
    /// # Errors
    ///
    /// `DeliveryError::NoReceiver` when the context has no live connection.
    async fn deliver(
        &self,
        context: &ContextId,
        message: &CoordinatorMessage,
    ) -> Result<(), DeliveryError>;

    /// Bring the capture side of `context` back so it can receive again.
    async fn reinject(&self, context: &ContextId) -> Result<(), DeliveryError>;
}

/// Adapts one context of a [`PageHost`] to the retry machinery.
struct ContextCourier<H: PageHost> {
    host: Arc<H>,
    context: ContextId,
}

#[async_trait]
impl<H: PageHost> Courier for ContextCourier<H> {
    type Message = CoordinatorMessage;
    type Reply = ();

    async fn deliver(&self, message: &CoordinatorMessage) -> Result<(), DeliveryError> {
        self.host.deliver(&self.context, message).await
    }

    async fn reinject(&self) -> Result<(), DeliveryError> {
        self.host.reinject(&self.context).await
    }
}

/// Result of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: Vec<ContextId>,
    /// Non-web pages that were never contacted.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Start,
    Stop,
}

impl Signal {
    fn message(self) -> CoordinatorMessage {
        match self {
            Self::Start => CoordinatorMessage::StartRecording,
            Self::Stop => CoordinatorMessage::StopRecording,
        }
    }
}

pub struct Broadcaster<H: PageHost> {
    host: Arc<H>,
    policy: RetryPolicy,
}

impl<H: PageHost> Clone for Broadcaster<H> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
            policy: self.policy,
        }
    }
}

impl<H: PageHost> Broadcaster<H> {
    pub fn new(host: Arc<H>, policy: RetryPolicy) -> Self {
        Self { host, policy }
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// Sends `START_RECORDING` to every web-page context.
    pub async fn start(&self) -> BroadcastReport {
        self.fan_out(Signal::Start).await
    }

    /// Sends `STOP_RECORDING` to every web-page context, best effort.
    pub async fn stop(&self) -> BroadcastReport {
        self.fan_out(Signal::Stop).await
    }

    async fn fan_out(&self, signal: Signal) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut tasks = JoinSet::new();

        for known in self.host.contexts().await {
            if !known.page.is_web_page() {
                debug!(context = %known.id, url = %known.page.url, "Skipping non-web page");
                report.skipped += 1;
                continue;
            }

            let courier = ContextCourier {
                host: Arc::clone(&self.host),
                context: known.id,
            };
            let policy = self.policy;
            tasks.spawn(async move {
                let message = signal.message();
                let delivery = match signal {
                    Signal::Start => deliver_with_retry(&courier, &message, policy).await,
                    Signal::Stop => deliver_best_effort(&courier, &message).await,
                };
                (courier.context, delivery)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Delivery::Delivered(()))) => report.delivered += 1,
                Ok((context, Delivery::Dropped { reason })) => {
                    debug!(context = %context, reason = %reason, ?signal, "Signal not delivered");
                    report.dropped.push(context);
                }
                Err(e) => warn!(error = %e, "Broadcast task failed"),
            }
        }

        info!(
            ?signal,
            delivered = report.delivered,
            dropped = report.dropped.len(),
            skipped = report.skipped,
            "Broadcast finished"
        );
        report
    }
}
