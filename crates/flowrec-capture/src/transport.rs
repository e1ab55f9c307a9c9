//! Capture transport: page context to coordinator.
//!
//! Every request goes through the bounded retry from
//! [`flowrec_protocol::delivery`]: a `NoReceiver` failure re-injects the
//! link once and retries once; anything else drops the message.

use std::sync::Arc;

use async_trait::async_trait;
use flowrec_core::{ActionRecord, PageIdentity, ScreenshotOutcome};
use flowrec_protocol::{
    deliver_best_effort, deliver_with_retry, AckStatus, ClientMessage, CoordinatorMessage,
    Courier, DeliveryError, RetryPolicy,
};
use tracing::{debug, warn};

use crate::error::{CaptureError, CaptureResult};

/// Recording signal pushed by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Start,
    Stop,
}

impl ControlSignal {
    pub fn from_message(message: &CoordinatorMessage) -> Option<Self> {
        match message {
            CoordinatorMessage::StartRecording => Some(Self::Start),
            CoordinatorMessage::StopRecording => Some(Self::Stop),
            _ => None,
        }
    }
}

/// Request/response channel to the coordinator.
#[async_trait]
pub trait CoordinatorLink: Send + Sync {
    /// Sends one message and waits for its reply.
    ///
    /// # Errors
    ///
    /// `DeliveryError::NoReceiver` when the coordinator side is not
    /// reachable; other variants for transport or protocol failures.
    async fn request(&self, message: ClientMessage) -> Result<CoordinatorMessage, DeliveryError>;

    /// Re-establishes the link after `NoReceiver`.
    async fn reinject(&self) -> Result<(), DeliveryError>;
}

/// Adapts a link to the [`Courier`] retry machinery.
struct LinkCourier<'a, L: ?Sized> {
    link: &'a L,
}

#[async_trait]
impl<'a, L> Courier for LinkCourier<'a, L>
where
    L: CoordinatorLink + ?Sized + 'a,
{
    type Message = ClientMessage;
    type Reply = CoordinatorMessage;

    async fn deliver(&self, message: &ClientMessage) -> Result<CoordinatorMessage, DeliveryError> {
        match self.link.request(message.clone()).await? {
            CoordinatorMessage::Error { message, .. } => Err(DeliveryError::Rejected(message)),
            reply => Ok(reply),
        }
    }

    async fn reinject(&self) -> Result<(), DeliveryError> {
        self.link.reinject().await
    }
}

/// Sends records and screenshot requests for one page context.
pub struct CaptureTransport<L: ?Sized> {
    link: Arc<L>,
    policy: RetryPolicy,
}

impl<L> CaptureTransport<L>
where
    L: CoordinatorLink + ?Sized,
{
    pub fn new(link: Arc<L>, policy: RetryPolicy) -> Self {
        Self { link, policy }
    }

    pub fn link(&self) -> &Arc<L> {
        &self.link
    }

    async fn exchange(&self, message: ClientMessage) -> CaptureResult<CoordinatorMessage> {
        let courier = LinkCourier { link: &*self.link };
        let reply = deliver_with_retry(&courier, &message, self.policy)
            .await
            .into_result()?;
        Ok(reply)
    }

    /// Sends a record as `USER_ACTION`.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Delivery` once the retry policy gave up.
    pub async fn send(&self, record: ActionRecord) -> CaptureResult<AckStatus> {
        let kind = record.kind();
        let reply = self.exchange(ClientMessage::user_action(record)).await?;
        let status = expect_ack(reply)?;
        debug!(kind = %kind, ?status, "Record delivered");
        Ok(status)
    }

    /// Asks the coordinator for a screenshot of the visible surface.
    ///
    /// Never fails: every problem is folded into
    /// [`ScreenshotOutcome::Failed`].
    pub async fn request_screenshot(&self) -> ScreenshotOutcome {
        match self.exchange(ClientMessage::capture_screenshot(None)).await {
            Ok(CoordinatorMessage::ScreenshotResult { outcome }) => outcome,
            Ok(other) => ScreenshotOutcome::failed(format!("unexpected reply: {}", reply_name(&other))),
            Err(e) => {
                warn!(error = %e, "Screenshot request failed");
                ScreenshotOutcome::failed(e.to_string())
            }
        }
    }

    /// Reads the coordinator's recording flag.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError` if the request fails or the reply has the
    /// wrong type.
    pub async fn recording_status(&self) -> CaptureResult<bool> {
        match self.exchange(ClientMessage::get_recording_status()).await? {
            CoordinatorMessage::RecordingStatus { active, .. } => Ok(active),
            other => Err(CaptureError::UnexpectedReply(reply_name(&other).to_string())),
        }
    }

    /// Tells the coordinator the page navigated. Best effort.
    pub async fn page_updated(&self, page: PageIdentity) {
        let courier = LinkCourier { link: &*self.link };
        let delivery = deliver_best_effort(&courier, &ClientMessage::page_updated(page)).await;
        if !delivery.is_delivered() {
            debug!("Page update not delivered");
        }
    }
}

fn expect_ack(reply: CoordinatorMessage) -> CaptureResult<AckStatus> {
    match reply {
        CoordinatorMessage::Ack { status } => Ok(status),
        other => Err(CaptureError::UnexpectedReply(reply_name(&other).to_string())),
    }
}

fn reply_name(message: &CoordinatorMessage) -> &'static str {
    match message {
        CoordinatorMessage::Connected { .. } => "CONNECTED",
        CoordinatorMessage::Rejected { .. } => "REJECTED",
        CoordinatorMessage::StartRecording => "START_RECORDING",
        CoordinatorMessage::StopRecording => "STOP_RECORDING",
        CoordinatorMessage::Ack { .. } => "ACK",
        CoordinatorMessage::RecordingStatus { .. } => "RECORDING_STATUS",
        CoordinatorMessage::Log { .. } => "LOG",
        CoordinatorMessage::ScreenshotResult { .. } => "SCREENSHOT_RESULT",
        CoordinatorMessage::Pong { .. } => "PONG",
        CoordinatorMessage::Error { .. } => "ERROR",
    }
}
