//! Client interface for the coordinator actor.
//!
//! `CoordinatorHandle` is cheap to clone. Connection handlers, the
//! persister and the broadcaster each hold one.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `CoordinatorError::ChannelClosed`

use tokio::sync::{broadcast, mpsc, oneshot};

use flowrec_core::{ActionRecord, ContextId, LogEntry, PageIdentity};

use super::commands::{
    CoordinatorCommand, CoordinatorError, CoordinatorEvent, KnownContext, RecordOutcome,
    RecordingStatus,
};

/// Handle for interacting with the coordinator actor.
#[derive(Clone)]
pub struct CoordinatorHandle {
    sender: mpsc::Sender<CoordinatorCommand>,
    event_sender: broadcast::Sender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    pub fn new(
        sender: mpsc::Sender<CoordinatorCommand>,
        event_sender: broadcast::Sender<CoordinatorEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Start a new session. The previous log is discarded.
    ///
    /// # Errors
    ///
    /// - `CoordinatorError::ChannelClosed` if the actor has shut down
    pub async fn start(&self) -> Result<RecordingStatus, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Start { respond_to: tx }).await?;
        rx.await.map_err(|_| CoordinatorError::ChannelClosed)
    }

    /// Stop the current session.
    ///
    /// # Errors
    ///
    /// - `CoordinatorError::ChannelClosed` if the actor has shut down
    pub async fn stop(&self) -> Result<RecordingStatus, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Stop { respond_to: tx }).await?;
        rx.await.map_err(|_| CoordinatorError::ChannelClosed)
    }

    /// Append an action captured by `origin`.
    ///
    /// # Errors
    ///
    /// - `CoordinatorError::ChannelClosed` if the actor has shut down
    pub async fn record(
        &self,
        action: ActionRecord,
        origin: ContextId,
    ) -> Result<RecordOutcome, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Record {
            action: Box::new(action),
            origin,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| CoordinatorError::ChannelClosed)
    }

    /// Current recording flag.
    ///
    /// # Errors
    ///
    /// - `CoordinatorError::ChannelClosed` if the actor has shut down
    pub async fn status(&self) -> Result<RecordingStatus, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Status { respond_to: tx }).await?;
        rx.await.map_err(|_| CoordinatorError::ChannelClosed)
    }

    /// The whole session log, ordered by capture stamp.
    ///
    /// Returns an empty vector if the actor is gone.
    pub async fn get_log(&self) -> Vec<LogEntry> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(CoordinatorCommand::GetLog { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Empty the log.
    ///
    /// # Errors
    ///
    /// - `CoordinatorError::ChannelClosed` if the actor has shut down
    pub async fn clear(&self) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Clear { respond_to: tx }).await?;
        rx.await.map_err(|_| CoordinatorError::ChannelClosed)
    }

    /// Add or refresh a page context.
    ///
    /// # Errors
    ///
    /// - `CoordinatorError::TooManyContexts` if at capacity
    /// - `CoordinatorError::ChannelClosed` if the actor has shut down
    pub async fn register_context(
        &self,
        context_id: ContextId,
        page: PageIdentity,
    ) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorCommand::RegisterContext {
            context_id,
            page,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| CoordinatorError::ChannelClosed)?
    }

    /// Record a navigation of a known context.
    ///
    /// # Errors
    ///
    /// - `CoordinatorError::UnknownContext` if it was never registered
    /// - `CoordinatorError::ChannelClosed` if the actor has shut down
    pub async fn update_context(
        &self,
        context_id: ContextId,
        page: PageIdentity,
    ) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorCommand::UpdateContext {
            context_id,
            page,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| CoordinatorError::ChannelClosed)?
    }

    /// # Errors
    ///
    /// - `CoordinatorError::UnknownContext` if it was never registered
    /// - `CoordinatorError::ChannelClosed` if the actor has shut down
    pub async fn forget_context(&self, context_id: ContextId) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorCommand::ForgetContext {
            context_id,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| CoordinatorError::ChannelClosed)?
    }

    /// Known page contexts. Empty if the actor is gone.
    pub async fn list_contexts(&self) -> Vec<KnownContext> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(CoordinatorCommand::ListContexts { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Subscribe to coordinator events.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.event_sender.subscribe()
    }

    /// True while the command channel is open.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    async fn send(&self, cmd: CoordinatorCommand) -> Result<(), CoordinatorError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)
    }
}
