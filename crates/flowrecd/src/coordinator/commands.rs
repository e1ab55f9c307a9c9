//! Coordinator actor commands, errors, and events.
//!
//! - `CoordinatorCommand`: Commands sent to the actor
//! - `CoordinatorError`: Errors that can occur during coordinator operations
//! - `CoordinatorEvent`: Events published for subscribers (persister, server)

use flowrec_core::{ActionRecord, CaptureStamp, ContextId, LogEntry, PageIdentity};
use flowrec_protocol::AckStatus;
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Coordinator Commands
// ============================================================================

/// Commands sent to the coordinator actor.
///
/// Each command carries a oneshot channel for the response.
#[derive(Debug)]
pub enum CoordinatorCommand {
    /// Begin a session: set active, clear the log.
    Start {
        respond_to: oneshot::Sender<RecordingStatus>,
    },

    /// End the session. The log stays readable.
    Stop {
        respond_to: oneshot::Sender<RecordingStatus>,
    },

    /// Append a captured action from `origin`.
    Record {
        /// Boxed to keep the enum small.
        action: Box<ActionRecord>,
        origin: ContextId,
        respond_to: oneshot::Sender<RecordOutcome>,
    },

    Status {
        respond_to: oneshot::Sender<RecordingStatus>,
    },

    GetLog {
        respond_to: oneshot::Sender<Vec<LogEntry>>,
    },

    /// Empty the log without touching the recording flag.
    Clear { respond_to: oneshot::Sender<()> },

    /// Add or refresh a known page context.
    ///
    /// # Errors
    /// - `CoordinatorError::TooManyContexts` if at capacity
    RegisterContext {
        context_id: ContextId,
        page: PageIdentity,
        respond_to: oneshot::Sender<Result<(), CoordinatorError>>,
    },

    /// A known context navigated.
    ///
    /// # Errors
    /// - `CoordinatorError::UnknownContext` if never registered
    UpdateContext {
        context_id: ContextId,
        page: PageIdentity,
        respond_to: oneshot::Sender<Result<(), CoordinatorError>>,
    },

    /// The context closed for good.
    ForgetContext {
        context_id: ContextId,
        respond_to: oneshot::Sender<Result<(), CoordinatorError>>,
    },

    ListContexts {
        respond_to: oneshot::Sender<Vec<KnownContext>>,
    },
}

// ============================================================================
// Replies
// ============================================================================

/// Snapshot of the recording flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordingStatus {
    pub active: bool,
    pub started_at: Option<CaptureStamp>,
}

/// What `Record` did with an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Appended; `evicted` oldest entries were dropped.
    Accepted { evicted: usize },
    /// Same origin and capture stamp already logged.
    Duplicate,
    /// No session is active.
    Ignored,
}

impl RecordOutcome {
    pub fn ack_status(&self) -> AckStatus {
        match self {
            Self::Accepted { .. } => AckStatus::Accepted,
            Self::Duplicate => AckStatus::Duplicate,
            Self::Ignored => AckStatus::Ignored,
        }
    }
}

/// A page context the coordinator knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownContext {
    pub id: ContextId,
    pub page: PageIdentity,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("unknown page context: {0}")]
    UnknownContext(ContextId),

    #[error("too many page contexts (max: {max})")]
    TooManyContexts { max: usize },

    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Events
// ============================================================================

/// Published after every state change.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    RecordingStarted { started_at: CaptureStamp },
    RecordingStopped,
    ActionRecorded { entry: Box<LogEntry> },
    LogCleared,
    ContextRegistered { context_id: ContextId },
    ContextForgotten { context_id: ContextId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_error_display() {
        let err = CoordinatorError::TooManyContexts { max: 100 };
        assert_eq!(err.to_string(), "too many page contexts (max: 100)");

        let err = CoordinatorError::UnknownContext(ContextId::new("tab-9"));
        assert_eq!(err.to_string(), "unknown page context: tab-9");
    }

    #[test]
    fn test_outcome_to_ack() {
        assert_eq!(
            RecordOutcome::Accepted { evicted: 2 }.ack_status(),
            AckStatus::Accepted
        );
        assert_eq!(RecordOutcome::Duplicate.ack_status(), AckStatus::Duplicate);
        assert_eq!(RecordOutcome::Ignored.ack_status(), AckStatus::Ignored);
    }
}
