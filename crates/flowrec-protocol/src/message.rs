//! Protocol message types for coordinator communication.
//!
//! Every message is one JSON object per line. Clients send
//! [`ClientMessage`]s; the coordinator answers each request with exactly
//! one [`CoordinatorMessage`] and additionally pushes `START_RECORDING` /
//! `STOP_RECORDING` to page contexts.
//!
//! A request may carry a `request_id`. The reply echoes it in its
//! [`CoordinatorFrame`], so a client with several requests open can match
//! replies that come back out of order. Pushed signals never carry one.

use crate::version::ProtocolVersion;
use flowrec_core::{
    ActionRecord, CaptureStamp, ContextId, LogEntry, PageIdentity, ScreenshotOutcome,
};
use serde::{Deserialize, Serialize};

/// Which side of the system a client is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// A page context that captures actions.
    Page,
    /// The viewer that polls the log and drives start/stop.
    Viewer,
}

/// Message types that can be sent by clients to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Handshake.
    Connect {
        role: ClientRole,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        /// Required for page contexts.
        #[serde(skip_serializing_if = "Option::is_none")]
        context_id: Option<ContextId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        page: Option<PageIdentity>,
    },

    /// Begin a new session (clears the previous log).
    StartRecording,

    /// End the current session.
    StopRecording,

    /// A captured action from a page context.
    UserAction { action: ActionRecord },

    /// Screenshot request; with an action attached the coordinator records
    /// it together with the captured image.
    CaptureScreenshot {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<ActionRecord>,
    },

    GetRecordingStatus,

    /// Read the full session log.
    GetLog,

    /// Empty the session log and its persisted copy.
    ClearLog,

    /// A page context navigated.
    PageUpdated { page: PageIdentity },

    /// Liveness check.
    Ping { seq: u64 },

    /// Client disconnecting gracefully
    Disconnect,
}

/// Messages sent from client to coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Protocol version
    pub protocol_version: ProtocolVersion,

    /// Echoed on the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,

    /// Message payload
    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    /// Creates a new client message with current protocol version.
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            request_id: None,
            message,
        }
    }

    pub fn with_request_id(mut self, request_id: u64) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Handshake for a page context.
    pub fn connect_page(context_id: ContextId, page: PageIdentity) -> Self {
        Self::new(MessageType::Connect {
            role: ClientRole::Page,
            client_id: Some(format!("page-{context_id}")),
            context_id: Some(context_id),
            page: Some(page),
        })
    }

    /// Handshake for the viewer.
    pub fn connect_viewer(client_id: Option<String>) -> Self {
        Self::new(MessageType::Connect {
            role: ClientRole::Viewer,
            client_id,
            context_id: None,
            page: None,
        })
    }

    pub fn start_recording() -> Self {
        Self::new(MessageType::StartRecording)
    }

    pub fn stop_recording() -> Self {
        Self::new(MessageType::StopRecording)
    }

    pub fn user_action(action: ActionRecord) -> Self {
        Self::new(MessageType::UserAction { action })
    }

    pub fn capture_screenshot(action: Option<ActionRecord>) -> Self {
        Self::new(MessageType::CaptureScreenshot { action })
    }

    pub fn get_recording_status() -> Self {
        Self::new(MessageType::GetRecordingStatus)
    }

    pub fn get_log() -> Self {
        Self::new(MessageType::GetLog)
    }

    pub fn clear_log() -> Self {
        Self::new(MessageType::ClearLog)
    }

    pub fn page_updated(page: PageIdentity) -> Self {
        Self::new(MessageType::PageUpdated { page })
    }

    pub fn ping(seq: u64) -> Self {
        Self::new(MessageType::Ping { seq })
    }

    pub fn disconnect() -> Self {
        Self::new(MessageType::Disconnect)
    }

    /// Short name of the message type, for logs.
    pub fn type_name(&self) -> &'static str {
        match self.message {
            MessageType::Connect { .. } => "CONNECT",
            MessageType::StartRecording => "START_RECORDING",
            MessageType::StopRecording => "STOP_RECORDING",
            MessageType::UserAction { .. } => "USER_ACTION",
            MessageType::CaptureScreenshot { .. } => "CAPTURE_SCREENSHOT",
            MessageType::GetRecordingStatus => "GET_RECORDING_STATUS",
            MessageType::GetLog => "GET_LOG",
            MessageType::ClearLog => "CLEAR_LOG",
            MessageType::PageUpdated { .. } => "PAGE_UPDATED",
            MessageType::Ping { .. } => "PING",
            MessageType::Disconnect => "DISCONNECT",
        }
    }
}

/// How the coordinator handled a recorded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// Appended to the session log.
    Accepted,
    /// Same origin and capture stamp already logged.
    Duplicate,
    /// No session is active.
    Ignored,
}

/// Messages sent from the coordinator to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinatorMessage {
    /// Connection accepted
    Connected {
        protocol_version: ProtocolVersion,
        client_id: String,
    },

    /// Connection rejected (version mismatch, etc.)
    Rejected {
        reason: String,
        protocol_version: ProtocolVersion,
    },

    /// Pushed to page contexts when a session starts.
    StartRecording,

    /// Pushed to page contexts when a session stops.
    StopRecording,

    /// Reply to `USER_ACTION`, `CLEAR_LOG` and `PAGE_UPDATED`.
    Ack { status: AckStatus },

    RecordingStatus {
        active: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        started_at: Option<CaptureStamp>,
    },

    Log { entries: Vec<LogEntry> },

    ScreenshotResult { outcome: ScreenshotOutcome },

    Pong { seq: u64 },

    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl CoordinatorMessage {
    pub fn connected(client_id: String) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            client_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    pub fn ack(status: AckStatus) -> Self {
        Self::Ack { status }
    }

    pub fn recording_status(active: bool, started_at: Option<CaptureStamp>) -> Self {
        Self::RecordingStatus { active, started_at }
    }

    pub fn log(entries: Vec<LogEntry>) -> Self {
        Self::Log { entries }
    }

    pub fn screenshot_result(outcome: ScreenshotOutcome) -> Self {
        Self::ScreenshotResult { outcome }
    }

    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }

    /// True for the start/stop signals the coordinator pushes unprompted.
    pub fn is_control_signal(&self) -> bool {
        matches!(self, Self::StartRecording | Self::StopRecording)
    }
}

/// A coordinator message as written to the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorFrame {
    /// Id of the request this answers; `None` for pushed signals and for
    /// replies to requests that carried no id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,

    #[serde(flatten)]
    pub message: CoordinatorMessage,
}

impl CoordinatorFrame {
    pub fn reply(request_id: Option<u64>, message: CoordinatorMessage) -> Self {
        Self {
            request_id,
            message,
        }
    }

    pub fn push(message: CoordinatorMessage) -> Self {
        Self::reply(None, message)
    }
}
