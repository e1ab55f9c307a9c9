//! Connection handler for individual client connections.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Performs protocol version negotiation and role registration
//! - Parses incoming messages
//! - Routes requests to the coordinator and answers each with one reply,
//!   echoing the request's id
//!
//! Screenshot requests are answered from their own task, so a slow capture
//! does not hold up the page's other requests. Their replies may overtake
//! earlier ones; clients match them by id.
//!
//! Page connections additionally lend their writer to
//! [`ConnectedPages`](super::pages::ConnectedPages)
//! so start/stop signals can be pushed to them.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use flowrec_core::{ActionRecord, ContextId, PageIdentity};
use flowrec_protocol::{
    AckStatus, ClientMessage, ClientRole, CoordinatorFrame, CoordinatorMessage, MessageType,
    ProtocolVersion,
};

use super::ServerState;
use crate::coordinator::CoordinatorError;

/// Shared writer half of a client connection.
pub type ClientWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// Maximum message size (8 MB). Screenshots ride inside actions.
pub const MAX_MESSAGE_SIZE: usize = 1_048_576 * 8;

/// Read timeout for idle connections (5 minutes)
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Write timeout (10 seconds)
pub(crate) const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Who is on the other end, once the handshake is done.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Peer {
    Page(ContextId),
    Viewer,
}

/// Connection handler for a single client.
pub struct ConnectionHandler {
    reader: BufReader<OwnedReadHalf>,
    writer: ClientWriter,
    state: ServerState,

    /// Assigned after handshake.
    client_id: Option<String>,
    peer: Option<Peer>,

    /// Set when a page said `DISCONNECT`, so its context is forgotten.
    said_goodbye: bool,

    connection_number: u64,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `reader` - Read half of the Unix stream
    /// * `writer` - Write half of the Unix stream
    /// * `state` - Coordinator handle, page registry, broadcaster and screenshot source
    /// * `connection_number` - Unique number for this connection
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        state: ServerState,
        connection_number: u64,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
            state,
            client_id: None,
            peer: None,
            said_goodbye: false,
            connection_number,
        }
    }

    /// Performs the handshake, then processes messages until the
    /// connection closes.
    pub async fn run(mut self) {
        debug!(connection = self.connection_number, "New client connected");

        match self.handle_handshake().await {
            Ok(()) => {
                info!(client_id = ?self.client_id, peer = ?self.peer, "Client handshake completed");
            }
            Err(e) => {
                warn!(
                    connection = self.connection_number,
                    error = %e,
                    "Handshake failed"
                );
                return;
            }
        }

        if let Err(e) = self.process_messages().await {
            debug!(client_id = ?self.client_id, error = %e, "Connection closed");
        }

        self.release().await;
        info!(client_id = ?self.client_id, "Client disconnected");
    }

    /// Expects `CONNECT`, checks the protocol version and registers the
    /// peer.
    async fn handle_handshake(&mut self) -> Result<(), ConnectionError> {
        let msg = self.read_message().await?;

        let client_version = msg.protocol_version;
        if !client_version.is_compatible_with(&ProtocolVersion::CURRENT) {
            warn!(
                client_version = %client_version,
                server_version = %ProtocolVersion::CURRENT,
                "Protocol version mismatch"
            );

            self.send_message(CoordinatorMessage::rejected(&format!(
                "Protocol version {} not compatible with server version {}",
                client_version,
                ProtocolVersion::CURRENT
            )))
            .await?;

            return Err(ConnectionError::VersionMismatch {
                client: client_version,
                server: ProtocolVersion::CURRENT,
            });
        }

        let MessageType::Connect {
            role,
            client_id,
            context_id,
            page,
        } = msg.message
        else {
            self.send_message(CoordinatorMessage::error(
                "Expected Connect message for handshake",
            ))
            .await?;
            return Err(ConnectionError::UnexpectedMessage(msg.type_name().to_string()));
        };

        let peer = match role {
            ClientRole::Viewer => Peer::Viewer,
            ClientRole::Page => {
                let Some(context_id) = context_id else {
                    self.send_message(CoordinatorMessage::rejected(
                        "Page connections must carry a context_id",
                    ))
                    .await?;
                    return Err(ConnectionError::UnexpectedMessage(
                        "page CONNECT without context_id".to_string(),
                    ));
                };
                let page = page.unwrap_or_else(|| PageIdentity::new("", ""));
                if let Err(e) = self
                    .state
                    .coordinator
                    .register_context(context_id.clone(), page)
                    .await
                {
                    self.send_message(CoordinatorMessage::rejected(&e.to_string()))
                        .await?;
                    return Err(e.into());
                }
                Peer::Page(context_id)
            }
        };

        let assigned_id = client_id.unwrap_or_else(|| format!("client-{}", self.connection_number));
        self.client_id = Some(assigned_id.clone());

        self.send_message(CoordinatorMessage::connected(assigned_id))
            .await?;

        // Attach only after CONNECTED so no pushed signal overtakes it.
        if let Peer::Page(context_id) = &peer {
            self.state
                .pages
                .attach(
                    context_id.clone(),
                    self.connection_number,
                    Arc::clone(&self.writer),
                )
                .await;
        }
        self.peer = Some(peer);
        Ok(())
    }

    /// Reads and processes messages until the connection closes or an
    /// unrecoverable error occurs.
    async fn process_messages(&mut self) -> Result<(), ConnectionError> {
        loop {
            let msg = match timeout(READ_TIMEOUT, self.read_message()).await {
                Ok(Ok(msg)) => msg,
                Ok(Err(ConnectionError::Eof)) => {
                    debug!(client_id = ?self.client_id, "Client sent EOF");
                    return Ok(());
                }
                Ok(Err(e @ ConnectionError::ParseError(_))) => {
                    // One bad line does not end the session.
                    warn!(client_id = ?self.client_id, error = %e, "Unparseable message");
                    let _ = self
                        .send_message(CoordinatorMessage::error_with_code(
                            &e.to_string(),
                            "parse_error",
                        ))
                        .await;
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!(client_id = ?self.client_id, "Connection timed out");
                    return Err(ConnectionError::Timeout);
                }
            };

            let request_id = msg.request_id;
            match self.handle_message(msg).await {
                Ok(Some(reply)) => self.send_reply(request_id, reply).await?,
                Ok(None) => {}
                Err(ConnectionError::Eof) => return Ok(()),
                Err(e) => {
                    error!(
                        client_id = ?self.client_id,
                        error = %e,
                        "Error handling message"
                    );
                    // Send error response but continue processing
                    let _ = self
                        .send_reply(request_id, CoordinatorMessage::error(&e.to_string()))
                        .await;
                }
            }
        }
    }

    /// Handles a single client message and returns its reply. `None`
    /// means the reply is written later by a spawned task.
    async fn handle_message(
        &mut self,
        msg: ClientMessage,
    ) -> Result<Option<CoordinatorMessage>, ConnectionError> {
        let request_id = msg.request_id;
        let reply = match msg.message {
            MessageType::Connect { .. } => CoordinatorMessage::error("Already connected"),

            MessageType::StartRecording => {
                let status = self.state.coordinator.start().await?;
                let broadcaster = self.state.broadcaster.clone();
                tokio::spawn(async move {
                    broadcaster.start().await;
                });
                CoordinatorMessage::recording_status(status.active, status.started_at)
            }

            MessageType::StopRecording => {
                let status = self.state.coordinator.stop().await?;
                let broadcaster = self.state.broadcaster.clone();
                tokio::spawn(async move {
                    broadcaster.stop().await;
                });
                CoordinatorMessage::recording_status(status.active, status.started_at)
            }

            MessageType::UserAction { action } => {
                let origin = self.page_context("USER_ACTION")?;
                let outcome = self.state.coordinator.record(action, origin).await?;
                CoordinatorMessage::ack(outcome.ack_status())
            }

            MessageType::CaptureScreenshot { action: None } => {
                let screenshots = Arc::clone(&self.state.screenshots);
                self.reply_later(request_id, async move {
                    CoordinatorMessage::screenshot_result(screenshots.capture().await)
                });
                return Ok(None);
            }

            MessageType::CaptureScreenshot {
                action: Some(action),
            } => {
                let origin = self.page_context("CAPTURE_SCREENSHOT")?;
                let state = self.state.clone();
                self.reply_later(request_id, async move {
                    match capture_and_record(&state, action, origin).await {
                        Ok(status) => CoordinatorMessage::ack(status),
                        Err(e) => CoordinatorMessage::error(&e.to_string()),
                    }
                });
                return Ok(None);
            }

            MessageType::GetRecordingStatus => {
                let status = self.state.coordinator.status().await?;
                CoordinatorMessage::recording_status(status.active, status.started_at)
            }

            MessageType::GetLog => CoordinatorMessage::log(self.state.coordinator.get_log().await),

            MessageType::ClearLog => {
                self.state.coordinator.clear().await?;
                CoordinatorMessage::ack(AckStatus::Accepted)
            }

            MessageType::PageUpdated { page } => {
                let context_id = self.page_context("PAGE_UPDATED")?;
                debug!(context = %context_id, url = %page.url, "Page navigated");
                self.state
                    .coordinator
                    .update_context(context_id, page)
                    .await?;
                CoordinatorMessage::ack(AckStatus::Accepted)
            }

            MessageType::Ping { seq } => CoordinatorMessage::pong(seq),

            MessageType::Disconnect => {
                debug!(client_id = ?self.client_id, "Client requested disconnect");
                self.said_goodbye = true;
                return Err(ConnectionError::Eof);
            }
        };

        Ok(Some(reply))
    }

    /// Computes a reply on its own task and writes it when ready.
    fn reply_later<F>(&self, request_id: Option<u64>, reply: F)
    where
        F: Future<Output = CoordinatorMessage> + Send + 'static,
    {
        let writer = Arc::clone(&self.writer);
        let client_id = self.client_id.clone();
        tokio::spawn(async move {
            let frame = CoordinatorFrame::reply(request_id, reply.await);
            if let Err(e) = write_message(&writer, &frame).await {
                debug!(client_id = ?client_id, error = %e, "Late reply not delivered");
            }
        });
    }

    fn page_context(&self, message: &'static str) -> Result<ContextId, ConnectionError> {
        match &self.peer {
            Some(Peer::Page(context_id)) => Ok(context_id.clone()),
            _ => Err(ConnectionError::NotAPage(message)),
        }
    }

    /// Detaches a page's writer. A page that said goodbye is forgotten;
    /// one that just dropped stays known so broadcasts hit the re-injection
    /// path.
    async fn release(&self) {
        let Some(Peer::Page(context_id)) = &self.peer else {
            return;
        };
        let attached = self
            .state
            .pages
            .detach(context_id, self.connection_number)
            .await;
        if self.said_goodbye && attached {
            if let Err(e) = self
                .state
                .coordinator
                .forget_context(context_id.clone())
                .await
            {
                debug!(context = %context_id, error = %e, "Context already forgotten");
            }
        }
    }

    /// Reads a single message from the client.
    async fn read_message(&mut self) -> Result<ClientMessage, ConnectionError> {
        let mut line = String::new();

        let bytes_read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if line.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: line.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let msg: ClientMessage = serde_json::from_str(&line)
            .map_err(|e| ConnectionError::ParseError(e.to_string()))?;

        debug!(
            client_id = ?self.client_id,
            message_type = msg.type_name(),
            "Received message"
        );

        Ok(msg)
    }

    /// Writes a handshake-time message, which answers no numbered request.
    async fn send_message(&self, msg: CoordinatorMessage) -> Result<(), ConnectionError> {
        write_message(&self.writer, &CoordinatorFrame::push(msg)).await
    }

    async fn send_reply(
        &self,
        request_id: Option<u64>,
        msg: CoordinatorMessage,
    ) -> Result<(), ConnectionError> {
        write_message(&self.writer, &CoordinatorFrame::reply(request_id, msg)).await
    }
}

/// Captures the visible surface and records `action` with it. A failed
/// capture still records the action, without an image.
async fn capture_and_record(
    state: &ServerState,
    action: ActionRecord,
    origin: ContextId,
) -> Result<AckStatus, ConnectionError> {
    if !state.coordinator.status().await?.active {
        return Ok(AckStatus::Ignored);
    }

    let action = match state.screenshots.capture().await.into_screenshot() {
        Some(screenshot) => action.with_screenshot(screenshot),
        None => {
            debug!(context = %origin, "Recording action without screenshot");
            action
        }
    };
    let outcome = state.coordinator.record(action, origin).await?;
    Ok(outcome.ack_status())
}

/// Writes one newline-terminated message under the write timeout.
///
/// Used for replies and for signals pushed by
/// [`ConnectedPages`](super::pages::ConnectedPages).
pub(crate) async fn write_message(
    writer: &ClientWriter,
    msg: &CoordinatorFrame,
) -> Result<(), ConnectionError> {
    let json =
        serde_json::to_string(msg).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

    let mut writer = writer.lock().await;

    match timeout(WRITE_TIMEOUT, async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Protocol version mismatch: client {client}, server {server}")]
    VersionMismatch {
        client: ProtocolVersion,
        server: ProtocolVersion,
    },

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("{0} is only accepted from page connections")]
    NotAPage(&'static str),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Read timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),
}
