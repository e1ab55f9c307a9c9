//! Coordinator connection for the flowrec viewer.
//!
//! This module provides:
//! - [`ViewerConnection`]: a request/reply connection with the viewer role
//! - [`ViewerClient`]: the long-running task that keeps a connection alive,
//!   executes [`ClientCommand`]s and polls the log while a session is active
//!
//! The coordinator never pushes anything to a viewer, so every read on the
//! socket is the reply to the request just written.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use flowrec_core::config::DEFAULT_SOCKET_PATH;
use flowrec_core::{CaptureStamp, LogEntry, ViewerSettings};
use flowrec_protocol::{ClientMessage, CoordinatorMessage, ProtocolVersion};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, sleep, timeout, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, ViewerError};
use crate::input::{ClientCommand, Event};
use crate::reconciler::LogSource;

/// Handshake must complete within this time.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Write timeout for one request.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a request waits for its reply.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the viewer client.
///
/// # Example
///
/// ```rust
/// use flowrec_viewer::client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     socket_path: std::path::PathBuf::from("/tmp/my-flowrec.sock"),
///     poll_interval: Duration::from_millis(250),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Path to the Unix socket where the coordinator listens.
    pub socket_path: PathBuf,

    /// Initial delay before first retry after connection failure.
    pub retry_initial_delay: Duration,

    /// Maximum delay between retry attempts.
    pub retry_max_delay: Duration,

    /// Multiplier for exponential backoff.
    pub retry_multiplier: f64,

    /// Log poll period while a session is active.
    pub poll_interval: Duration,

    /// Recording-status refresh period. Also keeps an idle connection
    /// from hitting the coordinator's read timeout.
    pub status_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            retry_initial_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            retry_multiplier: 2.0,
            poll_interval: ViewerSettings::default().poll_interval(),
            status_interval: Duration::from_secs(2),
        }
    }
}

impl ClientConfig {
    pub fn from_settings(socket_path: impl Into<PathBuf>, viewer: &ViewerSettings) -> Self {
        Self {
            socket_path: socket_path.into(),
            poll_interval: viewer.poll_interval(),
            ..Self::default()
        }
    }

    /// Backoff delay following `current`, capped at `retry_max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.retry_multiplier) as u64;
        Duration::from_millis(next_ms).min(self.retry_max_delay)
    }
}

// ============================================================================
// Viewer Connection
// ============================================================================

/// Recording flag as reported by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingState {
    pub active: bool,
    pub started_at: Option<CaptureStamp>,
}

struct ConnectionIo {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

/// One handshaken viewer connection.
///
/// Requests are serialized through an internal lock, so a connection can be
/// shared between the command loop and a [`LogSource`] user.
pub struct ViewerConnection {
    client_id: String,
    io: Mutex<ConnectionIo>,
}

impl ViewerConnection {
    /// Connects and performs the viewer handshake.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be reached, the handshake times out, or
    /// the coordinator rejects the connection.
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut writer = BufWriter::new(write_half);

        write_line(&mut writer, &ClientMessage::connect_viewer(None)).await?;

        let mut line = String::new();
        let read = timeout(HANDSHAKE_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "handshake timed out"))??;
        if read == 0 {
            return Err(ViewerError::DaemonConnection(
                "connection closed during handshake".to_string(),
            ));
        }

        let client_id = match serde_json::from_str::<CoordinatorMessage>(line.trim())? {
            CoordinatorMessage::Connected {
                protocol_version,
                client_id,
            } => {
                if !ProtocolVersion::CURRENT.is_compatible_with(&protocol_version) {
                    return Err(ViewerError::VersionMismatch {
                        client_version: ProtocolVersion::CURRENT.to_string(),
                        daemon_version: protocol_version.to_string(),
                    });
                }
                info!(
                    client_id,
                    protocol_version = %protocol_version,
                    "Handshake complete"
                );
                client_id
            }
            CoordinatorMessage::Rejected {
                reason,
                protocol_version,
            } => {
                if !ProtocolVersion::CURRENT.is_compatible_with(&protocol_version) {
                    return Err(ViewerError::VersionMismatch {
                        client_version: ProtocolVersion::CURRENT.to_string(),
                        daemon_version: protocol_version.to_string(),
                    });
                }
                return Err(ViewerError::DaemonConnection(reason));
            }
            other => {
                return Err(ViewerError::ProtocolError(format!(
                    "Unexpected response to connect: {other:?}"
                )));
            }
        };

        Ok(Self {
            client_id,
            io: Mutex::new(ConnectionIo { reader, writer }),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Writes one request and reads its reply.
    ///
    /// # Errors
    ///
    /// `ViewerError::Refused` when the coordinator answers with `ERROR`;
    /// any other error means the connection is no longer usable.
    pub async fn request(&self, message: &ClientMessage) -> Result<CoordinatorMessage> {
        let mut conn = self.io.lock().await;
        write_line(&mut conn.writer, message).await?;
        debug!(message_type = message.type_name(), "Sent request");

        loop {
            let mut line = String::new();
            let read = timeout(RESPONSE_TIMEOUT, conn.reader.read_line(&mut line))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "timed out waiting for reply"))??;
            if read == 0 {
                return Err(ViewerError::DaemonConnection(
                    "coordinator closed the connection".to_string(),
                ));
            }

            let reply: CoordinatorMessage = serde_json::from_str(line.trim())?;
            if reply.is_control_signal() {
                debug!(?reply, "Skipping control signal");
                continue;
            }
            return match reply {
                CoordinatorMessage::Error { message, code } => {
                    warn!(error_message = %message, error_code = ?code, "Request refused");
                    Err(ViewerError::Refused { message, code })
                }
                other => Ok(other),
            };
        }
    }

    /// Current recording flag.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn status(&self) -> Result<RecordingState> {
        self.expect_status(ClientMessage::get_recording_status()).await
    }

    /// Starts a session; the coordinator clears its log.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn start(&self) -> Result<RecordingState> {
        self.expect_status(ClientMessage::start_recording()).await
    }

    /// Stops the session. Stopping while idle is accepted.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn stop(&self) -> Result<RecordingState> {
        self.expect_status(ClientMessage::stop_recording()).await
    }

    /// Full session log.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get_log(&self) -> Result<Vec<LogEntry>> {
        let message = ClientMessage::get_log();
        match self.request(&message).await? {
            CoordinatorMessage::Log { entries } => Ok(entries),
            other => Err(unexpected(&message, &other)),
        }
    }

    /// Empties the coordinator's log and its persisted copy.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn clear_log(&self) -> Result<()> {
        let message = ClientMessage::clear_log();
        match self.request(&message).await? {
            CoordinatorMessage::Ack { .. } => Ok(()),
            other => Err(unexpected(&message, &other)),
        }
    }

    /// Liveness check.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request); a pong carrying another sequence
    /// number is a protocol error.
    pub async fn ping(&self, seq: u64) -> Result<()> {
        let message = ClientMessage::ping(seq);
        match self.request(&message).await? {
            CoordinatorMessage::Pong { seq: echoed } if echoed == seq => Ok(()),
            other => Err(unexpected(&message, &other)),
        }
    }

    /// Says goodbye. Failures are only logged.
    pub async fn disconnect(&self) {
        let mut conn = self.io.lock().await;
        if let Err(e) = write_line(&mut conn.writer, &ClientMessage::disconnect()).await {
            debug!(error = %e, "Disconnect message not sent");
        }
    }

    async fn expect_status(&self, message: ClientMessage) -> Result<RecordingState> {
        match self.request(&message).await? {
            CoordinatorMessage::RecordingStatus { active, started_at } => {
                Ok(RecordingState { active, started_at })
            }
            other => Err(unexpected(&message, &other)),
        }
    }
}

#[async_trait]
impl LogSource for ViewerConnection {
    async fn fetch_log(&self) -> Result<Vec<LogEntry>> {
        self.get_log().await
    }
}

fn unexpected(request: &ClientMessage, reply: &CoordinatorMessage) -> ViewerError {
    ViewerError::ProtocolError(format!(
        "Unexpected reply to {}: {reply:?}",
        request.type_name()
    ))
}

async fn write_line<W>(writer: &mut W, message: &ClientMessage) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(message)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let write = async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    };
    timeout(WRITE_TIMEOUT, write)
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timed out"))?
}

// ============================================================================
// Viewer Client
// ============================================================================

/// Keeps the viewer connected to the coordinator.
///
/// # Connection Lifecycle
///
/// 1. Connects with exponential backoff and performs the handshake
/// 2. Reports the current recording state (and the log, if recording)
/// 3. Executes commands from the main loop, polls the log while recording
///    and refreshes the recording state periodically
/// 4. On an I/O or protocol failure, notifies the main loop and reconnects
///
/// # Example
///
/// ```rust,ignore
/// use flowrec_viewer::client::{ClientConfig, ViewerClient};
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// let (event_tx, event_rx) = mpsc::unbounded_channel();
/// let (command_tx, command_rx) = mpsc::unbounded_channel();
/// let client = ViewerClient::new(ClientConfig::default(), event_tx, command_rx, CancellationToken::new());
///
/// tokio::spawn(async move {
///     client.run().await;
/// });
/// ```
pub struct ViewerClient {
    config: ClientConfig,

    /// Channel to send events to the main loop.
    event_tx: mpsc::UnboundedSender<Event>,

    /// Channel to receive commands from the main loop.
    command_rx: Mutex<mpsc::UnboundedReceiver<ClientCommand>>,

    cancel_token: CancellationToken,
}

impl ViewerClient {
    #[must_use]
    pub fn new(
        config: ClientConfig,
        event_tx: mpsc::UnboundedSender<Event>,
        command_rx: mpsc::UnboundedReceiver<ClientCommand>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            event_tx,
            command_rx: Mutex::new(command_rx),
            cancel_token,
        }
    }

    /// Main loop that maintains the connection until cancelled.
    pub async fn run(&self) {
        info!(
            socket_path = %self.config.socket_path.display(),
            "Viewer client starting"
        );

        loop {
            if self.cancel_token.is_cancelled() {
                info!("Viewer client shutting down (cancelled)");
                return;
            }

            match self.connect_with_retry().await {
                Ok(connection) => {
                    info!("Connected to coordinator");

                    if let Err(e) = self.handle_connection(&connection).await {
                        warn!(error = %e, "Connection ended with error");
                    }

                    // The main loop may already be gone.
                    let _ = self.event_tx.send(Event::DaemonDisconnected);
                }
                Err(e) => {
                    if !self.cancel_token.is_cancelled() {
                        error!(error = %e, "Failed to connect to coordinator");
                    }
                }
            }

            if self.cancel_token.is_cancelled() {
                info!("Viewer client shutting down (cancelled)");
                return;
            }
        }
    }

    /// Connects with exponential backoff. Returns an error only when
    /// cancelled.
    async fn connect_with_retry(&self) -> Result<ViewerConnection> {
        let mut delay = self.config.retry_initial_delay;
        let mut attempt = 0u32;

        loop {
            attempt = attempt.saturating_add(1);

            debug!(
                attempt,
                socket_path = %self.config.socket_path.display(),
                "Attempting to connect to coordinator"
            );

            if !self.config.socket_path.exists() {
                if attempt == 1 {
                    warn!(
                        socket_path = %self.config.socket_path.display(),
                        "Coordinator socket not found, will retry"
                    );
                }
            } else {
                match ViewerConnection::connect(&self.config.socket_path).await {
                    Ok(connection) => {
                        debug!(attempt, "Connection successful");
                        return Ok(connection);
                    }
                    Err(e) => {
                        debug!(attempt, error = %e, "Connection attempt failed");
                    }
                }
            }

            tokio::select! {
                _ = sleep(delay) => {
                    delay = self.config.next_delay(delay);
                }
                _ = self.cancel_token.cancelled() => {
                    info!("Connection retry cancelled");
                    return Err(ViewerError::DaemonConnection("cancelled".to_string()));
                }
            }
        }
    }

    /// Runs one connection until it fails, the command channel closes or
    /// the client is cancelled.
    async fn handle_connection(&self, connection: &ViewerConnection) -> Result<()> {
        let initial = connection.status().await?;
        self.emit(Event::Connected {
            active: initial.active,
            started_at: initial.started_at,
        });
        let mut recording = initial.active;
        if recording {
            self.emit(Event::Log(connection.get_log().await?));
        }

        let mut poll = ticker(self.config.poll_interval);
        let mut status = ticker(self.config.status_interval);

        loop {
            let mut command_rx = self.command_rx.lock().await;

            tokio::select! {
                command = command_rx.recv() => {
                    drop(command_rx);
                    match command {
                        Some(command) => {
                            self.execute(connection, command, &mut recording).await?;
                        }
                        None => {
                            debug!("Command channel closed");
                            connection.disconnect().await;
                            return Ok(());
                        }
                    }
                }

                _ = poll.tick(), if recording => {
                    drop(command_rx);
                    self.execute(connection, ClientCommand::PollLog, &mut recording).await?;
                }

                _ = status.tick() => {
                    drop(command_rx);
                    self.execute(connection, ClientCommand::Status, &mut recording).await?;
                }

                _ = self.cancel_token.cancelled() => {
                    drop(command_rx);
                    debug!("Connection loop cancelled");
                    connection.disconnect().await;
                    return Ok(());
                }
            }
        }
    }

    /// Executes one command and reports the result to the main loop.
    ///
    /// A refused request becomes `Event::CommandFailed` and the connection
    /// stays up; every other error is returned.
    async fn execute(
        &self,
        connection: &ViewerConnection,
        command: ClientCommand,
        recording: &mut bool,
    ) -> Result<()> {
        let result = match command {
            ClientCommand::Start => connection.start().await.map(|state| {
                *recording = state.active;
                self.emit_status(state);
            }),

            // The final log goes out before the status so late actions land
            // ahead of the stop step.
            ClientCommand::Stop => match connection.stop().await {
                Ok(state) => self.finish_session(connection, state, recording).await,
                Err(e) => Err(e),
            },

            ClientCommand::PollLog => connection
                .get_log()
                .await
                .map(|entries| self.emit(Event::Log(entries))),

            ClientCommand::Clear => connection
                .clear_log()
                .await
                .map(|()| self.emit(Event::LogCleared)),

            ClientCommand::Status => match connection.status().await {
                Ok(state) if *recording && !state.active => {
                    self.finish_session(connection, state, recording).await
                }
                Ok(state) => {
                    *recording = state.active;
                    self.emit_status(state);
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(()) => Ok(()),
            Err(ViewerError::Refused { message, .. }) => {
                self.emit(Event::CommandFailed(message));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn finish_session(
        &self,
        connection: &ViewerConnection,
        state: RecordingState,
        recording: &mut bool,
    ) -> Result<()> {
        if *recording {
            self.emit(Event::Log(connection.get_log().await?));
        }
        *recording = state.active;
        self.emit_status(state);
        Ok(())
    }

    fn emit_status(&self, state: RecordingState) {
        self.emit(Event::Status {
            active: state.active,
            started_at: state.started_at,
        });
    }

    fn emit(&self, event: Event) {
        // The main loop may already be gone.
        let _ = self.event_tx.send(event);
    }
}

/// Interval whose first tick is one period away.
fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use flowrec_core::{ActionKind, ActionRecord, ContextId, PageIdentity};
    use flowrec_protocol::{AckStatus, MessageType};
    use tokio::net::UnixListener;
    use tokio::task::JoinHandle;

    // ------------------------------------------------------------------------
    // ClientConfig Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();

        assert_eq!(config.socket_path, PathBuf::from("/tmp/flowrec.sock"));
        assert_eq!(config.retry_initial_delay, Duration::from_secs(1));
        assert_eq!(config.retry_max_delay, Duration::from_secs(30));
        assert!((config.retry_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_client_config_from_settings() {
        let settings = ViewerSettings {
            poll_interval_ms: 250,
            ..Default::default()
        };
        let config = ClientConfig::from_settings("/custom/path.sock", &settings);

        assert_eq!(config.socket_path, PathBuf::from("/custom/path.sock"));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.retry_initial_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_backoff() {
        let config = ClientConfig::default();
        let d2 = config.next_delay(config.retry_initial_delay);
        assert_eq!(d2, Duration::from_secs(2));
        assert_eq!(config.next_delay(d2), Duration::from_secs(4));
    }

    #[test]
    fn test_exponential_backoff_max_cap() {
        let config = ClientConfig {
            retry_max_delay: Duration::from_secs(10),
            retry_multiplier: 10.0,
            ..Default::default()
        };
        let d2 = config.next_delay(config.retry_initial_delay);
        assert_eq!(d2, Duration::from_secs(10));
        assert_eq!(config.next_delay(d2), Duration::from_secs(10));
    }

    // ------------------------------------------------------------------------
    // Fake coordinator
    // ------------------------------------------------------------------------

    fn entry(stamp: i64, caption: &str) -> LogEntry {
        LogEntry::new(
            ActionRecord::new(
                ActionKind::Click,
                caption,
                "URL: https://app.example/",
                CaptureStamp::from_millis(stamp),
                &PageIdentity::new("https://app.example/", "App"),
            ),
            ContextId::new("tab-1"),
            CaptureStamp::from_millis(stamp),
        )
    }

    /// Answers one viewer connection the way the coordinator would.
    fn spawn_fake_coordinator(
        listener: UnixListener,
        active: bool,
        entries: Vec<LogEntry>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut active = active;
            let mut entries = entries;

            let mut line = String::new();
            while reader.read_line(&mut line).await.unwrap_or(0) > 0 {
                let message: ClientMessage = serde_json::from_str(line.trim()).unwrap();
                line.clear();
                let reply = match message.message {
                    MessageType::Connect { .. } => {
                        CoordinatorMessage::connected("viewer-1".to_string())
                    }
                    MessageType::GetRecordingStatus => CoordinatorMessage::recording_status(
                        active,
                        active.then(|| CaptureStamp::from_millis(1_000)),
                    ),
                    MessageType::StartRecording => {
                        active = true;
                        CoordinatorMessage::recording_status(
                            true,
                            Some(CaptureStamp::from_millis(1_000)),
                        )
                    }
                    MessageType::StopRecording => {
                        active = false;
                        CoordinatorMessage::recording_status(false, None)
                    }
                    MessageType::GetLog => CoordinatorMessage::log(entries.clone()),
                    MessageType::ClearLog => {
                        entries.clear();
                        CoordinatorMessage::ack(AckStatus::Accepted)
                    }
                    MessageType::Ping { seq } => CoordinatorMessage::pong(seq),
                    MessageType::Disconnect => break,
                    _ => CoordinatorMessage::error_with_code("not for viewers", "role"),
                };
                let json = serde_json::to_string(&reply).unwrap();
                write_half.write_all(json.as_bytes()).await.unwrap();
                write_half.write_all(b"\n").await.unwrap();
            }
        })
    }

    fn bind(dir: &tempfile::TempDir) -> (PathBuf, UnixListener) {
        let path = dir.path().join("flowrec.sock");
        let listener = UnixListener::bind(&path).unwrap();
        (path, listener)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    // ------------------------------------------------------------------------
    // ViewerConnection Tests
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_connection_requests() {
        let dir = tempfile::tempdir().unwrap();
        let (path, listener) = bind(&dir);
        let server = spawn_fake_coordinator(listener, false, vec![entry(5, "a")]);

        let connection = ViewerConnection::connect(&path).await.unwrap();
        assert_eq!(connection.client_id(), "viewer-1");

        assert!(!connection.status().await.unwrap().active);
        let started = connection.start().await.unwrap();
        assert!(started.active);
        assert_eq!(started.started_at, Some(CaptureStamp::from_millis(1_000)));

        let log = connection.fetch_log().await.unwrap();
        assert_eq!(log.len(), 1);
        connection.ping(7).await.unwrap();
        connection.clear_log().await.unwrap();
        assert!(connection.get_log().await.unwrap().is_empty());

        connection.disconnect().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_request_keeps_connection() {
        let dir = tempfile::tempdir().unwrap();
        let (path, listener) = bind(&dir);
        let _server = spawn_fake_coordinator(listener, false, Vec::new());

        let connection = ViewerConnection::connect(&path).await.unwrap();
        let refused = connection
            .request(&ClientMessage::capture_screenshot(None))
            .await;
        match refused {
            Err(ViewerError::Refused { message, code }) => {
                assert_eq!(message, "not for viewers");
                assert_eq!(code.as_deref(), Some("role"));
            }
            other => panic!("Expected Refused, got {other:?}"),
        }
        assert!(connection.status().await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let (path, listener) = bind(&dir);
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut line = String::new();
            BufReader::new(read_half).read_line(&mut line).await.unwrap();
            let json = serde_json::to_string(&CoordinatorMessage::rejected("busy")).unwrap();
            write_half.write_all(json.as_bytes()).await.unwrap();
            write_half.write_all(b"\n").await.unwrap();
        });

        match ViewerConnection::connect(&path).await {
            Err(ViewerError::DaemonConnection(reason)) => assert_eq!(reason, "busy"),
            other => panic!("Expected DaemonConnection, got {:?}", other.err()),
        }
    }

    // ------------------------------------------------------------------------
    // ViewerClient Tests
    // ------------------------------------------------------------------------

    fn quiet_config(socket_path: PathBuf) -> ClientConfig {
        ClientConfig {
            socket_path,
            retry_initial_delay: Duration::from_millis(10),
            poll_interval: Duration::from_secs(60),
            status_interval: Duration::from_secs(60),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_client_start_then_stop_flushes_log_before_status() {
        let dir = tempfile::tempdir().unwrap();
        let (path, listener) = bind(&dir);
        let _server = spawn_fake_coordinator(listener, false, vec![entry(5, "a")]);

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let client = ViewerClient::new(quiet_config(path), event_tx, command_rx, cancel_token.clone());
        let task = tokio::spawn(async move { client.run().await });

        assert!(matches!(
            next_event(&mut event_rx).await,
            Event::Connected { active: false, .. }
        ));

        command_tx.send(ClientCommand::Start).unwrap();
        assert!(matches!(
            next_event(&mut event_rx).await,
            Event::Status { active: true, .. }
        ));

        command_tx.send(ClientCommand::Stop).unwrap();
        match next_event(&mut event_rx).await {
            Event::Log(entries) => assert_eq!(entries.len(), 1),
            other => panic!("Expected Log, got {other:?}"),
        }
        assert!(matches!(
            next_event(&mut event_rx).await,
            Event::Status { active: false, .. }
        ));

        cancel_token.cancel();
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_client_reports_log_when_joining_active_session() {
        let dir = tempfile::tempdir().unwrap();
        let (path, listener) = bind(&dir);
        let _server = spawn_fake_coordinator(listener, true, vec![entry(5, "a"), entry(6, "b")]);

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (_command_tx, command_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let client = ViewerClient::new(quiet_config(path), event_tx, command_rx, cancel_token.clone());
        tokio::spawn(async move { client.run().await });

        assert!(matches!(
            next_event(&mut event_rx).await,
            Event::Connected { active: true, .. }
        ));
        match next_event(&mut event_rx).await {
            Event::Log(entries) => assert_eq!(entries.len(), 2),
            other => panic!("Expected Log, got {other:?}"),
        }
        cancel_token.cancel();
    }

    #[tokio::test]
    async fn test_client_forwards_clear() {
        let dir = tempfile::tempdir().unwrap();
        let (path, listener) = bind(&dir);
        let _server = spawn_fake_coordinator(listener, false, vec![entry(5, "a")]);

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let client = ViewerClient::new(quiet_config(path), event_tx, command_rx, cancel_token.clone());
        tokio::spawn(async move { client.run().await });

        let _ = next_event(&mut event_rx).await;
        command_tx.send(ClientCommand::Clear).unwrap();
        assert!(matches!(next_event(&mut event_rx).await, Event::LogCleared));
        cancel_token.cancel();
    }

    #[tokio::test]
    async fn test_client_respects_cancellation() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let config = quiet_config(PathBuf::from("/tmp/flowrec-nonexistent-test.sock"));

        let client = ViewerClient::new(config, tx, cmd_rx, cancel_token.clone());
        cancel_token.cancel();

        let start = std::time::Instant::now();
        client.run().await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
