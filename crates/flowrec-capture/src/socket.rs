//! Unix-socket link to the coordinator.
//!
//! One connection per page context. Every request carries a fresh
//! `request_id` and its reply is matched by that id, so screenshot
//! replies may arrive after later ones. The coordinator may also push
//! `START_RECORDING` / `STOP_RECORDING` at any time; those never answer a
//! request and go to the control channel.
//!
//! An idle page still pings the coordinator every [`PING_INTERVAL`] so its
//! connection outlives the coordinator's read timeout. A failed ping
//! reconnects.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use flowrec_core::{ContextId, PageIdentity};
use flowrec_protocol::{
    ClientMessage, CoordinatorFrame, CoordinatorMessage, DeliveryError, MessageType,
    ProtocolVersion,
};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};

use crate::error::{CaptureError, CaptureResult};
use crate::transport::{ControlSignal, CoordinatorLink};

/// Write timeout for one message.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a request waits for its reply. Screenshot requests run an
/// external command, so this is generous.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Handshake must complete within this time.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Keepalive period. The coordinator closes connections idle for five
/// minutes.
pub const PING_INTERVAL: Duration = Duration::from_secs(60);

/// Reply waiters by request id.
#[derive(Default)]
struct Inflight {
    waiters: HashMap<u64, oneshot::Sender<CoordinatorMessage>>,
    closed: bool,
}

struct Connection {
    writer: BufWriter<OwnedWriteHalf>,
    inflight: Arc<Mutex<Inflight>>,
    reader: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// [`CoordinatorLink`] over the coordinator's Unix socket.
pub struct SocketLink {
    socket_path: PathBuf,
    context_id: ContextId,
    /// Sent in every handshake, kept current from outgoing `PAGE_UPDATED`.
    page: Mutex<PageIdentity>,
    connection: Mutex<Option<Connection>>,
    control_tx: mpsc::UnboundedSender<ControlSignal>,
    next_request_id: AtomicU64,
    keepalive: Mutex<Option<JoinHandle<()>>>,
}

impl SocketLink {
    /// Connects and registers the page context.
    ///
    /// Returns the link and the receiver for pushed control signals. The
    /// link pings the coordinator until [`disconnect`](Self::disconnect)
    /// or until it is dropped.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be reached or the handshake is rejected.
    pub async fn connect(
        socket_path: impl Into<PathBuf>,
        context_id: ContextId,
        page: PageIdentity,
    ) -> CaptureResult<(Arc<Self>, mpsc::UnboundedReceiver<ControlSignal>)> {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let link = Self {
            socket_path: socket_path.into(),
            context_id,
            page: Mutex::new(page),
            connection: Mutex::new(None),
            control_tx,
            next_request_id: AtomicU64::new(1),
            keepalive: Mutex::new(None),
        };
        let connection = link.open().await?;
        *link.connection.lock().await = Some(connection);

        let link = Arc::new(link);
        let pinger = tokio::spawn(keepalive(Arc::downgrade(&link)));
        *link.keepalive.lock().await = Some(pinger);
        Ok((link, control_rx))
    }

    pub fn context_id(&self) -> &ContextId {
        &self.context_id
    }

    /// Stops the keepalive, says goodbye and drops the connection.
    pub async fn disconnect(&self) {
        if let Some(pinger) = self.keepalive.lock().await.take() {
            pinger.abort();
        }
        let mut guard = self.connection.lock().await;
        if let Some(mut connection) = guard.take() {
            if let Err(e) = write_line(&mut connection.writer, &ClientMessage::disconnect()).await
            {
                debug!(error = %e, "Disconnect message not sent");
            }
        }
    }

    /// Sends `PING` and reconnects when it goes unanswered.
    async fn ping(&self, seq: u64) {
        match self.request(ClientMessage::ping(seq)).await {
            Ok(CoordinatorMessage::Pong { .. }) => debug!(seq, "Coordinator answered ping"),
            Ok(other) => debug!(?other, "Unexpected reply to ping"),
            Err(e) => {
                info!(context = %self.context_id, error = %e, "Ping failed, reconnecting");
                if let Err(e) = self.reinject().await {
                    warn!(context = %self.context_id, error = %e, "Reconnect failed");
                }
            }
        }
    }

    async fn open(&self) -> CaptureResult<Connection> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut writer = BufWriter::new(write_half);

        let page = self.page.lock().await.clone();
        let hello = ClientMessage::connect_page(self.context_id.clone(), page);
        write_line(&mut writer, &hello).await?;

        let mut line = String::new();
        let read = timeout(HANDSHAKE_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "handshake timed out"))??;
        if read == 0 {
            return Err(CaptureError::Rejected(
                "connection closed during handshake".to_string(),
            ));
        }

        match serde_json::from_str::<CoordinatorMessage>(line.trim())? {
            CoordinatorMessage::Connected {
                protocol_version,
                client_id,
            } => {
                if !ProtocolVersion::CURRENT.is_compatible_with(&protocol_version) {
                    return Err(CaptureError::Rejected(format!(
                        "protocol {protocol_version} is not compatible with {}",
                        ProtocolVersion::CURRENT
                    )));
                }
                info!(client_id, context = %self.context_id, "Registered with coordinator");
            }
            CoordinatorMessage::Rejected { reason, .. } => {
                return Err(CaptureError::Rejected(reason));
            }
            other => {
                return Err(CaptureError::UnexpectedReply(format!("{other:?}")));
            }
        }

        let inflight = Arc::new(Mutex::new(Inflight::default()));
        let reader = tokio::spawn(read_loop(
            reader,
            Arc::clone(&inflight),
            self.control_tx.clone(),
        ));
        Ok(Connection {
            writer,
            inflight,
            reader,
        })
    }
}

#[async_trait]
impl CoordinatorLink for SocketLink {
    async fn request(&self, message: ClientMessage) -> Result<CoordinatorMessage, DeliveryError> {
        if let MessageType::PageUpdated { page } = &message.message {
            *self.page.lock().await = page.clone();
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let message = message.with_request_id(request_id);

        let (reply_rx, inflight) = {
            let mut guard = self.connection.lock().await;
            let Some(connection) = guard.as_mut() else {
                return Err(DeliveryError::NoReceiver);
            };

            let (reply_tx, reply_rx) = oneshot::channel();
            let closed = {
                let mut inflight = connection.inflight.lock().await;
                if !inflight.closed {
                    inflight.waiters.insert(request_id, reply_tx);
                }
                inflight.closed
            };
            if closed {
                *guard = None;
                return Err(DeliveryError::NoReceiver);
            }

            if let Err(e) = write_line(&mut connection.writer, &message).await {
                *guard = None;
                return Err(match e.kind() {
                    io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::NotConnected => DeliveryError::NoReceiver,
                    _ => DeliveryError::Transport(e.to_string()),
                });
            }
            (reply_rx, Arc::clone(&connection.inflight))
        };

        match timeout(RESPONSE_TIMEOUT, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            // Reader ended before our reply arrived.
            Ok(Err(_)) => Err(DeliveryError::NoReceiver),
            Err(_) => {
                inflight.lock().await.waiters.remove(&request_id);
                Err(DeliveryError::Transport("timed out waiting for reply".to_string()))
            }
        }
    }

    async fn reinject(&self) -> Result<(), DeliveryError> {
        let mut guard = self.connection.lock().await;
        guard.take();
        match self.open().await {
            Ok(connection) => {
                *guard = Some(connection);
                info!(context = %self.context_id, "Re-established coordinator link");
                Ok(())
            }
            Err(e) => Err(DeliveryError::Reinjection(e.to_string())),
        }
    }
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

/// Routes coordinator messages until the connection ends, then fails every
/// outstanding waiter.
async fn read_loop(
    mut reader: BufReader<OwnedReadHalf>,
    inflight: Arc<Mutex<Inflight>>,
    control_tx: mpsc::UnboundedSender<ControlSignal>,
) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("Coordinator closed connection");
                break;
            }
            Ok(_) => {
                let frame = match serde_json::from_str::<CoordinatorFrame>(line.trim()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "Unparseable message from coordinator");
                        continue;
                    }
                };
                if let Some(signal) = ControlSignal::from_message(&frame.message) {
                    // Receiver gone means the page context is shutting down.
                    let _ = control_tx.send(signal);
                    continue;
                }
                let waiter = match frame.request_id {
                    Some(id) => inflight.lock().await.waiters.remove(&id),
                    None => None,
                };
                match waiter {
                    Some(reply_tx) => {
                        let _ = reply_tx.send(frame.message);
                    }
                    None => debug!(reply = ?frame.message, "Unsolicited message from coordinator"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Read from coordinator failed");
                break;
            }
        }
    }

    let mut inflight = inflight.lock().await;
    inflight.closed = true;
    inflight.waiters.clear();
}

/// Pings the coordinator every [`PING_INTERVAL`] while the link lives.
async fn keepalive(link: Weak<SocketLink>) {
    let mut ticker = interval(PING_INTERVAL);
    // The first tick completes immediately.
    ticker.tick().await;

    let mut seq = 0;
    loop {
        ticker.tick().await;
        let Some(link) = link.upgrade() else {
            debug!("Keepalive stopping: link dropped");
            break;
        };
        seq += 1;
        link.ping(seq).await;
    }
}
