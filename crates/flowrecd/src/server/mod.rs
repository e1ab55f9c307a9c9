//! Unix socket server for the flowrec coordinator.
//!
//! The server:
//! - Listens on a Unix socket for page and viewer connections
//! - Spawns a ConnectionHandler for each client
//! - Pushes start/stop signals to page connections through [`ConnectedPages`]
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   DaemonServer  │
//! │  UnixListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌───────────────────┐
//! │ConnectionHandler│────▶│ CoordinatorHandle │
//! │   (per client)  │     └───────────────────┘
//! └───────┬─────────┘
//!         │ START/STOP_RECORDING
//!         ▼
//! ┌─────────────────┐     ┌───────────────────┐
//! │   Broadcaster   │────▶│  ConnectedPages   │──▶ page sockets
//! └─────────────────┘     └───────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Server errors are logged and allow continued operation

mod connection;
mod pages;

pub use connection::{ClientWriter, ConnectionError, ConnectionHandler, MAX_MESSAGE_SIZE};
pub use pages::{ConnectedPages, DEFAULT_REINJECT_WAIT};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use flowrec_protocol::RetryPolicy;

use crate::broadcast::Broadcaster;
use crate::coordinator::CoordinatorHandle;
use crate::screenshot::ScreenshotSource;

/// Everything a connection handler needs, cheap to clone.
#[derive(Clone)]
pub struct ServerState {
    pub coordinator: CoordinatorHandle,
    pub pages: Arc<ConnectedPages>,
    pub broadcaster: Broadcaster<ConnectedPages>,
    pub screenshots: Arc<dyn ScreenshotSource>,
}

impl ServerState {
    pub fn new(
        coordinator: CoordinatorHandle,
        screenshots: Arc<dyn ScreenshotSource>,
        reinject_wait: Duration,
        policy: RetryPolicy,
    ) -> Self {
        let pages = Arc::new(ConnectedPages::new(coordinator.clone(), reinject_wait));
        let broadcaster = Broadcaster::new(Arc::clone(&pages), policy);
        Self {
            coordinator,
            pages,
            broadcaster,
            screenshots,
        }
    }
}

/// Unix socket server for the coordinator.
pub struct DaemonServer {
    socket_path: PathBuf,
    state: ServerState,
    cancel_token: CancellationToken,

    /// Connection counter for generating client IDs
    connection_counter: AtomicU64,
}

impl DaemonServer {
    /// Creates a new daemon server with the default re-injection wait and
    /// retry policy.
    ///
    /// # Arguments
    ///
    /// * `socket_path` - Path where the Unix socket will be created
    /// * `coordinator` - Handle to the coordinator actor
    /// * `screenshots` - Source used for `CAPTURE_SCREENSHOT`
    /// * `cancel_token` - Token for graceful shutdown
    pub fn new(
        socket_path: impl Into<PathBuf>,
        coordinator: CoordinatorHandle,
        screenshots: Arc<dyn ScreenshotSource>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self::with_state(
            socket_path,
            ServerState::new(
                coordinator,
                screenshots,
                DEFAULT_REINJECT_WAIT,
                RetryPolicy::default(),
            ),
            cancel_token,
        )
    }

    pub fn with_state(
        socket_path: impl Into<PathBuf>,
        state: ServerState,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            state,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Runs the server.
    ///
    /// Listens for connections until the cancellation token is triggered.
    /// This method does not return until shutdown.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::SocketSetup` if the socket cannot be bound.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = bind_listener(&self.socket_path)?;

        info!(
            socket = %self.socket_path.display(),
            "Coordinator listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.cleanup().await;
        Ok(())
    }

    /// Handles a new client connection by spawning a handler task.
    fn handle_connection(&self, stream: tokio::net::UnixStream, connection_number: u64) {
        let (reader, writer) = stream.into_split();
        let handler = ConnectionHandler::new(reader, writer, self.state.clone(), connection_number);
        tokio::spawn(handler.run());
    }

    /// Performs cleanup on shutdown.
    async fn cleanup(&self) {
        self.state.pages.clear().await;

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }

        info!("Server cleanup complete");
    }
}

/// Binds a fresh socket at `path`, replacing a stale socket file and
/// creating the parent directory as needed.
fn bind_listener(path: &Path) -> Result<UnixListener, ServerError> {
    let setup_error = |e: std::io::Error| ServerError::SocketSetup {
        path: path.to_path_buf(),
        error: e.to_string(),
    };

    if path.exists() {
        std::fs::remove_file(path).map_err(setup_error)?;
    }
    if let Some(parent) = path.parent().filter(|p| !p.exists()) {
        std::fs::create_dir_all(parent).map_err(setup_error)?;
    }
    UnixListener::bind(path).map_err(setup_error)
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}
