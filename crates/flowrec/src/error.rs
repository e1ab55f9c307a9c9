//! Error types for the flowrec viewer.
//!
//! `ViewerError` covers terminal setup and coordinator communication.
//! `ExportError` covers writing exports; a single step that cannot be
//! rendered never fails an export, it degrades to a placeholder instead.
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` outside tests.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// Viewer Error Type
// ============================================================================

/// Viewer application errors.
///
/// Connection errors suggest checking that `flowrecd` is running; terminal
/// errors usually mean the viewer is not attached to a TTY.
#[derive(Error, Debug)]
pub enum ViewerError {
    /// Raw mode or the alternate screen could not be set up.
    #[error("Failed to initialize terminal: {0}")]
    TerminalInit(String),

    /// The terminal could not be restored; running `reset` can help.
    #[error("Failed to restore terminal: {0}")]
    TerminalCleanup(String),

    #[error("Failed to connect to coordinator: {0}")]
    DaemonConnection(String),

    /// The viewer and `flowrecd` speak incompatible protocol versions.
    #[error("Protocol version mismatch (client: {client_version}, coordinator: {daemon_version})")]
    VersionMismatch {
        client_version: String,
        daemon_version: String,
    },

    /// The coordinator answered with something the request did not expect.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The coordinator refused a request; the connection stays usable.
    #[error("Coordinator refused request: {message}")]
    Refused {
        message: String,
        code: Option<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse message: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Convenience Result type alias for viewer operations.
pub type Result<T> = std::result::Result<T, ViewerError>;

// ============================================================================
// Export Error Type
// ============================================================================

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Nothing to export")]
    Empty,

    #[error("Failed to encode {format} export: {reason}")]
    Encode {
        format: &'static str,
        reason: String,
    },

    #[error("Failed to read {format} export: {reason}")]
    Decode {
        format: &'static str,
        reason: String,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<csv::Error> for ExportError {
    fn from(e: csv::Error) -> Self {
        Self::Encode {
            format: "csv",
            reason: e.to_string(),
        }
    }
}
