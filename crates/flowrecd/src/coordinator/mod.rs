//! Session coordinator using the actor pattern.
//!
//! The coordinator owns the recording flag, the bounded session log and
//! the set of known page contexts. Everything else talks to it through a
//! [`CoordinatorHandle`].
//!
//! ```text
//! ┌──────────────┐  CoordinatorCommand  ┌──────────────────┐  CoordinatorEvent
//! │ Connections  │─────────────────────▶│ CoordinatorActor │──────────────────▶ persister,
//! └──────────────┘    (mpsc channel)    └──────────────────┘    (broadcast)     server
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use tokio::sync::{broadcast, mpsc};

use flowrec_core::LogEntry;

mod actor;
mod commands;
mod handle;

pub use actor::{CoordinatorActor, MAX_CONTEXTS};
pub use commands::{
    CoordinatorCommand, CoordinatorError, CoordinatorEvent, KnownContext, RecordOutcome,
    RecordingStatus,
};
pub use handle::CoordinatorHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Spawn the coordinator actor and return a handle for it.
///
/// `restored` seeds the log with entries from a previous run; the
/// coordinator always starts idle.
///
/// # Example
///
/// ```no_run
/// use flowrecd::coordinator::spawn_coordinator;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_coordinator(100, Vec::new());
///     let log = handle.get_log().await;
///     assert!(log.is_empty());
/// }
/// ```
pub fn spawn_coordinator(capacity: usize, restored: Vec<LogEntry>) -> CoordinatorHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let mut actor = CoordinatorActor::new(cmd_rx, event_tx.clone(), capacity);
    if !restored.is_empty() {
        actor = actor.with_restored(restored);
    }
    tokio::spawn(actor.run());

    CoordinatorHandle::new(cmd_tx, event_tx)
}
