//! flowrec viewer - library modules
//!
//! This library provides the viewer side of flowrec: turning the
//! coordinator's session log into numbered steps, editing them, and
//! exporting them.
//!
//! # Architecture
//!
//! The viewer binary uses an event-driven architecture with three tasks:
//!
//! 1. **Keyboard Task**: Polls for keyboard input and sends events to the main loop
//! 2. **Viewer Client Task**: Talks to `flowrecd`, executes commands and polls the log
//! 3. **Main Event Loop**: Processes events, updates [`App`], and renders the UI
//!
//! All tasks respect a shared `CancellationToken` for graceful shutdown.
//! The reconciliation, step and export modules carry no terminal
//! dependency and back the headless `flowrec export` command as well.

pub mod app;
pub mod client;
pub mod daemon;
pub mod error;
pub mod export;
pub mod input;
pub mod reconciler;
pub mod save;
pub mod session;
pub mod steps;
pub mod ui;

// Re-export commonly used types
pub use app::App;
pub use client::{ClientConfig, ViewerClient, ViewerConnection};
pub use error::{ExportError, Result, ViewerError};
pub use reconciler::{LogSource, Reconciler};
pub use steps::{Step, StepList};
