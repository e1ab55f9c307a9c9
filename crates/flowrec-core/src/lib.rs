//! flowrec core - shared types for recording web interactions
//!
//! This crate provides the domain types shared between the coordinator
//! (`flowrecd`), the page capture contexts and the viewer:
//! - [`ActionRecord`]: an immutable captured action
//! - [`SessionLog`]: the coordinator's bounded log
//! - [`target`]: selector and name derivation for DOM nodes
//! - [`FlowrecConfig`]: configuration loaded from TOML
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod action;
pub mod clock;
pub mod config;
pub mod error;
pub mod log;
pub mod page;
pub mod screenshot;
pub mod target;

// Re-exports for convenience
pub use action::{ActionKind, ActionRecord, Point};
pub use clock::{CaptureStamp, MonotonicClock};
pub use config::{CaptureSettings, DaemonSettings, FlowrecConfig, ViewerSettings};
pub use error::{DomainError, DomainResult};
pub use log::{AppendOutcome, LogEntry, SessionLog, DEFAULT_LOG_CAPACITY, PERSISTED_LOG_KEY};
pub use page::{ContextId, PageIdentity};
pub use screenshot::{Screenshot, ScreenshotOutcome};
pub use target::{identify, is_own_ui, DomNode, TargetIdentity, TargetSnapshot, RECORDER_PANEL_ID};
