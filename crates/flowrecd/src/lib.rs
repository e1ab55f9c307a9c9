//! flowrec coordinator - session log owner and recording broadcast server
//!
//! This crate provides the coordinator side of flowrec:
//! - `coordinator` - actor owning the recording flag and the bounded session log
//! - `broadcast` - start/stop fan-out to page contexts
//! - `server` - Unix socket server for page and viewer connections
//! - `store` - key-value persistence of the session log
//! - `screenshot` - screenshot acquisition for click-type actions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      flowrecd daemon                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │  DaemonServer   │────▶│     CoordinatorActor        │    │
//! │  │ (Unix Socket)   │     │  (session log owner)        │    │
//! │  └────────┬────────┘     └──────────────┬──────────────┘    │
//! │           │ START/STOP                  │ events            │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │  Broadcaster    │     │   persister (KeyValueStore) │    │
//! │  │ (page contexts) │     │                             │    │
//! │  └─────────────────┘     └─────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod broadcast;
pub mod coordinator;
pub mod screenshot;
pub mod server;
pub mod store;
