//! flowrec protocol - wire protocol for coordinator communication
//!
//! This crate provides the message types exchanged between page contexts,
//! the viewer and the coordinator, the raw page-event payloads page hosts
//! emit, and the bounded retry used for every delivery.

pub mod delivery;
pub mod message;
pub mod parse;
pub mod version;

pub use delivery::{
    deliver_best_effort, deliver_with_retry, Courier, Delivery, DeliveryError, RetryPolicy,
};
pub use message::{
    AckStatus, ClientMessage, ClientRole, CoordinatorFrame, CoordinatorMessage, MessageType,
};
pub use parse::{to_point, RawNode, RawPageEvent};
pub use version::{ProtocolVersion, VersionError};
