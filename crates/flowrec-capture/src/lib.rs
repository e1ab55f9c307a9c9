//! flowrec capture - per-page action capture
//!
//! Each open page runs one [`PageContext`]: raw DOM events come in,
//! the [`Classifier`] filters and debounces them into action records, and
//! the [`CaptureTransport`] hands those to the coordinator with a bounded
//! retry.

pub mod classifier;
pub mod context;
pub mod debounce;
pub mod error;
pub mod keys;
pub mod scroll;
pub mod socket;
pub mod transport;

pub use classifier::{Classifier, DebounceKey, Emission, RecordingState};
pub use context::PageContext;
pub use debounce::{Debouncer, Fire};
pub use error::{CaptureError, CaptureResult};
pub use keys::KeyPress;
pub use scroll::{ScrollDirection, ScrollMove, ScrollTracker};
pub use socket::SocketLink;
pub use transport::{CaptureTransport, ControlSignal, CoordinatorLink};
