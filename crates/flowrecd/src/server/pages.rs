//! Live page connections, as seen by the broadcaster.
//!
//! Page handlers attach their writer after the handshake and detach it
//! when the socket closes. A context can be known to the coordinator
//! while having no writer here; delivering to it reports
//! `DeliveryError::NoReceiver`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use flowrec_core::ContextId;
use flowrec_protocol::{CoordinatorFrame, CoordinatorMessage, DeliveryError};

use super::connection::{write_message, ClientWriter, ConnectionError};
use crate::broadcast::PageHost;
use crate::coordinator::{CoordinatorHandle, KnownContext};

/// How long a re-injection waits for a dropped page to reconnect.
pub const DEFAULT_REINJECT_WAIT: Duration = Duration::from_secs(2);

struct Attached {
    connection_number: u64,
    writer: ClientWriter,
}

pub struct ConnectedPages {
    coordinator: CoordinatorHandle,
    writers: RwLock<HashMap<ContextId, Attached>>,
    /// Woken whenever a page attaches.
    attached: Notify,
    reinject_wait: Duration,
}

impl ConnectedPages {
    pub fn new(coordinator: CoordinatorHandle, reinject_wait: Duration) -> Self {
        Self {
            coordinator,
            writers: RwLock::new(HashMap::new()),
            attached: Notify::new(),
            reinject_wait,
        }
    }

    /// Makes `writer` the live route to `context_id`, replacing any older
    /// connection of the same context.
    pub async fn attach(&self, context_id: ContextId, connection_number: u64, writer: ClientWriter) {
        let replaced = self.writers.write().await.insert(
            context_id.clone(),
            Attached {
                connection_number,
                writer,
            },
        );
        if replaced.is_some() {
            debug!(context = %context_id, connection = connection_number, "Page reconnected");
        }
        self.attached.notify_waiters();
    }

    /// Removes the route if it still belongs to `connection_number`.
    /// Returns whether it did.
    pub async fn detach(&self, context_id: &ContextId, connection_number: u64) -> bool {
        let mut writers = self.writers.write().await;
        let owned = writers
            .get(context_id)
            .is_some_and(|a| a.connection_number == connection_number);
        if owned {
            writers.remove(context_id);
            debug!(context = %context_id, "Page detached");
        }
        owned
    }

    pub async fn is_attached(&self, context_id: &ContextId) -> bool {
        self.writers.read().await.contains_key(context_id)
    }

    pub async fn attached_count(&self) -> usize {
        self.writers.read().await.len()
    }

    pub async fn clear(&self) {
        self.writers.write().await.clear();
    }
}

#[async_trait]
impl PageHost for ConnectedPages {
    async fn contexts(&self) -> Vec<KnownContext> {
        self.coordinator.list_contexts().await
    }

    async fn deliver(
        &self,
        context: &ContextId,
        message: &CoordinatorMessage,
    ) -> Result<(), DeliveryError> {
        let writer = match self.writers.read().await.get(context) {
            Some(attached) => (attached.connection_number, attached.writer.clone()),
            None => return Err(DeliveryError::NoReceiver),
        };

        let frame = CoordinatorFrame::push(message.clone());
        match write_message(&writer.1, &frame).await {
            Ok(()) => Ok(()),
            Err(ConnectionError::Io(reason)) => {
                debug!(context = %context, reason = %reason, "Page socket is gone");
                self.detach(context, writer.0).await;
                Err(DeliveryError::NoReceiver)
            }
            Err(e) => Err(DeliveryError::Transport(e.to_string())),
        }
    }

    /// Pages reconnect on their own; re-injection waits a bounded time for
    /// that to happen.
    async fn reinject(&self, context: &ContextId) -> Result<(), DeliveryError> {
        let deadline = Instant::now() + self.reinject_wait;
        loop {
            let notified = self.attached.notified();
            if self.is_attached(context).await {
                return Ok(());
            }
            if timeout_at(deadline, notified).await.is_err() {
                return Err(DeliveryError::Reinjection(format!(
                    "{context} did not reconnect within {:?}",
                    self.reinject_wait
                )));
            }
        }
    }
}
