//! Coordinator actor - owns the recording flag, the session log and the
//! set of known page contexts.
//!
//! It is the only writer of the session log. Commands are processed one at
//! a time from an mpsc channel and every state change is published on a
//! broadcast channel.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Response send failures are ignored (the caller went away)

use std::collections::BTreeMap;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use flowrec_core::{
    ActionRecord, AppendOutcome, CaptureStamp, ContextId, LogEntry, MonotonicClock, PageIdentity,
    SessionLog,
};

use super::commands::{
    CoordinatorCommand, CoordinatorError, CoordinatorEvent, KnownContext, RecordOutcome,
    RecordingStatus,
};

/// Maximum number of page contexts tracked at once.
pub const MAX_CONTEXTS: usize = 100;

pub struct CoordinatorActor {
    receiver: mpsc::Receiver<CoordinatorCommand>,
    event_publisher: broadcast::Sender<CoordinatorEvent>,

    active: bool,
    started_at: Option<CaptureStamp>,
    log: SessionLog,

    /// Known page contexts. Disconnected contexts stay until forgotten.
    contexts: BTreeMap<ContextId, PageIdentity>,

    /// Issues server timestamps.
    clock: MonotonicClock,
}

impl CoordinatorActor {
    /// Creates an idle actor with an empty log of `capacity` entries.
    pub fn new(
        receiver: mpsc::Receiver<CoordinatorCommand>,
        event_publisher: broadcast::Sender<CoordinatorEvent>,
        capacity: usize,
    ) -> Self {
        Self {
            receiver,
            event_publisher,
            active: false,
            started_at: None,
            log: SessionLog::new(capacity),
            contexts: BTreeMap::new(),
            clock: MonotonicClock::new(),
        }
    }

    /// Seeds the log with entries persisted by a previous run. The actor
    /// stays idle; the clock moves past the restored server timestamps.
    #[must_use]
    pub fn with_restored(mut self, entries: Vec<LogEntry>) -> Self {
        let capacity = self.log.capacity();
        self.log = SessionLog::from_entries(entries, capacity);
        if let Some(latest) = self.log.latest_server_timestamp() {
            self.clock.observe(latest);
        }
        info!(entries = self.log.len(), "Restored session log");
        self
    }

    /// Processes commands until every sender is dropped.
    pub async fn run(mut self) {
        info!("Coordinator actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(entries = self.log.len(), "Coordinator actor stopped");
    }

    fn handle_command(&mut self, cmd: CoordinatorCommand) {
        match cmd {
            CoordinatorCommand::Start { respond_to } => {
                let _ = respond_to.send(self.handle_start());
            }
            CoordinatorCommand::Stop { respond_to } => {
                let _ = respond_to.send(self.handle_stop());
            }
            CoordinatorCommand::Record {
                action,
                origin,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_record(*action, origin));
            }
            CoordinatorCommand::Status { respond_to } => {
                let _ = respond_to.send(self.status());
            }
            CoordinatorCommand::GetLog { respond_to } => {
                let _ = respond_to.send(self.log.to_vec());
            }
            CoordinatorCommand::Clear { respond_to } => {
                self.handle_clear();
                let _ = respond_to.send(());
            }
            CoordinatorCommand::RegisterContext {
                context_id,
                page,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_register_context(context_id, page));
            }
            CoordinatorCommand::UpdateContext {
                context_id,
                page,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_update_context(context_id, page));
            }
            CoordinatorCommand::ForgetContext {
                context_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_forget_context(context_id));
            }
            CoordinatorCommand::ListContexts { respond_to } => {
                let contexts = self
                    .contexts
                    .iter()
                    .map(|(id, page)| KnownContext {
                        id: id.clone(),
                        page: page.clone(),
                    })
                    .collect();
                let _ = respond_to.send(contexts);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn status(&self) -> RecordingStatus {
        RecordingStatus {
            active: self.active,
            started_at: self.started_at,
        }
    }

    fn handle_start(&mut self) -> RecordingStatus {
        let started_at = self.clock.stamp();
        let discarded = self.log.len();
        self.active = true;
        self.started_at = Some(started_at);
        self.log.clear();

        info!(discarded, "Recording started");
        self.publish(CoordinatorEvent::RecordingStarted { started_at });
        self.status()
    }

    fn handle_stop(&mut self) -> RecordingStatus {
        if self.active {
            self.active = false;
            info!(entries = self.log.len(), "Recording stopped");
            self.publish(CoordinatorEvent::RecordingStopped);
        } else {
            debug!("Stop requested while idle");
        }
        self.status()
    }

    fn handle_record(&mut self, action: ActionRecord, origin: ContextId) -> RecordOutcome {
        if !self.active {
            debug!(origin = %origin, kind = %action.kind(), "Ignoring action while idle");
            return RecordOutcome::Ignored;
        }

        let entry = LogEntry::new(action, origin, self.clock.stamp());
        match self.log.append(entry.clone()) {
            AppendOutcome::Appended { evicted } => {
                if evicted > 0 {
                    debug!(evicted, capacity = self.log.capacity(), "Evicted oldest log entries");
                }
                debug!(
                    origin = %entry.origin,
                    kind = %entry.action.kind(),
                    server_timestamp = entry.server_timestamp.as_millis(),
                    "Action recorded"
                );
                self.publish(CoordinatorEvent::ActionRecorded {
                    entry: Box::new(entry),
                });
                RecordOutcome::Accepted { evicted }
            }
            AppendOutcome::Duplicate => {
                debug!(origin = %entry.origin, "Duplicate action ignored");
                RecordOutcome::Duplicate
            }
        }
    }

    fn handle_clear(&mut self) {
        self.log.clear();
        info!("Session log cleared");
        self.publish(CoordinatorEvent::LogCleared);
    }

    fn handle_register_context(
        &mut self,
        context_id: ContextId,
        page: PageIdentity,
    ) -> Result<(), CoordinatorError> {
        if !self.contexts.contains_key(&context_id) && self.contexts.len() >= MAX_CONTEXTS {
            warn!(context = %context_id, max = MAX_CONTEXTS, "Too many page contexts");
            return Err(CoordinatorError::TooManyContexts { max: MAX_CONTEXTS });
        }
        debug!(context = %context_id, url = %page.url, "Page context registered");
        self.contexts.insert(context_id.clone(), page);
        self.publish(CoordinatorEvent::ContextRegistered { context_id });
        Ok(())
    }

    fn handle_update_context(
        &mut self,
        context_id: ContextId,
        page: PageIdentity,
    ) -> Result<(), CoordinatorError> {
        match self.contexts.get_mut(&context_id) {
            Some(existing) => {
                *existing = page;
                Ok(())
            }
            None => Err(CoordinatorError::UnknownContext(context_id)),
        }
    }

    fn handle_forget_context(&mut self, context_id: ContextId) -> Result<(), CoordinatorError> {
        if self.contexts.remove(&context_id).is_none() {
            return Err(CoordinatorError::UnknownContext(context_id));
        }
        debug!(context = %context_id, "Page context forgotten");
        self.publish(CoordinatorEvent::ContextForgotten { context_id });
        Ok(())
    }

    fn publish(&self, event: CoordinatorEvent) {
        // No subscribers is fine.
        let _ = self.event_publisher.send(event);
    }

    /// Number of entries in the log.
    pub fn log_len(&self) -> usize {
        self.log.len()
    }
}
