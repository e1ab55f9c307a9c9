//! Application state for the flowrec viewer.
//!
//! Holds the connection state, the recording flag as last reported by the
//! coordinator, the working set of steps and the reconciler that feeds it.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use flowrec_core::{CaptureStamp, LogEntry, MonotonicClock};
use tracing::{debug, info, warn};

use crate::error::ExportError;
use crate::export::{
    export_tabular, DocumentModel, DocumentSerializer, ImageEmbedder,
};
use crate::reconciler::Reconciler;
use crate::save::{document_file_name, tabular_file_name, FileSaver};
use crate::session::SessionSummary;
use crate::steps::{Step, StepList};

/// How long a notification stays in the status bar by default.
pub const DEFAULT_NOTIFICATION_TTL: Duration = Duration::from_secs(4);

// ============================================================================
// Application State
// ============================================================================

/// Connection state of the viewer to the coordinator.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AppState {
    /// Connected and receiving replies.
    Connected,

    /// Lost connection, attempting reconnect.
    Disconnected {
        since: DateTime<Utc>,
        retry_count: u32,
    },

    /// Initial connection in progress.
    #[default]
    Connecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// A timed status-bar message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    expires_at: Instant,
}

// ============================================================================
// Application
// ============================================================================

#[derive(Debug)]
pub struct App {
    pub state: AppState,

    /// Whether the coordinator last reported an active session.
    pub recording: bool,

    pub steps: StepList,

    pub reconciler: Reconciler,

    /// Index of the selected step.
    pub selected_index: usize,

    pub should_quit: bool,

    /// Shown once a session stops, cleared when the next one starts.
    pub summary: Option<SessionSummary>,

    pub notification: Option<Notification>,

    notification_ttl: Duration,

    /// Stamps the synthetic start/stop steps.
    clock: MonotonicClock,

    /// Whether the blinking recording indicator is visible.
    /// Toggles every 500ms (5 ticks at 100ms tick rate).
    pub blink_visible: bool,

    tick_count: u32,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// Creates a new App in the Connecting state.
    pub fn new() -> Self {
        Self {
            state: AppState::Connecting,
            recording: false,
            steps: StepList::new(),
            reconciler: Reconciler::new(),
            selected_index: 0,
            should_quit: false,
            summary: None,
            notification: None,
            notification_ttl: DEFAULT_NOTIFICATION_TTL,
            clock: MonotonicClock::new(),
            blink_visible: true,
            tick_count: 0,
        }
    }

    #[must_use]
    pub fn with_notification_ttl(mut self, ttl: Duration) -> Self {
        self.notification_ttl = ttl;
        self
    }

    // ------------------------------------------------------------------------
    // Coordinator events
    // ------------------------------------------------------------------------

    pub fn mark_connected(&mut self) {
        self.state = AppState::Connected;
    }

    /// Marks the connection as disconnected and increments retry count.
    pub fn mark_disconnected(&mut self) {
        match &self.state {
            AppState::Disconnected { since, retry_count } => {
                self.state = AppState::Disconnected {
                    since: *since,
                    retry_count: retry_count.saturating_add(1),
                };
            }
            AppState::Connected | AppState::Connecting => {
                self.state = AppState::Disconnected {
                    since: Utc::now(),
                    retry_count: 1,
                };
            }
        }
    }

    /// Reconciles the local recording flag with the coordinator's.
    ///
    /// An inactive-to-active change begins a fresh working set headed by
    /// the synthetic start step; active-to-inactive appends the stop step
    /// and computes the summary.
    pub fn apply_status(&mut self, active: bool, started_at: Option<CaptureStamp>) {
        match (self.recording, active) {
            (false, true) => self.begin_session(started_at),
            (true, false) => self.end_session(),
            _ => {}
        }
    }

    fn begin_session(&mut self, started_at: Option<CaptureStamp>) {
        let at = started_at.unwrap_or_else(|| self.clock.stamp());
        self.clock.observe(at);

        self.recording = true;
        self.steps.clear();
        self.reconciler.reset();
        self.summary = None;
        self.steps.push_start(at);
        self.selected_index = 0;
        info!(started_at = %at, "Recording started");
    }

    fn end_session(&mut self) {
        if let Some(last) = self.steps.as_slice().last() {
            self.clock.observe(last.timestamp());
        }
        self.recording = false;
        self.steps.push_stop(self.clock.stamp());
        let summary = SessionSummary::of(&self.steps);
        info!(steps = summary.step_count, duration_secs = summary.duration_secs, "Recording stopped");
        self.summary = Some(summary);
    }

    /// Materializes new log entries while a session is active.
    pub fn apply_log(&mut self, entries: &[LogEntry]) -> usize {
        if !self.recording {
            debug!("Ignoring log while idle");
            return 0;
        }
        let added = self.reconciler.apply(entries, &mut self.steps);
        if added > 0 {
            self.selected_index = self.steps.len().saturating_sub(1);
        }
        added
    }

    // ------------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------------

    /// Deletes the selected step; synthetic steps are refused with a
    /// notification.
    pub fn delete_selected(&mut self) {
        let Some(number) = self.selected_step().map(Step::number) else {
            return;
        };
        match self.steps.delete(number) {
            Ok(step) => {
                debug!(number, caption = %step.caption(), "Step deleted");
                self.clamp_selection();
            }
            Err(e) => self.notify(NotificationLevel::Error, e.to_string()),
        }
    }

    /// Drops every local step. The coordinator's log is cleared separately.
    pub fn clear_steps(&mut self) {
        self.steps.clear();
        self.summary = None;
        self.selected_index = 0;
    }

    // ------------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------------

    /// Writes the CSV export and reports the outcome in the status bar.
    ///
    /// # Errors
    ///
    /// `ExportError::Empty` without steps; otherwise encoding or write
    /// failures.
    pub fn export_tabular(
        &mut self,
        saver: &dyn FileSaver,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, ExportError> {
        let result = self.nonempty().and_then(|steps| {
            let text = export_tabular(steps)?;
            saver.save(&tabular_file_name(now), text.as_bytes())
        });
        self.report_export("CSV", &result);
        result
    }

    /// Writes the structured document and reports the outcome.
    ///
    /// # Errors
    ///
    /// `ExportError::Empty` without steps; otherwise encoding or write
    /// failures. A screenshot that cannot be embedded is not an error.
    pub fn export_document(
        &mut self,
        saver: &dyn FileSaver,
        serializer: &dyn DocumentSerializer,
        embedder: &dyn ImageEmbedder,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, ExportError> {
        let summary = SessionSummary::of(&self.steps);
        let result = self.nonempty().and_then(|steps| {
            let document = DocumentModel::build(steps, &summary, embedder, now);
            let bytes = serializer.serialize(&document)?;
            saver.save(&document_file_name(now, serializer.extension()), &bytes)
        });
        self.report_export("Document", &result);
        result
    }

    fn nonempty(&self) -> Result<&[Step], ExportError> {
        if self.steps.is_empty() {
            Err(ExportError::Empty)
        } else {
            Ok(self.steps.as_slice())
        }
    }

    fn report_export(&mut self, what: &str, result: &Result<PathBuf, ExportError>) {
        match result {
            Ok(path) => {
                self.notify(
                    NotificationLevel::Info,
                    format!("{what} exported to {}", path.display()),
                );
            }
            Err(e) => {
                warn!(error = %e, format = what, "Export failed");
                self.notify(NotificationLevel::Error, format!("{what} export failed: {e}"));
            }
        }
    }

    // ------------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------------

    pub fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        self.notification = Some(Notification {
            message: message.into(),
            level,
            expires_at: Instant::now() + self.notification_ttl,
        });
    }

    /// Drops the notification once it has expired.
    pub fn expire_notification(&mut self, now: Instant) {
        if self
            .notification
            .as_ref()
            .is_some_and(|n| now >= n.expires_at)
        {
            self.notification = None;
        }
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    pub fn selected_step(&self) -> Option<&Step> {
        self.steps.get(self.selected_index)
    }

    fn clamp_selection(&mut self) {
        let count = self.steps.len();
        if count == 0 {
            self.selected_index = 0;
        } else if self.selected_index >= count {
            self.selected_index = count.saturating_sub(1);
        }
    }

    /// Navigates to the next step, wrapping around if needed.
    pub fn select_next(&mut self) {
        let count = self.steps.len();
        if count == 0 {
            self.selected_index = 0;
            return;
        }
        self.selected_index = (self.selected_index.saturating_add(1)) % count;
    }

    /// Navigates to the previous step, wrapping around if needed.
    pub fn select_previous(&mut self) {
        let count = self.steps.len();
        if count == 0 {
            self.selected_index = 0;
            return;
        }
        if self.selected_index == 0 {
            self.selected_index = count.saturating_sub(1);
        } else {
            self.selected_index = self.selected_index.saturating_sub(1);
        }
    }

    // ------------------------------------------------------------------------
    // Loop housekeeping
    // ------------------------------------------------------------------------

    /// Advances the blink animation and expires notifications.
    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);
        if self.tick_count % 5 == 0 {
            self.blink_visible = !self.blink_visible;
        }
        self.expire_notification(Instant::now());
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{DecodingEmbedder, JsonDocumentSerializer};
    use crate::save::DirectorySaver;
    use flowrec_core::{ActionKind, ActionRecord, ContextId, PageIdentity};

    fn entry(server: i64, caption: &str) -> LogEntry {
        LogEntry::new(
            ActionRecord::new(
                ActionKind::Click,
                caption,
                "URL: https://app.example/",
                CaptureStamp::from_millis(server),
                &PageIdentity::new("https://app.example/", "App"),
            ),
            ContextId::new("tab-1"),
            CaptureStamp::from_millis(server),
        )
    }

    fn captions(app: &App) -> Vec<String> {
        app.steps.iter().map(|s| s.caption().to_string()).collect()
    }

    #[test]
    fn test_app_new_is_connecting_and_idle() {
        let app = App::new();
        assert_eq!(app.state, AppState::Connecting);
        assert!(!app.recording);
        assert!(app.steps.is_empty());
        assert!(!app.should_quit);
    }

    #[test]
    fn test_session_lifecycle_adds_bookkeeping_steps() {
        let mut app = App::new();
        app.apply_status(true, Some(CaptureStamp::from_millis(1_000)));
        app.apply_log(&[entry(2_000, "Click \"Submit\"")]);
        app.apply_status(false, None);

        assert_eq!(
            captions(&app),
            vec!["Start Recording", "Click \"Submit\"", "Stop Recording"]
        );
        let summary = app.summary.as_ref().unwrap();
        assert_eq!(summary.step_count, 3);
        assert!(summary.duration_secs >= 1);
    }

    #[test]
    fn test_repeated_status_is_idempotent() {
        let mut app = App::new();
        app.apply_status(true, None);
        app.apply_status(true, None);
        assert_eq!(app.steps.len(), 1);

        app.apply_status(false, None);
        app.apply_status(false, None);
        assert_eq!(app.steps.len(), 2);
    }

    #[test]
    fn test_new_session_replaces_working_set() {
        let mut app = App::new();
        app.apply_status(true, None);
        app.apply_log(&[entry(5, "old")]);
        app.apply_status(false, None);

        app.apply_status(true, None);
        assert_eq!(captions(&app), vec!["Start Recording"]);
        assert!(app.summary.is_none());
        // Watermark was reset with the new session.
        assert_eq!(app.apply_log(&[entry(5, "replayed")]), 1);
    }

    #[test]
    fn test_log_ignored_while_idle() {
        let mut app = App::new();
        assert_eq!(app.apply_log(&[entry(1, "a")]), 0);
        assert!(app.steps.is_empty());
    }

    #[test]
    fn test_polling_twice_adds_no_duplicates() {
        let mut app = App::new();
        app.apply_status(true, None);
        let log = vec![entry(1, "a"), entry(2, "b")];
        app.apply_log(&log);
        app.apply_log(&log);
        assert_eq!(app.steps.len(), 3);
    }

    #[test]
    fn test_delete_selected_refuses_start_step() {
        let mut app = App::new();
        app.apply_status(true, None);
        app.selected_index = 0;
        app.delete_selected();

        assert_eq!(app.steps.len(), 1);
        let notification = app.notification.as_ref().unwrap();
        assert_eq!(notification.level, NotificationLevel::Error);
    }

    #[test]
    fn test_delete_last_clamps_selection() {
        let mut app = App::new();
        app.apply_status(true, None);
        app.apply_log(&[entry(1, "a"), entry(2, "b")]);
        assert_eq!(app.selected_index, 2);

        app.delete_selected();
        assert_eq!(app.selected_index, 1);
        assert_eq!(captions(&app), vec!["Start Recording", "a"]);
    }

    #[test]
    fn test_select_wraps_around() {
        let mut app = App::new();
        app.apply_status(true, None);
        app.apply_log(&[entry(1, "a")]);
        app.selected_index = 1;

        app.select_next();
        assert_eq!(app.selected_index, 0);
        app.select_previous();
        assert_eq!(app.selected_index, 1);
    }

    #[test]
    fn test_select_on_empty() {
        let mut app = App::new();
        app.select_next();
        app.select_previous();
        assert_eq!(app.selected_index, 0);
        assert!(app.selected_step().is_none());
    }

    #[test]
    fn test_mark_disconnected_increments_retry() {
        let mut app = App::new();
        app.mark_disconnected();
        app.mark_disconnected();
        match &app.state {
            AppState::Disconnected { retry_count, .. } => assert_eq!(*retry_count, 2),
            other => panic!("Expected Disconnected, got {other:?}"),
        }
        app.mark_connected();
        assert_eq!(app.state, AppState::Connected);
    }

    #[test]
    fn test_export_empty_is_refused_with_notification() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = App::new();

        let result = app.export_tabular(&DirectorySaver::new(dir.path()), Utc::now());
        assert!(matches!(result, Err(ExportError::Empty)));
        assert_eq!(
            app.notification.as_ref().map(|n| n.level),
            Some(NotificationLevel::Error)
        );
    }

    #[test]
    fn test_exports_write_files() {
        let dir = tempfile::tempdir().unwrap();
        let saver = DirectorySaver::new(dir.path());
        let now = CaptureStamp::from_millis(1_705_312_800_000).to_datetime();

        let mut app = App::new();
        app.apply_status(true, None);
        app.apply_log(&[entry(1, "a")]);
        app.apply_status(false, None);

        let csv = app.export_tabular(&saver, now).unwrap();
        assert_eq!(csv, dir.path().join("action-recording-2024-01-15.csv"));
        assert_eq!(
            app.notification.as_ref().map(|n| n.level),
            Some(NotificationLevel::Info)
        );

        let doc = app
            .export_document(&saver, &JsonDocumentSerializer, &DecodingEmbedder, now)
            .unwrap();
        assert_eq!(doc, dir.path().join("workflow-1705312800000.json"));
    }

    #[test]
    fn test_notification_expires() {
        let mut app = App::new().with_notification_ttl(Duration::from_millis(10));
        app.notify(NotificationLevel::Info, "hello");

        app.expire_notification(Instant::now());
        assert!(app.notification.is_some());

        app.expire_notification(Instant::now() + Duration::from_millis(20));
        assert!(app.notification.is_none());
    }

    #[test]
    fn test_tick_blink_timing() {
        let mut app = App::new();
        for _ in 0..4 {
            app.tick();
            assert!(app.blink_visible);
        }
        app.tick();
        assert!(!app.blink_visible);
    }
}
