//! UI rendering module for the flowrec viewer.
//!
//! # Layout Structure
//!
//! ```text
//! +--------------------------------------------------+
//! |  Header: Connection, REC indicator, summary      |  <- 3 lines
//! +---------------+----------------------------------+
//! | Step List     |  Detail Panel                    |  <- fills remaining
//! | (30-40%)      |  (rest)                          |
//! | >  1. Start   |  Click "Submit"                  |
//! |    2. Click   |  Type: click   Time: ...         |
//! |    3. Enter   |  URL: https://...                |
//! +---------------+----------------------------------+
//! |  Footer: Keybinding Hints / Notification         |  <- 3 lines
//! +--------------------------------------------------+
//! ```

pub mod detail_panel;
pub mod layout;
pub mod status_bar;
pub mod step_list;
pub mod theme;

use crate::app::App;
use layout::AppLayout;
use ratatui::Frame;

pub use detail_panel::render_detail_panel_inline;
pub use status_bar::{render_footer, render_header};
pub use step_list::render_step_list;

/// Renders the complete viewer interface.
///
/// # Example
///
/// ```ignore
/// terminal.draw(|frame| {
///     ui::render(frame, &app);
/// })?;
/// ```
pub fn render(frame: &mut Frame, app: &App) {
    let layout = AppLayout::new(frame.area());

    render_header(frame, layout.header, app);
    render_footer(frame, layout.footer, app);

    render_step_list(frame, layout.list_area, app);
    render_detail_panel_inline(frame, layout.detail_area, app.selected_step());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{App, AppState, NotificationLevel};
    use flowrec_core::{ActionKind, ActionRecord, CaptureStamp, ContextId, LogEntry, PageIdentity};
    use ratatui::{backend::TestBackend, Terminal};

    fn entry(stamp: i64, caption: &str) -> LogEntry {
        LogEntry::new(
            ActionRecord::new(
                ActionKind::Click,
                caption,
                "Element: button\nURL: https://app.example/",
                CaptureStamp::from_millis(stamp),
                &PageIdentity::new("https://app.example/", "App"),
            ),
            ContextId::new("tab-1"),
            CaptureStamp::from_millis(stamp),
        )
    }

    fn screen_text(app: &App) -> String {
        let backend = TestBackend::new(80, 24);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();

        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_render_empty_state() {
        let app = App::new();
        let text = screen_text(&app);
        assert!(text.contains("Connecting"));
    }

    #[test]
    fn test_render_recording_with_steps() {
        let mut app = App::new();
        app.state = AppState::Connected;
        app.apply_status(true, Some(CaptureStamp::from_millis(0)));
        app.apply_log(&[entry(1, "Click \"Submit\""), entry(2, "Click \"Next\"")]);

        let text = screen_text(&app);
        assert!(text.contains("Steps (3)"));
        assert!(text.contains("REC"));
        // Newest step is selected and shown in the detail panel.
        assert!(text.contains("Step 3"));
    }

    #[test]
    fn test_render_summary_after_stop() {
        let mut app = App::new();
        app.state = AppState::Connected;
        app.apply_status(true, Some(CaptureStamp::from_millis(0)));
        app.apply_status(false, None);

        let text = screen_text(&app);
        assert!(text.contains("2 steps"));
        assert!(!text.contains("REC"));
    }

    #[test]
    fn test_render_notification_replaces_hints() {
        let mut app = App::new();
        app.state = AppState::Connected;
        app.notify(NotificationLevel::Error, "Nothing to export");

        let text = screen_text(&app);
        assert!(text.contains("Nothing to export"));
        assert!(!text.contains("quit"));
    }

    #[test]
    fn test_render_disconnected_state() {
        let mut app = App::new();
        app.mark_disconnected();

        let text = screen_text(&app);
        assert!(text.contains("Disconnected"));
    }
}
