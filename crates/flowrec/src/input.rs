//! Keyboard input handling for the flowrec viewer.
//!
//! This module provides the event types that drive the main loop, the
//! commands the loop sends to the coordinator client, and the key map.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

use crate::app::App;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use flowrec_core::{CaptureStamp, LogEntry};

// ============================================================================
// Event Types
// ============================================================================

/// Events that the viewer can receive and process.
#[derive(Debug, Clone)]
pub enum Event {
    /// Keyboard input from the user.
    Key(KeyEvent),

    /// Terminal window resize event.
    Resize(u16, u16),

    /// Handshake finished; carries the coordinator's current state.
    Connected {
        active: bool,
        started_at: Option<CaptureStamp>,
    },

    /// Recording flag as reported by the coordinator.
    Status {
        active: bool,
        started_at: Option<CaptureStamp>,
    },

    /// Full session log from a poll.
    Log(Vec<LogEntry>),

    /// The coordinator emptied its log.
    LogCleared,

    /// The coordinator refused a command; the connection is still up.
    CommandFailed(String),

    /// Connection to the coordinator was lost.
    DaemonDisconnected,
}

// ============================================================================
// Client Commands
// ============================================================================

/// Commands the main loop sends to the coordinator client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    Start,
    Stop,
    PollLog,
    Clear,
    Status,
}

// ============================================================================
// Action Types
// ============================================================================

/// What the main loop should do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    /// Forward a command to the coordinator client.
    Send(ClientCommand),
    ExportTabular,
    ExportDocument,
}

// ============================================================================
// Input Handler
// ============================================================================

/// Handles a keyboard event and updates application state accordingly.
///
/// # Key Bindings
///
/// | Key              | Action                             |
/// |------------------|------------------------------------|
/// | `q`, `Esc`, `^C` | Quit                               |
/// | `s`              | Start or stop recording            |
/// | `j`, `Down`      | Select the next step               |
/// | `k`, `Up`        | Select the previous step           |
/// | `d`, `Delete`    | Delete the selected step           |
/// | `c`              | Clear all steps and the session log|
/// | `e`              | Export CSV                         |
/// | `x`              | Export document                    |
#[must_use]
pub fn handle_key_event(key: KeyEvent, app: &mut App) -> Action {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        app.quit();
        return Action::Quit;
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
            app.quit();
            Action::Quit
        }

        KeyCode::Char('s') | KeyCode::Char('S') => {
            if app.recording {
                Action::Send(ClientCommand::Stop)
            } else {
                Action::Send(ClientCommand::Start)
            }
        }

        KeyCode::Char('j') | KeyCode::Down => {
            app.select_next();
            Action::None
        }

        KeyCode::Char('k') | KeyCode::Up => {
            app.select_previous();
            Action::None
        }

        KeyCode::Char('d') | KeyCode::Delete => {
            app.delete_selected();
            Action::None
        }

        KeyCode::Char('c') => {
            app.clear_steps();
            Action::Send(ClientCommand::Clear)
        }

        KeyCode::Char('e') => Action::ExportTabular,
        KeyCode::Char('x') => Action::ExportDocument,

        _ => Action::None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use flowrec_core::{ActionKind, ActionRecord, PageIdentity};

    fn key_event(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn recording_app(captions: &[&str]) -> App {
        let mut app = App::new();
        app.apply_status(true, Some(CaptureStamp::from_millis(0)));
        for (i, caption) in captions.iter().enumerate() {
            app.steps.push(ActionRecord::new(
                ActionKind::Click,
                *caption,
                "URL: https://app.example/",
                CaptureStamp::from_millis(i as i64 + 1),
                &PageIdentity::new("https://app.example/", "App"),
            ));
        }
        app
    }

    #[test]
    fn test_q_quits() {
        let mut app = App::new();
        assert_eq!(handle_key_event(key_event(KeyCode::Char('q')), &mut app), Action::Quit);
        assert!(app.should_quit);
    }

    #[test]
    fn test_escape_quits() {
        let mut app = App::new();
        assert_eq!(handle_key_event(key_event(KeyCode::Esc), &mut app), Action::Quit);
    }

    #[test]
    fn test_ctrl_c_quits() {
        let mut app = App::new();
        let action = handle_key_event(
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
            &mut app,
        );
        assert_eq!(action, Action::Quit);
        assert!(app.should_quit);
    }

    #[test]
    fn test_s_toggles_by_recording_state() {
        let mut app = App::new();
        assert_eq!(
            handle_key_event(key_event(KeyCode::Char('s')), &mut app),
            Action::Send(ClientCommand::Start)
        );

        app.apply_status(true, None);
        assert_eq!(
            handle_key_event(key_event(KeyCode::Char('s')), &mut app),
            Action::Send(ClientCommand::Stop)
        );
    }

    #[test]
    fn test_navigation_keys() {
        let mut app = recording_app(&["a", "b"]);
        assert_eq!(app.selected_index, 0);

        let _ = handle_key_event(key_event(KeyCode::Char('j')), &mut app);
        assert_eq!(app.selected_index, 1);
        let _ = handle_key_event(key_event(KeyCode::Down), &mut app);
        assert_eq!(app.selected_index, 2);
        let _ = handle_key_event(key_event(KeyCode::Up), &mut app);
        assert_eq!(app.selected_index, 1);
        let _ = handle_key_event(key_event(KeyCode::Char('k')), &mut app);
        assert_eq!(app.selected_index, 0);
    }

    #[test]
    fn test_delete_key_removes_selected_step() {
        let mut app = recording_app(&["a", "b"]);
        app.selected_index = 1;

        let action = handle_key_event(key_event(KeyCode::Delete), &mut app);
        assert_eq!(action, Action::None);
        assert_eq!(app.steps.len(), 2);
        assert_eq!(app.steps.get(1).map(|s| s.caption()), Some("b"));
    }

    #[test]
    fn test_c_clears_and_forwards() {
        let mut app = recording_app(&["a"]);
        let action = handle_key_event(key_event(KeyCode::Char('c')), &mut app);
        assert_eq!(action, Action::Send(ClientCommand::Clear));
        assert!(app.steps.is_empty());
    }

    #[test]
    fn test_export_keys() {
        let mut app = App::new();
        assert_eq!(
            handle_key_event(key_event(KeyCode::Char('e')), &mut app),
            Action::ExportTabular
        );
        assert_eq!(
            handle_key_event(key_event(KeyCode::Char('x')), &mut app),
            Action::ExportDocument
        );
    }

    #[test]
    fn test_unhandled_key_returns_none() {
        let mut app = App::new();
        assert_eq!(handle_key_event(key_event(KeyCode::F(1)), &mut app), Action::None);
        assert!(!app.should_quit);
    }
}
