//! Header and footer status bar widgets for the flowrec viewer.
//!
//! The status bar provides:
//! - Header: title, connection state, recording indicator and session summary
//! - Footer: keybinding hints, replaced by the current notification if any

use crate::app::{App, AppState};
use crate::ui::theme::{notification_color, recording_indicator};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

/// Renders the header bar.
///
/// While recording it shows a blinking REC indicator and the elapsed step
/// count; after a stop it shows the session summary.
pub fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let (status_text, status_style) = get_status_display(&app.state);

    let mut spans = vec![
        Span::styled(
            "flowrec",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" - Workflow Recorder | "),
        Span::styled(status_text, status_style),
    ];

    if app.recording {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            recording_indicator(app.blink_visible),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::styled(
            format!(" {} step{}", app.steps.len(), plural(app.steps.len())),
            Style::default().fg(Color::DarkGray),
        ));
    } else if let Some(summary) = &app.summary {
        spans.push(Span::styled(
            format!(" | {}", summary.display()),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let border_style = match app.state {
        AppState::Connected => Style::default().fg(Color::Green),
        AppState::Connecting => Style::default().fg(Color::Yellow),
        AppState::Disconnected { .. } => Style::default().fg(Color::Red),
    };

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style),
    );

    frame.render_widget(header, area);
}

/// Renders the footer bar with keybinding hints or the active notification.
pub fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let footer_line = match &app.notification {
        Some(notification) => Line::from(Span::styled(
            format!(" {}", notification.message),
            Style::default()
                .fg(notification_color(notification.level))
                .add_modifier(Modifier::BOLD),
        )),
        None => Line::from(key_hints(app.recording)),
    };

    let footer = Paragraph::new(footer_line).block(Block::default().borders(Borders::ALL));

    frame.render_widget(footer, area);
}

fn key_hints(recording: bool) -> Vec<Span<'static>> {
    let key_style = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let sep_style = Style::default().fg(Color::DarkGray);

    let mut hints = vec![
        Span::styled(" s", key_style),
        Span::raw(if recording { " stop" } else { " start" }),
        Span::styled("  |  ", sep_style),
        Span::styled("^/k", key_style),
        Span::raw(" up"),
        Span::styled("  ", sep_style),
        Span::styled("v/j", key_style),
        Span::raw(" down"),
        Span::styled("  |  ", sep_style),
        Span::styled("d", key_style),
        Span::raw(" delete"),
        Span::styled("  ", sep_style),
        Span::styled("c", key_style),
        Span::raw(" clear"),
    ];

    // Exports are offered once the session is over.
    if !recording {
        hints.push(Span::styled("  |  ", sep_style));
        hints.push(Span::styled("e", key_style));
        hints.push(Span::raw(" csv"));
        hints.push(Span::styled("  ", sep_style));
        hints.push(Span::styled("x", key_style));
        hints.push(Span::raw(" doc"));
    }

    hints.push(Span::styled("  |  ", sep_style));
    hints.push(Span::styled("q", key_style));
    hints.push(Span::raw(" quit"));
    hints
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Returns the display text and style for the given connection state.
fn get_status_display(state: &AppState) -> (&'static str, Style) {
    match state {
        AppState::Connected => (
            "Connected",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
        AppState::Connecting => (
            "Connecting...",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        AppState::Disconnected { retry_count, .. } => {
            if *retry_count > 3 {
                (
                    "Disconnected (retrying...)",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )
            } else {
                (
                    "Disconnected",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )
            }
        }
    }
}
