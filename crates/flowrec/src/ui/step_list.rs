//! Step list widget for the flowrec viewer.
//!
//! Displays the working set of steps, numbered and captioned, and keeps
//! the selected step scrolled into view.

use crate::app::{App, AppState};
use crate::steps::Step;
use crate::ui::theme::{kind_color, step_background};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

/// Renders the step list in the left panel.
///
/// Each row shows `> [number]. [icon] [caption]`. When there are no steps,
/// displays a context-sensitive empty state message instead.
pub fn render_step_list(frame: &mut Frame, area: Rect, app: &App) {
    if app.steps.is_empty() {
        render_empty_state(frame, area, app);
        return;
    }

    // Borders plus the selection marker, number and icon columns.
    let caption_width = usize::from(area.width).saturating_sub(10);

    let items: Vec<ListItem> = app
        .steps
        .iter()
        .enumerate()
        .map(|(idx, step)| create_step_item(step, idx == app.selected_index, caption_width))
        .collect();

    let title = format!(" Steps ({}) ", app.steps.len());

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(Style::default().fg(Color::White)),
    );

    let mut state = ListState::default().with_selected(Some(app.selected_index));
    frame.render_stateful_widget(list, area, &mut state);
}

fn create_step_item(step: &Step, is_selected: bool, caption_width: usize) -> ListItem<'static> {
    let color = kind_color(step.kind());

    let spans = vec![
        Span::styled(
            if is_selected { ">" } else { " " },
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("{:>3}. ", step.number()),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(format!("{} ", step.icon())),
        Span::styled(
            truncate_string(&single_line(step.caption()), caption_width),
            Style::default().fg(color),
        ),
    ];

    let style = match step_background(step.kind(), is_selected) {
        Some(bg) => Style::default().bg(bg),
        None => Style::default(),
    };

    ListItem::new(Line::from(spans)).style(style)
}

/// Captions may carry typed newlines; a list row shows them as spaces.
fn single_line(s: &str) -> String {
    s.replace(['\n', '\r'], " ")
}

/// Truncates a string to the specified maximum display width.
///
/// If truncated, appends "..." to indicate truncation.
/// Counts chars, not bytes, so multi-byte characters are never split.
fn truncate_string(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

/// Renders the empty state when there are no steps.
///
/// Shows different messages based on connection and recording state.
fn render_empty_state(frame: &mut Frame, area: Rect, app: &App) {
    let hint_style = Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::ITALIC);

    let (title, lines) = match &app.state {
        AppState::Connected if app.recording => (
            " Recording ",
            vec![
                Line::from(""),
                Line::from(Span::styled(
                    "Waiting for the first action...",
                    Style::default().fg(Color::Yellow),
                )),
                Line::from(""),
                Line::from("Interact with a page that runs flowrec-page."),
            ],
        ),
        AppState::Connected => (
            " No Steps ",
            vec![
                Line::from(""),
                Line::from(Span::styled(
                    "Nothing recorded yet",
                    Style::default().fg(Color::Yellow),
                )),
                Line::from(""),
                Line::from("To get started:"),
                Line::from(""),
                Line::from(Span::styled(
                    "  1. Press 's' to start recording",
                    Style::default().fg(Color::Cyan),
                )),
                Line::from(Span::styled(
                    "  2. Use the recorded pages",
                    Style::default().fg(Color::White),
                )),
                Line::from(Span::styled(
                    "  3. Press 's' again to stop",
                    Style::default().fg(Color::White),
                )),
            ],
        ),
        AppState::Connecting => (
            " Connecting ",
            vec![
                Line::from(""),
                Line::from(Span::styled(
                    "Connecting to flowrecd...",
                    Style::default().fg(Color::Yellow),
                )),
                Line::from(""),
                Line::from(Span::styled("If this persists, check: flowrecd status", hint_style)),
            ],
        ),
        AppState::Disconnected { retry_count, .. } => (
            " Disconnected ",
            vec![
                Line::from(""),
                Line::from(Span::styled(
                    "Lost connection to flowrecd",
                    Style::default()
                        .fg(Color::Red)
                        .add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(format!("Retry attempt: {retry_count}")),
                Line::from(""),
                Line::from(Span::styled(
                    "  Check: flowrecd status",
                    Style::default().fg(Color::White),
                )),
                Line::from(Span::styled(
                    "  Restart: flowrecd start -d",
                    Style::default().fg(Color::Cyan),
                )),
            ],
        ),
    };

    let border_style = match app.state {
        AppState::Connected | AppState::Connecting => Style::default().fg(Color::Yellow),
        AppState::Disconnected { .. } => Style::default().fg(Color::Red),
    };

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(border_style),
    );

    frame.render_widget(paragraph, area);
}
