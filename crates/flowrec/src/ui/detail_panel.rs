//! Step detail panel widget for the flowrec viewer.
//!
//! Displays everything recorded for the selected step in the right panel
//! of the split layout.

use crate::export::format_timestamp;
use crate::steps::Step;
use crate::ui::theme::kind_color;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

/// Renders the step detail panel inline (for split layout).
///
/// # Arguments
/// * `frame` - The frame to render into
/// * `area` - The rectangular area to fill
/// * `step` - The step to display (or None for empty state)
pub fn render_detail_panel_inline(frame: &mut Frame, area: Rect, step: Option<&Step>) {
    match step {
        Some(step) => {
            let border_color = if step.is_synthetic() {
                Color::DarkGray
            } else {
                Color::Cyan
            };

            let block = Block::default()
                .title(format!(" Step {} ", step.number()))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border_color));

            let paragraph = Paragraph::new(build_detail_lines(step))
                .block(block)
                .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
        }
        None => {
            let block = Block::default()
                .title(" Details ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray));

            let paragraph = Paragraph::new("").block(block);
            frame.render_widget(paragraph, area);
        }
    }
}

fn build_detail_lines(step: &Step) -> Vec<Line<'static>> {
    let label_style = Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::BOLD);
    let value_style = Style::default().fg(Color::White);
    let action = step.action();

    let mut lines = vec![
        Line::from(""),
        Line::from(vec![
            Span::raw(format!("  {} ", step.icon())),
            Span::styled(
                step.caption().to_string(),
                Style::default()
                    .fg(kind_color(step.kind()))
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Type: ", label_style),
            Span::styled(step.kind().as_str().to_string(), value_style),
            Span::styled("    Time: ", label_style),
            Span::styled(format_timestamp(step.timestamp()), value_style),
        ]),
        Line::from(""),
    ];

    // Detail text is multi-line ("Element: ...\nURL: ...").
    for detail_line in step.detail().lines() {
        lines.push(Line::from(Span::styled(
            format!("  {detail_line}"),
            value_style,
        )));
    }

    if let Some(target) = action.target() {
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("  Element: ", label_style),
            Span::styled(target.tag_name.clone(), value_style),
        ]));
        for (label, value) in [
            ("  ID: ", &target.id),
            ("  Class: ", &target.class_name),
            ("  Text: ", &target.text),
            ("  Selector: ", &target.selector),
        ] {
            if !value.is_empty() {
                lines.push(Line::from(vec![
                    Span::styled(label, label_style),
                    Span::styled(value.clone(), Style::default().fg(Color::DarkGray)),
                ]));
            }
        }
    }

    if let Some(value) = action.value() {
        lines.push(Line::from(vec![
            Span::styled("  Value: ", label_style),
            Span::styled(value.to_string(), value_style),
        ]));
    }

    if let Some(point) = action.coordinates() {
        lines.push(Line::from(vec![
            Span::styled("  At: ", label_style),
            Span::styled(point.to_string(), value_style),
        ]));
    }

    if !step.is_synthetic() {
        lines.push(Line::from(""));
        lines.push(Line::from(screenshot_span(step)));
    }

    lines
}

fn screenshot_span(step: &Step) -> Span<'static> {
    if step.action().screenshot().is_some() {
        Span::styled("  [screenshot attached]", Style::default().fg(Color::Green))
    } else if step.kind().wants_screenshot() {
        Span::styled(
            "  [screenshot not available]",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::ITALIC),
        )
    } else {
        Span::styled("  [no screenshot]", Style::default().fg(Color::DarkGray))
    }
}
