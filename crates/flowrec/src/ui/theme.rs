//! Shared theme utilities for the flowrec viewer.
//!
//! Provides consistent styling across all UI components.

use flowrec_core::ActionKind;
use ratatui::style::Color;

use crate::app::NotificationLevel;

/// Returns the color for a step of the given kind.
///
/// Color coding:
/// - Cyan: pointer actions (click, hover, context click)
/// - Yellow: keyboard and text entry
/// - Blue: navigation and scrolling
/// - Magenta: drag and drop
/// - Green: form submission
/// - Red / DarkGray: session start / stop
pub fn kind_color(kind: ActionKind) -> Color {
    match kind {
        ActionKind::Click | ActionKind::Hover | ActionKind::ContextClick => Color::Cyan,
        ActionKind::KeyCombo | ActionKind::TextInput => Color::Yellow,
        ActionKind::Navigation | ActionKind::Scroll => Color::Blue,
        ActionKind::DragStart | ActionKind::Drop => Color::Magenta,
        ActionKind::FormSubmit => Color::Green,
        ActionKind::RecordingStarted => Color::Red,
        ActionKind::RecordingStopped => Color::DarkGray,
    }
}

/// Row background for a step. Only the synthetic start/stop steps get one.
pub fn step_background(kind: ActionKind, is_selected: bool) -> Option<Color> {
    if is_selected {
        Some(Color::Rgb(30, 30, 40))
    } else if kind.is_bookkeeping() {
        Some(Color::Rgb(25, 25, 25))
    } else {
        None
    }
}

pub fn notification_color(level: NotificationLevel) -> Color {
    match level {
        NotificationLevel::Info => Color::Green,
        NotificationLevel::Error => Color::Red,
    }
}

/// Recording indicator, blanked on the off phase of the blink.
pub fn recording_indicator(blink_visible: bool) -> &'static str {
    if blink_visible {
        "● REC"
    } else {
        "  REC"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_color_groups() {
        assert_eq!(kind_color(ActionKind::Click), Color::Cyan);
        assert_eq!(kind_color(ActionKind::ContextClick), Color::Cyan);
        assert_eq!(kind_color(ActionKind::TextInput), Color::Yellow);
        assert_eq!(kind_color(ActionKind::Navigation), Color::Blue);
        assert_eq!(kind_color(ActionKind::Drop), Color::Magenta);
        assert_eq!(kind_color(ActionKind::FormSubmit), Color::Green);
    }

    #[test]
    fn test_bookkeeping_colors() {
        assert_eq!(kind_color(ActionKind::RecordingStarted), Color::Red);
        assert_eq!(kind_color(ActionKind::RecordingStopped), Color::DarkGray);
    }

    #[test]
    fn test_step_background() {
        assert!(step_background(ActionKind::Click, false).is_none());
        assert!(step_background(ActionKind::RecordingStarted, false).is_some());
        // Selection wins over the bookkeeping tint
        assert_eq!(
            step_background(ActionKind::RecordingStarted, true),
            step_background(ActionKind::Click, true)
        );
    }

    #[test]
    fn test_notification_color() {
        assert_eq!(notification_color(NotificationLevel::Info), Color::Green);
        assert_eq!(notification_color(NotificationLevel::Error), Color::Red);
    }

    #[test]
    fn test_recording_indicator_blinks() {
        assert_eq!(recording_indicator(true), "● REC");
        assert_eq!(recording_indicator(false), "  REC");
    }
}
