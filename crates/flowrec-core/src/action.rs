//! Captured user actions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::clock::CaptureStamp;
use crate::page::PageIdentity;
use crate::screenshot::Screenshot;
use crate::target::TargetSnapshot;

// ============================================================================
// Action Kind
// ============================================================================

/// Classification of a captured action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    KeyCombo,
    TextInput,
    Scroll,
    Navigation,
    Hover,
    ContextClick,
    DragStart,
    Drop,
    FormSubmit,

    /// Viewer-side bookkeeping step, never sent by a page context.
    RecordingStarted,

    /// Viewer-side bookkeeping step, never sent by a page context.
    RecordingStopped,
}

impl ActionKind {
    /// Every kind a page context can produce.
    pub const CAPTURED: [ActionKind; 10] = [
        Self::Click,
        Self::KeyCombo,
        Self::TextInput,
        Self::Scroll,
        Self::Navigation,
        Self::Hover,
        Self::ContextClick,
        Self::DragStart,
        Self::Drop,
        Self::FormSubmit,
    ];

    /// Fixed glyph shown next to steps of this kind.
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Click => "👆",
            Self::KeyCombo => "⌨️",
            Self::TextInput => "✏️",
            Self::Scroll => "📜",
            Self::Navigation => "🌐",
            Self::Hover => "🖱️",
            Self::ContextClick => "📋",
            Self::DragStart => "✊",
            Self::Drop => "📥",
            Self::FormSubmit => "📤",
            Self::RecordingStarted => "🔴",
            Self::RecordingStopped => "⏹️",
        }
    }

    /// Stable snake_case name, as written in exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::KeyCombo => "key_combo",
            Self::TextInput => "text_input",
            Self::Scroll => "scroll",
            Self::Navigation => "navigation",
            Self::Hover => "hover",
            Self::ContextClick => "context_click",
            Self::DragStart => "drag_start",
            Self::Drop => "drop",
            Self::FormSubmit => "form_submit",
            Self::RecordingStarted => "recording_started",
            Self::RecordingStopped => "recording_stopped",
        }
    }

    /// Parses a name produced by [`as_str`](Self::as_str).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "click" => Some(Self::Click),
            "key_combo" => Some(Self::KeyCombo),
            "text_input" => Some(Self::TextInput),
            "scroll" => Some(Self::Scroll),
            "navigation" => Some(Self::Navigation),
            "hover" => Some(Self::Hover),
            "context_click" => Some(Self::ContextClick),
            "drag_start" => Some(Self::DragStart),
            "drop" => Some(Self::Drop),
            "form_submit" => Some(Self::FormSubmit),
            "recording_started" => Some(Self::RecordingStarted),
            "recording_stopped" => Some(Self::RecordingStopped),
            _ => None,
        }
    }

    /// Kinds whose record carries a screenshot.
    pub fn wants_screenshot(&self) -> bool {
        matches!(self, Self::Click)
    }

    pub fn is_bookkeeping(&self) -> bool {
        matches!(self, Self::RecordingStarted | Self::RecordingStopped)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Pointer or scroll position in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ============================================================================
// Action Record
// ============================================================================

/// An immutable captured action.
///
/// Built once by the classifier; the consuming `with_*` methods only run
/// before the record leaves its page context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    kind: ActionKind,
    caption: String,
    detail: String,
    icon: String,
    captured_at: CaptureStamp,
    source_url: String,
    #[serde(default)]
    source_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    screenshot: Option<Screenshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<TargetSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    coordinates: Option<Point>,
}

impl ActionRecord {
    pub fn new(
        kind: ActionKind,
        caption: impl Into<String>,
        detail: impl Into<String>,
        captured_at: CaptureStamp,
        page: &PageIdentity,
    ) -> Self {
        Self {
            kind,
            caption: caption.into(),
            detail: detail.into(),
            icon: kind.icon().to_string(),
            captured_at,
            source_url: page.url.clone(),
            source_title: page.title.clone(),
            screenshot: None,
            target: None,
            value: None,
            coordinates: None,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: TargetSnapshot) -> Self {
        self.target = Some(target);
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_coordinates(mut self, point: Point) -> Self {
        self.coordinates = Some(point);
        self
    }

    /// Attaches a screenshot. A record that already has one keeps it.
    #[must_use]
    pub fn with_screenshot(mut self, screenshot: Screenshot) -> Self {
        if self.screenshot.is_none() {
            self.screenshot = Some(screenshot);
        }
        self
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn icon(&self) -> &str {
        &self.icon
    }

    pub fn captured_at(&self) -> CaptureStamp {
        self.captured_at
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn source_title(&self) -> &str {
        &self.source_title
    }

    pub fn screenshot(&self) -> Option<&Screenshot> {
        self.screenshot.as_ref()
    }

    pub fn target(&self) -> Option<&TargetSnapshot> {
        self.target.as_ref()
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn coordinates(&self) -> Option<Point> {
        self.coordinates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> PageIdentity {
        PageIdentity::new("https://shop.example/cart", "Cart")
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in ActionKind::CAPTURED {
            assert_eq!(ActionKind::from_name(kind.as_str()), Some(kind));
            assert!(!kind.is_bookkeeping());
        }
        assert_eq!(ActionKind::from_name("teleport"), None);
    }

    #[test]
    fn test_only_clicks_want_screenshots() {
        let wanting: Vec<_> = ActionKind::CAPTURED
            .iter()
            .filter(|k| k.wants_screenshot())
            .collect();
        assert_eq!(wanting, vec![&ActionKind::Click]);
    }

    #[test]
    fn test_record_carries_page_identity_and_icon() {
        let record = ActionRecord::new(
            ActionKind::Click,
            "Click \"Checkout\"",
            "Element: button\nURL: https://shop.example/cart",
            CaptureStamp::from_millis(42),
            &page(),
        );
        assert_eq!(record.icon(), "👆");
        assert_eq!(record.source_url(), "https://shop.example/cart");
        assert_eq!(record.source_title(), "Cart");
        assert!(record.screenshot().is_none());
    }

    #[test]
    fn test_screenshot_is_set_once() {
        let first = Screenshot::from_png(&[1]);
        let second = Screenshot::from_png(&[2]);
        let record = ActionRecord::new(
            ActionKind::Click,
            "c",
            "d",
            CaptureStamp::from_millis(1),
            &page(),
        )
        .with_screenshot(first.clone())
        .with_screenshot(second);
        assert_eq!(record.screenshot(), Some(&first));
    }

    #[test]
    fn test_point_display() {
        assert_eq!(Point::new(120, 80).to_string(), "(120, 80)");
    }

    #[test]
    fn test_record_json_omits_absent_fields() {
        let record = ActionRecord::new(
            ActionKind::Scroll,
            "Scroll down",
            "",
            CaptureStamp::from_millis(7),
            &page(),
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"kind\":\"scroll\""));
        assert!(!json.contains("screenshot"));
        let back: ActionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
