//! Scroll distance tracking and destination naming.

use flowrec_core::target::{short_name_for, SECTIONING_TAGS};
use flowrec_core::{DomNode, Point};

/// Minimum class token length that identifies an element.
const MIN_CLASS_LEN: usize = 3;

/// Elements never worth naming as a scroll destination.
const DOCUMENT_TAGS: &[&str] = &["html", "body"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// A scroll that moved far enough to be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollMove {
    pub direction: ScrollDirection,
    pub distance: u64,
    pub position: Point,
}

/// Remembers the last captured scroll point.
#[derive(Debug, Clone)]
pub struct ScrollTracker {
    anchor: Point,
    threshold: u64,
}

impl ScrollTracker {
    pub fn new(threshold: u64) -> Self {
        Self {
            anchor: Point::default(),
            threshold,
        }
    }

    /// Sets the reference point, at the start of a session.
    pub fn reset(&mut self, anchor: Point) {
        self.anchor = anchor;
    }

    pub fn anchor(&self) -> Point {
        self.anchor
    }

    /// Compares `current` with the anchor. Moves of `threshold` pixels or
    /// less are suppressed and leave the anchor in place.
    pub fn observe(&mut self, current: Point) -> Option<ScrollMove> {
        let distance = current.y.abs_diff(self.anchor.y);
        if distance <= self.threshold {
            return None;
        }
        let direction = if current.y > self.anchor.y {
            ScrollDirection::Down
        } else {
            ScrollDirection::Up
        };
        self.anchor = current;
        Some(ScrollMove {
            direction,
            distance,
            position: current,
        })
    }
}

/// Picks the element a scroll landed on, starting from the element at the
/// viewport centre: the nearest sectioning ancestor, else the nearest
/// element with an id or a meaningful class, else the centre element.
pub fn scroll_destination(center: &DomNode) -> &DomNode {
    let candidates = || {
        center
            .ancestors()
            .filter(|n| !DOCUMENT_TAGS.contains(&n.tag().as_str()))
    };

    candidates()
        .find(|n| SECTIONING_TAGS.contains(&n.tag().as_str()))
        .or_else(|| candidates().find(|n| is_identified(n)))
        .unwrap_or(center)
}

/// Human name for where a scroll ended, or `page` without a centre element.
pub fn scroll_target(center: Option<&DomNode>) -> String {
    match center {
        Some(node) => short_name_for(scroll_destination(node)),
        None => "page".to_string(),
    }
}

fn is_identified(node: &DomNode) -> bool {
    node.element_id().is_some() || node.class_tokens().any(|c| c.len() >= MIN_CLASS_LEN)
}
