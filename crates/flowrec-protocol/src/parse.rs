//! Raw page-event payloads.
//!
//! A page host (browser extension shim, test harness) streams these JSON
//! objects into a page context. Field names accept both the DOM's camelCase
//! and snake_case, and every optional field defaults, so hosts only send
//! what they have.

use std::collections::BTreeMap;

use flowrec_core::{DomNode, PageIdentity, Point};
use serde::{Deserialize, Serialize};

/// A DOM element as serialized by the page host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawNode {
    #[serde(default, alias = "tagName")]
    pub tag_name: String,

    #[serde(default)]
    pub id: String,

    #[serde(default, alias = "className")]
    pub class_name: String,

    #[serde(default, alias = "textContent")]
    pub text: String,

    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Ancestors, nearest first. Their own `ancestors` are ignored.
    #[serde(default)]
    pub ancestors: Vec<RawNode>,
}

impl RawNode {
    fn to_single_node(&self) -> DomNode {
        DomNode {
            tag_name: self.tag_name.clone(),
            id: self.id.clone(),
            class_name: self.class_name.clone(),
            text: self.text.clone(),
            attributes: self.attributes.clone(),
            parent: None,
        }
    }
}

impl From<RawNode> for DomNode {
    fn from(raw: RawNode) -> Self {
        // Build the parent chain from the root downwards.
        let mut parent: Option<Box<DomNode>> = None;
        for ancestor in raw.ancestors.iter().rev() {
            let mut node = ancestor.to_single_node();
            node.parent = parent;
            parent = Some(Box::new(node));
        }
        let mut node = raw.to_single_node();
        node.parent = parent;
        node
    }
}

/// One raw input event observed in a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RawPageEvent {
    Click {
        target: RawNode,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
    },

    Keydown {
        key: String,
        #[serde(default, alias = "ctrlKey")]
        ctrl: bool,
        #[serde(default, alias = "altKey")]
        alt: bool,
        #[serde(default, alias = "shiftKey")]
        shift: bool,
        #[serde(default, alias = "metaKey")]
        meta: bool,
        #[serde(default)]
        target: Option<RawNode>,
    },

    Input {
        target: RawNode,
        #[serde(default)]
        value: String,
    },

    Scroll {
        #[serde(default, alias = "scrollX")]
        x: f64,
        #[serde(default, alias = "scrollY")]
        y: f64,
        /// Element at the centre of the viewport.
        #[serde(default)]
        center: Option<RawNode>,
    },

    /// URL change seen by the DOM mutation observer.
    UrlChanged {
        url: String,
        #[serde(default)]
        title: String,
    },

    /// History back/forward.
    HistoryPop {
        url: String,
        #[serde(default)]
        title: String,
    },

    Hover { target: RawNode },

    ContextMenu {
        target: RawNode,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
    },

    DragStart { target: RawNode },

    Drop { target: RawNode },

    Submit { target: RawNode },
}

impl RawPageEvent {
    /// Event name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Click { .. } => "click",
            Self::Keydown { .. } => "keydown",
            Self::Input { .. } => "input",
            Self::Scroll { .. } => "scroll",
            Self::UrlChanged { .. } => "url_changed",
            Self::HistoryPop { .. } => "history_pop",
            Self::Hover { .. } => "hover",
            Self::ContextMenu { .. } => "context_menu",
            Self::DragStart { .. } => "drag_start",
            Self::Drop { .. } => "drop",
            Self::Submit { .. } => "submit",
        }
    }

    /// The element the event happened on, if any.
    pub fn target(&self) -> Option<&RawNode> {
        match self {
            Self::Click { target, .. }
            | Self::Input { target, .. }
            | Self::Hover { target }
            | Self::ContextMenu { target, .. }
            | Self::DragStart { target }
            | Self::Drop { target }
            | Self::Submit { target } => Some(target),
            Self::Keydown { target, .. } => target.as_ref(),
            Self::Scroll { center, .. } => center.as_ref(),
            Self::UrlChanged { .. } | Self::HistoryPop { .. } => None,
        }
    }

    /// New page identity for navigation events.
    pub fn navigation_target(&self) -> Option<PageIdentity> {
        match self {
            Self::UrlChanged { url, title } | Self::HistoryPop { url, title } => {
                Some(PageIdentity::new(url.clone(), title.clone()))
            }
            _ => None,
        }
    }
}

/// Rounds host-reported pixel coordinates.
pub fn to_point(x: f64, y: f64) -> Point {
    Point::new(round_px(x), round_px(y))
}

fn round_px(v: f64) -> i64 {
    if v.is_finite() {
        v.round() as i64
    } else {
        0
    }
}
