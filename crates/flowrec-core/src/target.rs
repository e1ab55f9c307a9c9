//! Target resolution for DOM nodes.
//!
//! A page host hands us a [`DomNode`] snapshot (the node plus its ancestor
//! chain). From it we derive a selector, a short human name, and whether the
//! node is part of the recorder's own panel. Everything here is pure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Element id of the recorder's own panel container.
pub const RECORDER_PANEL_ID: &str = "action-recorder-panel";

/// Maximum number of words for text content to count as a concise name.
const MAX_NAME_WORDS: usize = 8;

/// Display limit for short names.
const MAX_NAME_CHARS: usize = 50;

/// Limit for element text carried into exports.
pub const MAX_ELEMENT_TEXT_CHARS: usize = 100;

/// Attributes consulted, in order, for a labelled name.
const LABEL_ATTRIBUTES: &[&str] = &["aria-label", "data-label", "data-name", "data-testid"];

/// Tags that are meaningful on their own when nothing better is available.
const SEMANTIC_TAGS: &[&str] = &[
    "nav", "header", "footer", "main", "section", "article", "aside", "form", "dialog", "table",
    "figure", "button", "select", "textarea", "input", "label", "img", "video", "ul", "ol",
];

/// Sectioning elements preferred when naming a scroll destination.
pub const SECTIONING_TAGS: &[&str] = &["section", "article", "main", "nav", "aside", "header", "footer"];

const INTERACTIVE_TAGS: &[&str] = &["A", "BUTTON", "INPUT", "SELECT", "TEXTAREA"];

/// Input types that do not accept typed text.
const NON_TEXT_INPUT_TYPES: &[&str] = &[
    "button", "submit", "reset", "checkbox", "radio", "file", "image", "range", "color", "hidden",
];

// ============================================================================
// DOM Snapshot
// ============================================================================

/// Serializable snapshot of a DOM element and its ancestors.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DomNode {
    /// Tag name as reported by the DOM (usually uppercase).
    pub tag_name: String,

    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub class_name: String,

    /// `textContent` of the element.
    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    #[serde(default)]
    pub parent: Option<Box<DomNode>>,
}

impl DomNode {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_parent(mut self, parent: DomNode) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Lowercase tag name.
    pub fn tag(&self) -> String {
        self.tag_name.to_ascii_lowercase()
    }

    /// Non-empty attribute value.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Non-empty id.
    pub fn element_id(&self) -> Option<&str> {
        Some(self.id.trim()).filter(|id| !id.is_empty())
    }

    pub fn class_tokens(&self) -> impl Iterator<Item = &str> {
        self.class_name.split_whitespace()
    }

    /// Text content with whitespace runs collapsed to single spaces.
    pub fn visible_text(&self) -> String {
        collapse_whitespace(&self.text)
    }

    /// The node itself followed by each ancestor up to the root.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    /// Value of `name` or `id`, used to key form fields.
    pub fn field_key(&self) -> Option<&str> {
        self.attr("name").or_else(|| self.element_id())
    }
}

/// Iterator returned by [`DomNode::ancestors`].
pub struct Ancestors<'a> {
    next: Option<&'a DomNode>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a DomNode;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent.as_deref();
        Some(current)
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Selector and human name for a target element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetIdentity {
    pub selector: String,
    pub short_name: String,
}

/// Derives the selector and short name for `node`.
pub fn identify(node: &DomNode) -> TargetIdentity {
    TargetIdentity {
        selector: selector_for(node),
        short_name: short_name_for(node),
    }
}

/// `#id` when the node has an id, otherwise `tag.firstClass` (or the bare tag).
pub fn selector_for(node: &DomNode) -> String {
    if let Some(id) = node.element_id() {
        return format!("#{id}");
    }
    let tag = node.tag();
    match node.class_tokens().next() {
        Some(class) => format!("{tag}.{class}"),
        None => tag,
    }
}

/// Picks the most human-friendly name available for `node`.
pub fn short_name_for(node: &DomNode) -> String {
    if is_heading(node) {
        let text = node.visible_text();
        if !text.is_empty() {
            return ellipsize(&text, MAX_NAME_CHARS);
        }
    }

    let text = node.visible_text();
    if !text.is_empty() && text.split(' ').count() <= MAX_NAME_WORDS {
        return ellipsize(&text, MAX_NAME_CHARS);
    }

    if let Some(label) = LABEL_ATTRIBUTES.iter().find_map(|name| node.attr(name)) {
        return ellipsize(&collapse_whitespace(label), MAX_NAME_CHARS);
    }

    if let Some(id) = node.element_id() {
        let humanized = humanize_identifier(id);
        if !humanized.is_empty() {
            return ellipsize(&humanized, MAX_NAME_CHARS);
        }
    }

    let tag = node.tag();
    if SEMANTIC_TAGS.contains(&tag.as_str()) {
        return tag;
    }

    "section".to_string()
}

/// True when the node or any ancestor is the recorder's own panel.
pub fn is_own_ui(node: &DomNode, panel_id: &str) -> bool {
    node.ancestors()
        .any(|n| n.element_id().is_some_and(|id| id == panel_id))
}

/// True for element types hover capture cares about.
pub fn is_interactive(node: &DomNode) -> bool {
    let tag = node.tag_name.to_ascii_uppercase();
    INTERACTIVE_TAGS.contains(&tag.as_str())
}

/// True when typing into the node edits text.
pub fn is_editable(node: &DomNode) -> bool {
    match node.tag().as_str() {
        "textarea" => return true,
        "input" => {
            let kind = node.attr("type").unwrap_or("text").to_ascii_lowercase();
            return !NON_TEXT_INPUT_TYPES.contains(&kind.as_str());
        }
        _ => {}
    }
    node.ancestors().any(|n| {
        n.attributes
            .get("contenteditable")
            .is_some_and(|v| v.is_empty() || v.eq_ignore_ascii_case("true"))
    })
}

fn is_heading(node: &DomNode) -> bool {
    let tag = node.tag();
    let numbered = tag.len() == 2
        && tag.starts_with('h')
        && tag.chars().nth(1).is_some_and(|c| ('1'..='6').contains(&c));
    numbered || node.attr("role") == Some("heading")
}

/// Replaces `-`/`_` with spaces and splits camelCase, then capitalises the
/// first letter: `submitOrder_btn` becomes `Submit order btn`.
pub fn humanize_identifier(raw: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in raw.chars() {
        if c == '-' || c == '_' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    let sentence = words
        .iter()
        .map(|w| {
            if w.chars().all(|c| c.is_uppercase() || c.is_ascii_digit()) {
                w.clone()
            } else {
                w.to_lowercase()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    let mut chars = sentence.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// Snapshot for records
// ============================================================================

/// The element fields an action record keeps for export.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub tag_name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub selector: String,
}

impl TargetSnapshot {
    pub fn of(node: &DomNode) -> Self {
        Self {
            tag_name: node.tag_name.to_ascii_uppercase(),
            id: node.id.trim().to_string(),
            class_name: node.class_name.trim().to_string(),
            text: truncate(&node.visible_text(), MAX_ELEMENT_TEXT_CHARS),
            selector: selector_for(node),
        }
    }
}

// ============================================================================
// Text helpers
// ============================================================================

/// Collapses whitespace runs into single spaces and trims the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cuts `s` to at most `max` characters.
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Cuts `s` to `max` characters and appends `...` when anything was dropped.
pub fn ellipsize(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", truncate(s, max))
    }
}
