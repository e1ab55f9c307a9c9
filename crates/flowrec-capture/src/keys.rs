//! Key combination rendering.

use flowrec_core::target::is_editable;
use flowrec_core::DomNode;

/// Keys that only ever act as modifiers.
const MODIFIER_KEYS: &[&str] = &["Control", "Shift", "Alt", "Meta", "AltGraph", "OS"];

/// One keydown as reported by the page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyPress {
    pub key: String,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl KeyPress {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    #[must_use]
    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    #[must_use]
    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }

    #[must_use]
    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    pub fn is_modifier_only(&self) -> bool {
        MODIFIER_KEYS.contains(&self.key.as_str())
    }

    /// A key that produces one character.
    pub fn is_printable(&self) -> bool {
        self.key.chars().count() == 1
    }

    /// Ctrl, Alt or Cmd is held.
    pub fn has_command_modifier(&self) -> bool {
        self.ctrl || self.alt || self.meta
    }

    /// Whether this keydown becomes a key-combo record.
    ///
    /// Plain characters typed into an editable target are left to the
    /// debounced text-input path.
    pub fn should_capture(&self, target: Option<&DomNode>) -> bool {
        if self.key.is_empty() || self.is_modifier_only() {
            return false;
        }
        let typing = self.is_printable()
            && !self.has_command_modifier()
            && target.is_some_and(is_editable);
        !typing
    }

    /// `Ctrl+Alt+Shift+Cmd+Key`, with `Shift+` only for non-printable keys.
    pub fn combo(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(5);
        if self.ctrl {
            parts.push("Ctrl".to_string());
        }
        if self.alt {
            parts.push("Alt".to_string());
        }
        if self.shift && !self.is_printable() {
            parts.push("Shift".to_string());
        }
        if self.meta {
            parts.push("Cmd".to_string());
        }
        parts.push(self.key_label());
        parts.join("+")
    }

    fn key_label(&self) -> String {
        match self.key.as_str() {
            " " => "Space".to_string(),
            k if self.is_printable() => k.to_uppercase(),
            k => k.to_string(),
        }
    }

    /// Friendly name for common shortcuts.
    pub fn friendly_name(&self) -> Option<&'static str> {
        if self.key == "F5" && !self.has_command_modifier() && !self.shift {
            return Some("Refresh");
        }
        // Exactly one of Ctrl/Cmd, no Alt.
        if self.ctrl == self.meta || self.alt {
            return None;
        }
        let key = self.key.to_ascii_lowercase();
        let name = match (self.shift, key.as_str()) {
            (false, "c") => "Copy",
            (false, "v") => "Paste",
            (false, "x") => "Cut",
            (false, "z") => "Undo",
            (false, "y") | (true, "z") => "Redo",
            (false, "s") => "Save",
            (false, "a") => "Select All",
            (false, "f") => "Find",
            (false, "r") => "Refresh",
            (false, "t") => "New Tab",
            (false, "w") => "Close Tab",
            (false, "n") => "New Window",
            _ => return None,
        };
        Some(name)
    }

    /// `Copy (Ctrl+C)` for known shortcuts, `Press "<combo>"` otherwise.
    pub fn caption(&self) -> String {
        let combo = self.combo();
        match self.friendly_name() {
            Some(name) => format!("{name} ({combo})"),
            None => format!("Press \"{combo}\""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friendly_shortcuts() {
        assert_eq!(KeyPress::new("c").ctrl().caption(), "Copy (Ctrl+C)");
        assert_eq!(KeyPress::new("v").meta().caption(), "Paste (Cmd+V)");
        assert_eq!(KeyPress::new("z").ctrl().shift().friendly_name(), Some("Redo"));
        assert_eq!(KeyPress::new("F5").caption(), "Refresh (F5)");
    }

    #[test]
    fn test_lookup_uses_full_modifiers() {
        assert_eq!(KeyPress::new("c").ctrl().alt().friendly_name(), None);
        assert_eq!(KeyPress::new("c").ctrl().meta().friendly_name(), None);
        assert_eq!(KeyPress::new("c").ctrl().alt().caption(), "Press \"Ctrl+Alt+C\"");
    }

    #[test]
    fn test_shift_only_shown_for_non_printable() {
        assert_eq!(KeyPress::new("Tab").shift().combo(), "Shift+Tab");
        assert_eq!(KeyPress::new("A").shift().ctrl().combo(), "Ctrl+A");
        assert_eq!(KeyPress::new("Enter").caption(), "Press \"Enter\"");
        assert_eq!(KeyPress::new(" ").ctrl().combo(), "Ctrl+Space");
    }

    #[test]
    fn test_modifier_keys_are_discarded() {
        for key in ["Control", "Shift", "Alt", "Meta"] {
            assert!(!KeyPress::new(key).ctrl().should_capture(None));
        }
    }

    #[test]
    fn test_typing_into_field_is_left_to_input_debounce() {
        let field = DomNode::new("INPUT").with_attr("type", "email");
        assert!(!KeyPress::new("a").should_capture(Some(&field)));
        assert!(!KeyPress::new("A").shift().should_capture(Some(&field)));
        assert!(KeyPress::new("a").ctrl().should_capture(Some(&field)));
        assert!(KeyPress::new("Enter").should_capture(Some(&field)));

        let body = DomNode::new("BODY");
        assert!(KeyPress::new("a").should_capture(Some(&body)));
    }
}
