//! Page context identity.
//!
//! Every open page runs its own capture context. The coordinator tracks
//! them by [`ContextId`] and only broadcasts recording signals to contexts
//! whose [`PageIdentity`] points at a real web page.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Identifier of one page context (one tab).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ContextId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ContextId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// Page Identity
// ============================================================================

/// Address and title of a page at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageIdentity {
    pub url: String,
    #[serde(default)]
    pub title: String,
}

impl PageIdentity {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }

    /// Returns the lowercase scheme of the address, if it has one.
    pub fn scheme(&self) -> Option<String> {
        let (scheme, _) = self.url.split_once(':')?;
        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return None;
        }
        Some(scheme.to_ascii_lowercase())
    }

    /// True for `http`/`https` pages. Browser-internal pages
    /// (`chrome://`, `about:`, extension pages) return false.
    pub fn is_web_page(&self) -> bool {
        matches!(self.scheme().as_deref(), Some("http") | Some("https"))
    }

    /// Title if the page has one, otherwise the address.
    pub fn display_name(&self) -> &str {
        let title = self.title.trim();
        if title.is_empty() {
            &self.url
        } else {
            title
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_page_schemes() {
        assert!(PageIdentity::new("https://example.com/a", "").is_web_page());
        assert!(PageIdentity::new("HTTP://example.com", "").is_web_page());
        assert!(!PageIdentity::new("chrome://extensions", "").is_web_page());
        assert!(!PageIdentity::new("about:blank", "").is_web_page());
        assert!(!PageIdentity::new("no scheme here", "").is_web_page());
    }

    #[test]
    fn test_display_name_falls_back_to_url() {
        let page = PageIdentity::new("https://example.com", "  ");
        assert_eq!(page.display_name(), "https://example.com");

        let page = PageIdentity::new("https://example.com", "Example");
        assert_eq!(page.display_name(), "Example");
    }

    #[test]
    fn test_context_id_serializes_transparently() {
        let id = ContextId::new("tab-7");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"tab-7\"");
    }
}
