//! Screenshot references and acquisition outcomes.
//!
//! Screenshots travel as `data:` URLs so they can ride inside JSON messages
//! and the persisted log without a side channel.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// An image captured from the visible surface of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Screenshot(String);

impl Screenshot {
    /// Wraps an existing `data:` URL.
    pub fn from_data_url(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Encodes raw PNG bytes into a `data:image/png;base64,` reference.
    pub fn from_png(bytes: &[u8]) -> Self {
        Self(format!("data:image/png;base64,{}", STANDARD.encode(bytes)))
    }

    pub fn as_data_url(&self) -> &str {
        &self.0
    }

    /// MIME type declared by the data URL.
    pub fn mime_type(&self) -> Option<&str> {
        let rest = self.0.strip_prefix(DATA_URL_PREFIX)?;
        let (mime, _) = rest.split_once(BASE64_MARKER)?;
        Some(mime)
    }

    /// Decodes the embedded image bytes.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidScreenshot` if the reference is not a
    /// base64 data URL or the payload does not decode.
    pub fn decode(&self) -> DomainResult<Vec<u8>> {
        let rest = self
            .0
            .strip_prefix(DATA_URL_PREFIX)
            .ok_or_else(|| DomainError::InvalidScreenshot {
                reason: "not a data URL".to_string(),
            })?;
        let (_, payload) =
            rest.split_once(BASE64_MARKER)
                .ok_or_else(|| DomainError::InvalidScreenshot {
                    reason: "data URL is not base64-encoded".to_string(),
                })?;
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| DomainError::InvalidScreenshot {
                reason: e.to_string(),
            })?;
        if bytes.is_empty() {
            return Err(DomainError::InvalidScreenshot {
                reason: "image is empty".to_string(),
            });
        }
        Ok(bytes)
    }
}

/// Result of asking the platform for a screenshot.
///
/// Failure is a value, not an error: the caller records the action without
/// an image and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScreenshotOutcome {
    Captured { screenshot: Screenshot },
    Failed { reason: String },
}

impl ScreenshotOutcome {
    pub fn captured(screenshot: Screenshot) -> Self {
        Self::Captured { screenshot }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn into_screenshot(self) -> Option<Screenshot> {
        match self {
            Self::Captured { screenshot } => Some(screenshot),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_captured(&self) -> bool {
        matches!(self, Self::Captured { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_data_url_decodes() {
        let shot = Screenshot::from_png(&[0x89, b'P', b'N', b'G']);
        assert_eq!(shot.mime_type(), Some("image/png"));
        assert_eq!(shot.decode().unwrap(), vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_invalid_references_fail_to_decode() {
        assert!(Screenshot::from_data_url("https://example.com/a.png").decode().is_err());
        assert!(Screenshot::from_data_url("data:image/png,raw").decode().is_err());
        assert!(Screenshot::from_data_url("data:image/png;base64,!!!").decode().is_err());
        assert!(Screenshot::from_data_url("data:image/png;base64,").decode().is_err());
    }

    #[test]
    fn test_outcome_serialization() {
        let failed = ScreenshotOutcome::failed("tab not visible");
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("\"status\":\"failed\""));
        assert!(failed.into_screenshot().is_none());
    }
}
