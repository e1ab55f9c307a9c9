//! Structured document export.
//!
//! [`DocumentModel::build`] lays out the title, a metadata table and one
//! section per step. A step's screenshot goes through an [`ImageEmbedder`];
//! if embedding fails the section gets [`SCREENSHOT_PLACEHOLDER`] and the
//! export carries on. The model is encoded by a [`DocumentSerializer`],
//! which keeps the on-disk format swappable.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use flowrec_core::Screenshot;
use serde::{Serialize, Serializer};
use tracing::warn;

use crate::error::ExportError;
use crate::export::format_timestamp;
use crate::session::SessionSummary;
use crate::steps::Step;

pub const DOCUMENT_SUBTITLE: &str = "Automated Workflow Documentation";
pub const STEPS_HEADING: &str = "Step-by-Step Workflow";
pub const DOCUMENT_FOOTER: &str = "This document was automatically generated by flowrec";
pub const SCREENSHOT_PLACEHOLDER: &str = "[Screenshot not available]";

/// A page break follows every this many steps, except after the last.
pub const STEPS_PER_PAGE: usize = 5;

/// Display size of embedded screenshots.
pub const IMAGE_WIDTH: u32 = 400;
pub const IMAGE_HEIGHT: u32 = 250;

// ============================================================================
// Model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentModel {
    pub title: String,
    pub subtitle: String,
    pub generated_at: DateTime<Utc>,
    pub metadata: Vec<MetadataRow>,
    pub heading: String,
    pub sections: Vec<StepSection>,
    pub footer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataRow {
    pub label: String,
    pub value: String,
}

impl MetadataRow {
    fn new(label: &str, value: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepSection {
    pub number: usize,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Heading { icon: String, text: String },
    Detail { text: String },
    Timestamp { text: String },
    Image { image: EmbeddedImage, caption: String },
    Placeholder { text: String },
    PageBreak,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddedImage {
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    #[serde(serialize_with = "as_base64")]
    pub data: Vec<u8>,
}

fn as_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

impl DocumentModel {
    /// Lays out `steps` in order.
    ///
    /// `generated_at` is stamped into the footer and used for the title
    /// when the session has no start time.
    pub fn build(
        steps: &[Step],
        summary: &SessionSummary,
        embedder: &dyn ImageEmbedder,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let recorded_at = summary
            .started_at
            .map(|s| s.to_datetime())
            .unwrap_or(generated_at);

        let metadata = vec![
            MetadataRow::new("Recording Date", recorded_at.format("%Y-%m-%d").to_string()),
            MetadataRow::new("Recording Time", recorded_at.format("%H:%M:%S").to_string()),
            MetadataRow::new("Duration", format!("{} seconds", summary.duration_secs)),
            MetadataRow::new("Total Steps", format!("{} actions", steps.len())),
            MetadataRow::new("Source URL", summary.source_url.clone().unwrap_or_default()),
        ];

        let last = steps.len().saturating_sub(1);
        let sections = steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let mut section = build_section(step, embedder);
                if (i + 1) % STEPS_PER_PAGE == 0 && i < last {
                    section.blocks.push(Block::PageBreak);
                }
                section
            })
            .collect();

        Self {
            title: format!("Workflow recorded on {}", recorded_at.format("%Y-%m-%d")),
            subtitle: DOCUMENT_SUBTITLE.to_string(),
            generated_at,
            metadata,
            heading: STEPS_HEADING.to_string(),
            sections,
            footer: DOCUMENT_FOOTER.to_string(),
        }
    }

    pub fn metadata_value(&self, label: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|row| row.label == label)
            .map(|row| row.value.as_str())
    }

    pub fn page_breaks(&self) -> usize {
        self.sections
            .iter()
            .flat_map(|s| s.blocks.iter())
            .filter(|b| matches!(b, Block::PageBreak))
            .count()
    }
}

fn build_section(step: &Step, embedder: &dyn ImageEmbedder) -> StepSection {
    let mut blocks = vec![Block::Heading {
        icon: step.icon().to_string(),
        text: format!("Step {}: {}", step.number(), step.caption()),
    }];

    if !step.detail().is_empty() {
        blocks.push(Block::Detail {
            text: step.detail().to_string(),
        });
    }

    blocks.push(Block::Timestamp {
        text: format!("Timestamp: {}", format_timestamp(step.timestamp())),
    });

    match step.action().screenshot() {
        Some(screenshot) => match embedder.embed(screenshot) {
            Ok(image) => blocks.push(Block::Image {
                image,
                caption: format!("Screenshot captured at step {}", step.number()),
            }),
            Err(reason) => {
                warn!(step = step.number(), reason = %reason, "Could not embed screenshot");
                blocks.push(placeholder());
            }
        },
        // Kinds that normally carry an image say so when they don't.
        None if step.kind().wants_screenshot() => blocks.push(placeholder()),
        None => {}
    }

    StepSection {
        number: step.number(),
        blocks,
    }
}

fn placeholder() -> Block {
    Block::Placeholder {
        text: SCREENSHOT_PLACEHOLDER.to_string(),
    }
}

// ============================================================================
// Image Embedding
// ============================================================================

/// Turns a screenshot reference into embeddable image data.
pub trait ImageEmbedder: Send + Sync {
    /// Returns the image or a human-readable reason it cannot be embedded.
    fn embed(&self, screenshot: &Screenshot) -> Result<EmbeddedImage, String>;
}

/// Decodes the data URL and accepts PNG and JPEG payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodingEmbedder;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = b"\xff\xd8\xff";

impl ImageEmbedder for DecodingEmbedder {
    fn embed(&self, screenshot: &Screenshot) -> Result<EmbeddedImage, String> {
        let data = screenshot.decode().map_err(|e| e.to_string())?;
        let mime_type = if data.starts_with(PNG_MAGIC) {
            "image/png"
        } else if data.starts_with(JPEG_MAGIC) {
            "image/jpeg"
        } else {
            return Err("payload is neither PNG nor JPEG".to_string());
        };
        Ok(EmbeddedImage {
            mime_type: mime_type.to_string(),
            width: IMAGE_WIDTH,
            height: IMAGE_HEIGHT,
            data,
        })
    }
}

// ============================================================================
// Serialization
// ============================================================================

/// Encodes a document model into file bytes.
pub trait DocumentSerializer: Send + Sync {
    /// File extension without the dot.
    fn extension(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns `ExportError::Encode` if the model cannot be encoded.
    fn serialize(&self, document: &DocumentModel) -> Result<Vec<u8>, ExportError>;
}

/// Pretty-printed JSON, images inlined as base64.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDocumentSerializer;

impl DocumentSerializer for JsonDocumentSerializer {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, document: &DocumentModel) -> Result<Vec<u8>, ExportError> {
        serde_json::to_vec_pretty(document).map_err(|e| ExportError::Encode {
            format: "json",
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::StepList;
    use flowrec_core::{ActionKind, ActionRecord, CaptureStamp, PageIdentity};

    const TINY_PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn action(kind: ActionKind, stamp: i64) -> ActionRecord {
        ActionRecord::new(
            kind,
            format!("{kind} at {stamp}"),
            "URL: https://app.example/",
            CaptureStamp::from_millis(stamp),
            &PageIdentity::new("https://app.example/", "App"),
        )
    }

    fn steps_of(n: usize) -> StepList {
        let mut steps = StepList::new();
        for i in 0..n {
            steps.push(action(ActionKind::Scroll, i as i64 * 1000));
        }
        steps
    }

    fn build(steps: &StepList) -> DocumentModel {
        DocumentModel::build(
            steps.as_slice(),
            &SessionSummary::of(steps),
            &DecodingEmbedder,
            CaptureStamp::from_millis(1_700_000_000_000).to_datetime(),
        )
    }

    #[test]
    fn test_page_breaks_every_fifth_step_but_not_last() {
        assert_eq!(build(&steps_of(4)).page_breaks(), 0);
        assert_eq!(build(&steps_of(5)).page_breaks(), 0);
        assert_eq!(build(&steps_of(6)).page_breaks(), 1);
        assert_eq!(build(&steps_of(10)).page_breaks(), 1);
        assert_eq!(build(&steps_of(11)).page_breaks(), 2);

        let doc = build(&steps_of(6));
        assert_eq!(doc.sections[4].blocks.last(), Some(&Block::PageBreak));
    }

    #[test]
    fn test_metadata_rows() {
        let mut steps = StepList::new();
        steps.push_start(CaptureStamp::from_millis(1_700_000_000_000));
        steps.push(action(ActionKind::Click, 1_700_000_001_000));
        steps.push_stop(CaptureStamp::from_millis(1_700_000_012_000));

        let doc = build(&steps);
        assert_eq!(doc.title, "Workflow recorded on 2023-11-14");
        assert_eq!(doc.subtitle, DOCUMENT_SUBTITLE);
        assert_eq!(doc.metadata_value("Recording Date"), Some("2023-11-14"));
        assert_eq!(doc.metadata_value("Recording Time"), Some("22:13:20"));
        assert_eq!(doc.metadata_value("Duration"), Some("12 seconds"));
        assert_eq!(doc.metadata_value("Total Steps"), Some("3 actions"));
        assert_eq!(doc.metadata_value("Source URL"), Some("https://app.example/"));
        assert_eq!(doc.footer, DOCUMENT_FOOTER);
    }

    #[test]
    fn test_broken_screenshot_becomes_placeholder() {
        let mut steps = StepList::new();
        steps.push(
            action(ActionKind::Click, 1)
                .with_screenshot(Screenshot::from_data_url("data:image/png;base64,@@@")),
        );
        steps.push(action(ActionKind::Click, 2).with_screenshot(Screenshot::from_png(TINY_PNG)));

        let doc = build(&steps);
        assert_eq!(doc.sections.len(), 2);
        assert!(doc.sections[0].blocks.contains(&Block::Placeholder {
            text: SCREENSHOT_PLACEHOLDER.to_string()
        }));
        assert!(matches!(
            doc.sections[1].blocks.last(),
            Some(Block::Image { image, .. }) if image.mime_type == "image/png"
        ));
    }

    #[test]
    fn test_missing_screenshot_only_flagged_for_click() {
        let mut steps = StepList::new();
        steps.push(action(ActionKind::Click, 1));
        steps.push(action(ActionKind::Navigation, 2));

        let doc = build(&steps);
        let has_placeholder =
            |s: &StepSection| s.blocks.iter().any(|b| matches!(b, Block::Placeholder { .. }));
        assert!(has_placeholder(&doc.sections[0]));
        assert!(!has_placeholder(&doc.sections[1]));
    }

    #[test]
    fn test_embedder_rejects_non_image_payload() {
        let screenshot = Screenshot::from_png(b"plain text");
        assert!(DecodingEmbedder.embed(&screenshot).is_err());
    }

    #[test]
    fn test_json_serializer_inlines_base64() {
        let mut steps = StepList::new();
        steps.push(action(ActionKind::Click, 1).with_screenshot(Screenshot::from_png(TINY_PNG)));

        let bytes = JsonDocumentSerializer.serialize(&build(&steps)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let image = &value["sections"][0]["blocks"][3]["image"];
        assert_eq!(image["data"], STANDARD.encode(TINY_PNG));
        assert_eq!(image["width"], 400);
        assert_eq!(value["sections"][0]["blocks"][0]["kind"], "heading");
    }
}
