//! Export pipeline.
//!
//! Both encodings read the working set in order and never skip a step:
//! - [`tabular`]: one CSV row per step
//! - [`document`]: a structured document model handed to a
//!   [`DocumentSerializer`](document::DocumentSerializer)
//!
//! [`save`](crate::save) decides where the encoded bytes end up.

pub mod document;
pub mod tabular;

pub use document::{
    Block, DecodingEmbedder, DocumentModel, DocumentSerializer, EmbeddedImage, ImageEmbedder,
    JsonDocumentSerializer, MetadataRow, StepSection, SCREENSHOT_PLACEHOLDER,
};
pub use tabular::{export_tabular, import_tabular, TabularRow, TABULAR_HEADER};

use chrono::SecondsFormat;
use flowrec_core::CaptureStamp;

/// RFC 3339 with millisecond precision, as written in exports.
pub fn format_timestamp(stamp: CaptureStamp) -> String {
    stamp
        .to_datetime()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp(CaptureStamp::from_millis(1_700_000_000_123)),
            "2023-11-14T22:13:20.123Z"
        );
    }
}
