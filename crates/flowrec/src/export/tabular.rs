//! CSV export of the working set.
//!
//! The header row is written bare; every data field is quoted, with
//! internal quotes doubled.

use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ExportError;
use crate::export::format_timestamp;
use crate::steps::Step;

pub const TABULAR_HEADER: [&str; 11] = [
    "Step",
    "Timestamp",
    "Action Type",
    "Element",
    "Element ID",
    "Element Class",
    "Element Text",
    "CSS Selector",
    "Value",
    "Coordinates",
    "Caption",
];

/// One CSV row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularRow {
    #[serde(rename = "Step")]
    pub step: usize,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Action Type")]
    pub action_type: String,
    #[serde(rename = "Element")]
    pub element: String,
    #[serde(rename = "Element ID")]
    pub element_id: String,
    #[serde(rename = "Element Class")]
    pub element_class: String,
    #[serde(rename = "Element Text")]
    pub element_text: String,
    #[serde(rename = "CSS Selector")]
    pub css_selector: String,
    #[serde(rename = "Value")]
    pub value: String,
    #[serde(rename = "Coordinates")]
    pub coordinates: String,
    #[serde(rename = "Caption")]
    pub caption: String,
}

impl From<&Step> for TabularRow {
    fn from(step: &Step) -> Self {
        let action = step.action();
        let target = action.target().cloned().unwrap_or_default();
        Self {
            step: step.number(),
            timestamp: format_timestamp(step.timestamp()),
            action_type: step.kind().as_str().to_string(),
            element: target.tag_name,
            element_id: target.id,
            element_class: target.class_name,
            element_text: target.text,
            css_selector: target.selector,
            value: action.value().unwrap_or_default().to_string(),
            coordinates: action
                .coordinates()
                .map(|p| p.to_string())
                .unwrap_or_default(),
            caption: step.caption().to_string(),
        }
    }
}

/// Encodes `steps` as CSV text.
///
/// # Errors
///
/// Returns `ExportError::Encode` if a row cannot be serialized.
pub fn export_tabular(steps: &[Step]) -> Result<String, ExportError> {
    let mut buffer = TABULAR_HEADER.join(",").into_bytes();
    buffer.push(b'\n');

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(buffer);
    for step in steps {
        writer.serialize(TabularRow::from(step))?;
    }

    let bytes = writer.into_inner().map_err(|e| ExportError::Encode {
        format: "csv",
        reason: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| ExportError::Encode {
        format: "csv",
        reason: e.to_string(),
    })
}

/// Reads an export back into rows.
///
/// # Errors
///
/// Returns `ExportError::Decode` if the header differs or a row is
/// malformed.
pub fn import_tabular(text: &str) -> Result<Vec<TabularRow>, ExportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers().map_err(decode_error)?;
    if !headers.iter().eq(TABULAR_HEADER.iter().copied()) {
        return Err(ExportError::Decode {
            format: "csv",
            reason: format!("unexpected header: {}", headers.iter().collect::<Vec<_>>().join(",")),
        });
    }

    reader
        .deserialize::<TabularRow>()
        .map(|row| row.map_err(decode_error))
        .collect()
}

fn decode_error(e: csv::Error) -> ExportError {
    ExportError::Decode {
        format: "csv",
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::StepList;
    use flowrec_core::{
        ActionKind, ActionRecord, CaptureStamp, PageIdentity, Point, TargetSnapshot,
    };

    fn submit_click() -> ActionRecord {
        ActionRecord::new(
            ActionKind::Click,
            "Click \"Submit\"",
            "Element: button\nURL: https://app.example/form",
            CaptureStamp::from_millis(1_700_000_000_000),
            &PageIdentity::new("https://app.example/form", "Form"),
        )
        .with_target(TargetSnapshot {
            tag_name: "BUTTON".to_string(),
            id: String::new(),
            class_name: String::new(),
            text: "Submit".to_string(),
            selector: "button".to_string(),
        })
        .with_coordinates(Point::new(120, 80))
    }

    #[test]
    fn test_header_is_bare_and_rows_quoted() {
        let mut steps = StepList::new();
        steps.push(submit_click());

        let csv = export_tabular(steps.as_slice()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("Step,Timestamp,Action Type,Element,Element ID,Element Class,Element Text,CSS Selector,Value,Coordinates,Caption")
        );
        assert_eq!(
            lines.next(),
            Some(r#""1","2023-11-14T22:13:20.000Z","click","BUTTON","","","Submit","button","","(120, 80)","Click ""Submit""""#)
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_empty_export_is_header_only() {
        let csv = export_tabular(&[]).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn test_synthetic_steps_have_blank_element_fields() {
        let mut steps = StepList::new();
        steps.push_start(CaptureStamp::from_millis(0));

        let rows = import_tabular(&export_tabular(steps.as_slice()).unwrap()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action_type, "recording_started");
        assert_eq!(rows[0].element, "");
        assert_eq!(rows[0].coordinates, "");
        assert_eq!(rows[0].caption, "Start Recording");
    }

    #[test]
    fn test_import_rejects_foreign_header() {
        let result = import_tabular("a,b,c\n\"1\",\"2\",\"3\"\n");
        assert!(matches!(result, Err(ExportError::Decode { .. })));
    }

    #[test]
    fn test_multiline_value_survives() {
        let mut steps = StepList::new();
        steps.push(
            ActionRecord::new(
                ActionKind::TextInput,
                "Enter \"two\nlines\" in Notes",
                "Field: Notes\nURL: https://app.example/",
                CaptureStamp::from_millis(5),
                &PageIdentity::new("https://app.example/", "App"),
            )
            .with_value("two\nlines"),
        );

        let rows = import_tabular(&export_tabular(steps.as_slice()).unwrap()).unwrap();
        assert_eq!(rows[0].value, "two\nlines");
        assert_eq!(rows[0].caption, "Enter \"two\nlines\" in Notes");
    }
}
