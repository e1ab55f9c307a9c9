//! End-to-end tests of a recorded session through the viewer's exports.

use chrono::{DateTime, Utc};
use flowrec_core::{
    ActionKind, ActionRecord, CaptureStamp, ContextId, DomNode, LogEntry, PageIdentity, Point,
    Screenshot, TargetSnapshot,
};
use flowrec_viewer::export::{
    import_tabular, Block, DecodingEmbedder, DocumentModel, JsonDocumentSerializer,
    SCREENSHOT_PLACEHOLDER,
};
use flowrec_viewer::save::DirectorySaver;
use flowrec_viewer::session::SessionSummary;
use flowrec_viewer::App;

const TINY_PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
const SESSION_START: i64 = 1_705_312_800_000;

fn page() -> PageIdentity {
    PageIdentity::new("https://shop.example/checkout", "Checkout")
}

fn export_time() -> DateTime<Utc> {
    CaptureStamp::from_millis(SESSION_START + 60_000).to_datetime()
}

fn logged(action: ActionRecord, offset_ms: i64) -> LogEntry {
    LogEntry::new(
        action,
        ContextId::new("tab-1"),
        CaptureStamp::from_millis(SESSION_START + offset_ms),
    )
}

fn submit_click(offset_ms: i64) -> ActionRecord {
    let button = DomNode::new("button")
        .with_id("submit-order")
        .with_class("btn primary")
        .with_text("Submit");
    ActionRecord::new(
        ActionKind::Click,
        "Click \"Submit\"",
        "Element: button\nURL: https://shop.example/checkout",
        CaptureStamp::from_millis(SESSION_START + offset_ms),
        &page(),
    )
    .with_target(TargetSnapshot::of(&button))
    .with_coordinates(Point::new(120, 48))
    .with_screenshot(Screenshot::from_png(TINY_PNG))
}

fn typed(offset_ms: i64, value: &str) -> ActionRecord {
    let field = DomNode::new("input").with_attr("name", "email");
    ActionRecord::new(
        ActionKind::TextInput,
        "Type in \"Email\"",
        format!("Value: {value}"),
        CaptureStamp::from_millis(SESSION_START + offset_ms),
        &page(),
    )
    .with_target(TargetSnapshot::of(&field))
    .with_value(value)
}

fn key_combo(offset_ms: i64) -> ActionRecord {
    ActionRecord::new(
        ActionKind::KeyCombo,
        "Press Ctrl+S",
        "Key combination: Ctrl+S",
        CaptureStamp::from_millis(SESSION_START + offset_ms),
        &page(),
    )
}

fn recorded_app(entries: &[LogEntry]) -> App {
    let mut app = App::new();
    app.apply_status(true, Some(CaptureStamp::from_millis(SESSION_START)));
    app.apply_log(entries);
    app.apply_status(false, None);
    app
}

#[test]
fn test_single_click_session_exports_numbered_rows() {
    let dir = tempfile::tempdir().unwrap();
    let saver = DirectorySaver::new(dir.path());
    let mut app = recorded_app(&[logged(submit_click(500), 500)]);

    assert_eq!(app.steps.len(), 3);

    let path = app.export_tabular(&saver, export_time()).unwrap();
    let text = std::fs::read_to_string(path).unwrap();
    let rows = import_tabular(&text).unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].action_type, "recording_started");
    assert_eq!(rows[1].step, 2);
    assert_eq!(rows[1].action_type, "click");
    assert_eq!(rows[1].caption, "Click \"Submit\"");
    assert_eq!(rows[1].element, "BUTTON");
    assert_eq!(rows[1].element_id, "submit-order");
    assert_eq!(rows[1].coordinates, "(120, 48)");
    assert_eq!(rows[2].action_type, "recording_stopped");
}

#[test]
fn test_tabular_export_reads_back_for_mixed_kinds() {
    let dir = tempfile::tempdir().unwrap();
    let saver = DirectorySaver::new(dir.path());
    let mut app = recorded_app(&[
        logged(typed(100, "ann, \"the\" user"), 100),
        logged(key_combo(200), 200),
        logged(submit_click(300), 300),
    ]);

    let path = app.export_tabular(&saver, export_time()).unwrap();
    let rows = import_tabular(&std::fs::read_to_string(path).unwrap()).unwrap();

    let kinds: Vec<&str> = rows.iter().map(|r| r.action_type.as_str()).collect();
    assert_eq!(
        kinds,
        [
            "recording_started",
            "text_input",
            "key_combo",
            "click",
            "recording_stopped"
        ]
    );
    assert_eq!(rows[1].value, "ann, \"the\" user");
    assert_eq!(rows[2].element, "");
    assert!(rows.iter().enumerate().all(|(i, r)| r.step == i + 1));
}

#[test]
fn test_deleted_step_leaves_contiguous_numbers() {
    let dir = tempfile::tempdir().unwrap();
    let saver = DirectorySaver::new(dir.path());
    let mut app = recorded_app(&[
        logged(typed(100, "a"), 100),
        logged(key_combo(200), 200),
        logged(submit_click(300), 300),
    ]);

    // Steps: start, input, combo, click, stop. Remove the combo.
    app.selected_index = 2;
    app.delete_selected();
    assert_eq!(app.steps.len(), 4);

    let path = app.export_tabular(&saver, export_time()).unwrap();
    let rows = import_tabular(&std::fs::read_to_string(path).unwrap()).unwrap();
    let numbers: Vec<usize> = rows.iter().map(|r| r.step).collect();
    assert_eq!(numbers, [1, 2, 3, 4]);
    assert_eq!(rows[2].action_type, "click");
}

#[test]
fn test_document_embeds_screenshot_and_marks_missing_ones() {
    let dir = tempfile::tempdir().unwrap();
    let saver = DirectorySaver::new(dir.path());
    let bare_click = ActionRecord::new(
        ActionKind::Click,
        "Click \"Cancel\"",
        "",
        CaptureStamp::from_millis(SESSION_START + 400),
        &page(),
    );
    let mut app = recorded_app(&[
        logged(submit_click(300), 300),
        logged(bare_click, 400),
        logged(key_combo(500), 500),
    ]);

    let path = app
        .export_document(&saver, &JsonDocumentSerializer, &DecodingEmbedder, export_time())
        .unwrap();
    let document: serde_json::Value =
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();

    let sections = document["sections"].as_array().unwrap();
    assert_eq!(sections.len(), 5);

    let block_kinds = |index: usize| -> Vec<String> {
        sections[index]["blocks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["kind"].as_str().unwrap().to_string())
            .collect()
    };
    assert!(block_kinds(1).contains(&"image".to_string()));
    assert!(block_kinds(2).contains(&"placeholder".to_string()));
    // Key combos never carry a screenshot, so no placeholder either.
    assert!(!block_kinds(3).contains(&"placeholder".to_string()));

    let placeholder = sections[2]["blocks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["kind"] == "placeholder")
        .unwrap();
    assert_eq!(placeholder["text"], SCREENSHOT_PLACEHOLDER);
    assert_eq!(document["metadata"][3]["value"], "5 actions");
}

#[test]
fn test_document_breaks_pages_every_five_steps() {
    let entries: Vec<LogEntry> = (1..=10)
        .map(|i| logged(key_combo(i * 100), i * 100))
        .collect();
    let app = recorded_app(&entries);
    assert_eq!(app.steps.len(), 12);

    let summary = SessionSummary::of(&app.steps);
    let document = DocumentModel::build(
        app.steps.as_slice(),
        &summary,
        &DecodingEmbedder,
        export_time(),
    );

    assert_eq!(document.page_breaks(), 2);
    for (index, section) in document.sections.iter().enumerate() {
        let breaks = matches!(section.blocks.last(), Some(Block::PageBreak));
        assert_eq!(breaks, index == 4 || index == 9, "section {index}");
    }
    assert_eq!(document.metadata_value("Total Steps"), Some("12 actions"));
    assert_eq!(
        document.metadata_value("Source URL"),
        Some("https://shop.example/checkout")
    );
}
