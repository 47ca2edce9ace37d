mod common;

use common::{build_pdf, line, png_base64, span_texts};
use pdfedit_core::edits::{EditOutcome, RecordStatus};
use pdfedit_core::page::{load, lookup_page, raw_content};
use pdfedit_core::{apply_edits, parse_edit_records, EditRecord, EditorConfig, SkipReason};

fn letter() -> Vec<u8> {
    build_pdf(vec![(
        vec![line("Hello World", 72, 700), line("Regards", 72, 650)],
        true,
    )])
}

fn records(json: &str) -> Vec<EditRecord> {
    parse_edit_records(json).unwrap().valid().cloned().collect()
}

#[test]
fn text_edit_replaces_only_the_match() {
    let pdf = letter();
    let edits = records(
        r#"[{"type": "text", "page": 1, "old_text": "World", "new_text": "There"}]"#,
    );
    let (output, report) = apply_edits(&pdf, &edits, &EditorConfig::default()).unwrap();

    assert_eq!(report.applied(), 1);
    assert!(matches!(
        report.results[0],
        Ok(EditOutcome::TextReplaced { occurrences: 1 })
    ));

    let texts = span_texts(&output, 1).join("|");
    assert!(texts.contains("Hello"));
    assert!(texts.contains("There"));
    assert!(texts.contains("Regards"));
    assert!(!texts.contains("World"));
}

#[test]
fn edit_without_match_leaves_text_alone() {
    let pdf = letter();
    let edits = records(
        r#"{"edits": [{"type": "text", "old_text": "Goodbye", "new_text": "Hi"}]}"#,
    );
    let (output, report) = apply_edits(&pdf, &edits, &EditorConfig::default()).unwrap();

    assert!(matches!(
        report.results[0],
        Ok(EditOutcome::TextReplaced { occurrences: 0 })
    ));
    assert_eq!(span_texts(&output, 1), span_texts(&pdf, 1));
}

#[test]
fn image_ordinal_past_the_page_is_skipped() {
    let pdf = letter();
    let json = format!(
        r#"[
            {{"type": "image", "page": 1, "image_id": 4, "image_data": "{png}"}},
            {{"type": "image", "page": 1, "image_id": 1, "image_data": "data:image/png;base64,{png}"}}
        ]"#,
        png = png_base64(3, 3)
    );
    let (output, report) = apply_edits(&pdf, &records(&json), &EditorConfig::default()).unwrap();

    assert_eq!(
        report.results[0],
        Err(SkipReason::ImageOrdinalOutOfRange {
            image_id: 4,
            count: 1
        })
    );
    assert!(matches!(
        report.results[1],
        Ok(EditOutcome::ImageReplaced { .. })
    ));

    // the draw still references the same name
    let doc = load(&output).unwrap();
    let content = raw_content(&doc, lookup_page(&doc, 1).unwrap()).unwrap();
    assert!(String::from_utf8_lossy(&content).contains("/Im1 Do"));
}

#[test]
fn skipped_records_are_reported_in_order() {
    let pdf = letter();
    let edits = records(
        r#"[
            {"type": "text", "page": 9, "old_text": "Hello", "new_text": "Hi"},
            {"type": "text", "page": 1, "old_text": "", "new_text": "Hi"},
            {"type": "text", "page": 1, "old_text": "Regards", "new_text": "Cheers"}
        ]"#,
    );
    let (_, report) = apply_edits(&pdf, &edits, &EditorConfig::default()).unwrap();

    let statuses = report.statuses();
    assert!(matches!(
        statuses[0],
        RecordStatus::Skipped {
            index: 0,
            reason: SkipReason::PageOutOfRange {
                page: 9,
                page_count: 1
            }
        }
    ));
    assert!(matches!(statuses[1], RecordStatus::Skipped { index: 1, .. }));
    assert!(matches!(statuses[2], RecordStatus::Applied { index: 2, .. }));
}
