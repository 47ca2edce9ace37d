//! Edit records submitted against a document, and their per-record outcomes

use crate::error::{PdfEditError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

fn first_page() -> u32 {
    1
}

/// One user edit. Pages are 1-based; `image_id` is the image's draw ordinal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EditRecord {
    Text {
        #[serde(default = "first_page")]
        page: u32,
        #[serde(default)]
        old_text: String,
        #[serde(default)]
        new_text: String,
    },
    Image {
        #[serde(default = "first_page")]
        page: u32,
        #[serde(default)]
        image_id: u32,
        /// Base64, optionally as a data URL
        #[serde(default)]
        image_data: String,
    },
}

impl EditRecord {
    pub fn page(&self) -> u32 {
        match self {
            EditRecord::Text { page, .. } | EditRecord::Image { page, .. } => *page,
        }
    }
}

/// Why a record was not applied
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("required field is empty: {0}")]
    EmptyField(String),

    #[error("page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("image {image_id} out of range (page has {count} images)")]
    ImageOrdinalOutOfRange { image_id: u32, count: u32 },

    #[error("invalid image data: {0}")]
    InvalidImage(String),

    #[error("invalid edit record: {0}")]
    InvalidRecord(String),

    #[error("element has no area left inside the page")]
    EmptyArea,

    #[error("edit failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditOutcome {
    TextReplaced { occurrences: usize },
    ImageReplaced { object_id: (u32, u16) },
}

/// Serializable view of one record's result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordStatus {
    Applied { index: usize, outcome: EditOutcome },
    Skipped { index: usize, reason: SkipReason },
}

/// Results of an edit batch, in submission order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditReport {
    pub results: Vec<std::result::Result<EditOutcome, SkipReason>>,
}

impl EditReport {
    pub fn applied(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn skipped(&self) -> usize {
        self.results.iter().filter(|r| r.is_err()).count()
    }

    pub fn statuses(&self) -> Vec<RecordStatus> {
        self.results
            .iter()
            .enumerate()
            .map(|(index, result)| match result {
                Ok(outcome) => RecordStatus::Applied {
                    index,
                    outcome: outcome.clone(),
                },
                Err(reason) => RecordStatus::Skipped {
                    index,
                    reason: reason.clone(),
                },
            })
            .collect()
    }
}

/// Records parsed from a request body; malformed entries are kept as rejections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedEdits {
    pub records: Vec<std::result::Result<EditRecord, SkipReason>>,
}

impl ParsedEdits {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn valid(&self) -> impl Iterator<Item = &EditRecord> {
        self.records.iter().filter_map(|r| r.as_ref().ok())
    }
}

/// Parse either a JSON array of records or an object with an `edits` array.
/// Entries that are not valid records are returned as `InvalidRecord`.
pub fn parse_edit_records(json: &str) -> Result<ParsedEdits> {
    let value: Value = serde_json::from_str(json)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("edits") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(PdfEditError::Validation(
                    "\"edits\" must be an array".to_string(),
                ))
            }
        },
        _ => {
            return Err(PdfEditError::Validation(
                "edit records must be a JSON array".to_string(),
            ))
        }
    };

    let records = items
        .into_iter()
        .map(|item| {
            serde_json::from_value::<EditRecord>(item)
                .map_err(|e| SkipReason::InvalidRecord(e.to_string()))
        })
        .collect();
    Ok(ParsedEdits { records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_tagged_records() {
        let json = r#"[
            {"type": "text", "page": 2, "old_text": "Hello", "new_text": "Bye"},
            {"type": "image", "page": 1, "image_id": 3, "image_data": "data:image/png;base64,AAAA"}
        ]"#;
        let parsed = parse_edit_records(json).unwrap();
        let records: Vec<_> = parsed.valid().cloned().collect();
        assert_eq!(
            records,
            vec![
                EditRecord::Text {
                    page: 2,
                    old_text: "Hello".to_string(),
                    new_text: "Bye".to_string(),
                },
                EditRecord::Image {
                    page: 1,
                    image_id: 3,
                    image_data: "data:image/png;base64,AAAA".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_request_body_with_edits_key() {
        let parsed = parse_edit_records(r#"{"edits": [{"type": "text", "new_text": "x"}]}"#)
            .unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.valid().next().map(EditRecord::page), Some(1));
    }

    #[test]
    fn test_unknown_type_is_rejected_not_fatal() {
        let parsed =
            parse_edit_records(r#"[{"type": "shape"}, 5, {"type": "text", "page": 1}]"#).unwrap();
        assert_eq!(parsed.records.len(), 3);
        assert!(matches!(parsed.records[0], Err(SkipReason::InvalidRecord(_))));
        assert!(matches!(parsed.records[1], Err(SkipReason::InvalidRecord(_))));
        assert!(parsed.records[2].is_ok());
    }

    #[test]
    fn test_empty_body() {
        assert!(parse_edit_records("{}").unwrap().is_empty());
        assert!(parse_edit_records("not json").is_err());
    }

    #[test]
    fn test_report_statuses_serialize() {
        let report = EditReport {
            results: vec![
                Ok(EditOutcome::TextReplaced { occurrences: 2 }),
                Err(SkipReason::PageOutOfRange {
                    page: 9,
                    page_count: 1,
                }),
            ],
        };
        assert_eq!(report.applied(), 1);
        assert_eq!(report.skipped(), 1);
        let json = serde_json::to_value(report.statuses()).unwrap();
        assert_eq!(json[0]["status"], "applied");
        assert_eq!(json[0]["outcome"]["occurrences"], 2);
        assert_eq!(json[1]["reason"]["reason"], "page_out_of_range");
        assert_eq!(json[1]["reason"]["detail"]["page"], 9);
    }
}
