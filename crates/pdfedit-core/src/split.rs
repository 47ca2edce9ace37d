//! PDF split
//!
//! Extracts pages from a PDF by deleting every other page from a copy and
//! pruning whatever is no longer referenced.

use crate::error::{PdfEditError, Result};
use crate::page::{load, save};
use lopdf::Document;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

/// One page written out as its own document
#[derive(Debug, Clone, Serialize)]
pub struct SplitPart {
    pub filename: String,
    pub page_number: u32,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Keep only `pages` (1-based, already validated) of `doc`
fn extract_pages(doc: &Document, pages: &[u32]) -> Result<Vec<u8>> {
    let page_count = doc.get_pages().len() as u32;
    let pages_to_keep: HashSet<u32> = pages.iter().copied().collect();
    let pages_to_delete: Vec<u32> = (1..=page_count)
        .rev()
        .filter(|p| !pages_to_keep.contains(p))
        .collect();

    let mut new_doc = doc.clone();
    new_doc.delete_pages(&pages_to_delete);
    new_doc.prune_objects();
    new_doc.compress();
    save(&mut new_doc)
}

/// Split a PDF, extracting only the specified pages (1-indexed)
pub fn split_document(bytes: &[u8], pages: Vec<u32>) -> Result<Vec<u8>> {
    if pages.is_empty() {
        return Err(PdfEditError::Validation("No pages specified".into()));
    }
    if pages.contains(&0) {
        return Err(PdfEditError::Validation("Page numbers must be >= 1".into()));
    }

    let doc = load(bytes)?;
    let page_count = doc.get_pages().len() as u32;
    if let Some(&page) = pages.iter().find(|&&p| p > page_count) {
        return Err(PdfEditError::Validation(format!(
            "Page {} does not exist (document has {} pages)",
            page, page_count
        )));
    }
    extract_pages(&doc, &pages)
}

/// Write every page of a multi-page PDF as its own document,
/// named `<base_name>_page_<n>.pdf`
pub fn split_each_page(bytes: &[u8], base_name: &str) -> Result<Vec<SplitPart>> {
    let doc = load(bytes)?;
    let page_count = doc.get_pages().len() as u32;
    if page_count <= 1 {
        return Err(PdfEditError::Validation(
            "PDF must have more than 1 page to split".into(),
        ));
    }

    let mut parts = Vec::with_capacity(page_count as usize);
    for page_number in 1..=page_count {
        let bytes = extract_pages(&doc, &[page_number])?;
        debug!(page = page_number, size = bytes.len(), "split page");
        parts.push(SplitPart {
            filename: format!("{}_page_{}.pdf", base_name, page_number),
            page_number,
            bytes,
        });
    }
    info!(pages = page_count, "split document into single pages");
    Ok(parts)
}

/// Parse page range string like "1-3, 5, 8-10" into sorted unique page numbers
pub fn parse_ranges(input: &str) -> Result<Vec<u32>> {
    let mut pages = BTreeSet::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start
                .trim()
                .parse()
                .map_err(|_| PdfEditError::Validation(format!("Invalid start: {}", start)))?;
            let end: u32 = end
                .trim()
                .parse()
                .map_err(|_| PdfEditError::Validation(format!("Invalid end: {}", end)))?;

            if start > end {
                return Err(PdfEditError::Validation(format!(
                    "Start {} > end {}",
                    start, end
                )));
            }
            pages.extend(start..=end);
        } else {
            let page: u32 = part
                .parse()
                .map_err(|_| PdfEditError::Validation(format!("Invalid page: {}", part)))?;
            pages.insert(page);
        }
    }

    Ok(pages.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{content::Content, content::Operation, Dictionary, Object, Stream};
    use proptest::prelude::*;

    fn create_test_pdf(num_pages: u32) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let mut page_ids = Vec::new();
        for i in 0..num_pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new(
                        "Tf",
                        vec![Object::Name(b"F1".to_vec()), Object::Integer(12)],
                    ),
                    Operation::new("Td", vec![Object::Integer(100), Object::Integer(700)]),
                    Operation::new(
                        "Tj",
                        vec![Object::String(
                            format!("Page {}", i + 1).into_bytes(),
                            lopdf::StringFormat::Literal,
                        )],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));

            let page = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                (
                    "MediaBox",
                    Object::Array(vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(612),
                        Object::Integer(792),
                    ]),
                ),
                ("Contents", Object::Reference(content_id)),
            ]);
            page_ids.push(doc.add_object(page));
        }

        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(num_pages as i64)),
            (
                "Kids",
                Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
            ),
        ]);
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_split_empty_pages_fails() {
        let pdf = create_test_pdf(5);
        assert!(split_document(&pdf, vec![]).is_err());
    }

    #[test]
    fn test_split_extracts_multiple_pages() {
        let pdf = create_test_pdf(5);
        let result = split_document(&pdf, vec![1, 3, 5]).unwrap();
        let doc = Document::load_mem(&result).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn test_split_invalid_page_number_fails() {
        let pdf = create_test_pdf(5);
        let err = split_document(&pdf, vec![10]).unwrap_err();
        assert!(err.to_string().contains("Page 10 does not exist"));
        assert!(split_document(&pdf, vec![0]).is_err());
    }

    #[test]
    fn test_split_each_page_names_and_contents() {
        let pdf = create_test_pdf(3);
        let parts = split_each_page(&pdf, "report").unwrap();
        let names: Vec<&str> = parts.iter().map(|p| p.filename.as_str()).collect();
        assert_eq!(
            names,
            vec!["report_page_1.pdf", "report_page_2.pdf", "report_page_3.pdf"]
        );
        for part in &parts {
            let doc = Document::load_mem(&part.bytes).unwrap();
            let pages = doc.get_pages();
            assert_eq!(pages.len(), 1);
            let content = crate::page::raw_content(&doc, pages[&1]).unwrap();
            let expected = format!("(Page {})", part.page_number);
            assert!(String::from_utf8_lossy(&content).contains(&expected));
        }
    }

    #[test]
    fn test_single_page_document_cannot_be_split() {
        let err = split_each_page(&create_test_pdf(1), "single").unwrap_err();
        assert!(err.to_string().contains("more than 1 page"));
    }

    #[test]
    fn test_parse_ranges() {
        assert_eq!(parse_ranges("1-3, 5, 8-10").unwrap(), vec![1, 2, 3, 5, 8, 9, 10]);
        assert_eq!(parse_ranges("3, 1, 3").unwrap(), vec![1, 3]);
        assert_eq!(parse_ranges("").unwrap(), Vec::<u32>::new());
        assert!(parse_ranges("5-2").is_err());
        assert!(parse_ranges("a").is_err());
    }

    proptest! {
        #[test]
        fn prop_ranges_are_sorted_and_unique(a in 1u32..50, b in 1u32..50, c in 1u32..50) {
            let (lo, hi) = (a.min(b), a.max(b));
            let pages = parse_ranges(&format!("{}-{}, {}", lo, hi, c)).unwrap();
            prop_assert!(pages.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(pages.contains(&c));
            prop_assert_eq!(pages.first().copied(), Some(lo.min(c)));
        }
    }
}
