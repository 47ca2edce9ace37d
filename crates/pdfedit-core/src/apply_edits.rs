//! Apply edit records to PDF documents
//!
//! Text edits remove the matched glyphs from the page's content stream
//! (their advance is kept as TJ kerning so the rest of the line does not
//! move), paint a white cover over each match and write the replacement in a
//! standard font. Image edits overwrite the drawn image object in place.

use crate::config::EditorConfig;
use crate::content::{interpret_page, GlyphSource, PageLayout};
use crate::edits::{EditOutcome, EditRecord, EditReport, SkipReason};
use crate::error::{PdfEditError, Result};
use crate::fonts::{encode_win_ansi, FontStyle};
use crate::geometry::Rect;
use crate::page::{
    add_standard_font, encode_ops, load, lookup_page, number, real, save, set_content_bytes,
};
use crate::raster::{decode_payload, image_xobject, replace_image};
use lopdf::content::Operation;
use lopdf::{Document, Object, ObjectId, StringFormat};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Apply `records` in order to a copy of the document in `pdf_bytes`
pub fn apply_edits(
    pdf_bytes: &[u8],
    records: &[EditRecord],
    config: &EditorConfig,
) -> Result<(Vec<u8>, EditReport)> {
    if records.is_empty() {
        return Err(PdfEditError::Validation("No edits to save".to_string()));
    }
    let mut doc = load(pdf_bytes)?;
    let report = apply_edits_to_document(&mut doc, records, config);
    let output = save(&mut doc)?;

    info!(
        applied = report.applied(),
        skipped = report.skipped(),
        "applied edit records"
    );
    Ok((output, report))
}

/// Apply `records` to an open document. Each record succeeds or is skipped
/// on its own; a skipped record never stops the batch.
pub fn apply_edits_to_document(
    doc: &mut Document,
    records: &[EditRecord],
    config: &EditorConfig,
) -> EditReport {
    let mut report = EditReport::default();
    for (index, record) in records.iter().enumerate() {
        let result = apply_record(doc, record, config);
        match &result {
            Ok(outcome) => debug!(index, ?outcome, "edit applied"),
            Err(reason) => warn!(index, page = record.page(), %reason, "skipping edit"),
        }
        report.results.push(result);
    }
    report
}

fn apply_record(
    doc: &mut Document,
    record: &EditRecord,
    config: &EditorConfig,
) -> std::result::Result<EditOutcome, SkipReason> {
    let page_count = doc.get_pages().len() as u32;
    let page = record.page();
    if page == 0 || page > page_count {
        return Err(SkipReason::PageOutOfRange { page, page_count });
    }
    let page_id = lookup_page(doc, page).map_err(|e| SkipReason::Failed(e.to_string()))?;

    match record {
        EditRecord::Text {
            old_text, new_text, ..
        } => {
            if old_text.is_empty() {
                return Err(SkipReason::EmptyField("old_text".to_string()));
            }
            if new_text.is_empty() {
                return Err(SkipReason::EmptyField("new_text".to_string()));
            }
            replace_text(doc, page_id, old_text, new_text, config)
                .map(|occurrences| EditOutcome::TextReplaced { occurrences })
                .map_err(|e| SkipReason::Failed(e.to_string()))
        }
        EditRecord::Image {
            image_id,
            image_data,
            ..
        } => {
            if image_data.trim().is_empty() {
                return Err(SkipReason::EmptyField("image_data".to_string()));
            }
            let object_id = replace_image_draw(doc, page_id, *image_id, image_data)?;
            Ok(EditOutcome::ImageReplaced { object_id })
        }
    }
}

/// Rectangles (page space) covering every occurrence of `needle` inside a span
fn find_matches(layout: &PageLayout, needle: &str) -> Vec<Rect> {
    let mut rects = Vec::new();
    for span in layout.spans() {
        let ranges = span.glyph_ranges();
        for (start, _) in span.text.match_indices(needle) {
            let end = start + needle.len();
            let rect = span
                .glyphs
                .iter()
                .zip(&ranges)
                .filter(|(_, &(g0, g1))| g0 < end && g1 > start)
                .map(|(g, _)| g.bbox)
                .reduce(|a, b| a.union(&b));
            if let Some(rect) = rect {
                rects.push(rect);
            }
        }
    }
    rects
}

/// Top-level glyphs whose centre falls inside one of `rects`, with the
/// advance each one contributed
fn covered_glyphs(layout: &PageLayout, rects: &[Rect]) -> HashMap<GlyphSource, f64> {
    let mut covered = HashMap::new();
    for glyph in layout.spans().flat_map(|s| s.glyphs.iter()) {
        let Some(source) = glyph.source else {
            continue;
        };
        let (cx, cy) = glyph.bbox.center();
        if rects.iter().any(|r| r.contains_point(cx, cy)) {
            covered.insert(source, glyph.kern_equivalent);
        }
    }
    covered
}

fn push_adjustment(items: &mut Vec<Object>, adjust: f64) {
    if let Some(previous) = items.last().and_then(number) {
        items.pop();
        items.push(real(previous + adjust));
    } else {
        items.push(real(adjust));
    }
}

/// Rewrite one shown string without the removed codes
fn strip_codes(
    bytes: &[u8],
    format: StringFormat,
    removed: &[(usize, usize, f64)],
    items: &mut Vec<Object>,
) {
    let mut cursor = 0;
    for &(offset, len, kern) in removed {
        if offset < cursor || offset + len > bytes.len() {
            continue;
        }
        if offset > cursor {
            items.push(Object::String(bytes[cursor..offset].to_vec(), format));
        }
        push_adjustment(items, -kern);
        cursor = offset + len;
    }
    if cursor < bytes.len() {
        items.push(Object::String(bytes[cursor..].to_vec(), format));
    }
}

/// Replace a show operator with equivalent operators whose final TJ omits
/// the removed codes
fn rewrite_show(op: &Operation, removed: &HashMap<usize, Vec<(usize, usize, f64)>>) -> Vec<Operation> {
    let mut prefix = Vec::new();
    let shown: Vec<Object> = match op.operator.as_str() {
        "TJ" => match op.operands.first() {
            Some(Object::Array(items)) => items.clone(),
            _ => return vec![op.clone()],
        },
        "Tj" => op.operands.iter().take(1).cloned().collect(),
        "'" => {
            prefix.push(Operation::new("T*", vec![]));
            op.operands.iter().take(1).cloned().collect()
        }
        "\"" => {
            if op.operands.len() < 3 {
                return vec![op.clone()];
            }
            prefix.push(Operation::new("Tw", vec![op.operands[0].clone()]));
            prefix.push(Operation::new("Tc", vec![op.operands[1].clone()]));
            prefix.push(Operation::new("T*", vec![]));
            vec![op.operands[2].clone()]
        }
        _ => return vec![op.clone()],
    };

    let mut items = Vec::with_capacity(shown.len());
    for (element, item) in shown.into_iter().enumerate() {
        match (item, removed.get(&element)) {
            (Object::String(bytes, format), Some(codes)) => {
                strip_codes(&bytes, format, codes, &mut items)
            }
            (other, _) => {
                if let Some(adjust) = number(&other) {
                    push_adjustment(&mut items, adjust);
                } else {
                    items.push(other);
                }
            }
        }
    }
    prefix.push(Operation::new("TJ", vec![Object::Array(items)]));
    prefix
}

/// Replace every occurrence of `old_text` on the page; returns the count
fn replace_text(
    doc: &mut Document,
    page_id: ObjectId,
    old_text: &str,
    new_text: &str,
    config: &EditorConfig,
) -> Result<usize> {
    let (content, layout) = interpret_page(doc, page_id)?;
    let rects = find_matches(&layout, old_text);
    if rects.is_empty() {
        debug!(old_text, "no occurrences on page");
        return Ok(0);
    }

    // op index -> element -> removed codes, in byte order
    let mut removals: HashMap<usize, HashMap<usize, Vec<(usize, usize, f64)>>> = HashMap::new();
    for (source, kern) in covered_glyphs(&layout, &rects) {
        removals
            .entry(source.op_index)
            .or_default()
            .entry(source.element)
            .or_default()
            .push((source.offset, source.len, kern));
    }
    for codes in removals.values_mut().flat_map(|e| e.values_mut()) {
        codes.sort_by_key(|&(offset, _, _)| offset);
    }

    let mut operations = Vec::with_capacity(content.operations.len() + rects.len() * 12 + 2);
    operations.push(Operation::new("q", vec![]));
    for (op_index, op) in content.operations.iter().enumerate() {
        match removals.get(&op_index) {
            Some(removed) => operations.extend(rewrite_show(op, removed)),
            None => operations.push(op.clone()),
        }
    }
    operations.push(Operation::new("Q", vec![]));

    let style = FontStyle::new(Some(config.edit.font.as_str()), false, false);
    let font_name = add_standard_font(doc, page_id, style.standard_font_name())?;
    let encoded = encode_win_ansi(new_text);
    for rect in &rects {
        let (x, y) = layout.page.to_pdf(rect.x0, rect.y1);
        operations.extend([
            Operation::new("q", vec![]),
            Operation::new("g", vec![real(1.0)]),
            Operation::new(
                "re",
                vec![real(x), real(y), real(rect.width()), real(rect.height())],
            ),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(font_name.as_bytes().to_vec()),
                    real(config.edit.font_size),
                ],
            ),
            Operation::new("g", vec![real(0.0)]),
            Operation::new("Td", vec![real(x), real(y)]),
            Operation::new(
                "Tj",
                vec![Object::String(encoded.clone(), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
    }

    set_content_bytes(doc, page_id, encode_ops(operations)?)?;
    Ok(rects.len())
}

fn replace_image_draw(
    doc: &mut Document,
    page_id: ObjectId,
    image_id: u32,
    image_data: &str,
) -> std::result::Result<(u32, u16), SkipReason> {
    let (_, layout) = interpret_page(doc, page_id).map_err(|e| SkipReason::Failed(e.to_string()))?;
    let count = layout.images().count() as u32;
    let Some(target) = layout.images().find(|image| image.ordinal == image_id) else {
        return Err(SkipReason::ImageOrdinalOutOfRange { image_id, count });
    };
    let object_id = target.object_id;

    let bytes = decode_payload(image_data).map_err(|e| SkipReason::InvalidImage(e.to_string()))?;
    let image = image_xobject(&bytes).map_err(|e| SkipReason::InvalidImage(e.to_string()))?;
    debug!(image_id, ?object_id, width = image.width, height = image.height, "replacing image");
    replace_image(doc, object_id, image);
    Ok(object_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::raw_content;
    use lopdf::{dictionary, Stream};

    fn create_test_pdf(content: &[u8]) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0u8],
        ));
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => dictionary! { "Im1" => image_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    fn text_edit(old_text: &str, new_text: &str) -> EditRecord {
        EditRecord::Text {
            page: 1,
            old_text: old_text.to_string(),
            new_text: new_text.to_string(),
        }
    }

    fn page_text(bytes: &[u8]) -> String {
        let doc = load(bytes).unwrap();
        let page_id = lookup_page(&doc, 1).unwrap();
        let (_, layout) = interpret_page(&doc, page_id).unwrap();
        layout
            .spans()
            .map(|s| s.text.clone())
            .collect::<Vec<_>>()
            .join("|")
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let pdf = create_test_pdf(b"BT /F1 12 Tf 72 700 Td (Hello) Tj ET");
        let err = apply_edits(&pdf, &[], &EditorConfig::default()).unwrap_err();
        assert!(err.to_string().contains("No edits to save"));
    }

    #[test]
    fn test_replace_removes_glyphs_and_keeps_neighbours() {
        let pdf = create_test_pdf(b"BT /F1 10 Tf 72 700 Td (Hello World) Tj ET");
        let (output, report) = apply_edits(
            &pdf,
            &[text_edit("World", "There")],
            &EditorConfig::default(),
        )
        .unwrap();
        assert_eq!(report.results[0], Ok(EditOutcome::TextReplaced { occurrences: 1 }));

        let text = page_text(&output);
        assert!(!text.contains("World"));
        assert!(text.contains("There"));

        // "Hello " keeps its position: H at x = 72
        let doc = load(&output).unwrap();
        let page_id = lookup_page(&doc, 1).unwrap();
        let (_, layout) = interpret_page(&doc, page_id).unwrap();
        let hello = layout.spans().find(|s| s.text.starts_with("Hello")).unwrap();
        assert!((hello.bbox.x0 - 72.0).abs() < 1e-3);
    }

    #[test]
    fn test_every_occurrence_is_replaced() {
        let pdf = create_test_pdf(b"BT /F1 10 Tf 72 700 Td (ab ab) Tj 0 -20 Td [(a) (b)] TJ ET");
        let (output, report) =
            apply_edits(&pdf, &[text_edit("ab", "X")], &EditorConfig::default()).unwrap();
        assert_eq!(report.results[0], Ok(EditOutcome::TextReplaced { occurrences: 3 }));
        assert!(!page_text(&output).contains("ab"));
    }

    #[test]
    fn test_zero_matches_leave_content_unchanged() {
        let pdf = create_test_pdf(b"BT /F1 12 Tf 72 700 Td (Hello) Tj ET");
        let before = {
            let doc = load(&pdf).unwrap();
            raw_content(&doc, lookup_page(&doc, 1).unwrap()).unwrap()
        };
        let (output, report) =
            apply_edits(&pdf, &[text_edit("absent", "x")], &EditorConfig::default()).unwrap();
        assert_eq!(report.results[0], Ok(EditOutcome::TextReplaced { occurrences: 0 }));

        let doc = load(&output).unwrap();
        let after = raw_content(&doc, lookup_page(&doc, 1).unwrap()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_invalid_records_are_skipped_individually() {
        let pdf = create_test_pdf(b"BT /F1 12 Tf 72 700 Td (Hello) Tj ET q 10 0 0 10 0 0 cm /Im1 Do Q");
        let records = vec![
            text_edit("", "x"),
            EditRecord::Text {
                page: 4,
                old_text: "Hello".to_string(),
                new_text: "x".to_string(),
            },
            EditRecord::Image {
                page: 1,
                image_id: 2,
                image_data: "AAAA".to_string(),
            },
            EditRecord::Image {
                page: 1,
                image_id: 1,
                image_data: "data:image/png;base64,not-an-image".to_string(),
            },
            text_edit("Hello", "Bye"),
        ];
        let (_, report) = apply_edits(&pdf, &records, &EditorConfig::default()).unwrap();
        assert_eq!(
            report.results[0],
            Err(SkipReason::EmptyField("old_text".to_string()))
        );
        assert_eq!(
            report.results[1],
            Err(SkipReason::PageOutOfRange {
                page: 4,
                page_count: 1
            })
        );
        assert_eq!(
            report.results[2],
            Err(SkipReason::ImageOrdinalOutOfRange {
                image_id: 2,
                count: 1
            })
        );
        assert!(matches!(report.results[3], Err(SkipReason::InvalidImage(_))));
        assert_eq!(report.results[4], Ok(EditOutcome::TextReplaced { occurrences: 1 }));
        assert_eq!(report.applied(), 1);
    }

    #[test]
    fn test_strip_codes_merges_adjacent_adjustments() {
        let mut items = vec![Object::Integer(-100)];
        strip_codes(
            b"abc",
            StringFormat::Literal,
            &[(0, 1, 500.0), (1, 1, 250.0)],
            &mut items,
        );
        assert_eq!(items.len(), 2);
        assert_eq!(number(&items[0]), Some(-850.0));
        assert!(matches!(&items[1], Object::String(bytes, _) if bytes == b"c"));
    }
}
