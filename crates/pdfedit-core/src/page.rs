//! Page-level helpers shared by every writer
//!
//! Media box lookup with inheritance, resource registration and content
//! stream replacement.

use crate::error::{PdfEditError, Result};
use crate::geometry::PageBox;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use serde::Serialize;

/// US Letter, used when a page tree carries no MediaBox at all
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

const MAX_PARENT_DEPTH: usize = 32;

/// Information about a single PDF page
#[derive(Debug, Clone, Serialize)]
pub struct PageInfo {
    /// Page number (1-indexed)
    pub page_num: u32,
    /// Page width in points
    pub width: f64,
    /// Page height in points
    pub height: f64,
    /// Page rotation in degrees (0, 90, 180, 270)
    pub rotation: i64,
}

/// Follow indirect references until a direct object is reached
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    let mut current = obj;
    for _ in 0..MAX_PARENT_DEPTH {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(next) => current = next,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

pub fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(n) => Some(*n as f64),
        Object::Real(n) => Some(*n as f64),
        _ => None,
    }
}

pub fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

/// Decoded stream data; undecodable filters fall back to the raw bytes
pub fn stream_bytes(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

/// Resolve a 1-based page number
pub fn lookup_page(doc: &Document, page_num: u32) -> Result<ObjectId> {
    let pages = doc.get_pages();
    pages.get(&page_num).copied().ok_or_else(|| {
        PdfEditError::NotFound(format!(
            "Invalid page number. PDF has {} pages",
            pages.len()
        ))
    })
}

pub fn page_dict(doc: &Document, page_id: ObjectId) -> Result<&Dictionary> {
    doc.get_object(page_id)
        .and_then(|o| o.as_dict())
        .map_err(|e| PdfEditError::Extraction(format!("page {:?}: {}", page_id, e)))
}

/// Look up a page attribute, walking up the page tree for inheritable keys
pub fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(page_id);
    let mut depth = 0;
    while let Some(id) = current {
        if depth > MAX_PARENT_DEPTH {
            break;
        }
        let dict = doc.get_object(id).and_then(|o| o.as_dict()).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(resolve(doc, value));
        }
        current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
        depth += 1;
    }
    None
}

/// Parse a box array [x1, y1, x2, y2]
fn parse_box_array(array: &[Object]) -> Option<[f64; 4]> {
    if array.len() != 4 {
        return None;
    }
    let mut result = [0.0; 4];
    for (i, obj) in array.iter().enumerate() {
        result[i] = number(obj)?;
    }
    Some(result)
}

/// MediaBox of a page, inheriting from its ancestors if necessary
pub fn media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    inherited(doc, page_id, b"MediaBox")
        .and_then(|o| o.as_array().ok())
        .and_then(|arr| {
            let resolved: Vec<Object> = arr.iter().map(|o| resolve(doc, o).clone()).collect();
            parse_box_array(&resolved)
        })
        .unwrap_or(DEFAULT_MEDIA_BOX)
}

pub fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let [x0, y0, x1, y1] = media_box(doc, page_id);
    PageBox {
        llx: x0.min(x1),
        lly: y0.min(y1),
        width: (x1 - x0).abs(),
        height: (y1 - y0).abs(),
    }
}

/// Normalize rotation to 0, 90, 180, or 270
fn normalize_rotation(angle: i64) -> i64 {
    angle.rem_euclid(360)
}

pub fn page_info(doc: &Document) -> Vec<PageInfo> {
    doc.get_pages()
        .into_iter()
        .map(|(page_num, id)| {
            let page = page_box(doc, id);
            let rotation = inherited(doc, id, b"Rotate")
                .and_then(|o| o.as_i64().ok())
                .map(normalize_rotation)
                .unwrap_or(0);
            PageInfo {
                page_num,
                width: page.width,
                height: page.height,
                rotation,
            }
        })
        .collect()
}

/// Effective resources of a page, cloned and with sub-dictionaries resolved
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut resources = inherited(doc, page_id, b"Resources")
        .and_then(|o| o.as_dict().ok())
        .cloned()
        .unwrap_or_else(Dictionary::new);
    let keys: Vec<Vec<u8>> = resources.iter().map(|(k, _)| k.clone()).collect();
    for key in keys {
        let resolved = match resources.get(&key) {
            Ok(value @ Object::Reference(_)) => resolve(doc, value).clone(),
            _ => continue,
        };
        resources.set(key, resolved);
    }
    resources
}

/// Register `object` under a fresh name in the page's `category` resource
/// dictionary (`Font`, `XObject`, `ExtGState`) and return that name.
pub fn add_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    prefix: &str,
    object: Object,
) -> Result<String> {
    let mut resources = page_resources(doc, page_id);

    let mut entries = match resources.remove(category.as_bytes()) {
        Some(Object::Dictionary(dict)) => dict,
        _ => Dictionary::new(),
    };
    let name = (1..)
        .map(|n| format!("{}{}", prefix, n))
        .find(|candidate| !entries.has(candidate.as_bytes()))
        .unwrap_or_else(|| prefix.to_string());
    entries.set(name.clone(), object);
    resources.set(category, Object::Dictionary(entries));

    let page = doc
        .get_object_mut(page_id)
        .and_then(|o| o.as_dict_mut())
        .map_err(|e| PdfEditError::OperationError(e.to_string()))?;
    page.set("Resources", Object::Dictionary(resources));
    Ok(name)
}

/// Register a standard 14 font for text written by the editor
pub fn add_standard_font(doc: &mut Document, page_id: ObjectId, base_font: &str) -> Result<String> {
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => Object::Name(base_font.as_bytes().to_vec()),
        "Encoding" => "WinAnsiEncoding",
    });
    add_resource(doc, page_id, "Font", "FEd", Object::Reference(font_id))
}

/// Concatenated, decoded content of a page
pub fn raw_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>> {
    doc.get_page_content(page_id)
        .map_err(|e| PdfEditError::Extraction(format!("page content: {}", e)))
}

pub fn decode_content(doc: &Document, page_id: ObjectId) -> Result<Content> {
    let bytes = raw_content(doc, page_id)?;
    Content::decode(&bytes).map_err(|e| PdfEditError::Extraction(format!("content stream: {}", e)))
}

/// Replace the page's content with a single new stream
pub fn set_content_bytes(doc: &mut Document, page_id: ObjectId, bytes: Vec<u8>) -> Result<()> {
    let stream_id = doc.add_object(Stream::new(dictionary! {}, bytes));
    let page = doc
        .get_object_mut(page_id)
        .and_then(|o| o.as_dict_mut())
        .map_err(|e| PdfEditError::OperationError(e.to_string()))?;
    page.set("Contents", Object::Reference(stream_id));
    Ok(())
}

pub fn encode_ops(operations: Vec<Operation>) -> Result<Vec<u8>> {
    Content { operations }
        .encode()
        .map_err(|e| PdfEditError::OperationError(format!("encode content: {}", e)))
}

/// Draw `operations` on top of the existing page content.
/// The existing content is isolated in its own `q … Q` so its graphics state
/// cannot leak into the appended drawing.
pub fn append_content(doc: &mut Document, page_id: ObjectId, operations: Vec<Operation>) -> Result<()> {
    let existing = raw_content(doc, page_id).unwrap_or_default();
    let appended = encode_ops(operations)?;

    let mut bytes = Vec::with_capacity(existing.len() + appended.len() + 8);
    if !existing.is_empty() {
        bytes.extend_from_slice(b"q\n");
        bytes.extend_from_slice(&existing);
        bytes.extend_from_slice(b"\nQ\n");
    }
    bytes.extend_from_slice(&appended);
    set_content_bytes(doc, page_id, bytes)
}

pub fn save(doc: &mut Document) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| PdfEditError::OperationError(e.to_string()))?;
    Ok(output)
}

pub fn load(bytes: &[u8]) -> Result<Document> {
    Document::load_mem(bytes).map_err(|e| PdfEditError::ParseError(e.to_string()))
}
