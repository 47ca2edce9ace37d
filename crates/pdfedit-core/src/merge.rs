//! PDF merge
//!
//! Appends the pages of several documents, in input order, to the first one.

use crate::error::{PdfEditError, Result};
use crate::page::{inherited, save};
use lopdf::{Document, Object, ObjectId};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Page attributes a page may inherit from its ancestors
const INHERITABLE: [&str; 4] = ["MediaBox", "CropBox", "Resources", "Rotate"];

/// A named document to merge; the name decides whether it is accepted
#[derive(Debug, Clone)]
pub struct MergeInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl MergeInput {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    fn is_pdf(&self) -> bool {
        self.name.to_ascii_lowercase().ends_with(".pdf")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeReport {
    pub file_count: usize,
    pub page_count: usize,
    /// Inputs that were not PDFs
    pub skipped: Vec<String>,
}

/// Merge `inputs` into one document
///
/// The algorithm:
/// 1. Reject fewer than two inputs, then drop inputs not named `*.pdf`
/// 2. Load each document and copy inherited page attributes onto the pages
/// 3. Shift every source object id past the destination's highest id
/// 4. Append the shifted pages to the destination page list
/// 5. Rebuild a flat page tree, prune orphans, compress and save
pub fn merge_documents(inputs: Vec<MergeInput>) -> Result<(Vec<u8>, MergeReport)> {
    if inputs.len() < 2 {
        return Err(PdfEditError::Validation(
            "At least 2 PDF files are required for merging".into(),
        ));
    }

    let (accepted, rejected): (Vec<MergeInput>, Vec<MergeInput>) =
        inputs.into_iter().partition(MergeInput::is_pdf);
    let skipped: Vec<String> = rejected.into_iter().map(|input| input.name).collect();
    for name in &skipped {
        warn!(name = %name, "skipping non-PDF merge input");
    }
    if accepted.is_empty() {
        return Err(PdfEditError::Validation("No PDF files to merge".into()));
    }

    let mut loaded_docs = Vec::with_capacity(accepted.len());
    for input in &accepted {
        let mut doc = Document::load_mem(&input.bytes).map_err(|e| {
            PdfEditError::ParseError(format!("Failed to load {}: {}", input.name, e))
        })?;
        materialize_inherited(&mut doc);
        loaded_docs.push(doc);
    }
    let file_count = loaded_docs.len();

    let mut dest = loaded_docs.remove(0);
    let mut dest_max_id = dest.max_id;
    let mut dest_page_refs: Vec<ObjectId> = dest.get_pages().into_values().collect();

    for source in loaded_docs {
        let source_pages: Vec<ObjectId> = source.get_pages().into_values().collect();
        let id_offset = dest_max_id;

        for (old_id, object) in source.objects {
            let new_id = (old_id.0 + id_offset, old_id.1);
            dest.objects.insert(new_id, remap_object_refs(object, id_offset));
        }
        dest_page_refs.extend(
            source_pages
                .into_iter()
                .map(|(id, generation)| (id + id_offset, generation)),
        );
        dest_max_id = (source.max_id + id_offset).max(dest_max_id);
        debug!(pages = dest_page_refs.len(), "appended document");
    }
    dest.max_id = dest_max_id;

    update_page_tree(&mut dest, &dest_page_refs)?;
    dest.prune_objects();
    dest.compress();

    let output = save(&mut dest)?;
    let report = MergeReport {
        file_count,
        page_count: dest_page_refs.len(),
        skipped,
    };
    info!(
        files = report.file_count,
        pages = report.page_count,
        "merged documents"
    );
    Ok((output, report))
}

/// Copy inherited attributes onto every page so pages survive leaving
/// their original page tree
fn materialize_inherited(doc: &mut Document) {
    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for page_id in pages {
        let mut missing = Vec::new();
        if let Ok(dict) = doc.get_object(page_id).and_then(|o| o.as_dict()) {
            for key in INHERITABLE {
                if dict.has(key.as_bytes()) {
                    continue;
                }
                if let Some(value) = inherited(doc, page_id, key.as_bytes()) {
                    missing.push((key, value.clone()));
                }
            }
        }
        if missing.is_empty() {
            continue;
        }
        if let Ok(dict) = doc.get_object_mut(page_id).and_then(|o| o.as_dict_mut()) {
            for (key, value) in missing {
                dict.set(key, value);
            }
        }
    }
}

/// Recursively remap object references in an object
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = remap_object_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = remap_object_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

/// Point the root page tree at `page_refs` and every page back at the root
fn update_page_tree(doc: &mut Document, page_refs: &[ObjectId]) -> Result<()> {
    let pages_id = doc
        .catalog()
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(|pages| pages.as_reference())
        .map_err(|e| PdfEditError::OperationError(format!("No page tree: {}", e)))?;

    match doc.objects.get_mut(&pages_id) {
        Some(Object::Dictionary(pages_dict)) => {
            let kids = page_refs.iter().map(|&id| Object::Reference(id)).collect();
            pages_dict.set("Kids", Object::Array(kids));
            pages_dict.set("Count", Object::Integer(page_refs.len() as i64));
        }
        _ => {
            return Err(PdfEditError::OperationError(
                "Invalid pages dictionary".into(),
            ))
        }
    }

    for &page_id in page_refs {
        if let Some(Object::Dictionary(page)) = doc.objects.get_mut(&page_id) {
            page.set("Parent", Object::Reference(pages_id));
        }
    }
    Ok(())
}
