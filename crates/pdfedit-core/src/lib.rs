//! PDF markup-overlay editing
//!
//! Pages are turned into positioned HTML-like markup, edited as text/image
//! records or as markup, and written back either by patching the original
//! content streams or by rebuilding a fresh document from the markup.
//!
//! - `extract`: page content into markup fragments
//! - `apply_edits`: text and image edit records applied in place
//! - `reconstruct`: new document from (possibly edited) markup
//! - `overlay`: watermark and signature stamps
//! - `merge` / `split` / `compress`: whole-document operations
//! - `workspace`: the above over a storage context, with status reports

pub mod apply_edits;
pub mod compress;
pub mod config;
pub mod content;
pub mod edits;
pub mod error;
pub mod extract;
pub mod fonts;
pub mod geometry;
pub mod markup;
pub mod merge;
pub mod overlay;
pub mod page;
pub mod raster;
pub mod reconstruct;
pub mod report;
pub mod split;
pub mod storage;
pub mod workspace;

pub use apply_edits::apply_edits;
pub use compress::{compress_document, CompressionLevel, CompressionReport};
pub use config::EditorConfig;
pub use edits::{parse_edit_records, EditRecord, EditReport, SkipReason};
pub use error::{ErrorKind, PdfEditError, Result};
pub use extract::{extract_document, extract_page, DocumentMarkup, ExtractOptions, PageMarkup};
pub use geometry::Rect;
pub use merge::{merge_documents, MergeInput, MergeReport};
pub use overlay::{add_signature, add_watermark, OverlaySpec, PageTarget};
pub use reconstruct::{reconstruct, ReconstructReport};
pub use report::{OperationReport, ProcessMetrics, Status};
pub use split::{parse_ranges, split_document, split_each_page, SplitPart};
pub use storage::{DirStorage, MemoryStorage, Storage};
pub use workspace::Workspace;

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32> {
    Ok(page::load(bytes)?.get_pages().len() as u32)
}
