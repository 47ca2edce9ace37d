//! Request-scoped operations over a storage context
//!
//! Each operation reads its inputs by id, runs one core transform on a
//! document it owns, writes its output as the last step and answers with an
//! [`OperationReport`]. Failures never leave partial output in storage.

use crate::apply_edits::apply_edits;
use crate::compress::{compress_document, CompressionLevel};
use crate::config::EditorConfig;
use crate::edits::{parse_edit_records, EditReport, RecordStatus};
use crate::error::{PdfEditError, Result};
use crate::extract::{
    extract_document, extract_images, extract_page, extract_text, DocumentMarkup,
    ExtractOptions, ExtractedImage, PageMarkup, SkippedPage,
};
use crate::geometry::Rect;
use crate::merge::{merge_documents, MergeInput};
use crate::overlay::{add_signature, add_watermark, OverlayReport, OverlaySpec, PageTarget};
use crate::page::{load, page_info, PageInfo};
use crate::reconstruct::reconstruct;
use crate::report::{OperationReport, ProcessMetrics};
use crate::split::split_each_page;
use crate::storage::Storage;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize)]
pub struct ExtractDetails {
    pub pages: Vec<PageMarkup>,
    pub skipped: Vec<SkippedPage>,
    /// All fragments in one document container
    pub html: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditDetails {
    pub output_id: String,
    pub applied: usize,
    pub skipped: usize,
    pub results: Vec<RecordStatus>,
    pub metrics: ProcessMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkupDetails {
    pub markup_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildDetails {
    pub output_id: String,
    pub page_count: usize,
    pub placed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverlayDetails {
    pub output_id: String,
    #[serde(flatten)]
    pub overlay: OverlayReport,
    pub metrics: ProcessMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeDetails {
    pub output_id: String,
    pub file_count: usize,
    pub page_count: usize,
    pub skipped: Vec<String>,
    pub metrics: ProcessMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitFile {
    pub filename: String,
    pub page_number: u32,
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitDetails {
    pub total_pages: u32,
    pub split_files: Vec<SplitFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompressDetails {
    pub output_id: String,
    pub original_size: usize,
    pub compressed_size: usize,
    pub compression_ratio: f64,
    pub compression_level: CompressionLevel,
    pub image_quality: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextDetails {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImagesDetails {
    pub total_images: usize,
    pub images: Vec<ExtractedImage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageCountDetails {
    pub page_count: usize,
    pub pages: Vec<PageInfo>,
}

/// Name part of a storage id (`<unique>_<name>`)
pub fn display_name(id: &str) -> &str {
    id.split_once('_').map(|(_, name)| name).unwrap_or(id)
}

fn base_name(id: &str) -> String {
    Path::new(display_name(id))
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

fn pdf_name(id: &str) -> String {
    format!("{}.pdf", base_name(id))
}

fn page_count_of(bytes: &[u8]) -> u32 {
    load(bytes).map(|doc| doc.get_pages().len() as u32).unwrap_or(0)
}

fn metrics(input: usize, output: &[u8], started: Instant) -> ProcessMetrics {
    ProcessMetrics {
        input_size_bytes: input,
        output_size_bytes: output.len(),
        page_count: page_count_of(output),
        processing_time_ms: started.elapsed().as_millis() as u64,
    }
}

pub struct Workspace<S: Storage> {
    storage: S,
    config: EditorConfig,
}

impl<S: Storage> Workspace<S> {
    pub fn new(storage: S, config: EditorConfig) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Store an uploaded document under a sanitized, `.pdf`-suffixed name
    pub fn upload(&self, filename: &str, bytes: &[u8]) -> Result<String> {
        let name = if filename.to_ascii_lowercase().ends_with(".pdf") {
            filename.to_string()
        } else {
            format!("{}.pdf", filename)
        };
        self.storage.write(&name, bytes)
    }

    /// Markup for one page, or for every page when `page` is `None`
    pub fn extract(
        &self,
        id: &str,
        page: Option<u32>,
        options: &ExtractOptions,
    ) -> OperationReport<ExtractDetails> {
        OperationReport::from_result(self.try_extract(id, page, options))
    }

    fn try_extract(
        &self,
        id: &str,
        page: Option<u32>,
        options: &ExtractOptions,
    ) -> Result<(String, ExtractDetails)> {
        let doc = load(&self.storage.read(id)?)?;
        let markup = match page {
            Some(n) => DocumentMarkup {
                pages: vec![extract_page(&doc, n, options, &self.config)?],
                skipped: Vec::new(),
            },
            None => extract_document(&doc, options, &self.config),
        };
        let message = format!("Extracted {} page(s)", markup.pages.len());
        let html = markup.html();
        Ok((
            message,
            ExtractDetails {
                pages: markup.pages,
                skipped: markup.skipped,
                html,
            },
        ))
    }

    /// Apply a JSON batch of edit records and store the edited copy
    pub fn apply_edits(&self, id: &str, edits_json: &str) -> OperationReport<EditDetails> {
        OperationReport::from_result(self.try_apply_edits(id, edits_json))
    }

    fn try_apply_edits(&self, id: &str, edits_json: &str) -> Result<(String, EditDetails)> {
        let started = Instant::now();
        let parsed = parse_edit_records(edits_json)?;
        if parsed.is_empty() {
            return Err(PdfEditError::Validation("No edits to save".to_string()));
        }
        let input = self.storage.read(id)?;

        let records: Vec<_> = parsed.valid().cloned().collect();
        let (output, applied) = if records.is_empty() {
            (input.clone(), EditReport::default())
        } else {
            apply_edits(&input, &records, &self.config)?
        };

        // re-interleave records rejected at parse time, keeping submission order
        let mut applied_results = applied.results.into_iter();
        let mut report = EditReport::default();
        for entry in &parsed.records {
            match entry {
                Ok(_) => {
                    if let Some(result) = applied_results.next() {
                        report.results.push(result);
                    }
                }
                Err(reason) => report.results.push(Err(reason.clone())),
            }
        }

        let output_id = self
            .storage
            .write(&format!("edited_{}", pdf_name(id)), &output)?;
        let details = EditDetails {
            output_id,
            applied: report.applied(),
            skipped: report.skipped(),
            results: report.statuses(),
            metrics: metrics(input.len(), &output, started),
        };
        info!(applied = details.applied, skipped = details.skipped, "edits saved");
        Ok(("Edits saved successfully".to_string(), details))
    }

    pub fn save_markup(&self, markup: &str, name_hint: &str) -> OperationReport<MarkupDetails> {
        let result = self
            .storage
            .write(&format!("{}.html", base_name(name_hint)), markup.as_bytes())
            .map(|markup_id| {
                (
                    "Markup saved successfully".to_string(),
                    MarkupDetails { markup_id },
                )
            });
        OperationReport::from_result(result)
    }

    pub fn load_markup(&self, markup_id: &str) -> Result<String> {
        let bytes = self.storage.read(markup_id)?;
        String::from_utf8(bytes)
            .map_err(|e| PdfEditError::Decode(format!("markup is not UTF-8: {}", e)))
    }

    /// Build a PDF from stored markup
    pub fn rebuild_from_markup(&self, markup_id: &str) -> OperationReport<RebuildDetails> {
        OperationReport::from_result(self.try_rebuild(markup_id))
    }

    fn try_rebuild(&self, markup_id: &str) -> Result<(String, RebuildDetails)> {
        let markup = self.load_markup(markup_id)?;
        let (output, report) = reconstruct(&markup, &self.config)?;
        let output_id = self.storage.write(&pdf_name(markup_id), &output)?;
        let details = RebuildDetails {
            output_id,
            page_count: report.pages.len(),
            placed: report.placed(),
            skipped: report.skipped(),
        };
        Ok(("PDF rebuilt from markup".to_string(), details))
    }

    pub fn add_signature(
        &self,
        id: &str,
        page: u32,
        rect: Rect,
        signature_data: &str,
    ) -> OperationReport<OverlayDetails> {
        let result = (|| -> Result<(String, OverlayDetails)> {
            let started = Instant::now();
            let input = self.storage.read(id)?;
            let (output, overlay) = add_signature(&input, page, rect, signature_data, &self.config)?;
            let output_id = self
                .storage
                .write(&format!("{}_signed.pdf", base_name(id)), &output)?;
            Ok((
                format!("Signature added successfully to page {}", page),
                OverlayDetails {
                    output_id,
                    overlay,
                    metrics: metrics(input.len(), &output, started),
                },
            ))
        })();
        OperationReport::from_result(result)
    }

    pub fn add_watermark(
        &self,
        id: &str,
        target: PageTarget,
        spec: &OverlaySpec,
    ) -> OperationReport<OverlayDetails> {
        let result = (|| -> Result<(String, OverlayDetails)> {
            let started = Instant::now();
            let input = self.storage.read(id)?;
            let (output, overlay) = add_watermark(&input, target, spec, &self.config)?;
            let output_id = self
                .storage
                .write(&format!("{}_watermarked.pdf", base_name(id)), &output)?;
            Ok((
                format!(
                    "Watermark added successfully to {} page(s)",
                    overlay.pages_overlaid
                ),
                OverlayDetails {
                    output_id,
                    overlay,
                    metrics: metrics(input.len(), &output, started),
                },
            ))
        })();
        OperationReport::from_result(result)
    }

    /// Merge stored documents in the given order; ids whose name is not a
    /// `.pdf` are skipped
    pub fn merge(&self, ids: &[&str]) -> OperationReport<MergeDetails> {
        OperationReport::from_result(self.try_merge(ids))
    }

    fn try_merge(&self, ids: &[&str]) -> Result<(String, MergeDetails)> {
        let started = Instant::now();
        if ids.len() < 2 {
            return Err(PdfEditError::Validation(
                "At least 2 PDF files are required for merging".into(),
            ));
        }
        let mut inputs = Vec::with_capacity(ids.len());
        for id in ids {
            let name = display_name(id);
            let bytes = if name.to_ascii_lowercase().ends_with(".pdf") {
                self.storage.read(id)?
            } else {
                Vec::new()
            };
            inputs.push(MergeInput::new(name, bytes));
        }
        let input_size = inputs.iter().map(|i| i.bytes.len()).sum();

        let (output, report) = merge_documents(inputs)?;
        let output_id = self.storage.write("merged.pdf", &output)?;
        Ok((
            format!("Successfully merged {} PDF files", report.file_count),
            MergeDetails {
                output_id,
                file_count: report.file_count,
                page_count: report.page_count,
                skipped: report.skipped,
                metrics: metrics(input_size, &output, started),
            },
        ))
    }

    /// Store every page as its own document
    pub fn split(&self, id: &str) -> OperationReport<SplitDetails> {
        OperationReport::from_result(self.try_split(id))
    }

    fn try_split(&self, id: &str) -> Result<(String, SplitDetails)> {
        let parts = split_each_page(&self.storage.read(id)?, &base_name(id))?;
        let total_pages = parts.len() as u32;

        let mut split_files = Vec::with_capacity(parts.len());
        for part in parts {
            match self.storage.write(&part.filename, &part.bytes) {
                Ok(stored) => split_files.push(SplitFile {
                    filename: part.filename,
                    page_number: part.page_number,
                    id: stored,
                }),
                Err(e) => {
                    // undo the pages already stored
                    for written in &split_files {
                        if let Err(cleanup) = self.storage.remove(&written.id) {
                            debug!(id = %written.id, error = %cleanup, "cleanup failed");
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok((
            format!("PDF split successfully into {} pages", total_pages),
            SplitDetails {
                total_pages,
                split_files,
            },
        ))
    }

    pub fn compress(&self, id: &str, level: CompressionLevel) -> OperationReport<CompressDetails> {
        let result = (|| -> Result<(String, CompressDetails)> {
            let (output, report) = compress_document(&self.storage.read(id)?, level)?;
            let output_id = self
                .storage
                .write(&format!("compressed_{}", pdf_name(id)), &output)?;
            Ok((
                "PDF compressed successfully".to_string(),
                CompressDetails {
                    output_id,
                    original_size: report.original_size,
                    compressed_size: report.compressed_size,
                    compression_ratio: report.compression_ratio,
                    compression_level: report.level,
                    image_quality: report.image_quality,
                },
            ))
        })();
        OperationReport::from_result(result)
    }

    pub fn extract_text(&self, id: &str) -> OperationReport<TextDetails> {
        let result = self.storage.read(id).and_then(|bytes| {
            let doc = load(&bytes)?;
            Ok((
                "Text extracted successfully".to_string(),
                TextDetails {
                    text: extract_text(&doc),
                },
            ))
        });
        OperationReport::from_result(result)
    }

    pub fn extract_images(&self, id: &str) -> OperationReport<ImagesDetails> {
        let result = self.storage.read(id).and_then(|bytes| {
            let images = extract_images(&load(&bytes)?);
            Ok((
                format!("Extracted {} images", images.len()),
                ImagesDetails {
                    total_images: images.len(),
                    images,
                },
            ))
        });
        OperationReport::from_result(result)
    }

    pub fn page_count(&self, id: &str) -> OperationReport<PageCountDetails> {
        let result = self.storage.read(id).and_then(|bytes| {
            let pages = page_info(&load(&bytes)?);
            Ok((
                format!("PDF has {} pages", pages.len()),
                PageCountDetails {
                    page_count: pages.len(),
                    pages,
                },
            ))
        });
        OperationReport::from_result(result)
    }
}
