//! Page structural extraction
//!
//! Turns each page's text spans and image draws into a positioned markup
//! fragment on a bounded-width canvas. Read-only: the document is never
//! modified.

use crate::config::EditorConfig;
use crate::content::{interpret_page, Block, PageLayout, TextBlock};
use crate::error::Result;
use crate::fonts::{FLAG_BOLD, FLAG_ITALIC};
use crate::geometry::fit_to_width;
use crate::markup::{image_element, page_open, text_element, TextMarkup};
use crate::page::lookup_page;
use crate::raster::{encode_png, image_from_stream, load_image};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use lopdf::Document;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExtractOptions {
    /// Canvas width pages are fitted to; the configured editor width when `None`
    pub canvas_width: Option<f64>,
}

/// Markup fragment for one page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageMarkup {
    pub page: u32,
    pub html: String,
    /// Pixel size of the fragment
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPage {
    pub page: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentMarkup {
    pub pages: Vec<PageMarkup>,
    pub skipped: Vec<SkippedPage>,
}

impl DocumentMarkup {
    /// All page fragments in one document container
    pub fn html(&self) -> String {
        let mut html = String::from("<div class=\"pdf-document\">\n");
        for page in &self.pages {
            html.push_str(&page.html);
            html.push('\n');
        }
        html.push_str("</div>\n");
        html
    }
}

/// One embedded image as returned by [`extract_images`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedImage {
    pub page: u32,
    pub image_index: u32,
    pub width: u32,
    pub height: u32,
    /// Base64 PNG
    pub data: String,
}

fn text_block_html(block: &TextBlock, scale: f64, html: &mut String) {
    let mut lines = Vec::new();
    for line in &block.lines {
        let spans: Vec<String> = line
            .spans
            .iter()
            .filter(|span| !span.text.trim().is_empty())
            .map(|span| {
                text_element(&TextMarkup {
                    text: &span.text,
                    left: span.bbox.x0 * scale,
                    top: span.bbox.y0 * scale,
                    font_size: span.size * scale,
                    font_family: &span.font,
                    bold: span.flags & FLAG_BOLD != 0,
                    italic: span.flags & FLAG_ITALIC != 0,
                })
            })
            .collect();
        if !spans.is_empty() {
            lines.push(format!("<div class=\"text-line\">{}</div>", spans.concat()));
        }
    }
    if !lines.is_empty() {
        html.push_str("<div class=\"text-block\">");
        html.push_str(&lines.concat());
        html.push_str("</div>");
    }
}

fn render_page(doc: &Document, page_num: u32, layout: &PageLayout, canvas_width: f64) -> PageMarkup {
    let fit = fit_to_width(layout.page.width, layout.page.height, canvas_width);
    let mut html = page_open(page_num, fit.width, fit.height, fit.scale);

    for block in &layout.blocks {
        match block {
            Block::Text(text) => text_block_html(text, fit.scale, &mut html),
            Block::Image(image) => {
                let src = match image_from_stream(doc, image.object_id) {
                    Some(encoded) => encoded.data_url(),
                    None => {
                        debug!(page = page_num, ordinal = image.ordinal, "image without decodable raster");
                        String::new()
                    }
                };
                let bbox = image.bbox.scaled(fit.scale);
                html.push_str(&image_element(
                    image.ordinal,
                    &src,
                    bbox.x0,
                    bbox.y0,
                    bbox.width(),
                    bbox.height(),
                ));
            }
        }
    }
    html.push_str("</div>");

    PageMarkup {
        page: page_num,
        html,
        width: fit.width,
        height: fit.height,
        scale: fit.scale,
    }
}

/// Extract one page (1-based) into markup
pub fn extract_page(
    doc: &Document,
    page_num: u32,
    options: &ExtractOptions,
    config: &EditorConfig,
) -> Result<PageMarkup> {
    let page_id = lookup_page(doc, page_num)?;
    let (_, layout) = interpret_page(doc, page_id)?;
    let canvas_width = options.canvas_width.unwrap_or(config.canvas.width);
    Ok(render_page(doc, page_num, &layout, canvas_width))
}

/// Extract every page; pages that fail are skipped and reported
pub fn extract_document(
    doc: &Document,
    options: &ExtractOptions,
    config: &EditorConfig,
) -> DocumentMarkup {
    let mut markup = DocumentMarkup::default();
    for page_num in doc.get_pages().keys().copied() {
        match extract_page(doc, page_num, options, config) {
            Ok(page) => markup.pages.push(page),
            Err(e) => {
                warn!(page = page_num, error = %e, "skipping page during extraction");
                markup.skipped.push(SkippedPage {
                    page: page_num,
                    reason: e.to_string(),
                });
            }
        }
    }
    info!(
        pages = markup.pages.len(),
        skipped = markup.skipped.len(),
        "extracted document markup"
    );
    markup
}

fn layout_text(layout: &PageLayout) -> String {
    let mut out = String::new();
    for block in &layout.blocks {
        let Block::Text(text) = block else {
            continue;
        };
        for line in &text.lines {
            let joined: Vec<&str> = line.spans.iter().map(|s| s.text.as_str()).collect();
            out.push_str(&joined.join(" "));
            out.push('\n');
        }
    }
    out
}

/// Plain text of every page that has any, under `--- Page N ---` headers
pub fn extract_text(doc: &Document) -> String {
    let mut extracted = String::new();
    for (page_num, page_id) in doc.get_pages() {
        let text = match interpret_page(doc, page_id) {
            Ok((_, layout)) => layout_text(&layout),
            Err(e) => {
                warn!(page = page_num, error = %e, "skipping page during text extraction");
                continue;
            }
        };
        if text.trim().is_empty() {
            continue;
        }
        extracted.push_str(&format!("--- Page {} ---\n", page_num));
        extracted.push_str(&text);
        extracted.push_str("\n\n");
    }
    extracted
}

/// Every distinct image on every page, re-encoded as PNG
pub fn extract_images(doc: &Document) -> Vec<ExtractedImage> {
    let mut images = Vec::new();
    for (page_num, page_id) in doc.get_pages() {
        let layout = match interpret_page(doc, page_id) {
            Ok((_, layout)) => layout,
            Err(e) => {
                warn!(page = page_num, error = %e, "skipping page during image extraction");
                continue;
            }
        };
        let mut seen = HashSet::new();
        let mut index = 0;
        for image in layout.images() {
            if !seen.insert(image.object_id) {
                continue;
            }
            index += 1;
            let Some(encoded) = image_from_stream(doc, image.object_id) else {
                debug!(page = page_num, index, "image encoding not supported");
                continue;
            };
            let png = if encoded.mime == "image/png" {
                encoded.data
            } else {
                match load_image(&encoded.data).and_then(|img| encode_png(&img)) {
                    Ok(png) => png,
                    Err(e) => {
                        warn!(page = page_num, index, error = %e, "image could not be converted");
                        continue;
                    }
                }
            };
            images.push(ExtractedImage {
                page: page_num,
                image_index: index,
                width: encoded.width,
                height: encoded.height,
                data: BASE64.encode(&png),
            });
        }
    }
    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object, Stream};

    fn wide_page_doc() -> Document {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Times-Italic",
        });
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            b"BT /F1 20 Tf 100 900 Td (A<B) Tj ET BT /F1 20 Tf 100 800 Td (   ) Tj ET".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 1600.into(), 1000.into()],
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
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
        doc
    }

    #[test]
    fn test_wide_page_is_scaled_to_canvas() {
        let doc = wide_page_doc();
        let page = extract_page(&doc, 1, &ExtractOptions::default(), &EditorConfig::default())
            .unwrap();
        assert_eq!(page.scale, 0.5);
        assert_eq!((page.width, page.height), (800.0, 500.0));
        assert!(page.html.contains("data-width=\"800\""));
        // x0 = 100 * 0.5, font size 20 * 0.5
        assert!(page.html.contains("left: 50px;"));
        assert!(page.html.contains("font-size: 10px;"));
        assert!(page.html.contains("font-style: italic;"));
        assert!(page.html.contains("data-text=\"A&lt;B\""));
    }

    #[test]
    fn test_blank_spans_are_not_emitted() {
        let doc = wide_page_doc();
        let page = extract_page(&doc, 1, &ExtractOptions::default(), &EditorConfig::default())
            .unwrap();
        assert_eq!(page.html.matches("editable-text").count(), 1);
    }

    #[test]
    fn test_out_of_range_page_is_not_found() {
        let doc = wide_page_doc();
        let err = extract_page(&doc, 3, &ExtractOptions::default(), &EditorConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn test_extract_text_headers() {
        let doc = wide_page_doc();
        let text = extract_text(&doc);
        assert!(text.starts_with("--- Page 1 ---\nA<B\n"));
    }
}
