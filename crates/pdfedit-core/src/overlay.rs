//! Watermark and signature composition
//!
//! Overlays are appended on top of the existing page content, clipped to the
//! media box and isolated in their own graphics state.

use crate::config::EditorConfig;
use crate::error::{PdfEditError, Result};
use crate::fonts::encode_win_ansi;
use crate::geometry::{rotated_extent, Matrix, PageBox, Rect};
use crate::page::{
    add_resource, add_standard_font, append_content, load, lookup_page, page_box, real, save,
};
use crate::raster::{apply_opacity, decode_payload, image_xobject, insert_image};
use lopdf::content::Operation;
use lopdf::{Document, Object, ObjectId, StringFormat};
use serde::Serialize;
use tracing::{debug, info};

/// Which pages receive the overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTarget {
    All,
    /// 1-based
    Page(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayPayload {
    Text(String),
    /// Encoded image bytes (PNG, JPEG, ...)
    Image(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySpec {
    /// Target rectangle in page space
    pub rect: Rect,
    /// Degrees, counter-clockwise
    pub rotation: f64,
    /// 0.0 - 1.0, applied to image payloads only
    pub opacity: f64,
    pub payload: OverlayPayload,
}

impl OverlaySpec {
    pub fn image_from_base64(rect: Rect, data: &str, opacity: f64, rotation: f64) -> Result<Self> {
        if data.trim().is_empty() {
            return Err(PdfEditError::Validation("No image data provided".to_string()));
        }
        Ok(Self {
            rect,
            rotation,
            opacity,
            payload: OverlayPayload::Image(decode_payload(data)?),
        })
    }

    pub fn text(rect: Rect, text: &str, rotation: f64) -> Result<Self> {
        if text.is_empty() {
            return Err(PdfEditError::Validation(
                "No watermark text provided".to_string(),
            ));
        }
        Ok(Self {
            rect,
            rotation,
            opacity: 1.0,
            payload: OverlayPayload::Text(text.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverlayReport {
    pub pages_overlaid: usize,
    pub total_pages: usize,
}

fn clip_to(page: &PageBox) -> [Operation; 3] {
    [
        Operation::new("q", vec![]),
        Operation::new(
            "re",
            vec![
                real(page.llx),
                real(page.lly),
                real(page.width),
                real(page.height),
            ],
        ),
        Operation::new("W", vec![]),
    ]
}

fn text_overlay(
    doc: &mut Document,
    page_id: ObjectId,
    spec: &OverlaySpec,
    text: &str,
    config: &EditorConfig,
) -> Result<Vec<Operation>> {
    let font_size = (spec.rect.height() * config.overlay.text_height_ratio).floor();
    if font_size < 1.0 {
        return Err(PdfEditError::Validation(
            "Overlay rectangle is too small for text".to_string(),
        ));
    }
    let page = page_box(doc, page_id);
    let font = add_standard_font(doc, page_id, "Helvetica")?;
    let (x, y) = page.to_pdf(spec.rect.x0, spec.rect.y1);
    let (sin, cos) = spec.rotation.to_radians().sin_cos();

    let mut ops = clip_to(&page).to_vec();
    ops.extend([
        Operation::new("n", vec![]),
        Operation::new("g", vec![real(config.overlay.text_gray)]),
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(font.into_bytes()), real(font_size)],
        ),
        Operation::new(
            "Tm",
            vec![real(cos), real(sin), real(-sin), real(cos), real(x), real(y)],
        ),
        Operation::new(
            "Tj",
            vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ]);
    Ok(ops)
}

/// Matrix placing an `image_w` x `image_h` image inside `rect`, aspect ratio
/// kept, centred and rotated about the rectangle centre
fn image_matrix(page: &PageBox, rect: &Rect, image_w: f64, image_h: f64, rotation: f64) -> Matrix {
    let (extent_w, extent_h) = rotated_extent(image_w, image_h, rotation);
    let scale = if extent_w > 0.0 && extent_h > 0.0 {
        (rect.width() / extent_w).min(rect.height() / extent_h)
    } else {
        0.0
    };
    let (cx, cy) = rect.center();
    let (cx, cy) = page.to_pdf(cx, cy);
    Matrix::rotated_box(image_w * scale, image_h * scale, cx, cy, rotation)
}

fn image_overlay(
    doc: &mut Document,
    page_id: ObjectId,
    spec: &OverlaySpec,
    image_id: ObjectId,
    size: (u32, u32),
) -> Result<Vec<Operation>> {
    let page = page_box(doc, page_id);
    let name = add_resource(doc, page_id, "XObject", "Ovl", Object::Reference(image_id))?;
    let m = image_matrix(&page, &spec.rect, size.0 as f64, size.1 as f64, spec.rotation);

    let mut ops = clip_to(&page).to_vec();
    ops.extend([
        Operation::new("n", vec![]),
        Operation::new(
            "cm",
            vec![real(m.a), real(m.b), real(m.c), real(m.d), real(m.e), real(m.f)],
        ),
        Operation::new("Do", vec![Object::Name(name.into_bytes())]),
        Operation::new("Q", vec![]),
    ]);
    Ok(ops)
}

/// Draw `spec` on each of `pages` of an open document
pub fn overlay_pages(
    doc: &mut Document,
    pages: &[ObjectId],
    spec: &OverlaySpec,
    config: &EditorConfig,
) -> Result<()> {
    if spec.rect.width() <= 0.0 || spec.rect.height() <= 0.0 {
        return Err(PdfEditError::Validation(
            "Overlay rectangle must have a positive size".to_string(),
        ));
    }

    match &spec.payload {
        OverlayPayload::Text(text) => {
            for &page_id in pages {
                let ops = text_overlay(doc, page_id, spec, text, config)?;
                append_content(doc, page_id, ops)?;
            }
        }
        OverlayPayload::Image(bytes) => {
            // re-encoded with scaled alpha, lives only until the image object is built
            let prepared = apply_opacity(bytes, spec.opacity.clamp(0.0, 1.0))?;
            let image = image_xobject(&prepared)?;
            let size = (image.width, image.height);
            let image_id = insert_image(doc, image);
            for &page_id in pages {
                let ops = image_overlay(doc, page_id, spec, image_id, size)?;
                append_content(doc, page_id, ops)?;
            }
        }
    }
    debug!(pages = pages.len(), "overlay drawn");
    Ok(())
}

fn target_pages(doc: &Document, target: PageTarget) -> Result<Vec<ObjectId>> {
    match target {
        PageTarget::All => Ok(doc.get_pages().into_values().collect()),
        PageTarget::Page(n) => lookup_page(doc, n)
            .map(|id| vec![id])
            .map_err(|e| PdfEditError::Validation(e.to_string())),
    }
}

/// Watermark one page or every page
pub fn add_watermark(
    pdf_bytes: &[u8],
    target: PageTarget,
    spec: &OverlaySpec,
    config: &EditorConfig,
) -> Result<(Vec<u8>, OverlayReport)> {
    let mut doc = load(pdf_bytes)?;
    let pages = target_pages(&doc, target)?;
    overlay_pages(&mut doc, &pages, spec, config)?;

    let report = OverlayReport {
        pages_overlaid: pages.len(),
        total_pages: doc.get_pages().len(),
    };
    let output = save(&mut doc)?;
    info!(pages = report.pages_overlaid, "watermark added");
    Ok((output, report))
}

/// Stamp a signature image, unrotated and fully opaque, on one page
pub fn add_signature(
    pdf_bytes: &[u8],
    page: u32,
    rect: Rect,
    image_data: &str,
    config: &EditorConfig,
) -> Result<(Vec<u8>, OverlayReport)> {
    if image_data.trim().is_empty() {
        return Err(PdfEditError::Validation(
            "No signature data provided".to_string(),
        ));
    }
    let spec = OverlaySpec::image_from_base64(rect, image_data, 1.0, 0.0)?;
    let (output, report) = add_watermark(pdf_bytes, PageTarget::Page(page), &spec, config)?;
    info!(page, "signature added");
    Ok((output, report))
}
