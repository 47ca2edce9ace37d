//! Markup-to-PDF reconstruction
//!
//! Every page container in the markup becomes a fresh page of the configured
//! target size. Positioned text is written in a standard font at a fixed size
//! and images are placed into their (clamped) rectangles. Elements that
//! cannot be placed are skipped and reported, never fatal.

use crate::config::{EditorConfig, RebuildConfig};
use crate::edits::SkipReason;
use crate::error::{PdfEditError, Result};
use crate::fonts::{encode_win_ansi, FontStyle};
use crate::geometry::{clamp, CanvasMapping, PageBox, Rect};
use crate::markup::{parse_markup, MarkupElement, MarkupPage};
use crate::page::{real, save};
use crate::raster::{decode_payload, image_xobject, insert_image};
use lopdf::content::Operation;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Where an element ended up on the rebuilt page (page space)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Placement {
    Text {
        x: f64,
        y: f64,
        font: String,
        /// Placed in reading order because the markup had no usable position
        sequential: bool,
    },
    Image {
        rect: Rect,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebuiltPage {
    /// `data-page` of the source fragment
    pub source_page: u32,
    pub elements: Vec<std::result::Result<Placement, SkipReason>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructReport {
    pub pages: Vec<RebuiltPage>,
}

impl ReconstructReport {
    pub fn placed(&self) -> usize {
        self.pages
            .iter()
            .flat_map(|p| p.elements.iter())
            .filter(|e| e.is_ok())
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.pages
            .iter()
            .flat_map(|p| p.elements.iter())
            .filter(|e| e.is_err())
            .count()
    }
}

/// Content and resources of one page under construction
struct PageBuilder<'a> {
    config: &'a RebuildConfig,
    page: PageBox,
    mapping: CanvasMapping,
    operations: Vec<Operation>,
    fonts: BTreeMap<&'static str, String>,
    xobjects: Dictionary,
    next_sequential: f64,
}

impl<'a> PageBuilder<'a> {
    fn new(config: &'a RebuildConfig, canvas: (f64, f64)) -> Self {
        let page = PageBox::new(config.page_width, config.page_height);
        Self {
            config,
            page,
            mapping: CanvasMapping::new(canvas, (page.width, page.height)),
            operations: Vec::new(),
            fonts: BTreeMap::new(),
            xobjects: Dictionary::new(),
            next_sequential: config.sequential_y,
        }
    }

    fn max_x(&self) -> f64 {
        self.page.width - self.config.clamp_margin
    }

    fn max_y(&self) -> f64 {
        self.page.height - self.config.clamp_margin
    }

    fn font_resource(&mut self, base_font: &'static str) -> String {
        let next = self.fonts.len() + 1;
        self.fonts
            .entry(base_font)
            .or_insert_with(|| format!("F{}", next))
            .clone()
    }

    fn place(
        &mut self,
        doc: &mut Document,
        element: &MarkupElement,
    ) -> std::result::Result<Placement, SkipReason> {
        match element {
            MarkupElement::Text {
                left,
                top,
                text,
                font_family,
                bold,
                italic,
            } => {
                let style = FontStyle::new(font_family.as_deref(), *bold, *italic);
                self.place_text(text, left.zip(*top), &style)
            }
            MarkupElement::Image {
                left,
                top,
                width,
                height,
                data,
            } => match (left, top, width, height) {
                (Some(x), Some(y), Some(w), Some(h)) => {
                    self.place_image(doc, Rect::from_xywh(*x, *y, *w, *h), data)
                }
                _ => Err(SkipReason::InvalidRecord(
                    "image without position or size".to_string(),
                )),
            },
            MarkupElement::Unrecognized { reason, .. } => {
                Err(SkipReason::InvalidRecord(reason.clone()))
            }
        }
    }

    fn place_text(
        &mut self,
        text: &str,
        position: Option<(f64, f64)>,
        style: &FontStyle,
    ) -> std::result::Result<Placement, SkipReason> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SkipReason::EmptyField("text".to_string()));
        }

        let (x, y, sequential) = match position {
            Some((left, top)) => {
                let (x, y) = self.mapping.map_point(left, top);
                (clamp(x, 0.0, self.max_x()), clamp(y, 0.0, self.max_y()), false)
            }
            None => {
                let y = self.next_sequential;
                self.next_sequential += self.config.line_advance;
                (self.config.sequential_x, y, true)
            }
        };

        let base_font = style.standard_font_name();
        let resource = self.font_resource(base_font);
        let (pdf_x, pdf_y) = self.page.to_pdf(x, y);
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(resource.into_bytes()),
                    real(self.config.font_size),
                ],
            ),
            Operation::new("Td", vec![real(pdf_x), real(pdf_y)]),
            Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
        Ok(Placement::Text {
            x,
            y,
            font: base_font.to_string(),
            sequential,
        })
    }

    fn place_image(
        &mut self,
        doc: &mut Document,
        canvas_rect: Rect,
        data: &str,
    ) -> std::result::Result<Placement, SkipReason> {
        let (x, y) = self.mapping.map_point(canvas_rect.x0, canvas_rect.y0);
        let (w, h) = self.mapping.map_size(canvas_rect.width(), canvas_rect.height());
        let x = clamp(x, 0.0, self.max_x());
        let y = clamp(y, 0.0, self.max_y());
        let w = w.min(self.max_x() - x);
        let h = h.min(self.max_y() - y);
        if w <= 0.0 || h <= 0.0 {
            return Err(SkipReason::EmptyArea);
        }

        let bytes = decode_payload(data).map_err(|e| SkipReason::InvalidImage(e.to_string()))?;
        let image = image_xobject(&bytes).map_err(|e| SkipReason::InvalidImage(e.to_string()))?;
        let image_id = insert_image(doc, image);
        let name = format!("Im{}", self.xobjects.len() + 1);
        self.xobjects.set(name.clone(), Object::Reference(image_id));

        let (pdf_x, pdf_y) = self.page.to_pdf(x, y + h);
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![real(w), real(0.0), real(0.0), real(h), real(pdf_x), real(pdf_y)],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        Ok(Placement::Image {
            rect: Rect::from_xywh(x, y, w, h),
        })
    }

    fn finish(self, doc: &mut Document, pages_id: ObjectId) -> Result<ObjectId> {
        let content = lopdf::content::Content {
            operations: self.operations,
        }
        .encode()
        .map_err(|e| PdfEditError::Reconstruction(format!("encode content: {}", e)))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));

        let mut fonts = Dictionary::new();
        for (base_font, resource) in self.fonts {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => Object::Name(base_font.as_bytes().to_vec()),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(resource, Object::Reference(font_id));
        }

        Ok(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), real(self.page.width), real(self.page.height)],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => fonts,
                "XObject" => self.xobjects,
            },
        }))
    }
}

fn rebuild_page(
    doc: &mut Document,
    pages_id: ObjectId,
    source: &MarkupPage,
    config: &EditorConfig,
) -> Result<(ObjectId, RebuiltPage)> {
    let canvas = source
        .canvas
        .unwrap_or((config.canvas.legacy_width, config.canvas.legacy_height));
    let mut builder = PageBuilder::new(&config.rebuild, canvas);
    let mut rebuilt = RebuiltPage {
        source_page: source.page,
        elements: Vec::with_capacity(source.elements.len()),
    };

    for (index, element) in source.elements.iter().enumerate() {
        let result = builder.place(doc, element);
        match &result {
            Ok(placement) => debug!(page = source.page, index, ?placement, "placed element"),
            Err(SkipReason::EmptyField(_)) => {
                debug!(page = source.page, index, "blank text element")
            }
            Err(reason) => warn!(page = source.page, index, %reason, "skipping markup element"),
        }
        rebuilt.elements.push(result);
    }

    let page_id = builder.finish(doc, pages_id)?;
    Ok((page_id, rebuilt))
}

/// Build a new PDF from positioned markup
pub fn reconstruct(markup: &str, config: &EditorConfig) -> Result<(Vec<u8>, ReconstructReport)> {
    let pages = parse_markup(markup);
    if pages.is_empty() {
        return Err(PdfEditError::Reconstruction(
            "markup contains no page containers".to_string(),
        ));
    }

    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(pages.len());
    let mut report = ReconstructReport::default();
    for source in &pages {
        let (page_id, rebuilt) = rebuild_page(&mut doc, pages_id, source, config)?;
        kids.push(Object::Reference(page_id));
        report.pages.push(rebuilt);
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let output = save(&mut doc)?;
    info!(
        pages = report.pages.len(),
        placed = report.placed(),
        skipped = report.skipped(),
        "reconstructed document from markup"
    );
    Ok((output, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::interpret_page;
    use crate::page::{load, lookup_page};
    use image::{DynamicImage, RgbImage};

    fn png_data_url() -> String {
        let img = DynamicImage::ImageRgb8(RgbImage::from_raw(1, 1, vec![255, 0, 0]).unwrap());
        let png = crate::raster::encode_png(&img).unwrap();
        use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
        format!("data:image/png;base64,{}", BASE64.encode(png))
    }

    #[test]
    fn test_legacy_canvas_scaling_and_clamp() {
        let markup = r#"<div class="pdf-page" data-page="1">
            <span class="editable-text" style="left: 80px; top: 100px;">Near</span>
            <span class="editable-text" style="left: 5000px; top: -40px;">Far</span>
        </div>"#;
        let (_, report) = reconstruct(markup, &EditorConfig::default()).unwrap();
        let elements = &report.pages[0].elements;
        let Ok(Placement::Text { x, y, .. }) = &elements[0] else {
            panic!("expected text placement");
        };
        // 595/800 and 842/1000
        assert!((x - 59.5).abs() < 1e-9);
        assert!((y - 84.2).abs() < 1e-9);
        let Ok(Placement::Text { x, y, .. }) = &elements[1] else {
            panic!("expected text placement");
        };
        assert_eq!((*x, *y), (545.0, 0.0));
    }

    #[test]
    fn test_recorded_canvas_is_used() {
        let markup = r#"<div class="pdf-page" data-page="1" data-width="595" data-height="842">
            <span class="editable-text" style="left: 100px; top: 200px;">Same</span>
        </div>"#;
        let (_, report) = reconstruct(markup, &EditorConfig::default()).unwrap();
        assert_eq!(
            report.pages[0].elements[0],
            Ok(Placement::Text {
                x: 100.0,
                y: 200.0,
                font: "Helvetica".to_string(),
                sequential: false,
            })
        );
    }

    #[test]
    fn test_missing_position_is_sequential() {
        let markup = r#"<div class="pdf-page" data-page="1">
            <span class="editable-text">one</span>
            <span class="editable-text" style="left: oops;">two</span>
        </div>"#;
        let (_, report) = reconstruct(markup, &EditorConfig::default()).unwrap();
        let ys: Vec<f64> = report.pages[0]
            .elements
            .iter()
            .filter_map(|e| match e {
                Ok(Placement::Text { y, sequential: true, .. }) => Some(*y),
                _ => None,
            })
            .collect();
        assert_eq!(ys, vec![50.0, 65.0]);
    }

    #[test]
    fn test_pages_and_text_order_survive() {
        let markup = r#"
            <div class="pdf-page" data-page="1" data-width="595" data-height="842">
              <span class="editable-text" style="left: 72px; top: 100px;">First</span>
              <span class="editable-text" style="left: 72px; top: 120px;">Second</span>
            </div>
            <div class="pdf-page" data-page="2" data-width="595" data-height="842">
              <span class="editable-text" style="left: 72px; top: 100px;">Third</span>
            </div>"#;
        let (bytes, _) = reconstruct(markup, &EditorConfig::default()).unwrap();
        let doc = load(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
        let (_, layout) = interpret_page(&doc, lookup_page(&doc, 1).unwrap()).unwrap();
        let texts: Vec<_> = layout.spans().map(|s| s.text.clone()).collect();
        assert_eq!(texts, vec!["First", "Second"]);
    }

    #[test]
    fn test_image_shrinks_to_bounds_or_skips() {
        let src = png_data_url();
        let markup = format!(
            r#"<div class="pdf-page" data-page="1" data-width="595" data-height="842">
                <img class="editable-image" src="{src}" style="left: 500px; top: 10px; width: 100px; height: 20px;">
                <img class="editable-image" src="{src}" style="left: 600px; top: 10px; width: 100px; height: 20px;">
                <img class="editable-image" src="data:image/png;base64,AAAA" style="left: 0px; top: 0px; width: 10px; height: 10px;">
                <img src="{src}">
            </div>"#,
            src = src
        );
        let (bytes, report) = reconstruct(&markup, &EditorConfig::default()).unwrap();
        let elements = &report.pages[0].elements;
        assert_eq!(
            elements[0],
            Ok(Placement::Image {
                rect: Rect::from_xywh(500.0, 10.0, 45.0, 20.0)
            })
        );
        assert_eq!(elements[1], Err(SkipReason::EmptyArea));
        assert!(matches!(elements[2], Err(SkipReason::InvalidImage(_))));
        assert!(matches!(elements[3], Err(SkipReason::InvalidRecord(_))));

        let doc = load(&bytes).unwrap();
        let (_, layout) = interpret_page(&doc, lookup_page(&doc, 1).unwrap()).unwrap();
        assert_eq!(layout.images().count(), 1);
    }

    #[test]
    fn test_markup_without_pages_is_error() {
        let err = reconstruct("<p>nothing</p>", &EditorConfig::default()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Reconstruction);
    }
}
