#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

/// Text drawn at `(x, y)` in PDF user space with /F1 at `size`
pub struct Line {
    pub text: &'static str,
    pub x: i64,
    pub y: i64,
    pub size: i64,
}

pub fn line(text: &'static str, x: i64, y: i64) -> Line {
    Line { text, x, y, size: 12 }
}

fn text_ops(lines: &[Line], with_image: bool) -> Vec<u8> {
    let mut operations = Vec::new();
    for l in lines {
        operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), l.size.into()]),
            Operation::new("Td", vec![l.x.into(), l.y.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(l.text.as_bytes().to_vec(), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
    }
    if with_image {
        operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![100.into(), 0.into(), 0.into(), 50.into(), 72.into(), 400.into()],
            ),
            Operation::new("Do", vec!["Im1".into()]),
            Operation::new("Q", vec![]),
        ]);
    }
    Content { operations }.encode().unwrap()
}

/// One Letter-sized page per entry; pages listed with `true` also draw a
/// 2x2 gray image as /Im1
pub fn build_pdf(pages: Vec<(Vec<Line>, bool)>) -> Vec<u8> {
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
            "Width" => 2,
            "Height" => 2,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        vec![0u8, 64, 128, 255],
    ));

    let mut kids = Vec::new();
    for (lines, with_image) in &pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, text_ops(lines, *with_image)));
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
        kids.push(Object::Reference(page_id));
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
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// `pages` single-line pages reading "Page 1", "Page 2", ...
pub fn numbered_pdf(pages: usize) -> Vec<u8> {
    const LABELS: [&str; 6] = ["Page 1", "Page 2", "Page 3", "Page 4", "Page 5", "Page 6"];
    build_pdf(
        LABELS
            .iter()
            .take(pages)
            .map(|label| (vec![line(*label, 72, 700)], false))
            .collect(),
    )
}

/// Base64 of a small opaque RGB PNG
pub fn png_base64(width: u32, height: u32) -> String {
    use base64::Engine;
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Text of every span on `page`, in content order
pub fn span_texts(pdf: &[u8], page: u32) -> Vec<String> {
    let doc = pdfedit_core::page::load(pdf).unwrap();
    let page_id = pdfedit_core::page::lookup_page(&doc, page).unwrap();
    let (_, layout) = pdfedit_core::content::interpret_page(&doc, page_id).unwrap();
    layout.spans().map(|s| s.text.clone()).collect()
}
