//! Lossless size reduction
//!
//! Drops unreferenced objects and empty streams, deflates every stream and
//! renumbers the object table. The requested level is reported back, image
//! data is never re-encoded.

use crate::error::{PdfEditError, Result};
use crate::page::{load, save};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl CompressionLevel {
    pub fn image_quality(&self) -> f64 {
        match self {
            CompressionLevel::Low => 0.8,
            CompressionLevel::Medium => 0.6,
            CompressionLevel::High => 0.4,
        }
    }
}

impl FromStr for CompressionLevel {
    type Err = PdfEditError;

    /// Unknown names select the strongest level
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "low" => CompressionLevel::Low,
            "medium" | "" => CompressionLevel::Medium,
            _ => CompressionLevel::High,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionReport {
    pub original_size: usize,
    pub compressed_size: usize,
    /// Percent saved, two decimals; negative when the output grew
    pub compression_ratio: f64,
    pub level: CompressionLevel,
    pub image_quality: f64,
}

/// `(1 - compressed / original) * 100`, rounded to two decimals
pub fn compression_ratio(original: usize, compressed: usize) -> f64 {
    if original == 0 {
        return 0.0;
    }
    let ratio = (1.0 - compressed as f64 / original as f64) * 100.0;
    (ratio * 100.0).round() / 100.0
}

pub fn compress_document(
    pdf_bytes: &[u8],
    level: CompressionLevel,
) -> Result<(Vec<u8>, CompressionReport)> {
    let mut doc = load(pdf_bytes)?;
    let pruned = doc.prune_objects().len();
    let emptied = doc.delete_zero_length_streams().len();
    doc.compress();
    doc.renumber_objects();
    let output = save(&mut doc)?;

    let report = CompressionReport {
        original_size: pdf_bytes.len(),
        compressed_size: output.len(),
        compression_ratio: compression_ratio(pdf_bytes.len(), output.len()),
        level,
        image_quality: level.image_quality(),
    };
    info!(
        pruned,
        emptied,
        original = report.original_size,
        compressed = report.compressed_size,
        ratio = report.compression_ratio,
        "compressed document"
    );
    Ok((output, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object, Stream};

    fn padded_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let content = "BT /F1 12 Tf 72 700 Td (Repeated line) Tj ET\n".repeat(200);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        // unreferenced
        doc.add_object(Stream::new(dictionary! {}, vec![b'x'; 4096]));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
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

    #[test]
    fn test_ratio_rounding_and_sign() {
        assert_eq!(compression_ratio(1000, 500), 50.0);
        assert_eq!(compression_ratio(3, 2), 33.33);
        assert_eq!(compression_ratio(100, 150), -50.0);
        assert_eq!(compression_ratio(0, 10), 0.0);
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("low".parse::<CompressionLevel>().unwrap(), CompressionLevel::Low);
        assert_eq!("MEDIUM".parse::<CompressionLevel>().unwrap(), CompressionLevel::Medium);
        assert_eq!("extreme".parse::<CompressionLevel>().unwrap(), CompressionLevel::High);
        assert_eq!(CompressionLevel::High.image_quality(), 0.4);
    }

    #[test]
    fn test_compress_shrinks_redundant_document() {
        let pdf = padded_pdf();
        let (bytes, report) = compress_document(&pdf, CompressionLevel::Low).unwrap();
        assert_eq!(report.original_size, pdf.len());
        assert_eq!(report.compressed_size, bytes.len());
        assert!(report.compression_ratio > 0.0);
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }
}
