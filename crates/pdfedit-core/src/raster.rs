//! Raster helpers: image stream decoding, payload decoding, opacity and
//! image XObject construction

use crate::error::{PdfEditError, Result};
use crate::page::{number, resolve};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::{Cursor, Read, Write};
use tracing::debug;

/// An image in a browser-displayable encoding
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub mime: &'static str,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64())
    }
}

/// Decode a base64 payload, tolerating a `data:...;base64,` prefix
pub fn decode_payload(payload: &str) -> Result<Vec<u8>> {
    let encoded = match payload.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => payload,
    };
    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(cleaned.as_bytes())
        .map_err(|e| PdfEditError::Decode(format!("base64 payload: {}", e)))
}

pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| PdfEditError::Decode(format!("flate: {}", e)))?;
    Ok(output)
}

pub fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| PdfEditError::Decode(format!("png encode: {}", e)))?;
    Ok(buffer)
}

pub fn load_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| PdfEditError::Decode(format!("image: {}", e)))
}

fn filter_names(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

/// Number of colour components for the colour spaces we can convert
fn components(doc: &Document, color_space: Option<&Object>) -> Option<u8> {
    match color_space.map(|o| resolve(doc, o)) {
        None => Some(1),
        Some(Object::Name(name)) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" | b"G" => Some(1),
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Some(3),
            b"DeviceCMYK" | b"CMYK" => Some(4),
            _ => None,
        },
        Some(Object::Array(items)) => match items.first().and_then(|o| o.as_name().ok()) {
            Some(b"ICCBased") => items
                .get(1)
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_stream().ok())
                .and_then(|s| s.dict.get(b"N").ok().and_then(number))
                .map(|n| n as u8),
            Some(b"CalRGB") => Some(3),
            Some(b"CalGray") => Some(1),
            _ => None,
        },
        _ => None,
    }
}

fn cmyk_to_rgb(data: &[u8]) -> Vec<u8> {
    data.chunks_exact(4)
        .flat_map(|px| {
            let k = 255 - px[3] as u16;
            [
                ((255 - px[0] as u16) * k / 255) as u8,
                ((255 - px[1] as u16) * k / 255) as u8,
                ((255 - px[2] as u16) * k / 255) as u8,
            ]
        })
        .collect()
}

/// Decode an image XObject into PNG (or pass JPEG through).
/// Returns `None` for encodings we cannot convert; callers still report the
/// image draw, just without pixel data.
pub fn image_from_stream(doc: &Document, object_id: ObjectId) -> Option<EncodedImage> {
    let stream = doc.get_object(object_id).ok()?.as_stream().ok()?;
    let width = stream.dict.get(b"Width").ok().and_then(number)? as u32;
    let height = stream.dict.get(b"Height").ok().and_then(number)? as u32;
    let filters = filter_names(stream);

    if filters.last().map(Vec::as_slice) == Some(b"DCTDecode".as_slice()) {
        if filters.len() != 1 {
            debug!(?object_id, "chained DCT filters not supported");
            return None;
        }
        return Some(EncodedImage {
            mime: "image/jpeg",
            data: stream.content.clone(),
            width,
            height,
        });
    }

    let bits = stream
        .dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(number)
        .unwrap_or(8.0) as u8;
    if bits != 8 {
        debug!(?object_id, bits, "unsupported bits per component");
        return None;
    }
    let comps = components(doc, stream.dict.get(b"ColorSpace").ok())?;

    let raw = if filters.is_empty() {
        stream.content.clone()
    } else {
        match stream.decompressed_content() {
            Ok(data) => data,
            Err(_) if filters.iter().all(|f| f == b"FlateDecode") => {
                inflate(&stream.content).ok()?
            }
            Err(e) => {
                debug!(?object_id, error = %e, "undecodable image filter");
                return None;
            }
        }
    };

    let pixels = width as usize * height as usize;
    let image = match comps {
        1 => DynamicImage::ImageLuma8(GrayImage::from_raw(
            width,
            height,
            raw.get(..pixels)?.to_vec(),
        )?),
        3 => DynamicImage::ImageRgb8(RgbImage::from_raw(
            width,
            height,
            raw.get(..pixels * 3)?.to_vec(),
        )?),
        4 => DynamicImage::ImageRgb8(RgbImage::from_raw(
            width,
            height,
            cmyk_to_rgb(raw.get(..pixels * 4)?),
        )?),
        _ => return None,
    };
    let data = encode_png(&image).ok()?;
    Some(EncodedImage {
        mime: "image/png",
        data,
        width,
        height,
    })
}

/// Scale every alpha sample by `opacity`, truncating toward zero.
/// Opacity of 1.0 or more returns the input untouched.
pub fn apply_opacity(bytes: &[u8], opacity: f64) -> Result<Vec<u8>> {
    if opacity >= 1.0 {
        return Ok(bytes.to_vec());
    }
    let opacity = opacity.max(0.0);
    let mut rgba = load_image(bytes)?.to_rgba8();
    for pixel in rgba.pixels_mut() {
        pixel[3] = (pixel[3] as f64 * opacity).floor() as u8;
    }
    encode_png(&DynamicImage::ImageRgba8(rgba))
}

/// Image data ready to be stored as a PDF image XObject
#[derive(Debug, Clone)]
pub struct ImageXObject {
    pub stream: Stream,
    pub smask: Option<Stream>,
    pub width: u32,
    pub height: u32,
}

/// Build an image XObject from PNG/JPEG (or any format the decoder knows)
pub fn image_xobject(bytes: &[u8]) -> Result<ImageXObject> {
    let format = image::guess_format(bytes)
        .map_err(|e| PdfEditError::Decode(format!("image format: {}", e)))?;
    let decoded = load_image(bytes)?;
    let (width, height) = (decoded.width(), decoded.height());

    if format == ImageFormat::Jpeg {
        let color_space = match decoded.color().channel_count() {
            1 => "DeviceGray",
            _ => "DeviceRGB",
        };
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => color_space,
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            bytes.to_vec(),
        );
        return Ok(ImageXObject {
            stream,
            smask: None,
            width,
            height,
        });
    }

    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel[3]);
    }

    let smask = if alpha.iter().any(|&a| a < 255) {
        Some(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(&alpha)?,
        ))
    } else {
        None
    };

    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        deflate(&rgb)?,
    );
    Ok(ImageXObject {
        stream,
        smask,
        width,
        height,
    })
}

/// Add the image (and its soft mask) as new objects
pub fn insert_image(doc: &mut Document, image: ImageXObject) -> ObjectId {
    let stream = attach_smask(doc, image);
    doc.add_object(stream)
}

/// Overwrite an existing image object in place, keeping its object id
pub fn replace_image(doc: &mut Document, object_id: ObjectId, image: ImageXObject) {
    let stream = attach_smask(doc, image);
    doc.objects.insert(object_id, Object::Stream(stream));
}

fn attach_smask(doc: &mut Document, image: ImageXObject) -> Stream {
    let mut stream = image.stream;
    if let Some(smask) = image.smask {
        let smask_id = doc.add_object(smask);
        stream.dict.set("SMask", Object::Reference(smask_id));
    }
    stream
}
