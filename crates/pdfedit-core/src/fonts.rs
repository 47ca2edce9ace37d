//! Font model used by the content interpreter and the text writers
//!
//! Covers glyph widths, ToUnicode maps, style flags, WinAnsi encoding and the
//! mapping from arbitrary font names onto the PDF standard 14 fonts.

use crate::page::{number, resolve, stream_bytes};
use lopdf::{Dictionary, Document, Object};
use std::collections::HashMap;

pub const FLAG_ITALIC: u32 = 1 << 1;
pub const FLAG_SERIF: u32 = 1 << 2;
pub const FLAG_MONOSPACE: u32 = 1 << 3;
pub const FLAG_BOLD: u32 = 1 << 4;

// FontDescriptor /Flags bits
const DESCRIPTOR_FIXED_PITCH: i64 = 1;
const DESCRIPTOR_SERIF: i64 = 1 << 1;
const DESCRIPTOR_ITALIC: i64 = 1 << 6;
const DESCRIPTOR_FORCE_BOLD: i64 = 1 << 18;

/// WinAnsi code points 0x80..=0x9F (0 marks an undefined slot)
const WIN_ANSI_HIGH: [u16; 32] = [
    0x20AC, 0, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, 0x02C6, 0x2030, 0x0160, 0x2039,
    0x0152, 0, 0x017D, 0, 0, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, 0x02DC,
    0x2122, 0x0161, 0x203A, 0x0153, 0, 0x017E, 0x0178,
];

/// Requested style for text written back into a document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FontStyle {
    pub family: Option<String>,
    pub bold: bool,
    pub italic: bool,
}

impl FontStyle {
    pub fn new(family: Option<&str>, bold: bool, italic: bool) -> Self {
        Self {
            family: family.map(str::to_string),
            bold,
            italic,
        }
    }

    /// Map a family name to a PDF standard font name.
    /// Names coming out of real documents look like "Times-Roman",
    /// "BCDEEE+ArialMT" or a CSS generic family; all of them land on one of the
    /// standard 14 fonts, with the bold/italic flags picking the variant.
    pub fn standard_font_name(&self) -> &'static str {
        let base_font = match &self.family {
            Some(name) => {
                let lower = name.to_lowercase();
                if lower.contains("italic") || lower.contains("bold") || lower.contains("oblique") {
                    return map_to_standard_font(name);
                }
                map_font_family_to_base(name)
            }
            None => "Helvetica",
        };

        match base_font {
            "Times-Roman" => match (self.bold, self.italic) {
                (true, true) => "Times-BoldItalic",
                (true, false) => "Times-Bold",
                (false, true) => "Times-Italic",
                (false, false) => "Times-Roman",
            },
            "Helvetica" => match (self.bold, self.italic) {
                (true, true) => "Helvetica-BoldOblique",
                (true, false) => "Helvetica-Bold",
                (false, true) => "Helvetica-Oblique",
                (false, false) => "Helvetica",
            },
            "Courier" => match (self.bold, self.italic) {
                (true, true) => "Courier-BoldOblique",
                (true, false) => "Courier-Bold",
                (false, true) => "Courier-Oblique",
                (false, false) => "Courier",
            },
            _ => base_font,
        }
    }
}

/// Map font family name to base PDF font (without style variants)
fn map_font_family_to_base(name: &str) -> &'static str {
    let lower = name.to_lowercase();

    match lower.as_str() {
        "serif" => return "Times-Roman",
        "sans-serif" => return "Helvetica",
        "monospace" => return "Courier",
        "cursive" | "fantasy" => return "Helvetica",
        _ => {}
    }

    if lower.contains("times") || lower.contains("georgia") || lower.contains("garamond") {
        return "Times-Roman";
    }

    if lower.contains("courier")
        || lower.contains("mono")
        || lower.contains("consolas")
        || lower.contains("monaco")
    {
        return "Courier";
    }

    if lower.contains("symbol") {
        return "Symbol";
    }
    if lower.contains("zapf") || lower.contains("dingbat") {
        return "ZapfDingbats";
    }

    "Helvetica"
}

/// Map a font name that already carries style words onto a standard 14 font
fn map_to_standard_font(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    let bold = lower.contains("bold");
    let italic = lower.contains("italic") || lower.contains("oblique");

    match map_font_family_to_base(name) {
        "Times-Roman" => match (bold, italic) {
            (true, true) => "Times-BoldItalic",
            (true, false) => "Times-Bold",
            (false, true) => "Times-Italic",
            (false, false) => "Times-Roman",
        },
        "Courier" => match (bold, italic) {
            (true, true) => "Courier-BoldOblique",
            (true, false) => "Courier-Bold",
            (false, true) => "Courier-Oblique",
            (false, false) => "Courier",
        },
        "Helvetica" => match (bold, italic) {
            (true, true) => "Helvetica-BoldOblique",
            (true, false) => "Helvetica-Bold",
            (false, true) => "Helvetica-Oblique",
            (false, false) => "Helvetica",
        },
        other => other,
    }
}

/// Strip a subset tag such as `ABCDEF+` from a base font name
pub fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.chars().all(|c| c.is_ascii_uppercase()) => rest,
        _ => name,
    }
}

/// Style flags guessed from a font name
pub fn flags_from_name(name: &str) -> u32 {
    let lower = name.to_lowercase();
    let mut flags = 0;
    if lower.contains("bold") || lower.contains("black") || lower.contains("heavy") {
        flags |= FLAG_BOLD;
    }
    if lower.contains("italic") || lower.contains("oblique") {
        flags |= FLAG_ITALIC;
    }
    if lower.contains("courier") || lower.contains("mono") || lower.contains("consolas") {
        flags |= FLAG_MONOSPACE;
    }
    if (lower.contains("times") || lower.contains("serif") || lower.contains("georgia"))
        && !lower.contains("sans")
    {
        flags |= FLAG_SERIF;
    }
    flags
}

fn flags_from_descriptor(bits: i64) -> u32 {
    let mut flags = 0;
    if bits & DESCRIPTOR_FIXED_PITCH != 0 {
        flags |= FLAG_MONOSPACE;
    }
    if bits & DESCRIPTOR_SERIF != 0 {
        flags |= FLAG_SERIF;
    }
    if bits & DESCRIPTOR_ITALIC != 0 {
        flags |= FLAG_ITALIC;
    }
    if bits & DESCRIPTOR_FORCE_BOLD != 0 {
        flags |= FLAG_BOLD;
    }
    flags
}

/// Decode one WinAnsi byte
pub fn win_ansi_char(code: u8) -> char {
    match code {
        0x80..=0x9F => {
            let cp = WIN_ANSI_HIGH[(code - 0x80) as usize];
            if cp == 0 {
                char::REPLACEMENT_CHARACTER
            } else {
                char::from_u32(cp as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
            }
        }
        _ => code as char,
    }
}

/// Encode text for a standard font with WinAnsiEncoding; unmappable chars become `?`
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| {
            let cp = c as u32;
            if cp < 0x80 || (0xA0..=0xFF).contains(&cp) {
                return cp as u8;
            }
            WIN_ANSI_HIGH
                .iter()
                .position(|&w| w != 0 && w as u32 == cp)
                .map(|idx| 0x80 + idx as u8)
                .unwrap_or(b'?')
        })
        .collect()
}

/// One decoded character code from a shown string
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCode {
    pub code: u32,
    pub text: String,
    /// Byte offset of the code inside the shown string
    pub offset: usize,
    pub len: usize,
}

/// Everything the interpreter needs to know about one font resource
#[derive(Debug, Clone)]
pub struct FontInfo {
    pub base_font: String,
    pub flags: u32,
    pub two_byte: bool,
    widths: HashMap<u32, f64>,
    default_width: f64,
    to_unicode: HashMap<u32, String>,
    /// Ascent and descent as fractions of the font size
    pub ascent: f64,
    pub descent: f64,
}

impl Default for FontInfo {
    fn default() -> Self {
        Self::standard("Helvetica")
    }
}

impl FontInfo {
    /// A standard 14 font without a Widths array
    pub fn standard(base_font: &str) -> Self {
        let default_width = if base_font.starts_with("Courier") {
            600.0
        } else {
            500.0
        };
        Self {
            base_font: base_font.to_string(),
            flags: flags_from_name(base_font),
            two_byte: false,
            widths: HashMap::new(),
            default_width,
            to_unicode: HashMap::new(),
            ascent: 0.8,
            descent: 0.2,
        }
    }

    /// Build from a font dictionary, resolving indirect pieces through `doc`
    pub fn from_dict(doc: &Document, dict: &Dictionary) -> Self {
        let base_font = dict
            .get(b"BaseFont")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_name().ok())
            .map(|n| strip_subset_prefix(&String::from_utf8_lossy(n)).to_string())
            .unwrap_or_else(|| "Helvetica".to_string());

        let mut info = FontInfo::standard(&base_font);
        let subtype = dict
            .get(b"Subtype")
            .ok()
            .and_then(|o| o.as_name().ok())
            .unwrap_or(b"Type1");

        let mut descriptor_source = dict;
        if subtype == b"Type0" {
            info.two_byte = true;
            info.default_width = 1000.0;
            let descendant = dict
                .get(b"DescendantFonts")
                .ok()
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_array().ok())
                .and_then(|arr| arr.first())
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_dict().ok());
            if let Some(cid_font) = descendant {
                if let Some(dw) = cid_font.get(b"DW").ok().and_then(|o| number(resolve(doc, o))) {
                    info.default_width = dw;
                }
                if let Some(w) = cid_font
                    .get(b"W")
                    .ok()
                    .map(|o| resolve(doc, o))
                    .and_then(|o| o.as_array().ok())
                {
                    info.widths = parse_cid_widths(doc, w);
                }
                descriptor_source = cid_font;
            }
        } else if let Some(widths) = dict
            .get(b"Widths")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_array().ok())
        {
            let first_char = dict
                .get(b"FirstChar")
                .ok()
                .and_then(|o| number(resolve(doc, o)))
                .unwrap_or(0.0) as u32;
            for (idx, width) in widths.iter().enumerate() {
                if let Some(w) = number(resolve(doc, width)) {
                    info.widths.insert(first_char + idx as u32, w);
                }
            }
        }

        if let Some(descriptor) = descriptor_source
            .get(b"FontDescriptor")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok())
        {
            if let Some(bits) = descriptor
                .get(b"Flags")
                .ok()
                .and_then(|o| resolve(doc, o).as_i64().ok())
            {
                info.flags |= flags_from_descriptor(bits);
            }
            let ascent = descriptor.get(b"Ascent").ok().and_then(|o| number(resolve(doc, o)));
            let descent = descriptor.get(b"Descent").ok().and_then(|o| number(resolve(doc, o)));
            if let (Some(a), Some(d)) = (ascent, descent) {
                if a > 0.0 && a - d > 0.0 {
                    info.ascent = a / 1000.0;
                    info.descent = d.abs() / 1000.0;
                }
            }
        }

        if let Some(cmap) = dict
            .get(b"ToUnicode")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_stream().ok())
        {
            info.to_unicode = parse_to_unicode(&stream_bytes(cmap));
        }

        info
    }

    /// Glyph width in thousandths of a text-space unit
    pub fn width(&self, code: u32) -> f64 {
        self.widths.get(&code).copied().unwrap_or(self.default_width)
    }

    /// Split a shown string into character codes with their Unicode text
    pub fn decode(&self, bytes: &[u8]) -> Vec<DecodedCode> {
        let step = if self.two_byte { 2 } else { 1 };
        let mut out = Vec::with_capacity(bytes.len() / step + 1);
        let mut offset = 0;
        while offset < bytes.len() {
            let len = step.min(bytes.len() - offset);
            let code = bytes[offset..offset + len]
                .iter()
                .fold(0u32, |acc, b| (acc << 8) | *b as u32);
            let text = match self.to_unicode.get(&code) {
                Some(mapped) => mapped.clone(),
                None if self.two_byte => char::from_u32(code)
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
                None => win_ansi_char(code as u8).to_string(),
            };
            out.push(DecodedCode {
                code,
                text,
                offset,
                len,
            });
            offset += len;
        }
        out
    }
}

/// Parse a CIDFont `W` array: `c [w1 w2 ...]` or `c_first c_last w`
fn parse_cid_widths(doc: &Document, w: &[Object]) -> HashMap<u32, f64> {
    let mut widths = HashMap::new();
    let mut idx = 0;
    while idx < w.len() {
        let Some(first) = number(resolve(doc, &w[idx])) else {
            break;
        };
        match w.get(idx + 1).map(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (i, width) in list.iter().enumerate() {
                    if let Some(v) = number(resolve(doc, width)) {
                        widths.insert(first as u32 + i as u32, v);
                    }
                }
                idx += 2;
            }
            Some(last) => {
                let (Some(last), Some(v)) = (
                    number(last),
                    w.get(idx + 2).and_then(|o| number(resolve(doc, o))),
                ) else {
                    break;
                };
                for code in first as u32..=last as u32 {
                    widths.insert(code, v);
                }
                idx += 3;
            }
            None => break,
        }
    }
    widths
}

#[derive(Debug, PartialEq)]
enum CMapToken {
    Hex(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    Keyword(String),
}

fn tokenize_cmap(data: &[u8]) -> Vec<CMapToken> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'<' if data.get(i + 1) != Some(&b'<') => {
                let start = i + 1;
                let end = data[start..]
                    .iter()
                    .position(|&b| b == b'>')
                    .map(|p| start + p)
                    .unwrap_or(data.len());
                let digits: Vec<u8> = data[start..end]
                    .iter()
                    .copied()
                    .filter(|b| b.is_ascii_hexdigit())
                    .collect();
                let bytes = digits
                    .chunks(2)
                    .map(|pair| {
                        let s = std::str::from_utf8(pair).unwrap_or("0");
                        let v = u8::from_str_radix(s, 16).unwrap_or(0);
                        if pair.len() == 1 {
                            v << 4
                        } else {
                            v
                        }
                    })
                    .collect();
                tokens.push(CMapToken::Hex(bytes));
                i = end + 1;
            }
            b'[' => {
                tokens.push(CMapToken::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(CMapToken::ArrayEnd);
                i += 1;
            }
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < data.len() && data[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                tokens.push(CMapToken::Keyword(
                    String::from_utf8_lossy(&data[start..i]).into_owned(),
                ));
            }
            _ => i += 1,
        }
    }
    tokens
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|c| {
            if c.len() == 2 {
                u16::from_be_bytes([c[0], c[1]])
            } else {
                c[0] as u16
            }
        })
        .collect();
    String::from_utf16_lossy(&units)
}

/// Parse the `bfchar` and `bfrange` sections of a ToUnicode CMap
pub fn parse_to_unicode(data: &[u8]) -> HashMap<u32, String> {
    let tokens = tokenize_cmap(data);
    let mut map = HashMap::new();
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            CMapToken::Keyword(k) if k == "beginbfchar" => {
                i += 1;
                while i + 1 < tokens.len() {
                    match (&tokens[i], &tokens[i + 1]) {
                        (CMapToken::Hex(src), CMapToken::Hex(dst)) => {
                            map.insert(code_of(src), utf16_text(dst));
                            i += 2;
                        }
                        _ => break,
                    }
                }
            }
            CMapToken::Keyword(k) if k == "beginbfrange" => {
                i += 1;
                while i + 2 < tokens.len() {
                    let (CMapToken::Hex(lo), CMapToken::Hex(hi)) = (&tokens[i], &tokens[i + 1])
                    else {
                        break;
                    };
                    let (lo, hi) = (code_of(lo), code_of(hi));
                    match &tokens[i + 2] {
                        CMapToken::Hex(dst) => {
                            let base = dst.clone();
                            for (n, code) in (lo..=hi).enumerate() {
                                let mut target = base.clone();
                                if let Some(last) = target.last_mut() {
                                    *last = last.wrapping_add(n as u8);
                                }
                                map.insert(code, utf16_text(&target));
                            }
                            i += 3;
                        }
                        CMapToken::ArrayStart => {
                            let mut j = i + 3;
                            let mut code = lo;
                            while j < tokens.len() && tokens[j] != CMapToken::ArrayEnd {
                                if let CMapToken::Hex(dst) = &tokens[j] {
                                    if code <= hi {
                                        map.insert(code, utf16_text(dst));
                                    }
                                    code += 1;
                                }
                                j += 1;
                            }
                            i = j + 1;
                        }
                        _ => break,
                    }
                }
            }
            _ => i += 1,
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_font_mapping_css_generic_families() {
        assert_eq!(map_to_standard_font("serif"), "Times-Roman");
        assert_eq!(map_to_standard_font("sans-serif"), "Helvetica");
        assert_eq!(map_to_standard_font("monospace"), "Courier");
        assert_eq!(map_to_standard_font("cursive"), "Helvetica");
    }

    #[test]
    fn test_font_mapping_named_variants() {
        assert_eq!(map_to_standard_font("Times-BoldItalic"), "Times-BoldItalic");
        assert_eq!(map_to_standard_font("Arial-BoldMT"), "Helvetica-Bold");
        assert_eq!(map_to_standard_font("BCDEEE+ArialMT"), "Helvetica");
        assert_eq!(map_to_standard_font("CourierNew-Italic"), "Courier-Oblique");
        assert_eq!(map_to_standard_font("UnknownFont"), "Helvetica");
    }

    #[test]
    fn test_style_picks_variant_from_flags() {
        let style = FontStyle::new(Some("serif"), true, true);
        assert_eq!(style.standard_font_name(), "Times-BoldItalic");

        let style = FontStyle::new(Some("Consolas"), false, true);
        assert_eq!(style.standard_font_name(), "Courier-Oblique");

        assert_eq!(FontStyle::default().standard_font_name(), "Helvetica");
    }

    #[test]
    fn test_style_keeps_explicit_style_in_name() {
        let style = FontStyle::new(Some("Helvetica-Bold"), false, false);
        assert_eq!(style.standard_font_name(), "Helvetica-Bold");
    }

    #[test]
    fn test_strip_subset_prefix() {
        assert_eq!(strip_subset_prefix("ABCDEF+Calibri"), "Calibri");
        assert_eq!(strip_subset_prefix("Helvetica"), "Helvetica");
        assert_eq!(strip_subset_prefix("abc+Name"), "abc+Name");
    }

    #[test]
    fn test_flags_from_name() {
        assert_eq!(flags_from_name("Helvetica-Bold"), FLAG_BOLD);
        assert_eq!(flags_from_name("Times-Italic"), FLAG_ITALIC | FLAG_SERIF);
        assert_eq!(flags_from_name("Courier"), FLAG_MONOSPACE);
        assert_eq!(flags_from_name("DejaVuSans"), 0);
    }

    #[test]
    fn test_win_ansi_roundtrip_specials() {
        assert_eq!(win_ansi_char(0x80), '€');
        assert_eq!(win_ansi_char(0x93), '\u{201C}');
        assert_eq!(encode_win_ansi("€ é"), vec![0x80, b' ', 0xE9]);
        assert_eq!(encode_win_ansi("日"), vec![b'?']);
    }

    #[test]
    fn test_parse_to_unicode_bfchar_and_bfrange() {
        let cmap = b"begincmap\n2 beginbfchar\n<01> <0048>\n<02> <0069>\nendbfchar\n\
            1 beginbfrange\n<10> <12> <0041>\nendbfrange\n\
            1 beginbfrange\n<20> <21> [<0078> <0079>]\nendbfrange\nendcmap";
        let map = parse_to_unicode(cmap);
        assert_eq!(map.get(&0x01).map(String::as_str), Some("H"));
        assert_eq!(map.get(&0x02).map(String::as_str), Some("i"));
        assert_eq!(map.get(&0x11).map(String::as_str), Some("B"));
        assert_eq!(map.get(&0x12).map(String::as_str), Some("C"));
        assert_eq!(map.get(&0x21).map(String::as_str), Some("y"));
    }

    #[test]
    fn test_decode_simple_font() {
        let font = FontInfo::standard("Helvetica");
        let codes = font.decode(b"Hi");
        assert_eq!(codes.len(), 2);
        assert_eq!(codes[1].text, "i");
        assert_eq!(codes[1].offset, 1);
        assert_eq!(font.width(b'H' as u32), 500.0);
    }

    #[test]
    fn test_courier_default_width() {
        assert_eq!(FontInfo::standard("Courier-Bold").width(65), 600.0);
    }

    #[test]
    fn test_from_dict_reads_widths() {
        let doc = Document::with_version("1.7");
        let dict = lopdf::dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "BaseFont" => "ABCDEF+Arial-BoldMT",
            "FirstChar" => 65,
            "Widths" => vec![Object::Integer(722), Object::Integer(667)],
        };
        let font = FontInfo::from_dict(&doc, &dict);
        assert_eq!(font.base_font, "Arial-BoldMT");
        assert_eq!(font.width(66), 667.0);
        assert_eq!(font.width(90), 500.0);
        assert!(font.flags & FLAG_BOLD != 0);
    }

    #[test]
    fn test_from_dict_type0_widths() {
        let doc = Document::with_version("1.7");
        let dict = lopdf::dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "NotoSans",
            "DescendantFonts" => vec![Object::Dictionary(lopdf::dictionary! {
                "DW" => 1000,
                "W" => vec![
                    Object::Integer(3),
                    Object::Array(vec![Object::Integer(250), Object::Integer(300)]),
                    Object::Integer(10),
                    Object::Integer(12),
                    Object::Integer(400),
                ],
            })],
        };
        let font = FontInfo::from_dict(&doc, &dict);
        assert!(font.two_byte);
        assert_eq!(font.width(4), 300.0);
        assert_eq!(font.width(11), 400.0);
        assert_eq!(font.width(99), 1000.0);
        assert_eq!(font.decode(&[0x00, 0x41, 0x00, 0x42]).len(), 2);
    }
}
