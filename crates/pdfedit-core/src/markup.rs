//! The positioned markup mini-format
//!
//! Emitted by the extractor, edited by a human in a browser, and read back by
//! the reconstructor. Only this narrow shape is understood:
//!
//! ```text
//! <div class="pdf-page" data-page="1" data-width="612" data-height="792" data-scale="1" style="...">
//!   <span class="text-span editable-text" data-text="Hi" style="position: absolute; left: 72px; top: 83px; font-size: 12px; font-family: Helvetica;">Hi</span>
//!   <img class="editable-image" data-image-id="1" src="data:image/png;base64,..." style="position: absolute; left: 72px; top: 242px; width: 100px; height: 50px;">
//! </div>
//! ```
//!
//! A page fragment runs from its container to the next page container, so
//! nested `div`s and attribute order do not matter.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref DIV_OPEN: Regex = Regex::new(r"(?i)<div\b([^>]*)>").unwrap();

    static ref ELEMENT: Regex =
        Regex::new(r"(?is)<span\b([^>]*)>(.*?)</span\s*>|<img\b([^>]*?)/?>").unwrap();

    static ref ATTRIBUTE: Regex =
        Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap();

    static ref TAG: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
}

/// One positioned element read back from a page fragment
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupElement {
    Text {
        left: Option<f64>,
        top: Option<f64>,
        text: String,
        font_family: Option<String>,
        bold: bool,
        italic: bool,
    },
    Image {
        left: Option<f64>,
        top: Option<f64>,
        width: Option<f64>,
        height: Option<f64>,
        data: String,
    },
    Unrecognized {
        snippet: String,
        reason: String,
    },
}

/// A page container and the elements found in its fragment
#[derive(Debug, Clone, PartialEq)]
pub struct MarkupPage {
    pub page: u32,
    /// Canvas the fragment was laid out on (`data-width`, `data-height`)
    pub canvas: Option<(f64, f64)>,
    pub elements: Vec<MarkupElement>,
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Up to two decimals, trailing zeros trimmed
pub fn fmt_num(value: f64) -> String {
    let s = format!("{:.2}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" || s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

pub fn page_open(page: u32, width: f64, height: f64, scale: f64) -> String {
    format!(
        "<div class=\"pdf-page\" data-page=\"{page}\" data-width=\"{w}\" data-height=\"{h}\" data-scale=\"{s}\" style=\"position: relative; width: {w}px; height: {h}px;\">",
        page = page,
        w = fmt_num(width),
        h = fmt_num(height),
        s = fmt_num(scale),
    )
}

pub struct TextMarkup<'a> {
    pub text: &'a str,
    pub left: f64,
    pub top: f64,
    pub font_size: f64,
    pub font_family: &'a str,
    pub bold: bool,
    pub italic: bool,
}

pub fn text_element(span: &TextMarkup<'_>) -> String {
    let mut style = format!(
        "position: absolute; left: {}px; top: {}px; font-size: {}px; font-family: {};",
        fmt_num(span.left),
        fmt_num(span.top),
        fmt_num(span.font_size),
        escape(span.font_family),
    );
    if span.bold {
        style.push_str(" font-weight: bold;");
    }
    if span.italic {
        style.push_str(" font-style: italic;");
    }
    let text = escape(span.text);
    format!(
        "<span class=\"text-span editable-text\" data-text=\"{text}\" style=\"{style}\">{text}</span>",
        text = text,
        style = style,
    )
}

pub fn image_element(id: u32, src: &str, left: f64, top: f64, width: f64, height: f64) -> String {
    format!(
        "<img class=\"editable-image\" data-image-id=\"{}\" src=\"{}\" style=\"position: absolute; left: {}px; top: {}px; width: {}px; height: {}px;\">",
        id,
        escape(src),
        fmt_num(left),
        fmt_num(top),
        fmt_num(width),
        fmt_num(height),
    )
}

fn attributes(tag_body: &str) -> HashMap<String, String> {
    ATTRIBUTE
        .captures_iter(tag_body)
        .map(|cap| {
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            (cap[1].to_ascii_lowercase(), unescape(value))
        })
        .collect()
}

fn style_map(style: &str) -> HashMap<String, String> {
    style
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            Some((prop.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

fn px(styles: &HashMap<String, String>, prop: &str) -> Option<f64> {
    let raw = styles.get(prop)?;
    let number = raw.trim().trim_end_matches("px").trim();
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn has_class(attrs: &HashMap<String, String>, class: &str) -> bool {
    attrs
        .get("class")
        .map(|c| c.split_whitespace().any(|name| name.eq_ignore_ascii_case(class)))
        .unwrap_or(false)
}

fn snippet(raw: &str) -> String {
    const MAX: usize = 80;
    if raw.chars().count() <= MAX {
        raw.to_string()
    } else {
        raw.chars().take(MAX).collect::<String>() + "…"
    }
}

fn parse_element(cap: &regex::Captures<'_>) -> MarkupElement {
    let raw = &cap[0];
    if let Some(span_attrs) = cap.get(1) {
        let attrs = attributes(span_attrs.as_str());
        if !has_class(&attrs, "editable-text") {
            return MarkupElement::Unrecognized {
                snippet: snippet(raw),
                reason: "span without editable-text class".to_string(),
            };
        }
        let styles = style_map(attrs.get("style").map(String::as_str).unwrap_or_default());
        let inner = cap.get(2).map(|m| m.as_str()).unwrap_or_default();
        let text = unescape(&TAG.replace_all(inner, ""));
        let weight = styles.get("font-weight").map(|w| w.to_ascii_lowercase());
        return MarkupElement::Text {
            left: px(&styles, "left"),
            top: px(&styles, "top"),
            text,
            font_family: styles
                .get("font-family")
                .map(|f| f.trim_matches(|c| c == '"' || c == '\'').to_string())
                .filter(|f| !f.is_empty()),
            bold: matches!(weight.as_deref(), Some("bold" | "bolder" | "700" | "800" | "900")),
            italic: styles
                .get("font-style")
                .map(|s| s.eq_ignore_ascii_case("italic") || s.eq_ignore_ascii_case("oblique"))
                .unwrap_or(false),
        };
    }

    let attrs = attributes(cap.get(3).map(|m| m.as_str()).unwrap_or_default());
    if !has_class(&attrs, "editable-image") {
        return MarkupElement::Unrecognized {
            snippet: snippet(raw),
            reason: "img without editable-image class".to_string(),
        };
    }
    let Some(src) = attrs.get("src").filter(|s| !s.trim().is_empty()) else {
        return MarkupElement::Unrecognized {
            snippet: snippet(raw),
            reason: "img without src".to_string(),
        };
    };
    let styles = style_map(attrs.get("style").map(String::as_str).unwrap_or_default());
    MarkupElement::Image {
        left: px(&styles, "left"),
        top: px(&styles, "top"),
        width: px(&styles, "width"),
        height: px(&styles, "height"),
        data: src.clone(),
    }
}

/// Split markup into page fragments and parse their elements
pub fn parse_markup(markup: &str) -> Vec<MarkupPage> {
    let mut starts: Vec<(usize, usize, u32, Option<(f64, f64)>)> = Vec::new();
    for cap in DIV_OPEN.captures_iter(markup) {
        let attrs = attributes(&cap[1]);
        if !has_class(&attrs, "pdf-page") {
            continue;
        }
        let Some(page) = attrs.get("data-page").and_then(|p| p.trim().parse::<u32>().ok()) else {
            continue;
        };
        let dim = |key: &str| {
            attrs
                .get(key)
                .and_then(|v| v.trim().trim_end_matches("px").parse::<f64>().ok())
                .filter(|v| *v > 0.0)
        };
        let canvas = dim("data-width").zip(dim("data-height"));
        let whole = cap.get(0).map(|m| (m.start(), m.end())).unwrap_or_default();
        starts.push((whole.0, whole.1, page, canvas));
    }

    let mut pages = Vec::with_capacity(starts.len());
    for (idx, &(_, body_start, page, canvas)) in starts.iter().enumerate() {
        let body_end = starts
            .get(idx + 1)
            .map(|next| next.0)
            .unwrap_or(markup.len());
        let fragment = &markup[body_start..body_end];
        let elements = ELEMENT
            .captures_iter(fragment)
            .map(|cap| parse_element(&cap))
            .collect();
        pages.push(MarkupPage {
            page,
            canvas,
            elements,
        });
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fmt_num() {
        assert_eq!(fmt_num(72.0), "72");
        assert_eq!(fmt_num(12.346), "12.35");
        assert_eq!(fmt_num(0.5), "0.5");
        assert_eq!(fmt_num(-0.001), "0");
    }

    #[test]
    fn test_escape_unescape() {
        let raw = r#"a < b & "c" > d"#;
        assert_eq!(escape(raw), "a &lt; b &amp; &quot;c&quot; &gt; d");
        assert_eq!(unescape(&escape(raw)), raw);
        assert_eq!(unescape("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_emitted_text_parses_back() {
        let html = format!(
            "{}<div class=\"text-line\">{}</div></div>",
            page_open(1, 612.0, 792.0, 1.0),
            text_element(&TextMarkup {
                text: "Fish & Chips",
                left: 72.0,
                top: 83.4,
                font_size: 12.0,
                font_family: "Times-Bold",
                bold: true,
                italic: false,
            })
        );
        let pages = parse_markup(&html);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].canvas, Some((612.0, 792.0)));
        assert_eq!(
            pages[0].elements,
            vec![MarkupElement::Text {
                left: Some(72.0),
                top: Some(83.4),
                text: "Fish & Chips".to_string(),
                font_family: Some("Times-Bold".to_string()),
                bold: true,
                italic: false,
            }]
        );
    }

    #[test]
    fn test_fragment_runs_to_next_page_container() {
        let html = r#"<div class="pdf-page" data-page="1"><div class="text-line"><span class="editable-text" style="left: 1px; top: 2px;">A</span></div><span class="editable-text" style="left: 3px; top: 4px;">B</span></div>
<div data-page="2" class="pdf-page other"><span class="editable-text" style="top: 5px; left: 6px;">C</span></div>"#;
        let pages = parse_markup(html);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].elements.len(), 2);
        assert_eq!(pages[0].canvas, None);
        assert_eq!(pages[1].page, 2);
        match &pages[1].elements[0] {
            MarkupElement::Text { left, top, text, .. } => {
                assert_eq!((*left, *top), (Some(6.0), Some(5.0)));
                assert_eq!(text, "C");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_image_attributes_in_any_order() {
        let html = r#"<div class="pdf-page" data-page="1"><img style="width: 10px; height: 20px; left: 1px; top: 2px;" src="data:image/jpeg;base64,AAAA" data-image-id="1" class="editable-image" /></div>"#;
        let pages = parse_markup(html);
        assert_eq!(
            pages[0].elements[0],
            MarkupElement::Image {
                left: Some(1.0),
                top: Some(2.0),
                width: Some(10.0),
                height: Some(20.0),
                data: "data:image/jpeg;base64,AAAA".to_string(),
            }
        );
    }

    #[test]
    fn test_unparsable_coordinates_are_none() {
        let html = r#"<div class="pdf-page" data-page="1"><span class="editable-text" style="left: auto;">x</span></div>"#;
        let pages = parse_markup(html);
        assert!(matches!(
            &pages[0].elements[0],
            MarkupElement::Text { left: None, top: None, .. }
        ));
    }

    #[test]
    fn test_foreign_elements_are_unrecognized() {
        let html = r#"<div class="pdf-page" data-page="1"><span class="note">n</span><img src="x.png"></div>"#;
        let pages = parse_markup(html);
        assert_eq!(pages[0].elements.len(), 2);
        assert!(pages[0]
            .elements
            .iter()
            .all(|e| matches!(e, MarkupElement::Unrecognized { .. })));
    }

    #[test]
    fn test_page_without_number_is_ignored() {
        assert!(parse_markup(r#"<div class="pdf-page">x</div>"#).is_empty());
    }
}
