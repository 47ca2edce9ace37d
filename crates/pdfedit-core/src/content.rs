//! Content stream interpreter
//!
//! Walks a page's operators with a graphics/text state machine and produces
//! positioned glyphs grouped into text blocks, lines and spans, plus every
//! image draw in paint order. Positions are reported in page space.

use crate::error::Result;
use crate::fonts::FontInfo;
use crate::geometry::{Matrix, PageBox, Rect};
use crate::page::{decode_content, number, page_box, page_resources, resolve, stream_bytes};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use tracing::debug;

/// Nested form XObjects deeper than this are not entered
const MAX_FORM_DEPTH: usize = 8;

/// Gap (in font sizes) that splits a line into separate spans
const SPAN_BREAK_GAP: f64 = 1.5;
/// Gap (in font sizes) that is read as a word space
const WORD_GAP: f64 = 0.2;

/// Where a glyph's code lives inside the top-level content stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlyphSource {
    /// Index into `Content::operations`
    pub op_index: usize,
    /// Index of the string inside a TJ array (0 for the other show operators)
    pub element: usize,
    /// Byte offset of the code in that string
    pub offset: usize,
    pub len: usize,
}

#[derive(Debug, Clone)]
pub struct Glyph {
    pub text: String,
    pub bbox: Rect,
    /// Baseline y in page space
    pub baseline: f64,
    /// Font size in page space
    pub size: f64,
    pub font: String,
    pub flags: u32,
    /// Horizontal displacement expressed as a TJ adjustment (thousandths)
    pub kern_equivalent: f64,
    /// `None` for glyphs drawn by form XObjects and synthesized word spaces
    pub source: Option<GlyphSource>,
}

impl Glyph {
    fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TextSpan {
    pub text: String,
    pub bbox: Rect,
    pub font: String,
    pub size: f64,
    pub flags: u32,
    pub glyphs: Vec<Glyph>,
}

impl TextSpan {
    fn start(glyph: Glyph) -> Self {
        Self {
            text: glyph.text.clone(),
            bbox: glyph.bbox,
            font: glyph.font.clone(),
            size: glyph.size,
            flags: glyph.flags,
            glyphs: vec![glyph],
        }
    }

    fn push(&mut self, glyph: Glyph) {
        self.text.push_str(&glyph.text);
        self.bbox = self.bbox.union(&glyph.bbox);
        self.glyphs.push(glyph);
    }

    /// Byte range of each glyph's text inside `self.text`
    pub fn glyph_ranges(&self) -> Vec<(usize, usize)> {
        let mut start = 0;
        self.glyphs
            .iter()
            .map(|g| {
                let range = (start, start + g.text.len());
                start = range.1;
                range
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextLine {
    pub spans: Vec<TextSpan>,
}

#[derive(Debug, Clone, Default)]
pub struct TextBlock {
    pub lines: Vec<TextLine>,
}

impl TextBlock {
    pub fn bbox(&self) -> Option<Rect> {
        self.lines
            .iter()
            .flat_map(|l| l.spans.iter())
            .map(|s| s.bbox)
            .reduce(|a, b| a.union(&b))
    }
}

/// One paint of an image XObject
#[derive(Debug, Clone)]
pub struct ImageBlock {
    /// 1-based position among the page's image draws
    pub ordinal: u32,
    pub bbox: Rect,
    pub object_id: ObjectId,
    pub name: String,
}

#[derive(Debug, Clone)]
pub enum Block {
    Text(TextBlock),
    Image(ImageBlock),
}

#[derive(Debug, Clone)]
pub struct PageLayout {
    pub page: PageBox,
    pub blocks: Vec<Block>,
}

impl PageLayout {
    pub fn spans(&self) -> impl Iterator<Item = &TextSpan> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                Block::Text(t) => Some(t),
                Block::Image(_) => None,
            })
            .flat_map(|t| t.lines.iter())
            .flat_map(|l| l.spans.iter())
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageBlock> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Image(i) => Some(i),
            Block::Text(_) => None,
        })
    }
}

#[derive(Debug, Clone)]
struct TextState {
    font: Option<Vec<u8>>,
    size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    leading: f64,
    rise: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct GraphicsState {
    ctm: Matrix,
    text: TextState,
}

/// Resources in scope for one content stream (page or form)
struct Frame {
    resources: Dictionary,
    fonts: HashMap<Vec<u8>, FontInfo>,
    top_level: bool,
}

struct Interpreter<'a> {
    doc: &'a Document,
    page: PageBox,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    glyphs: Option<Vec<Glyph>>,
    blocks: Vec<Block>,
    image_count: u32,
}

/// Decode and interpret a page
pub fn interpret_page(doc: &Document, page_id: ObjectId) -> Result<(Content, PageLayout)> {
    let content = decode_content(doc, page_id)?;
    let layout = interpret(doc, page_id, &content);
    Ok((content, layout))
}

/// Interpret already decoded page content
pub fn interpret(doc: &Document, page_id: ObjectId, content: &Content) -> PageLayout {
    let page = page_box(doc, page_id);
    let mut interpreter = Interpreter {
        doc,
        page,
        state: GraphicsState::default(),
        stack: Vec::new(),
        text_matrix: Matrix::identity(),
        line_matrix: Matrix::identity(),
        glyphs: None,
        blocks: Vec::new(),
        image_count: 0,
    };
    let mut frame = Frame {
        resources: page_resources(doc, page_id),
        fonts: HashMap::new(),
        top_level: true,
    };
    interpreter.run(&content.operations, &mut frame, 0);
    interpreter.flush_text();

    debug!(
        blocks = interpreter.blocks.len(),
        images = interpreter.image_count,
        "interpreted page content"
    );
    PageLayout {
        page,
        blocks: interpreter.blocks,
    }
}

fn operand(operands: &[Object], idx: usize) -> f64 {
    operands.get(idx).and_then(number).unwrap_or(0.0)
}

fn matrix_from(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let v: Vec<f64> = operands.iter().take(6).filter_map(number).collect();
    (v.len() == 6).then(|| Matrix::new(v[0], v[1], v[2], v[3], v[4], v[5]))
}

impl<'a> Interpreter<'a> {
    fn run(&mut self, operations: &[Operation], frame: &mut Frame, depth: usize) {
        for (op_index, op) in operations.iter().enumerate() {
            let operands = op.operands.as_slice();
            match op.operator.as_str() {
                "q" => self.stack.push(self.state.clone()),
                "Q" => {
                    if let Some(state) = self.stack.pop() {
                        self.state = state;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_from(operands) {
                        self.state.ctm = m.then(&self.state.ctm);
                    }
                }
                "BT" => {
                    self.flush_text();
                    self.text_matrix = Matrix::identity();
                    self.line_matrix = Matrix::identity();
                    self.glyphs = Some(Vec::new());
                }
                "ET" => self.flush_text(),
                "Tf" => {
                    self.state.text.font = operands
                        .first()
                        .and_then(|o| o.as_name().ok())
                        .map(|n| n.to_vec());
                    self.state.text.size = operand(operands, 1);
                }
                "Tc" => self.state.text.char_spacing = operand(operands, 0),
                "Tw" => self.state.text.word_spacing = operand(operands, 0),
                "Tz" => self.state.text.horizontal_scale = operand(operands, 0) / 100.0,
                "TL" => self.state.text.leading = operand(operands, 0),
                "Ts" => self.state.text.rise = operand(operands, 0),
                "Td" => self.move_line(operand(operands, 0), operand(operands, 1)),
                "TD" => {
                    let ty = operand(operands, 1);
                    self.state.text.leading = -ty;
                    self.move_line(operand(operands, 0), ty);
                }
                "Tm" => {
                    if let Some(m) = matrix_from(operands) {
                        self.text_matrix = m;
                        self.line_matrix = m;
                    }
                }
                "T*" => self.next_line(),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(bytes, frame, op_index, 0);
                    }
                }
                "'" => {
                    self.next_line();
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(bytes, frame, op_index, 0);
                    }
                }
                "\"" => {
                    self.state.text.word_spacing = operand(operands, 0);
                    self.state.text.char_spacing = operand(operands, 1);
                    self.next_line();
                    if let Some(Object::String(bytes, _)) = operands.get(2) {
                        self.show(bytes, frame, op_index, 0);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        for (element, item) in items.iter().enumerate() {
                            match item {
                                Object::String(bytes, _) => {
                                    self.show(bytes, frame, op_index, element)
                                }
                                other => {
                                    if let Some(adjust) = number(other) {
                                        let ts = &self.state.text;
                                        let tx = -adjust / 1000.0 * ts.size * ts.horizontal_scale;
                                        self.text_matrix =
                                            Matrix::translate(tx, 0.0).then(&self.text_matrix);
                                    }
                                }
                            }
                        }
                    }
                }
                "Do" => {
                    if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                        self.draw_xobject(name, frame, depth);
                    }
                }
                _ => {}
            }
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = Matrix::translate(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.state.text.leading;
        self.move_line(0.0, -leading);
    }

    fn font_for(&self, frame: &mut Frame) -> FontInfo {
        let doc = self.doc;
        let Some(key) = self.state.text.font.clone() else {
            return FontInfo::default();
        };
        if let Some(font) = frame.fonts.get(&key) {
            return font.clone();
        }
        let font = frame
            .resources
            .get(b"Font")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok())
            .and_then(|fonts| fonts.get(&key).ok())
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok())
            .map(|dict| FontInfo::from_dict(doc, dict))
            .unwrap_or_default();
        frame.fonts.insert(key, font.clone());
        font
    }

    fn to_page_rect(&self, m: &Matrix, corners: &[(f64, f64)]) -> Rect {
        let points: Vec<(f64, f64)> = corners
            .iter()
            .map(|&(x, y)| {
                let (px, py) = m.apply(x, y);
                self.page.to_page(px, py)
            })
            .collect();
        let (mut x0, mut y0) = points[0];
        let (mut x1, mut y1) = points[0];
        for &(x, y) in &points[1..] {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        Rect::new(x0, y0, x1, y1)
    }

    fn show(&mut self, bytes: &[u8], frame: &mut Frame, op_index: usize, element: usize) {
        let font = self.font_for(frame);
        let ts = self.state.text.clone();
        let mut new_glyphs = Vec::new();

        for decoded in font.decode(bytes) {
            let w = font.width(decoded.code);
            let word = if !font.two_byte && decoded.code == 32 {
                ts.word_spacing
            } else {
                0.0
            };

            let trm = Matrix::new(ts.size * ts.horizontal_scale, 0.0, 0.0, ts.size, 0.0, ts.rise)
                .then(&self.text_matrix)
                .then(&self.state.ctm);
            let w0 = w / 1000.0;
            let bbox = self.to_page_rect(
                &trm,
                &[
                    (0.0, -font.descent),
                    (w0, -font.descent),
                    (0.0, font.ascent),
                    (w0, font.ascent),
                ],
            );
            let (ox, oy) = trm.apply(0.0, 0.0);
            let (_, baseline) = self.page.to_page(ox, oy);
            let size = ts.size * self.text_matrix.then(&self.state.ctm).vertical_scale();
            let kern_equivalent = if ts.size.abs() > f64::EPSILON {
                w + (ts.char_spacing + word) * 1000.0 / ts.size
            } else {
                w
            };

            new_glyphs.push(Glyph {
                text: decoded.text,
                bbox,
                baseline,
                size,
                font: font.base_font.clone(),
                flags: font.flags,
                kern_equivalent,
                source: frame.top_level.then_some(GlyphSource {
                    op_index,
                    element,
                    offset: decoded.offset,
                    len: decoded.len,
                }),
            });

            let tx = (w0 * ts.size + ts.char_spacing + word) * ts.horizontal_scale;
            self.text_matrix = Matrix::translate(tx, 0.0).then(&self.text_matrix);
        }
        self.glyphs
            .get_or_insert_with(Vec::new)
            .extend(new_glyphs);
    }

    fn draw_xobject(&mut self, name: &[u8], frame: &mut Frame, depth: usize) {
        let doc = self.doc;
        let Some(reference) = frame
            .resources
            .get(b"XObject")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok())
            .and_then(|x| x.get(name).ok())
        else {
            debug!(name = %String::from_utf8_lossy(name), "XObject not in resources");
            return;
        };
        let Ok(object_id) = reference.as_reference() else {
            return;
        };
        let Ok(stream) = doc.get_object(object_id).and_then(|o| o.as_stream()) else {
            return;
        };
        let subtype = stream.dict.get(b"Subtype").and_then(|o| o.as_name()).ok();

        match subtype {
            Some(b"Image") => {
                // images start a new block of their own
                self.flush_text();
                self.image_count += 1;
                let bbox = self.to_page_rect(
                    &self.state.ctm,
                    &[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)],
                );
                self.blocks.push(Block::Image(ImageBlock {
                    ordinal: self.image_count,
                    bbox,
                    object_id,
                    name: String::from_utf8_lossy(name).into_owned(),
                }));
            }
            Some(b"Form") => {
                if depth >= MAX_FORM_DEPTH {
                    debug!(depth, "form nesting too deep, skipping");
                    return;
                }
                let Ok(content) = Content::decode(&stream_bytes(stream)) else {
                    debug!(?object_id, "undecodable form content");
                    return;
                };
                let resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .map(|o| resolve(doc, o))
                    .and_then(|o| o.as_dict().ok())
                    .cloned()
                    .unwrap_or_else(|| frame.resources.clone());
                let form_matrix = stream
                    .dict
                    .get(b"Matrix")
                    .ok()
                    .and_then(|o| o.as_array().ok())
                    .and_then(|arr| matrix_from(arr))
                    .unwrap_or_default();

                let saved_text = (self.text_matrix, self.line_matrix);
                self.stack.push(self.state.clone());
                self.state.ctm = form_matrix.then(&self.state.ctm);
                let mut form_frame = Frame {
                    resources,
                    fonts: HashMap::new(),
                    top_level: false,
                };
                self.run(&content.operations, &mut form_frame, depth + 1);
                if let Some(state) = self.stack.pop() {
                    self.state = state;
                }
                (self.text_matrix, self.line_matrix) = saved_text;
            }
            _ => {}
        }
    }

    /// Close the current text object and group its glyphs into lines and spans
    fn flush_text(&mut self) {
        let Some(glyphs) = self.glyphs.take() else {
            return;
        };
        let block = group_glyphs(glyphs);
        if !block.lines.is_empty() {
            self.blocks.push(Block::Text(block));
        }
    }
}

fn word_space(prev: &Glyph, next: &Glyph) -> Glyph {
    Glyph {
        text: " ".to_string(),
        bbox: Rect::new(prev.bbox.x1, prev.bbox.y0, next.bbox.x0, prev.bbox.y1),
        baseline: prev.baseline,
        size: prev.size,
        font: prev.font.clone(),
        flags: prev.flags,
        kern_equivalent: 0.0,
        source: None,
    }
}

/// Split a text object's glyphs into lines (baseline changes) and spans
/// (font or size changes, large horizontal gaps)
pub fn group_glyphs(glyphs: Vec<Glyph>) -> TextBlock {
    let mut block = TextBlock::default();
    let mut line: Option<TextLine> = None;

    for glyph in glyphs {
        let Some(current_line) = line.as_mut() else {
            line = Some(TextLine {
                spans: vec![TextSpan::start(glyph)],
            });
            continue;
        };
        let Some(span) = current_line.spans.last_mut() else {
            current_line.spans.push(TextSpan::start(glyph));
            continue;
        };
        let Some(prev) = span.glyphs.last() else {
            span.push(glyph);
            continue;
        };

        let tolerance = (prev.size.max(glyph.size) * 0.1).max(0.5);
        if (glyph.baseline - prev.baseline).abs() > tolerance {
            if let Some(done) = line.take() {
                block.lines.push(done);
            }
            line = Some(TextLine {
                spans: vec![TextSpan::start(glyph)],
            });
            continue;
        }

        let gap = glyph.bbox.x0 - prev.bbox.x1;
        let size = prev.size.max(f64::EPSILON);
        let style_changed =
            glyph.font != span.font || (glyph.size - span.size).abs() > 0.01 * size.max(1.0);
        if style_changed || gap > SPAN_BREAK_GAP * size {
            current_line.spans.push(TextSpan::start(glyph));
        } else {
            if gap > WORD_GAP * size && !prev.is_blank() && !glyph.is_blank() {
                let space = word_space(prev, &glyph);
                span.push(space);
            }
            span.push(glyph);
        }
    }
    if let Some(done) = line {
        block.lines.push(done);
    }
    block
}
