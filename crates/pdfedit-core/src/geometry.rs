//! Coordinate transformation between page space, the editor canvas and PDF space
//!
//! Page space has a top-left origin with y growing downward (what the editor
//! sees). PDF space has a bottom-left origin. Both are in points.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in page space (top-left origin)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            self.x0.min(other.x0),
            self.y0.min(other.y0),
            self.x1.max(other.x1),
            self.y1.max(other.y1),
        )
    }

    pub fn scaled(&self, scale: f64) -> Rect {
        Rect::new(
            self.x0 * scale,
            self.y0 * scale,
            self.x1 * scale,
            self.y1 * scale,
        )
    }
}

/// A page's visible area: media box origin and size in PDF space
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageBox {
    pub llx: f64,
    pub lly: f64,
    pub width: f64,
    pub height: f64,
}

impl PageBox {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            llx: 0.0,
            lly: 0.0,
            width,
            height,
        }
    }

    /// PDF-space point to page space
    pub fn to_page(&self, pdf_x: f64, pdf_y: f64) -> (f64, f64) {
        (pdf_x - self.llx, self.height - (pdf_y - self.lly))
    }

    /// Page-space point to PDF space
    pub fn to_pdf(&self, x: f64, y: f64) -> (f64, f64) {
        (x + self.llx, self.lly + self.height - y)
    }
}

/// Result of fitting a page onto a bounded-width canvas
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitScale {
    pub scale: f64,
    pub width: f64,
    pub height: f64,
}

/// Fit a page of `width` x `height` into `target_width`, never upscaling.
pub fn fit_to_width(width: f64, height: f64, target_width: f64) -> FitScale {
    let scale = if width > 0.0 && target_width > 0.0 {
        (target_width / width).min(1.0)
    } else {
        1.0
    };
    FitScale {
        scale,
        width: width * scale,
        height: height * scale,
    }
}

/// Independent horizontal/vertical mapping from an editor canvas onto a target page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasMapping {
    pub scale_x: f64,
    pub scale_y: f64,
}

impl CanvasMapping {
    pub fn new(canvas: (f64, f64), target: (f64, f64)) -> Self {
        let ratio = |t: f64, c: f64| if c > 0.0 { t / c } else { 1.0 };
        Self {
            scale_x: ratio(target.0, canvas.0),
            scale_y: ratio(target.1, canvas.1),
        }
    }

    pub fn map_point(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.scale_x, y * self.scale_y)
    }

    pub fn map_size(&self, width: f64, height: f64) -> (f64, f64) {
        (width * self.scale_x, height * self.scale_y)
    }
}

/// PDF affine matrix `[a b c d e f]` applied as row vector: `p' = p * M`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix {
    pub const fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// `self` applied first, then `other`
    pub fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.a + y * self.c + self.e,
            x * self.b + y * self.d + self.f,
        )
    }

    /// Length of the transformed unit y vector
    pub fn vertical_scale(&self) -> f64 {
        (self.c * self.c + self.d * self.d).sqrt()
    }

    /// Rotation of `angle_deg` counter-clockwise about `(cx, cy)` composed after a
    /// `width` x `height` scale of the unit square centred on the origin.
    pub fn rotated_box(width: f64, height: f64, cx: f64, cy: f64, angle_deg: f64) -> Matrix {
        let (sin, cos) = angle_deg.to_radians().sin_cos();
        Matrix {
            a: width * cos,
            b: width * sin,
            c: -height * sin,
            d: height * cos,
            e: cx - 0.5 * (width * cos - height * sin),
            f: cy - 0.5 * (width * sin + height * cos),
        }
    }
}

/// Bounding size of a `width` x `height` box rotated by `angle_deg`
pub fn rotated_extent(width: f64, height: f64, angle_deg: f64) -> (f64, f64) {
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    (
        (width * cos).abs() + (height * sin).abs(),
        (width * sin).abs() + (height * cos).abs(),
    )
}

/// Clamp `value` into `[min, max]`
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn dimension() -> impl Strategy<Value = f64> {
        1.0f64..5000.0
    }

    proptest! {
        #[test]
        fn scale_never_exceeds_one(w in dimension(), h in dimension(), target in dimension()) {
            let fit = fit_to_width(w, h, target);
            prop_assert!(fit.scale <= 1.0);
            prop_assert!(fit.width <= target + 1e-6 || fit.scale == 1.0);
        }

        #[test]
        fn fit_preserves_aspect_ratio(w in dimension(), h in dimension(), target in dimension()) {
            let fit = fit_to_width(w, h, target);
            prop_assert!(((fit.width / fit.height) - (w / h)).abs() < 1e-6 * (w / h).max(1.0));
        }

        #[test]
        fn page_box_roundtrip(x in 0.0f64..1000.0, y in 0.0f64..1000.0, h in dimension()) {
            let page = PageBox::new(612.0, h);
            let (px, py) = page.to_pdf(x, y);
            let (bx, by) = page.to_page(px, py);
            prop_assert!((bx - x).abs() < 1e-6);
            prop_assert!((by - y).abs() < 1e-6);
        }
    }
}
