//! Page-oriented drawing surface.
//!
//! Every drawing call is recorded as a [`DrawOp`] on the current [`Page`] in
//! top-down engine coordinates. Nothing touches PDF syntax until [`Surface::render`],
//! which converts to PDF user space (points, y axis pointing up) and writes the
//! document with `pdf-writer`. Keeping a display list means tests can inspect
//! exactly what was drawn on which page.
//!
//! Watermarks are not ordinary ops: each page holds at most one, stamping again
//! replaces it, and it is painted underneath the page content.

use std::path::PathBuf;

use miniz_oxide::deflate::compress_to_vec_zlib;
use pdf_writer::types::LineCapStyle;
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref, Str, TextStr};
use thiserror::Error;

use crate::layout::metrics::{get_metrics, FontStyle, PageGeometry, Unit};

/// RGB colour, 0-255 per channel.
pub type Rgb = [u8; 3];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("page {page} does not exist (document has {count} pages)")]
    NoSuchPage { page: usize, count: usize },

    #[error("non-finite coordinate on page {page}")]
    InvalidGeometry { page: usize },

    #[error("failed to write PDF to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

/// One recorded drawing operation. `y` is measured from the top edge of the page.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        text: String,
        x: f32,
        y: f32,
        font_size: f32,
        style: FontStyle,
        color: Rgb,
        align: Align,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: f32,
        color: Rgb,
    },
    RoundedRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        radius: f32,
        color: Rgb,
    },
    /// Vector tick mark whose lower-left sits at the text baseline `(x, y)`.
    Checkmark {
        x: f32,
        y: f32,
        font_size: f32,
        color: Rgb,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Watermark {
    pub text: String,
    pub font_size: f32,
    pub color: Rgb,
    /// Counter-clockwise rotation in degrees.
    pub angle: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    ops: Vec<DrawOp>,
    watermark: Option<Watermark>,
}

impl Page {
    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn watermark(&self) -> Option<&Watermark> {
        self.watermark.as_ref()
    }

    /// Number of watermarks painted on this page (0 or 1).
    pub fn watermark_count(&self) -> usize {
        usize::from(self.watermark.is_some())
    }

    /// All text runs on the page, in drawing order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// The recorded document: pages plus the page that drawing currently targets.
pub struct Surface {
    geometry: PageGeometry,
    unit: Unit,
    pages: Vec<Page>,
    current: usize,
}

impl Surface {
    /// Opens a surface with a single blank page.
    pub fn new(geometry: PageGeometry, unit: Unit) -> Self {
        Self {
            geometry,
            unit,
            pages: vec![Page::default()],
            current: 0,
        }
    }

    /// Appends a blank page and makes it current. Returns its 1-based number.
    pub fn add_page(&mut self) -> usize {
        self.pages.push(Page::default());
        self.current = self.pages.len() - 1;
        self.pages.len()
    }

    /// Selects the 1-based page that subsequent drawing targets.
    pub fn set_page(&mut self, page: usize) -> Result<(), RenderError> {
        if page == 0 || page > self.pages.len() {
            return Err(RenderError::NoSuchPage {
                page,
                count: self.pages.len(),
            });
        }
        self.current = page - 1;
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn push(&mut self, op: DrawOp) {
        self.pages[self.current].ops.push(op);
    }

    pub fn stamp_watermark(&mut self, watermark: Watermark) {
        self.pages[self.current].watermark = Some(watermark);
    }

    /// Serialises the recorded pages into a complete PDF file.
    pub fn render(&self) -> Result<Vec<u8>, RenderError> {
        let mut pdf = Pdf::new();
        let mut next_id = 1i32;
        let mut alloc = || {
            let r = Ref::new(next_id);
            next_id += 1;
            r
        };

        let catalog_id = alloc();
        let pages_id = alloc();
        let info_id = alloc();
        let fonts = [
            (FontStyle::Normal, alloc()),
            (FontStyle::Bold, alloc()),
        ];
        let page_ids: Vec<(Ref, Ref)> = self.pages.iter().map(|_| (alloc(), alloc())).collect();

        pdf.catalog(catalog_id).pages(pages_id);
        pdf.pages(pages_id)
            .kids(page_ids.iter().map(|(page_id, _)| *page_id))
            .count(page_ids.len() as i32);
        pdf.document_info(info_id)
            .producer(TextStr(concat!("proposal-api ", env!("CARGO_PKG_VERSION"))));

        for (style, font_id) in fonts {
            pdf.type1_font(font_id)
                .base_font(Name(style.base_font()))
                .encoding_predefined(Name(b"WinAnsiEncoding"));
        }

        let k = self.unit.points_per_unit();
        let media = Rect::new(0.0, 0.0, self.geometry.width * k, self.geometry.height * k);

        for (index, (page, (page_id, content_id))) in self.pages.iter().zip(&page_ids).enumerate() {
            let raw = self.page_content(index, page)?;
            let compressed = compress_to_vec_zlib(&raw, 6);
            pdf.stream(*content_id, &compressed)
                .filter(Filter::FlateDecode);

            let mut pdf_page = pdf.page(*page_id);
            pdf_page
                .media_box(media)
                .parent(pages_id)
                .contents(*content_id);
            {
                let mut resources = pdf_page.resources();
                let mut font_dict = resources.fonts();
                for (style, font_id) in fonts {
                    font_dict.pair(Name(style.resource_name()), font_id);
                }
                font_dict.finish();
            }
            pdf_page.finish();
        }

        Ok(pdf.finish())
    }

    // ── content stream construction ────────────────────────────────────────

    fn page_content(&self, index: usize, page: &Page) -> Result<Vec<u8>, RenderError> {
        let mut content = Content::new();

        if let Some(watermark) = &page.watermark {
            self.paint_watermark(&mut content, watermark);
        }

        for op in &page.ops {
            if !op_is_finite(op) {
                return Err(RenderError::InvalidGeometry { page: index + 1 });
            }
            match op {
                DrawOp::Text {
                    text,
                    x,
                    y,
                    font_size,
                    style,
                    color,
                    align,
                } => {
                    let width = get_metrics(*style).text_width(text, *font_size, self.unit);
                    let left = match align {
                        Align::Left => *x,
                        Align::Center => x - width / 2.0,
                        Align::Right => x - width,
                    };
                    let (px, py) = self.to_pdf(left, *y);
                    set_fill(&mut content, *color);
                    content
                        .begin_text()
                        .set_font(Name(style.resource_name()), *font_size)
                        .set_text_matrix([1.0, 0.0, 0.0, 1.0, px, py])
                        .show(Str(&encode_win_ansi(text)))
                        .end_text();
                }
                DrawOp::Line {
                    x1,
                    y1,
                    x2,
                    y2,
                    width,
                    color,
                } => {
                    let (ax, ay) = self.to_pdf(*x1, *y1);
                    let (bx, by) = self.to_pdf(*x2, *y2);
                    content.save_state();
                    set_stroke(&mut content, *color);
                    content
                        .set_line_width(width * self.unit.points_per_unit())
                        .move_to(ax, ay)
                        .line_to(bx, by)
                        .stroke();
                    content.restore_state();
                }
                DrawOp::RoundedRect {
                    x,
                    y,
                    width,
                    height,
                    radius,
                    color,
                } => {
                    let k = self.unit.points_per_unit();
                    let (left, bottom) = self.to_pdf(*x, y + height);
                    content.save_state();
                    set_fill(&mut content, *color);
                    rounded_rect_path(&mut content, left, bottom, width * k, height * k, radius * k);
                    content.fill_nonzero();
                    content.restore_state();
                }
                DrawOp::Checkmark {
                    x,
                    y,
                    font_size,
                    color,
                } => {
                    // Glyph box roughly 0.6em wide, 0.7em tall.
                    let em = font_size / self.unit.points_per_unit();
                    let (ax, ay) = self.to_pdf(*x, y - em * 0.35);
                    let (bx, by) = self.to_pdf(x + em * 0.22, *y);
                    let (cx, cy) = self.to_pdf(x + em * 0.6, y - em * 0.7);
                    content.save_state();
                    set_stroke(&mut content, *color);
                    content
                        .set_line_width(font_size * 0.1)
                        .set_line_cap(LineCapStyle::RoundCap)
                        .move_to(ax, ay)
                        .line_to(bx, by)
                        .line_to(cx, cy)
                        .stroke();
                    content.restore_state();
                }
            }
        }

        Ok(content.finish())
    }

    /// Centred, rotated text through the middle of the page.
    fn paint_watermark(&self, content: &mut Content, watermark: &Watermark) {
        let k = self.unit.points_per_unit();
        let width_pt = get_metrics(FontStyle::Bold).measure_str(&watermark.text) * watermark.font_size;
        let half_height_pt = watermark.font_size * 0.35;
        let (cx, cy) = (self.geometry.width * k / 2.0, self.geometry.height * k / 2.0);
        let (sin, cos) = watermark.angle.to_radians().sin_cos();
        // Shift the baseline origin so the text's centre lands on the page centre.
        let ox = cx - (width_pt / 2.0) * cos + half_height_pt * sin;
        let oy = cy - (width_pt / 2.0) * sin - half_height_pt * cos;

        content.save_state();
        set_fill(content, watermark.color);
        content
            .begin_text()
            .set_font(Name(FontStyle::Bold.resource_name()), watermark.font_size)
            .set_text_matrix([cos, sin, -sin, cos, ox, oy])
            .show(Str(&encode_win_ansi(&watermark.text)))
            .end_text();
        content.restore_state();
    }

    fn to_pdf(&self, x: f32, y: f32) -> (f32, f32) {
        let k = self.unit.points_per_unit();
        (x * k, (self.geometry.height - y) * k)
    }
}

fn set_fill(content: &mut Content, color: Rgb) {
    let [r, g, b] = color;
    content.set_fill_rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
}

fn set_stroke(content: &mut Content, color: Rgb) {
    let [r, g, b] = color;
    content.set_stroke_rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
}

fn op_is_finite(op: &DrawOp) -> bool {
    let finite = |values: &[f32]| values.iter().all(|v| v.is_finite());
    match op {
        DrawOp::Text { x, y, font_size, .. } => finite(&[*x, *y, *font_size]),
        DrawOp::Line {
            x1, y1, x2, y2, width, ..
        } => finite(&[*x1, *y1, *x2, *y2, *width]),
        DrawOp::RoundedRect {
            x,
            y,
            width,
            height,
            radius,
            ..
        } => finite(&[*x, *y, *width, *height, *radius]),
        DrawOp::Checkmark { x, y, font_size, .. } => finite(&[*x, *y, *font_size]),
    }
}

/// Appends a closed rounded-rectangle path. `(x, y)` is the bottom-left corner in PDF space.
fn rounded_rect_path(content: &mut Content, x: f32, y: f32, w: f32, h: f32, radius: f32) {
    const KAPPA: f32 = 0.552_284_8;
    let r = radius.clamp(0.0, w.min(h) / 2.0);
    if r == 0.0 {
        content.rect(x, y, w, h);
        return;
    }
    let c = r * KAPPA;
    content
        .move_to(x + r, y)
        .line_to(x + w - r, y)
        .cubic_to(x + w - r + c, y, x + w, y + r - c, x + w, y + r)
        .line_to(x + w, y + h - r)
        .cubic_to(x + w, y + h - r + c, x + w - r + c, y + h, x + w - r, y + h)
        .line_to(x + r, y + h)
        .cubic_to(x + r - c, y + h, x, y + h - r + c, x, y + h - r)
        .line_to(x, y + r)
        .cubic_to(x, y + r - c, x + r - c, y, x + r, y)
        .close_path();
}

// ────────────────────────────────────────────────────────────────────────────
// WinAnsi encoding
// ────────────────────────────────────────────────────────────────────────────

/// Byte for `c` in WinAnsiEncoding, if the standard fonts can show it.
fn win_ansi_byte(c: char) -> Option<u8> {
    let code = c as u32;
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as u8),
        _ => match c {
            '€' => Some(0x80),
            '‚' => Some(0x82),
            'ƒ' => Some(0x83),
            '„' => Some(0x84),
            '…' => Some(0x85),
            '†' => Some(0x86),
            '‡' => Some(0x87),
            'ˆ' => Some(0x88),
            '‰' => Some(0x89),
            'Š' => Some(0x8A),
            '‹' => Some(0x8B),
            'Œ' => Some(0x8C),
            'Ž' => Some(0x8E),
            '‘' => Some(0x91),
            '’' => Some(0x92),
            '“' => Some(0x93),
            '”' => Some(0x94),
            '•' => Some(0x95),
            '–' => Some(0x96),
            '—' => Some(0x97),
            '˜' => Some(0x98),
            '™' => Some(0x99),
            'š' => Some(0x9A),
            '›' => Some(0x9B),
            'œ' => Some(0x9C),
            'ž' => Some(0x9E),
            'Ÿ' => Some(0x9F),
            _ => None,
        },
    }
}

/// Rewrites `text` so every character is showable with the standard fonts.
///
/// Newlines survive (the wrapper consumes them). Known glyphs outside WinAnsi
/// are transliterated; anything else becomes `?`.
pub fn normalize_glyphs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => out.push('\n'),
            '\r' => {}
            '\t' => out.push(' '),
            '₹' => out.push_str("Rs."),
            '→' => out.push_str("->"),
            '≥' => out.push_str(">="),
            '≤' => out.push_str("<="),
            '✓' | '✔' => out.push('-'),
            _ if win_ansi_byte(c).is_some() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(|c| win_ansi_byte(c).unwrap_or(b'?')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::metrics::{Orientation, PageFormat};

    fn surface() -> Surface {
        Surface::new(
            PageGeometry::new(Orientation::Portrait, Unit::Mm, PageFormat::A4),
            Unit::Mm,
        )
    }

    fn watermark(text: &str) -> Watermark {
        Watermark {
            text: text.to_string(),
            font_size: 72.0,
            color: [220, 220, 220],
            angle: 45.0,
        }
    }

    #[test]
    fn test_restamping_replaces_watermark() {
        let mut s = surface();
        s.stamp_watermark(watermark("CONFIDENTIAL"));
        s.stamp_watermark(watermark("CONFIDENTIAL"));
        assert_eq!(s.pages()[0].watermark_count(), 1);
    }

    #[test]
    fn test_set_page_out_of_range_is_an_error() {
        let mut s = surface();
        assert!(matches!(s.set_page(0), Err(RenderError::NoSuchPage { .. })));
        assert!(matches!(s.set_page(2), Err(RenderError::NoSuchPage { page: 2, count: 1 })));
        s.add_page();
        assert!(s.set_page(1).is_ok());
    }

    #[test]
    fn test_render_produces_pdf_with_one_page_object_per_page() {
        let mut s = surface();
        s.push(DrawOp::Text {
            text: "Executive Summary".to_string(),
            x: 25.0,
            y: 40.0,
            font_size: 18.0,
            style: FontStyle::Bold,
            color: [0, 0, 0],
            align: Align::Left,
        });
        s.add_page();
        s.push(DrawOp::RoundedRect {
            x: 25.0,
            y: 30.0,
            width: 160.0,
            height: 20.0,
            radius: 2.0,
            color: [248, 249, 250],
        });
        let bytes = s.render().unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Count 2"));
        assert!(text.contains("/Helvetica-Bold"));
        assert!(text.contains("/WinAnsiEncoding"));
    }

    #[test]
    fn test_non_finite_geometry_fails_render() {
        let mut s = surface();
        s.push(DrawOp::Line {
            x1: 0.0,
            y1: f32::NAN,
            x2: 10.0,
            y2: 10.0,
            width: 0.5,
            color: [0, 0, 0],
        });
        assert!(matches!(s.render(), Err(RenderError::InvalidGeometry { page: 1 })));
    }

    #[test]
    fn test_normalize_glyphs() {
        assert_eq!(normalize_glyphs("₹1,50,000"), "Rs.1,50,000");
        assert_eq!(normalize_glyphs("€ £ – ok"), "€ £ – ok");
        assert_eq!(normalize_glyphs("a\tb\r\nc"), "a b\nc");
        assert_eq!(normalize_glyphs("日本"), "??");
    }

    #[test]
    fn test_encode_win_ansi_specials() {
        assert_eq!(encode_win_ansi("€—é"), vec![0x80, 0x97, 0xE9]);
    }
}
