//! Stateful page-layout engine over a [`Surface`].
//!
//! The engine owns the cursor (`y_position`), page geometry and page counter for
//! exactly one document. Drawing primitives are coordinate-free: they draw at the
//! cursor and advance it, inserting a page break first when the block would run
//! past the bottom margin.
//!
//! # Watermark contract
//! `open` does NOT watermark page 1; the caller must call `add_watermark` for it.
//! Every page created by `check_page_break` is stamped automatically with the
//! most recent watermark the caller applied (or the default one).

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::debug;

use crate::layout::metrics::{get_metrics, FontStyle, Orientation, PageFormat, PageGeometry, Unit};
use crate::layout::surface::{normalize_glyphs, Align, DrawOp, Page, RenderError, Rgb, Surface, Watermark};
use crate::layout::wrap::split_text_to_size;

/// Approximate baseline-to-baseline distance per point of font size, in mm.
const LINE_HEIGHT_MM_PER_PT: f32 = 0.4;
/// Space reserved before a heading is drawn.
const HEADING_MIN_HEIGHT: f32 = 20.0;
/// Minimum space reserved before a list item is drawn.
const LIST_ITEM_MIN_HEIGHT: f32 = 20.0;
/// Indent of list-item text past the checkmark.
const LIST_ITEM_INDENT: f32 = 6.0;
/// Vertical space a horizontal rule consumes.
pub const RULE_SPACING: f32 = 8.0;

pub const DEFAULT_WATERMARK_TEXT: &str = "CONFIDENTIAL";

// ────────────────────────────────────────────────────────────────────────────
// Options
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TextOptions {
    pub font_size: f32,
    pub style: FontStyle,
    pub color: Rgb,
    pub align: Align,
    /// Wrap width; defaults to the content width.
    pub max_width: Option<f32>,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            font_size: 11.0,
            style: FontStyle::Normal,
            color: [0, 0, 0],
            align: Align::Left,
            max_width: None,
        }
    }
}

impl TextOptions {
    pub fn sized(font_size: f32) -> Self {
        Self {
            font_size,
            ..Self::default()
        }
    }

    pub fn bold(mut self) -> Self {
        self.style = FontStyle::Bold;
        self
    }

    pub fn color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }

    pub fn align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn max_width(mut self, width: f32) -> Self {
        self.max_width = Some(width);
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LineOptions {
    pub color: Rgb,
    pub width: f32,
}

impl Default for LineOptions {
    fn default() -> Self {
        Self {
            color: [200, 200, 200],
            width: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WatermarkOptions {
    pub font_size: f32,
    pub color: Rgb,
    pub angle: f32,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            font_size: 72.0,
            color: [220, 220, 220],
            angle: 45.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ListItemOptions {
    pub font_size: f32,
    pub spacing: f32,
}

impl Default for ListItemOptions {
    fn default() -> Self {
        Self {
            font_size: 11.0,
            spacing: 6.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoxOptions {
    pub color: Rgb,
    pub radius: f32,
}

impl Default for BoxOptions {
    fn default() -> Self {
        Self {
            color: [248, 249, 250],
            radius: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SectionOptions {
    pub title_size: f32,
    pub content_size: f32,
}

impl Default for SectionOptions {
    fn default() -> Self {
        Self {
            title_size: 18.0,
            content_size: 11.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingLevel {
    H1,
    H2,
    H3,
}

impl HeadingLevel {
    fn font_size(self) -> f32 {
        match self {
            HeadingLevel::H1 => 18.0,
            HeadingLevel::H2 => 14.0,
            HeadingLevel::H3 => 12.0,
        }
    }

    fn spacing(self) -> f32 {
        match self {
            HeadingLevel::H1 => 8.0,
            _ => 6.0,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

/// Layout state for one document. Never shared: each composition opens its own.
pub struct LayoutEngine {
    surface: Surface,
    geometry: PageGeometry,
    unit: Unit,
    y_position: f32,
    /// Watermark that automatic page breaks stamp onto new pages.
    page_watermark: Watermark,
}

impl LayoutEngine {
    /// Opens a blank one-page document with the cursor at the top margin.
    pub fn open(orientation: Orientation, unit: Unit, format: PageFormat) -> Self {
        let geometry = PageGeometry::new(orientation, unit, format);
        let defaults = WatermarkOptions::default();
        Self {
            surface: Surface::new(geometry, unit),
            geometry,
            unit,
            y_position: geometry.margin,
            page_watermark: Watermark {
                text: DEFAULT_WATERMARK_TEXT.to_string(),
                font_size: defaults.font_size,
                color: defaults.color,
                angle: defaults.angle,
            },
        }
    }

    /// Portrait A4 in millimetres.
    pub fn a4() -> Self {
        Self::open(Orientation::Portrait, Unit::Mm, PageFormat::A4)
    }

    /// Starts a new page if `required_height` would run past the bottom margin.
    ///
    /// The new page is watermarked and the cursor returns to the top margin.
    /// Returns whether a break happened.
    pub fn check_page_break(&mut self, required_height: f32) -> bool {
        if self.y_position + required_height <= self.bottom() {
            return false;
        }
        self.add_page();
        debug!(page = self.get_page_count(), required_height, "layout: page break");
        true
    }

    /// Starts a new watermarked page unconditionally, cursor at the top margin.
    pub fn add_page(&mut self) {
        self.surface.add_page();
        self.y_position = self.geometry.margin;
        self.surface.stamp_watermark(self.page_watermark.clone());
    }

    /// Lowest y the cursor may reach on a page.
    pub fn bottom(&self) -> f32 {
        self.geometry.height - self.geometry.margin
    }

    /// Stamps a centred, rotated watermark on the current page. Does not move the cursor.
    pub fn add_watermark(&mut self, text: &str, options: WatermarkOptions) {
        let watermark = Watermark {
            text: normalize_glyphs(text),
            font_size: options.font_size,
            color: options.color,
            angle: options.angle,
        };
        self.page_watermark = watermark.clone();
        self.surface.stamp_watermark(watermark);
    }

    /// Draws word-wrapped text and returns the y coordinate reached.
    ///
    /// With `y == None` the text flows from the cursor, breaking pages as needed,
    /// and the cursor ends below the last line. With an explicit `y` the text is
    /// drawn at that fixed position and the engine state is left untouched.
    pub fn add_text(&mut self, text: &str, x: Option<f32>, y: Option<f32>, options: &TextOptions) -> f32 {
        let x = x.unwrap_or(self.geometry.margin);
        let max_width = options.max_width.unwrap_or(self.geometry.content_width);
        let line_height = self.line_height(options.font_size);
        let lines = self.wrap(text, max_width, options.style, options.font_size);

        match y {
            Some(fixed) => {
                let mut y_pos = fixed;
                for line in lines {
                    self.push_text(line, x, y_pos, options);
                    y_pos += line_height;
                }
                y_pos
            }
            None => {
                for line in lines {
                    self.check_page_break(line_height);
                    self.push_text(line, x, self.y_position, options);
                    self.y_position += line_height;
                }
                self.y_position
            }
        }
    }

    /// Bold heading sized by level, optionally underlined across the content width.
    pub fn add_heading(&mut self, text: &str, level: HeadingLevel, underline_color: Option<Rgb>) {
        self.check_page_break(HEADING_MIN_HEIGHT);

        let options = TextOptions::sized(level.font_size()).bold();
        self.push_text(normalize_glyphs(text), self.geometry.margin, self.y_position, &options);
        self.y_position += level.spacing();

        if let Some(color) = underline_color {
            self.rule_at(self.y_position, LineOptions { color, width: 1.0 });
            self.y_position += 4.0;
        }

        self.y_position += 8.0;
    }

    /// Horizontal rule across the content width at the cursor.
    pub fn add_line(&mut self, options: LineOptions) {
        self.check_page_break(RULE_SPACING);
        self.rule_at(self.y_position, options);
        self.y_position += RULE_SPACING;
    }

    /// Titled block: heading with a blue underline followed by a wrapped paragraph.
    pub fn add_section(&mut self, title: &str, content: &str, options: SectionOptions) {
        self.check_page_break(25.0);

        let title_options = TextOptions::sized(options.title_size).bold();
        self.push_text(normalize_glyphs(title), self.geometry.margin, self.y_position, &title_options);
        self.y_position += 8.0;

        self.rule_at(
            self.y_position,
            LineOptions {
                color: [0, 100, 200],
                width: 1.0,
            },
        );
        self.y_position += 12.0;

        let body = TextOptions::sized(options.content_size).color([60, 60, 60]);
        for line in self.wrap(content, self.geometry.content_width, FontStyle::Normal, options.content_size) {
            self.check_page_break(8.0);
            self.push_text(line, self.geometry.margin, self.y_position, &body);
            self.y_position += 7.0;
        }
        self.y_position += 10.0;
    }

    /// Checkmark, bold title, then an indented wrapped description.
    pub fn add_list_item(&mut self, text: &str, description: Option<&str>, options: ListItemOptions) {
        let spacing = options.spacing;
        let desc_width = self.geometry.content_width - 2.0 * LIST_ITEM_INDENT;
        let desc_lines = description
            .map(|d| self.wrap(d, desc_width, FontStyle::Normal, options.font_size))
            .unwrap_or_default();

        let estimated = 7.0 + desc_lines.len() as f32 * spacing + spacing;
        self.check_page_break(estimated.max(LIST_ITEM_MIN_HEIGHT));

        let margin = self.geometry.margin;
        self.add_checkmark(margin, self.y_position, 12.0, [0, 150, 100]);
        let title = TextOptions::sized(options.font_size).bold();
        self.push_text(normalize_glyphs(text), margin + LIST_ITEM_INDENT, self.y_position, &title);
        self.y_position += 7.0;

        let body = TextOptions::sized(options.font_size).color([80, 80, 80]);
        for line in desc_lines {
            self.check_page_break(spacing);
            self.push_text(line, margin + LIST_ITEM_INDENT, self.y_position, &body);
            self.y_position += spacing;
        }
        self.y_position += spacing;
    }

    /// Vector checkmark with its baseline at `(x, y)`. Does not move the cursor.
    pub fn add_checkmark(&mut self, x: f32, y: f32, font_size: f32, color: Rgb) {
        self.surface.push(DrawOp::Checkmark { x, y, font_size, color });
    }

    /// Filled, optionally rounded rectangle with its top-left corner at `(x, y)`.
    /// Does not move the cursor.
    pub fn add_box(&mut self, x: f32, y: f32, width: f32, height: f32, options: BoxOptions) {
        self.surface.push(DrawOp::RoundedRect {
            x,
            y,
            width,
            height,
            radius: options.radius,
            color: options.color,
        });
    }

    /// Straight segment between two points. Does not move the cursor.
    pub fn add_segment(&mut self, from: (f32, f32), to: (f32, f32), options: LineOptions) {
        self.surface.push(DrawOp::Line {
            x1: from.0,
            y1: from.1,
            x2: to.0,
            y2: to.1,
            width: options.width,
            color: options.color,
        });
    }

    /// Advances the cursor, stopping at the bottom margin.
    pub fn add_spacing(&mut self, amount: f32) {
        self.y_position = (self.y_position + amount).min(self.bottom());
    }

    pub fn get_y_position(&self) -> f32 {
        self.y_position
    }

    pub fn set_y_position(&mut self, y: f32) {
        self.y_position = y;
    }

    pub fn get_page_info(&self) -> PageGeometry {
        self.geometry
    }

    pub fn get_page_count(&self) -> usize {
        self.surface.page_count()
    }

    /// Selects the 1-based page subsequent drawing targets.
    pub fn set_page(&mut self, page: usize) -> Result<(), RenderError> {
        self.surface.set_page(page)
    }

    /// Line height in engine units for a font size in points.
    pub fn line_height(&self, font_size: f32) -> f32 {
        font_size * LINE_HEIGHT_MM_PER_PT * (72.0 / 25.4) / self.unit.points_per_unit()
    }

    /// Wraps `text` the same way the drawing primitives do.
    pub fn wrap(&self, text: &str, max_width: f32, style: FontStyle, font_size: f32) -> Vec<String> {
        split_text_to_size(&normalize_glyphs(text), max_width, style, font_size, self.unit)
    }

    /// Rendered width of one line of text in engine units.
    pub fn text_width(&self, text: &str, style: FontStyle, font_size: f32) -> f32 {
        get_metrics(style).text_width(&normalize_glyphs(text), font_size, self.unit)
    }

    /// Recorded pages, for inspection.
    pub fn pages(&self) -> &[Page] {
        self.surface.pages()
    }

    // ── terminal operations ────────────────────────────────────────────────

    /// Writes the document to `path`.
    pub fn save(self, path: impl AsRef<Path>) -> Result<PathBuf, RenderError> {
        let path = path.as_ref().to_path_buf();
        let bytes = self.surface.render()?;
        std::fs::write(&path, &bytes).map_err(|source| RenderError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// The document as raw PDF bytes.
    pub fn get_blob(self) -> Result<Vec<u8>, RenderError> {
        self.surface.render()
    }

    /// The document as a `data:application/pdf;base64,...` URL.
    pub fn get_data_url(self) -> Result<String, RenderError> {
        let bytes = self.surface.render()?;
        Ok(format!("data:application/pdf;base64,{}", BASE64.encode(bytes)))
    }

    // ── internals ──────────────────────────────────────────────────────────

    fn push_text(&mut self, text: String, x: f32, y: f32, options: &TextOptions) {
        self.surface.push(DrawOp::Text {
            text,
            x,
            y,
            font_size: options.font_size,
            style: options.style,
            color: options.color,
            align: options.align,
        });
    }

    fn rule_at(&mut self, y: f32, options: LineOptions) {
        let margin = self.geometry.margin;
        self.add_segment((margin, y), (self.geometry.width - margin, y), options);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
