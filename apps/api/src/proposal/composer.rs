//! Proposal Document Composer.
//!
//! Drives the [`LayoutEngine`] through a fixed section order to turn one
//! [`ProposalDocument`] into a paginated, watermarked PDF:
//!
//! 1. optional drafting (best-effort; failures fall back to the original content)
//! 2. watermark page 1, fixed-position header band, title
//! 3. Executive Summary, Project Scope, Project Timeline, Investment Breakdown,
//!    Deliverables, Technology Stack, Terms and Conditions
//! 4. office footer
//! 5. watermark safety pass over every page
//! 6. exactly one terminal output call
//!
//! Composition itself is synchronous and CPU-bound. [`ProposalComposer::compose`]
//! runs the drafting call on the async runtime and the layout pass inside
//! `spawn_blocking`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::layout::{
    Align, BoxOptions, FontStyle, HeadingLevel, LayoutEngine, LineOptions, ListItemOptions,
    RenderError, Rgb, TextOptions, WatermarkOptions, DEFAULT_WATERMARK_TEXT, RULE_SPACING,
};
use crate::proposal::currency::{format_long_date, CurrencyFormatter};
use crate::proposal::drafting::{draft_with_timeout, DraftError, ProposalDrafter};
use crate::proposal::models::{
    attachment_filename, normalize_items, ContentError, LineItem, ListEntry, ProposalContent,
    ProposalDocument,
};

// ────────────────────────────────────────────────────────────────────────────
// Visual constants
// ────────────────────────────────────────────────────────────────────────────

const PRIMARY: Rgb = [0, 100, 200];
const ACCENT: Rgb = [0, 150, 100];
const BODY: Rgb = [60, 60, 60];
const MUTED: Rgb = [100, 100, 100];
const RULE: Rgb = [200, 200, 200];

/// Section headings, in the order they are drawn.
pub const SECTION_TITLES: [&str; 7] = [
    "Executive Summary",
    "Project Scope",
    "Project Timeline",
    "Investment Breakdown",
    "Deliverables",
    "Technology Stack",
    "Terms and Conditions",
];

/// y where flowing content starts below the header band.
const CONTENT_TOP: f32 = 60.0;

// Shaded cards (investment items, deliverables, tech stack).
const CARD_PADDING: f32 = 5.0;
const CARD_TITLE_LINE: f32 = 6.0;
const CARD_BODY_LINE: f32 = 4.5;
const CARD_GAP: f32 = 4.0;
/// Horizontal space reserved for the right-aligned amount in an investment card.
const AMOUNT_COLUMN: f32 = 60.0;

const DELIVERABLE_GUTTER: f32 = 8.0;
const TECH_GUTTER: f32 = 6.0;
const TIMELINE_INDENT: f32 = 6.0;
const TERM_INDENT: f32 = 8.0;

// ────────────────────────────────────────────────────────────────────────────
// Letterhead
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Office {
    pub name: String,
    pub lines: Vec<String>,
}

/// Company branding drawn in the header band and the closing footer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Letterhead {
    pub wordmark: String,
    pub offices: [Office; 2],
}

impl Default for Letterhead {
    fn default() -> Self {
        Self {
            wordmark: "NEURAL ARC".to_string(),
            offices: [
                Office {
                    name: "Neural Arc Inc.".to_string(),
                    lines: vec![
                        "San Francisco, CA".to_string(),
                        "United States".to_string(),
                        "hello@neuralarc.ai".to_string(),
                    ],
                },
                Office {
                    name: "Neural Arc India Pvt. Ltd.".to_string(),
                    lines: vec![
                        "Pune, Maharashtra".to_string(),
                        "India".to_string(),
                        "india@neuralarc.ai".to_string(),
                    ],
                },
            ],
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Content resolution (drafting boundary)
// ────────────────────────────────────────────────────────────────────────────

/// Content chosen for layout, and whether it came from the drafting pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContent {
    pub content: ProposalContent,
    pub drafted: bool,
}

/// Picks the content to lay out from the outcome of an optional drafting call.
///
/// A failed or invalid draft is logged and the original content is used.
/// A successful draft always has investment names and amounts restored from
/// the original.
pub fn resolve_content(
    doc: &ProposalDocument,
    drafted: Option<Result<ProposalContent, DraftError>>,
) -> ResolvedContent {
    let original = || ResolvedContent {
        content: doc.content.clone(),
        drafted: false,
    };

    match drafted {
        None => original(),
        Some(Err(e)) => {
            warn!(proposal_id = %doc.id, error = %e, "AI drafting failed, composing original content");
            original()
        }
        Some(Ok(content)) => {
            let content = enforce_investment_integrity(&doc.content, content);
            match content.validate() {
                Ok(()) => ResolvedContent {
                    content,
                    drafted: true,
                },
                Err(e) => {
                    warn!(proposal_id = %doc.id, error = %e, "Drafted content rejected, composing original content");
                    original()
                }
            }
        }
    }
}

/// Re-asserts `name` and `amount` of every original investment line, by index.
///
/// Drafted descriptions are kept when non-empty. Lines the draft added are
/// dropped and lines it removed are restored, so the investment totals are
/// always those of the original.
pub fn enforce_investment_integrity(
    original: &ProposalContent,
    mut drafted: ProposalContent,
) -> ProposalContent {
    let drafted_items = std::mem::take(&mut drafted.investment);
    if drafted_items.len() != original.investment.len() {
        warn!(
            original = original.investment.len(),
            drafted = drafted_items.len(),
            "Drafted investment item count differs from original"
        );
    }

    drafted.investment = original
        .investment
        .iter()
        .enumerate()
        .map(|(i, orig)| LineItem {
            name: orig.name.clone(),
            amount: orig.amount,
            description: drafted_items
                .get(i)
                .map(|d| d.description.clone())
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| orig.description.clone()),
        })
        .collect();
    drafted
}

// ────────────────────────────────────────────────────────────────────────────
// Layout pass
// ────────────────────────────────────────────────────────────────────────────

/// Lays out `content` under `doc`'s metadata. Returns the engine ready for one
/// terminal call.
pub fn compose_document(
    doc: &ProposalDocument,
    content: &ProposalContent,
    letterhead: &Letterhead,
) -> Result<LayoutEngine, RenderError> {
    let money = CurrencyFormatter::new(&doc.currency);
    let mut engine = LayoutEngine::a4();

    // Page 1 is never watermarked by the engine itself.
    engine.add_watermark(DEFAULT_WATERMARK_TEXT, WatermarkOptions::default());

    draw_header(&mut engine, doc, letterhead);
    draw_title(&mut engine, doc);

    let [summary, scope, timeline, investment, deliverables, stack, terms] = SECTION_TITLES;

    section_heading(&mut engine, summary);
    engine.add_text(
        &content.executive_summary,
        None,
        None,
        &TextOptions::sized(11.0).color(BODY),
    );
    engine.add_spacing(10.0);

    section_heading(&mut engine, scope);
    for entry in normalize_items(&content.project_scope) {
        engine.add_list_item(&entry.title, entry.description.as_deref(), ListItemOptions::default());
    }
    engine.add_spacing(4.0);

    section_heading(&mut engine, timeline);
    draw_timeline(&mut engine, content);

    section_heading(&mut engine, investment);
    draw_investment(&mut engine, content, &money);

    section_heading(&mut engine, deliverables);
    draw_deliverables(&mut engine, &normalize_items(&content.deliverables));

    section_heading(&mut engine, stack);
    draw_technology_stack(&mut engine, content);

    section_heading(&mut engine, terms);
    draw_terms(&mut engine, &content.terms_and_conditions);

    draw_footer(&mut engine, letterhead);
    ensure_watermarks(&mut engine)?;

    debug!(
        proposal_id = %doc.id,
        pages = engine.get_page_count(),
        "Proposal layout complete"
    );
    Ok(engine)
}

/// Stamps the watermark on every page, then returns to the last page.
///
/// Stamping replaces any existing watermark, so running this more than once
/// never leaves more than one per page.
pub fn ensure_watermarks(engine: &mut LayoutEngine) -> Result<(), RenderError> {
    let last = engine.get_page_count();
    for page in 1..=last {
        engine.set_page(page)?;
        engine.add_watermark(DEFAULT_WATERMARK_TEXT, WatermarkOptions::default());
    }
    engine.set_page(last)
}

/// Breaks the page unless `height` fits. Blocks taller than a whole page only
/// break once and must paginate themselves.
fn ensure_room(engine: &mut LayoutEngine, height: f32) {
    let page = engine.get_page_info();
    engine.check_page_break(height.min(page.height - 2.0 * page.margin));
}

fn section_heading(engine: &mut LayoutEngine, title: &str) {
    engine.add_heading(title, HeadingLevel::H1, Some(PRIMARY));
}

fn draw_header(engine: &mut LayoutEngine, doc: &ProposalDocument, letterhead: &Letterhead) {
    let page = engine.get_page_info();
    let right = page.width - page.margin;

    engine.add_text(
        &letterhead.wordmark,
        Some(page.margin),
        Some(30.0),
        &TextOptions::sized(20.0).bold().color(PRIMARY),
    );

    let label = TextOptions::sized(9.0).color(MUTED).align(Align::Right);
    let value = TextOptions::sized(11.0).bold().align(Align::Right);
    engine.add_text("Proposal Date", Some(right), Some(25.0), &label);
    engine.add_text(&format_long_date(&doc.created_at), Some(right), Some(30.0), &value);
    engine.add_text("Proposal ID", Some(right), Some(37.0), &label);
    engine.add_text(&doc.reference_code(), Some(right), Some(42.0), &value);

    engine.set_y_position(48.0);
    engine.add_line(LineOptions {
        color: PRIMARY,
        width: 0.8,
    });
    engine.set_y_position(CONTENT_TOP);
}

fn draw_title(engine: &mut LayoutEngine, doc: &ProposalDocument) {
    engine.add_text(&doc.title, None, None, &TextOptions::sized(24.0).bold());
    engine.add_spacing(2.0);
    engine.add_text(
        &format!("Prepared for {}", doc.client),
        None,
        None,
        &TextOptions::sized(12.0).color(MUTED),
    );
    engine.add_spacing(10.0);
}

fn draw_timeline(engine: &mut LayoutEngine, content: &ProposalContent) {
    let page = engine.get_page_info();
    let x = page.margin + TIMELINE_INDENT;
    let width = page.content_width - TIMELINE_INDENT;

    for phase in &content.timeline {
        let desc_lines = engine
            .wrap(&phase.description, width, FontStyle::Normal, 10.0)
            .len();
        let block = engine.line_height(10.0)
            + engine.line_height(11.0)
            + 1.0
            + desc_lines as f32 * engine.line_height(10.0)
            + 8.0;
        ensure_room(engine, block);

        let start = engine.get_y_position();
        engine.add_segment(
            (page.margin, start - 8.0),
            (page.margin, start + 18.0),
            LineOptions {
                color: PRIMARY,
                width: 2.0,
            },
        );

        engine.add_text(
            &phase.period,
            Some(x),
            None,
            &TextOptions::sized(10.0).bold().color(PRIMARY).max_width(width),
        );
        engine.add_spacing(1.0);
        engine.add_text(&phase.title, Some(x), None, &TextOptions::sized(11.0).bold().max_width(width));
        engine.add_text(
            &phase.description,
            Some(x),
            None,
            &TextOptions::sized(10.0).color(MUTED).max_width(width),
        );
        engine.add_spacing(8.0);
    }
}

/// Height of a shaded card holding `title_lines` heading lines and `body_lines`
/// body lines.
pub fn card_height(title_lines: usize, body_lines: usize) -> f32 {
    2.0 * CARD_PADDING + title_lines as f32 * CARD_TITLE_LINE + body_lines as f32 * CARD_BODY_LINE
}

/// One pre-wrapped line of a shaded card.
#[derive(Debug, Clone)]
enum CardLine {
    Title(String),
    Body(String),
}

impl CardLine {
    fn height(&self) -> f32 {
        match self {
            CardLine::Title(_) => CARD_TITLE_LINE,
            CardLine::Body(_) => CARD_BODY_LINE,
        }
    }
}

/// Drawn on the first title baseline of a card.
#[derive(Debug, Clone)]
enum CardMarker {
    Plain,
    Checkmark,
    /// Right-aligned against the card's inner edge.
    Amount { text: String, options: TextOptions },
}

#[derive(Debug, Clone)]
struct Card {
    lines: Vec<CardLine>,
    height: f32,
    marker: CardMarker,
}

impl Card {
    /// A card always reserves at least one title line.
    fn new(title: Vec<String>, body: Vec<String>, marker: CardMarker) -> Self {
        let height = card_height(title.len().max(1), body.len());
        let mut lines: Vec<CardLine> = if title.is_empty() {
            vec![CardLine::Title(String::new())]
        } else {
            title.into_iter().map(CardLine::Title).collect()
        };
        lines.extend(body.into_iter().map(CardLine::Body));
        Self {
            lines,
            height,
            marker,
        }
    }
}

/// Number of leading `lines` whose heights fit in `room`.
fn lines_fitting(lines: &[CardLine], room: f32) -> usize {
    let mut used = 0.0;
    lines
        .iter()
        .take_while(|line| {
            used += line.height();
            used <= room
        })
        .count()
}

/// Draws one row of equal-width shaded cards at the cursor; its height is that
/// of the tallest card.
///
/// A row taller than a page is split: each page gets its own boxes holding the
/// lines that fit there, and drawing resumes below the top margin of the next
/// page. The cursor only advances once the whole row is drawn.
fn draw_card_row(
    engine: &mut LayoutEngine,
    cards: &[Card],
    column_width: f32,
    gutter: f32,
    title_options: &TextOptions,
    body_options: &TextOptions,
) {
    if cards.is_empty() {
        return;
    }
    let page = engine.get_page_info();
    let height = cards.iter().map(|card| card.height).fold(0.0_f32, f32::max);
    if height <= page.height - 2.0 * page.margin {
        ensure_room(engine, height + CARD_GAP);
    } else {
        engine.check_page_break(card_height(1, 0));
    }

    let mut next = vec![0_usize; cards.len()];
    loop {
        let top = engine.get_y_position();
        let room = engine.bottom() - top - 2.0 * CARD_PADDING;
        let ends: Vec<usize> = cards
            .iter()
            .zip(&next)
            .map(|(card, &start)| start + lines_fitting(&card.lines[start..], room))
            .collect();

        if ends == next {
            engine.add_page();
            continue;
        }

        let used = cards
            .iter()
            .zip(next.iter().zip(&ends))
            .map(|(card, (&start, &end))| card.lines[start..end].iter().map(CardLine::height).sum::<f32>())
            .fold(0.0_f32, f32::max);
        let segment = used + 2.0 * CARD_PADDING;

        for (i, card) in cards.iter().enumerate() {
            let (start, end) = (next[i], ends[i]);
            if start == end {
                continue;
            }
            let x = page.margin + i as f32 * (column_width + gutter);
            engine.add_box(x, top, column_width, segment, BoxOptions::default());
            draw_card_lines(engine, card, start..end, (x, top), column_width, title_options, body_options);
        }

        next = ends;
        if cards.iter().zip(&next).all(|(card, &done)| done == card.lines.len()) {
            let below = (top + segment + CARD_GAP).min(engine.bottom());
            engine.set_y_position(below);
            return;
        }
        engine.add_page();
    }
}

/// Draws `card.lines[range]` inside the box whose top-left corner is `origin`.
/// The marker is drawn with the segment holding the card's first line.
fn draw_card_lines(
    engine: &mut LayoutEngine,
    card: &Card,
    range: std::ops::Range<usize>,
    origin: (f32, f32),
    width: f32,
    title_options: &TextOptions,
    body_options: &TextOptions,
) {
    let (x, top) = origin;
    let checkmark = matches!(card.marker, CardMarker::Checkmark);
    let text_x = if checkmark { x + CARD_PADDING + 5.0 } else { x + CARD_PADDING };

    let first_line = range.start == 0;
    let mut baseline = top + CARD_PADDING - 1.5;
    let mut first_baseline = None;
    for line in &card.lines[range] {
        baseline += line.height();
        match line {
            CardLine::Title(text) => engine.add_text(text, Some(text_x), Some(baseline), title_options),
            CardLine::Body(text) => engine.add_text(text, Some(text_x), Some(baseline), body_options),
        };
        first_baseline.get_or_insert(baseline);
    }

    let Some(baseline) = first_baseline.filter(|_| first_line) else {
        return;
    };
    match &card.marker {
        CardMarker::Plain => {}
        CardMarker::Checkmark => engine.add_checkmark(x + CARD_PADDING, baseline, 10.0, ACCENT),
        CardMarker::Amount { text, options } => {
            engine.add_text(text, Some(x + width - CARD_PADDING), Some(baseline), options);
        }
    }
}

fn draw_investment(engine: &mut LayoutEngine, content: &ProposalContent, money: &CurrencyFormatter) {
    let page = engine.get_page_info();
    let text_width = page.content_width - AMOUNT_COLUMN;

    let name_options = TextOptions::sized(12.0).bold();
    let desc_options = TextOptions::sized(10.0).color(MUTED);
    let amount_options = TextOptions::sized(12.0).bold().color(PRIMARY).align(Align::Right);

    for item in &content.investment {
        let card = Card::new(
            engine.wrap(&item.name, text_width, FontStyle::Bold, 12.0),
            engine.wrap(&item.description, text_width, FontStyle::Normal, 10.0),
            CardMarker::Amount {
                text: money.format_minor(item.amount_minor()),
                options: amount_options.clone(),
            },
        );
        draw_card_row(
            engine,
            std::slice::from_ref(&card),
            page.content_width,
            0.0,
            &name_options,
            &desc_options,
        );
    }

    let totals = content.totals();
    let row = |size: f32| engine.line_height(size) + 2.0;
    let block = 2.0 + RULE_SPACING + 2.0 * row(11.0) + 2.0 + row(16.0) + 8.0;
    ensure_room(engine, block);
    engine.add_spacing(2.0);
    engine.add_line(LineOptions {
        color: RULE,
        width: 0.5,
    });
    amount_row(engine, "Subtotal", &money.format_minor(totals.subtotal_minor), 11.0, FontStyle::Normal);
    amount_row(engine, "Tax", &money.format_minor(totals.tax_minor), 11.0, FontStyle::Normal);
    engine.add_spacing(2.0);
    amount_row(engine, "Total", &money.format_minor(totals.total_minor), 16.0, FontStyle::Bold);
    engine.add_spacing(8.0);
}

/// Label and right-aligned amount on one baseline at the cursor.
fn amount_row(engine: &mut LayoutEngine, label: &str, amount: &str, size: f32, style: FontStyle) {
    let page = engine.get_page_info();
    let right = page.width - page.margin;
    let y = engine.get_y_position();
    let mut options = TextOptions::sized(size);
    options.style = style;

    engine.add_text(label, Some(right - AMOUNT_COLUMN - 20.0), Some(y), &options);
    let color = if style == FontStyle::Bold { PRIMARY } else { BODY };
    engine.add_text(amount, Some(right), Some(y), &options.color(color).align(Align::Right));
    engine.add_spacing(engine.line_height(size) + 2.0);
}

fn draw_deliverables(engine: &mut LayoutEngine, entries: &[ListEntry]) {
    let page = engine.get_page_info();
    let column_width = (page.content_width - DELIVERABLE_GUTTER) / 2.0;
    let text_width = column_width - 2.0 * CARD_PADDING - 5.0;
    let title_options = TextOptions::sized(11.0).bold();
    let body_options = TextOptions::sized(9.0).color(MUTED);

    for row in entries.chunks(2) {
        let cards: Vec<Card> = row
            .iter()
            .map(|entry| {
                Card::new(
                    engine.wrap(&entry.title, text_width, FontStyle::Bold, 11.0),
                    entry
                        .description
                        .as_deref()
                        .map(|d| engine.wrap(d, text_width, FontStyle::Normal, 9.0))
                        .unwrap_or_default(),
                    CardMarker::Checkmark,
                )
            })
            .collect();
        draw_card_row(
            engine,
            &cards,
            column_width,
            DELIVERABLE_GUTTER,
            &title_options,
            &body_options,
        );
    }
    engine.add_spacing(4.0);
}

fn draw_technology_stack(engine: &mut LayoutEngine, content: &ProposalContent) {
    let page = engine.get_page_info();
    let column_width = (page.content_width - 2.0 * TECH_GUTTER) / 3.0;
    let text_width = column_width - 2.0 * CARD_PADDING;
    let stack = &content.technology_stack;

    let cards: Vec<Card> = [
        ("Frontend", &stack.frontend),
        ("Backend", &stack.backend),
        ("Infrastructure", &stack.infrastructure),
    ]
    .into_iter()
    .map(|(heading, body)| {
        Card::new(
            vec![heading.to_string()],
            engine.wrap(body, text_width, FontStyle::Normal, 9.5),
            CardMarker::Plain,
        )
    })
    .collect();

    draw_card_row(
        engine,
        &cards,
        column_width,
        TECH_GUTTER,
        &TextOptions::sized(11.0).bold().color(PRIMARY),
        &TextOptions::sized(9.5).color(BODY),
    );
    engine.add_spacing(4.0);
}

fn draw_terms(engine: &mut LayoutEngine, terms: &[String]) {
    let page = engine.get_page_info();
    let width = page.content_width - TERM_INDENT;
    let options = TextOptions::sized(10.0).color(BODY).max_width(width);

    for term in terms {
        let lines = engine.wrap(term, width, FontStyle::Normal, 10.0).len();
        ensure_room(engine, lines as f32 * engine.line_height(10.0) + 3.0);
        let y = engine.get_y_position();
        engine.add_checkmark(page.margin, y, 10.0, ACCENT);
        engine.add_text(term, Some(page.margin + TERM_INDENT), None, &options);
        engine.add_spacing(3.0);
    }
}

fn draw_footer(engine: &mut LayoutEngine, letterhead: &Letterhead) {
    let page = engine.get_page_info();
    let column_width = (page.content_width - DELIVERABLE_GUTTER) / 2.0;
    let line = 4.5;
    let rows = letterhead
        .offices
        .iter()
        .map(|o| o.lines.len() + 1)
        .max()
        .unwrap_or(1);

    ensure_room(engine, 40.0_f32.max(rows as f32 * line + 14.0));
    engine.add_spacing(6.0);
    engine.add_line(LineOptions {
        color: RULE,
        width: 0.5,
    });

    let top = engine.get_y_position();
    for (i, office) in letterhead.offices.iter().enumerate() {
        let x = page.margin + i as f32 * (column_width + DELIVERABLE_GUTTER);
        engine.add_text(
            &office.name,
            Some(x),
            Some(top),
            &TextOptions::sized(10.0).bold().color(PRIMARY).max_width(column_width),
        );
        let mut y = top + line;
        for text in &office.lines {
            engine.add_text(text, Some(x), Some(y), &TextOptions::sized(9.0).color(MUTED).max_width(column_width));
            y += line;
        }
    }
    engine.set_y_position(top + rows as f32 * line);
}

// ────────────────────────────────────────────────────────────────────────────
// Output
// ────────────────────────────────────────────────────────────────────────────

/// Where the finished document goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Interactive export: write to this path.
    File(PathBuf),
    /// Server-side export: raw bytes for a download response.
    Blob,
    DataUrl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportedProposal {
    Saved(PathBuf),
    Blob(Vec<u8>),
    DataUrl(String),
}

/// The single terminal call on a composed engine.
pub fn finish(engine: LayoutEngine, target: OutputTarget) -> Result<ExportedProposal, RenderError> {
    match target {
        OutputTarget::File(path) => engine.save(path).map(ExportedProposal::Saved),
        OutputTarget::Blob => engine.get_blob().map(ExportedProposal::Blob),
        OutputTarget::DataUrl => engine.get_data_url().map(ExportedProposal::DataUrl),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Async entry point
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("PDF output failed: {0}")]
    Render(#[from] RenderError),

    #[error("composition task failed: {0}")]
    Task(String),
}

#[derive(Debug)]
pub struct ComposedProposal {
    pub output: ExportedProposal,
    pub filename: String,
    pub page_count: usize,
    pub drafted: bool,
}

/// Composer with its optional drafting transform. Shared across requests.
#[derive(Clone)]
pub struct ProposalComposer {
    drafter: Option<Arc<dyn ProposalDrafter>>,
    drafting_timeout: Duration,
    letterhead: Arc<Letterhead>,
}

impl ProposalComposer {
    pub fn new(letterhead: Letterhead) -> Self {
        Self {
            drafter: None,
            drafting_timeout: Duration::from_secs(90),
            letterhead: Arc::new(letterhead),
        }
    }

    pub fn with_drafter(mut self, drafter: Arc<dyn ProposalDrafter>, timeout: Duration) -> Self {
        self.drafter = Some(drafter);
        self.drafting_timeout = timeout;
        self
    }

    pub fn drafting_available(&self) -> bool {
        self.drafter.is_some()
    }

    /// Validates, optionally drafts, lays out and outputs one proposal.
    ///
    /// Drafting failures never fail the call. Invalid input and output I/O do.
    pub async fn compose(
        &self,
        doc: ProposalDocument,
        use_drafting: bool,
        target: OutputTarget,
    ) -> Result<ComposedProposal, ComposeError> {
        doc.validate()?;

        let drafted = match (&self.drafter, use_drafting) {
            (Some(drafter), true) => {
                Some(draft_with_timeout(drafter.as_ref(), &doc, self.drafting_timeout).await)
            }
            _ => None,
        };
        let resolved = resolve_content(&doc, drafted);
        let letterhead = Arc::clone(&self.letterhead);

        let composed = tokio::task::spawn_blocking(move || -> Result<ComposedProposal, ComposeError> {
            let engine = compose_document(&doc, &resolved.content, &letterhead)?;
            let page_count = engine.get_page_count();
            let output = finish(engine, target)?;
            Ok(ComposedProposal {
                output,
                filename: attachment_filename(&doc.id, &doc.title),
                page_count,
                drafted: resolved.drafted,
            })
        })
        .await
        .map_err(|e| ComposeError::Task(e.to_string()))??;

        info!(
            filename = %composed.filename,
            pages = composed.page_count,
            drafted = composed.drafted,
            "Proposal composed"
        );
        Ok(composed)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{DrawOp, Page};
    use crate::llm_client::LlmError;
    use async_trait::async_trait;
    use serde_json::json;

    fn minimal() -> ProposalDocument {
        serde_json::from_value(json!({
            "id": "8c1e2f30-aa11-4bcd-9e77-00000a1b2c3d",
            "title": "Pilot",
            "client": "Acme",
            "createdAt": "2026-10-18T09:00:00Z",
            "currency": "USD",
            "content": {
                "executiveSummary": "Short pilot.",
                "projectScope": ["Build MVP"],
                "timeline": [{"period": "Week 1", "title": "Build", "description": "Build it"}],
                "investment": [{"name": "Dev", "description": "Dev work", "amount": 5000}],
                "deliverables": ["Working demo"],
                "technologyStack": {"frontend": "React", "backend": "Node", "infrastructure": "AWS"},
                "termsAndConditions": ["Net 30"]
            }
        }))
        .unwrap()
    }

    fn all_texts(pages: &[Page]) -> Vec<String> {
        pages
            .iter()
            .flat_map(|p| p.texts().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    fn compose(doc: &ProposalDocument, content: &ProposalContent) -> LayoutEngine {
        compose_document(doc, content, &Letterhead::default()).unwrap()
    }

    struct FailingDrafter;

    #[async_trait]
    impl ProposalDrafter for FailingDrafter {
        async fn draft(&self, _doc: &ProposalDocument) -> Result<ProposalContent, DraftError> {
            Err(DraftError::Llm(LlmError::EmptyContent))
        }
    }

    /// Rewrites the summary and tampers with every investment line.
    struct TamperingDrafter;

    #[async_trait]
    impl ProposalDrafter for TamperingDrafter {
        async fn draft(&self, doc: &ProposalDocument) -> Result<ProposalContent, DraftError> {
            let mut content = doc.content.clone();
            content.executive_summary = "A far more compelling executive summary.".to_string();
            for item in &mut content.investment {
                item.name = "Premium Development".to_string();
                item.amount = 1.0;
                item.description = "Polished description".to_string();
            }
            content.investment.push(LineItem {
                name: "Surprise fee".to_string(),
                description: String::new(),
                amount: 999.0,
            });
            Ok(content)
        }
    }

    #[test]
    fn test_minimal_proposal_scenario() {
        let doc = minimal();
        let engine = compose(&doc, &doc.content);
        let texts = all_texts(engine.pages());

        assert!(texts.iter().any(|t| t == "Dev"));
        assert!(texts.iter().any(|t| t == "Dev work"));
        // Line item, subtotal and total.
        assert_eq!(texts.iter().filter(|t| *t == "$5,000.00").count(), 3);
        assert!(texts.iter().any(|t| t == "$0.00"), "tax renders as zero");
        assert!(texts.iter().any(|t| t == "PROP-1B2C3D"));
        assert!(texts.iter().any(|t| t == "October 18, 2026"));
        assert!(texts.iter().any(|t| t == "Working demo"));
        assert!(texts.iter().any(|t| t == "Net 30"));

        let cards = engine
            .pages()
            .iter()
            .flat_map(|p| p.ops())
            .filter(|op| matches!(op, DrawOp::RoundedRect { .. }))
            .count();
        // One investment card, one deliverable, three tech stack cells.
        assert_eq!(cards, 5);
    }

    #[test]
    fn test_sections_are_drawn_in_fixed_order() {
        let doc = minimal();
        let texts = all_texts(compose(&doc, &doc.content).pages());
        let positions: Vec<usize> = SECTION_TITLES
            .iter()
            .map(|title| texts.iter().position(|t| t == title).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
    }

    #[test]
    fn test_every_page_has_exactly_one_watermark() {
        let doc = minimal();
        let engine = compose(&doc, &doc.content);
        assert_eq!(engine.pages()[0].watermark_count(), 1, "composer watermarks page 1");
        assert!(engine.pages().iter().all(|p| p.watermark_count() == 1));
        assert_eq!(
            engine.pages()[0].watermark().map(|w| w.text.as_str()),
            Some(DEFAULT_WATERMARK_TEXT)
        );
    }

    #[test]
    fn test_watermark_safety_pass_is_idempotent() {
        let mut doc = minimal();
        doc.content.timeline = (0..30)
            .map(|i| crate::proposal::models::Phase {
                period: format!("Week {i}"),
                title: "Phase".to_string(),
                description: "Discovery, design and delivery work. ".repeat(6),
            })
            .collect();
        let mut engine = compose(&doc, &doc.content);
        ensure_watermarks(&mut engine).unwrap();
        ensure_watermarks(&mut engine).unwrap();
        assert!(engine.get_page_count() > 1);
        assert!(engine.pages().iter().all(|p| p.watermark_count() == 1));
    }

    #[test]
    fn test_forty_phases_paginate_with_watermarks() {
        let mut doc = minimal();
        let description = "Requirements workshops with stakeholders, detailed solution design, \
                           implementation of the agreed backlog, integration with existing systems, \
                           acceptance testing and a handover session for the operations team.";
        doc.content.timeline = (1..=40)
            .map(|i| crate::proposal::models::Phase {
                period: format!("Week {i}"),
                title: format!("Phase {i}"),
                description: description.to_string(),
            })
            .collect();

        let engine = compose(&doc, &doc.content);
        let lines = engine.wrap(description, 154.0, FontStyle::Normal, 10.0).len();
        assert!(lines >= 2, "description should span several lines, got {lines}");
        assert!(engine.get_page_count() > 1);
        for page in &engine.pages()[1..] {
            assert_eq!(page.watermark_count(), 1);
        }
    }

    #[test]
    fn test_cursor_text_stays_inside_margins() {
        let mut doc = minimal();
        doc.content.executive_summary = "Long executive prose for the board. ".repeat(200);
        let engine = compose(&doc, &doc.content);
        let info = engine.get_page_info();
        for page in engine.pages() {
            for op in page.ops() {
                if let DrawOp::Text { y, .. } = op {
                    assert!(*y <= info.height - info.margin + 1e-3, "text below bottom margin at {y}");
                }
            }
        }
    }

    fn rounded_rects(engine: &LayoutEngine) -> Vec<(f32, f32)> {
        engine
            .pages()
            .iter()
            .flat_map(|p| p.ops())
            .filter_map(|op| match op {
                DrawOp::RoundedRect { y, height, .. } => Some((*y, *height)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_card_height_follows_its_own_description() {
        let mut doc = minimal();
        let long = "Backend services, data migration, admin tooling and an audit trail \
                    covering every approval step in the procurement workflow.";
        doc.content.investment = vec![
            LineItem { name: "Design".into(), description: "UX".into(), amount: 1000.0 },
            LineItem { name: "QA".into(), description: "Testing".into(), amount: 500.0 },
            LineItem { name: "Build".into(), description: long.into(), amount: 8000.0 },
        ];
        let engine = compose(&doc, &doc.content);
        let desc_lines = engine.wrap(long, 160.0 - AMOUNT_COLUMN, FontStyle::Normal, 10.0).len();
        assert!(desc_lines > 1);

        let heights: Vec<f32> = rounded_rects(&engine).iter().take(3).map(|(_, h)| *h).collect();
        assert_eq!(heights[0], card_height(1, 1));
        assert_eq!(heights[1], card_height(1, 1));
        assert_eq!(heights[2], card_height(1, desc_lines));
        assert_ne!(heights[2], heights[0]);
    }

    #[test]
    fn test_cards_taller_than_a_page_are_split() {
        let mut doc = minimal();
        let description = "The delivery team runs discovery, builds the agreed backlog and hands over. ".repeat(80);
        doc.content.investment[0].description = description.clone();
        doc.content.technology_stack.frontend =
            "React with TypeScript, server-side rendering and an accessible component library. ".repeat(40);

        let engine = compose(&doc, &doc.content);
        let info = engine.get_page_info();
        let bottom = info.height - info.margin;

        for page in engine.pages() {
            for op in page.ops() {
                match op {
                    DrawOp::Text { y, text, .. } => {
                        assert!(*y <= bottom + 1e-3, "text {text:?} below bottom margin at {y}");
                    }
                    DrawOp::RoundedRect { y, height, .. } => {
                        assert!(*y >= info.margin - 1e-3 && y + height <= bottom + 1e-3);
                    }
                    _ => {}
                }
            }
        }

        let wrapped = engine.wrap(&description, 160.0 - AMOUNT_COLUMN, FontStyle::Normal, 10.0);
        let texts = all_texts(engine.pages());
        let drawn = texts.iter().filter(|t| wrapped.contains(t)).count();
        assert_eq!(drawn, wrapped.len(), "every description line is drawn");
        assert_eq!(texts.iter().filter(|t| *t == "$5,000.00").count(), 3);
        // Investment and frontend cards each span more than one box.
        assert!(rounded_rects(&engine).len() > 5);
        let y = engine.get_y_position();
        assert!(y >= info.margin && y <= bottom);
    }

    #[test]
    fn test_totals_block_near_page_bottom_stays_on_one_page() {
        let mut engine = LayoutEngine::a4();
        let doc = minimal();
        engine.set_y_position(235.0);
        draw_investment(&mut engine, &doc.content, &CurrencyFormatter::new("USD"));
        let info = engine.get_page_info();
        let last = engine.pages().last().unwrap();
        assert_eq!(last.texts().filter(|t| *t == "$5,000.00").count(), 2, "subtotal and total together");
        assert!(engine.get_y_position() <= info.height - info.margin);
    }

    #[test]
    fn test_composition_is_deterministic() {
        let doc = minimal();
        let a = compose(&doc, &doc.content);
        let b = compose(&doc, &doc.content);
        assert_eq!(a.get_page_count(), b.get_page_count());
        let ops = |e: &LayoutEngine| e.pages().iter().map(|p| p.ops().to_vec()).collect::<Vec<_>>();
        assert_eq!(ops(&a), ops(&b));
        assert_eq!(a.get_blob().unwrap(), b.get_blob().unwrap());
    }

    #[test]
    fn test_legacy_and_object_scope_render_identically() {
        let doc = minimal();
        let mut object_form = doc.content.clone();
        object_form.project_scope = vec![crate::proposal::models::ContentItem::titled("Build MVP", None)];
        object_form.deliverables = vec![crate::proposal::models::ContentItem::titled("Working demo", None)];
        let legacy = compose(&doc, &doc.content);
        let objects = compose(&doc, &object_form);
        assert_eq!(all_texts(legacy.pages()), all_texts(objects.pages()));
    }

    #[test]
    fn test_empty_sections_still_draw_headings() {
        let mut doc = minimal();
        doc.content.project_scope.clear();
        doc.content.timeline.clear();
        doc.content.investment.clear();
        doc.content.deliverables.clear();
        doc.content.terms_and_conditions.clear();
        let texts = all_texts(compose(&doc, &doc.content).pages());
        for title in SECTION_TITLES {
            assert!(texts.iter().any(|t| t == title), "missing heading {title}");
        }
        assert_eq!(texts.iter().filter(|t| *t == "$0.00").count(), 3);
    }

    #[test]
    fn test_totals_match_rendered_items() {
        let mut doc = minimal();
        doc.content.investment = vec![
            LineItem { name: "A".into(), description: String::new(), amount: 0.1 },
            LineItem { name: "B".into(), description: String::new(), amount: 0.2 },
            LineItem { name: "C".into(), description: String::new(), amount: 1234.56 },
        ];
        let texts = all_texts(compose(&doc, &doc.content).pages());
        assert!(texts.iter().any(|t| t == "$0.10"));
        assert!(texts.iter().any(|t| t == "$0.20"));
        assert!(texts.iter().any(|t| t == "$1,234.56"));
        assert_eq!(texts.iter().filter(|t| *t == "$1,234.86").count(), 2);
    }

    #[test]
    fn test_failed_draft_falls_back_to_original() {
        let doc = minimal();
        let resolved = resolve_content(&doc, Some(Err(DraftError::TimedOut(Duration::from_secs(90)))));
        assert!(!resolved.drafted);
        assert_eq!(resolved.content, doc.content);
    }

    #[test]
    fn test_invalid_draft_falls_back_to_original() {
        let doc = minimal();
        let mut drafted = doc.content.clone();
        drafted.executive_summary = String::new();
        let resolved = resolve_content(&doc, Some(Ok(drafted)));
        assert!(!resolved.drafted);
        assert_eq!(resolved.content.executive_summary, "Short pilot.");
    }

    #[test]
    fn test_integrity_keeps_original_names_and_amounts() {
        let doc = minimal();
        let mut drafted = doc.content.clone();
        drafted.investment[0].name = "Renamed".into();
        drafted.investment[0].amount = 1.0;
        drafted.investment[0].description = "Better words".into();
        drafted.investment.push(LineItem { name: "Extra".into(), description: String::new(), amount: 5.0 });

        let fixed = enforce_investment_integrity(&doc.content, drafted);
        assert_eq!(fixed.investment.len(), 1);
        assert_eq!(fixed.investment[0].name, "Dev");
        assert_eq!(fixed.investment[0].amount, 5000.0);
        assert_eq!(fixed.investment[0].description, "Better words");
    }

    #[test]
    fn test_integrity_restores_dropped_lines() {
        let doc = minimal();
        let mut drafted = doc.content.clone();
        drafted.investment.clear();
        let fixed = enforce_investment_integrity(&doc.content, drafted);
        assert_eq!(fixed.investment, doc.content.investment);
    }

    #[tokio::test]
    async fn test_failing_drafter_still_produces_document_with_original_summary() {
        let doc = minimal();
        let composer = ProposalComposer::new(Letterhead::default())
            .with_drafter(Arc::new(FailingDrafter), Duration::from_secs(5));

        let composed = composer.compose(doc.clone(), true, OutputTarget::Blob).await.unwrap();
        assert!(!composed.drafted);
        match composed.output {
            ExportedProposal::Blob(bytes) => assert!(bytes.starts_with(b"%PDF-")),
            other => panic!("expected blob, got {other:?}"),
        }

        let drafted = Some(FailingDrafter.draft(&doc).await);
        let resolved = resolve_content(&doc, drafted);
        let texts = all_texts(compose(&doc, &resolved.content).pages());
        assert!(texts.iter().any(|t| t == "Short pilot."));
    }

    #[tokio::test]
    async fn test_tampering_drafter_cannot_change_amounts() {
        let doc = minimal();
        let drafted = Some(TamperingDrafter.draft(&doc).await);
        let resolved = resolve_content(&doc, drafted);
        assert!(resolved.drafted);

        let texts = all_texts(compose(&doc, &resolved.content).pages());
        assert!(texts.iter().any(|t| t == "Dev"));
        assert!(texts.iter().any(|t| t == "Polished description"));
        assert!(!texts.iter().any(|t| t.contains("Premium Development") || t.contains("Surprise fee")));
        assert!(!texts.iter().any(|t| t == "$1.00" || t == "$999.00"));
        assert_eq!(texts.iter().filter(|t| *t == "$5,000.00").count(), 3);
    }

    #[tokio::test]
    async fn test_drafting_skipped_when_not_requested() {
        let composer = ProposalComposer::new(Letterhead::default())
            .with_drafter(Arc::new(TamperingDrafter), Duration::from_secs(5));
        let composed = composer.compose(minimal(), false, OutputTarget::Blob).await.unwrap();
        assert!(!composed.drafted);
        assert!(composer.drafting_available());
    }

    #[tokio::test]
    async fn test_compose_to_file_and_data_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pilot.pdf");
        let composer = ProposalComposer::new(Letterhead::default());

        let composed = composer
            .compose(minimal(), false, OutputTarget::File(path.clone()))
            .await
            .unwrap();
        assert_eq!(composed.output, ExportedProposal::Saved(path.clone()));
        assert!(std::fs::read(&path).unwrap().starts_with(b"%PDF-"));
        assert_eq!(composed.filename, "Proposal-1B2C3D-Pilot.pdf");

        let composed = composer.compose(minimal(), false, OutputTarget::DataUrl).await.unwrap();
        match composed.output {
            ExportedProposal::DataUrl(url) => assert!(url.starts_with("data:application/pdf;base64,")),
            other => panic!("expected data url, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_document_is_rejected_before_layout() {
        let mut doc = minimal();
        doc.content.executive_summary = "  ".to_string();
        let err = ProposalComposer::new(Letterhead::default())
            .compose(doc, false, OutputTarget::Blob)
            .await
            .unwrap_err();
        assert!(matches!(err, ComposeError::Content(ContentError::MissingField("executiveSummary"))));
    }
}
