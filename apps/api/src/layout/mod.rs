// Layout Engine: cursor-driven page layout over a recorded drawing surface.
// Composition is CPU-bound; async callers run it inside tokio::task::spawn_blocking.

pub mod engine;
pub mod metrics;
pub mod surface;
pub mod wrap;

// Re-export the public API consumed by the proposal composer.
pub use engine::{
    BoxOptions, HeadingLevel, LayoutEngine, LineOptions, ListItemOptions, SectionOptions,
    TextOptions, WatermarkOptions, DEFAULT_WATERMARK_TEXT, RULE_SPACING,
};
pub use metrics::{FontStyle, Orientation, PageFormat, PageGeometry, Unit};
pub use surface::{Align, DrawOp, Page, RenderError, Rgb};
