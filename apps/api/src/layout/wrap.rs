//! Greedy word wrap over the static Helvetica metrics.
//!
//! Explicit newlines always start a new line (paragraph text is rendered with
//! its line breaks preserved). A single token wider than `max_width` is placed
//! on its own line untouched and overflows the right edge.

use crate::layout::metrics::{get_metrics, FontStyle, Unit};

/// Splits `text` into lines no wider than `max_width` (in `unit`) at `font_size_pt`.
///
/// Whitespace runs collapse to a single space. An empty paragraph between two
/// newlines yields an empty line; an empty string yields no lines at all.
pub fn split_text_to_size(
    text: &str,
    max_width: f32,
    style: FontStyle,
    font_size_pt: f32,
    unit: Unit,
) -> Vec<String> {
    if text.trim().is_empty() {
        return vec![];
    }

    let metrics = get_metrics(style);
    let space_w = metrics.text_width(" ", font_size_pt, unit);
    let mut lines: Vec<String> = Vec::new();

    for paragraph in text.trim_end().split('\n') {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current = String::new();
        let mut current_width = 0.0_f32;

        for word in words {
            let word_w = metrics.text_width(word, font_size_pt, unit);
            if current.is_empty() {
                current.push_str(word);
                current_width = word_w;
            } else if current_width + space_w + word_w > max_width {
                lines.push(std::mem::take(&mut current));
                current.push_str(word);
                current_width = word_w;
            } else {
                current.push(' ');
                current.push_str(word);
                current_width += space_w + word_w;
            }
        }
        lines.push(current);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(text: &str, width: f32) -> Vec<String> {
        split_text_to_size(text, width, FontStyle::Normal, 11.0, Unit::Mm)
    }

    #[test]
    fn test_empty_text_has_no_lines() {
        assert!(wrap("", 100.0).is_empty());
        assert!(wrap("   ", 100.0).is_empty());
    }

    #[test]
    fn test_short_text_is_one_line() {
        assert_eq!(wrap("Short pilot.", 160.0), vec!["Short pilot.".to_string()]);
    }

    #[test]
    fn test_long_text_wraps_and_preserves_words() {
        let text = "Build a production-grade partner portal with proposal generation, \
                    pricing management, approval workflow and watermarked document export";
        let lines = wrap(text, 60.0);
        assert!(lines.len() > 1, "expected wrapping, got {lines:?}");
        assert_eq!(lines.join(" "), text.split_whitespace().collect::<Vec<_>>().join(" "));
        let metrics = get_metrics(FontStyle::Normal);
        for line in &lines {
            if line.contains(' ') {
                assert!(metrics.text_width(line, 11.0, Unit::Mm) <= 60.0 + 1e-3);
            }
        }
    }

    #[test]
    fn test_newlines_start_new_lines() {
        let lines = wrap("First paragraph.\n\nSecond paragraph.", 160.0);
        assert_eq!(lines, vec!["First paragraph.", "", "Second paragraph."]);
    }

    #[test]
    fn test_unbreakable_token_overflows_verbatim() {
        let token = "x".repeat(400);
        let lines = wrap(&format!("a {token} b"), 50.0);
        assert_eq!(lines, vec!["a".to_string(), token, "b".to_string()]);
    }

    #[test]
    fn test_narrower_width_never_yields_fewer_lines() {
        let text = "Discovery workshops, requirements sign-off and architecture review with stakeholders";
        assert!(wrap(text, 40.0).len() >= wrap(text, 120.0).len());
    }
}
