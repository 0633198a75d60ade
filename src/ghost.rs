use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthStr;

/// Measures rendered text. Browsers measure with a canvas; the default
/// implementation estimates from display columns.
pub trait TextMeasure {
    fn text_width(&self, text: &str, font_size: f32) -> f32;
}

/// Width estimate: display columns × font size × average glyph advance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnMeasure {
    pub advance_ratio: f32,
}

impl Default for ColumnMeasure {
    fn default() -> Self {
        Self { advance_ratio: 0.6 }
    }
}

impl TextMeasure for ColumnMeasure {
    fn text_width(&self, text: &str, font_size: f32) -> f32 {
        UnicodeWidthStr::width(text) as f32 * font_size * self.advance_ratio
    }
}

/// Geometry of the search box the ghost is drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputMetrics {
    pub padding_left: f32,
    pub font_size: f32,
}

impl Default for InputMetrics {
    fn default() -> Self {
        Self {
            padding_left: 12.0,
            font_size: 24.0,
        }
    }
}

/// Inline completion drawn right after the typed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostText {
    pub text: String,
    /// Horizontal offset in pixels from the input's left edge.
    pub left: f32,
}

/// Remainder of the matched key beyond the query, both normalised.
pub fn remainder<'a>(normalized_key: &'a str, normalized_query: &str) -> &'a str {
    normalized_key
        .strip_prefix(normalized_query)
        .unwrap_or_default()
}

/// Places `suffix` after the typed `query`. Nothing to show yields `None`.
pub fn place(
    query: &str,
    suffix: &str,
    metrics: InputMetrics,
    measure: &dyn TextMeasure,
) -> Option<GhostText> {
    if suffix.is_empty() {
        return None;
    }
    Some(GhostText {
        text: suffix.to_string(),
        left: metrics.padding_left + measure.text_width(query, metrics.font_size),
    })
}
