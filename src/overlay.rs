use std::time::Duration;

use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::WidgetConfig;
use crate::error::ConfigError;
use crate::ghost::TextMeasure;
use crate::render::escape_html;

/// Delay before a new tooltip starts fading in.
pub const FADE_IN_DELAY: Duration = Duration::from_millis(50);
/// Length of both the fade-in and the fade-out transition.
pub const FADE_DURATION: Duration = Duration::from_millis(300);
const TOOLTIP_GAP: f32 = 5.0;

/// Wraps configured words in the rendered result with clickable spans.
pub struct Overlay {
    words: Vec<(String, Regex)>,
}

impl Overlay {
    pub fn new(config: &WidgetConfig) -> Result<Self, ConfigError> {
        let mut words = Vec::with_capacity(config.clickable_words.len());
        for word in config.clickable_words.keys() {
            if word.is_empty() {
                continue;
            }
            let needle = regex::escape(&escape_text(word));
            words.push((word.clone(), Regex::new(&format!("(?i){needle}"))?));
        }
        Ok(Self { words })
    }

    /// Only text between tags is scanned, so markup and attribute values
    /// are never rewritten.
    pub fn apply(&self, html: &str) -> String {
        let mut current = html.to_string();
        for (word, pattern) in &self.words {
            let span_open = format!(
                "<span class=\"clickable-word\" data-word=\"{}\">",
                escape_html(word)
            );
            current = map_text(&current, |text| {
                pattern
                    .replace_all(text, |caps: &regex::Captures<'_>| {
                        format!("{span_open}{}</span>", &caps[0])
                    })
                    .into_owned()
            });
        }
        current
    }
}

/// A word as the sanitizer serialises it inside a text node: quotes stay
/// literal, only `&`, `<` and `>` become entities.
fn escape_text(word: &str) -> String {
    word.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn map_text(html: &str, mut rewrite: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while !rest.is_empty() {
        match rest.find('<') {
            Some(0) => {
                let end = rest.find('>').map_or(rest.len(), |idx| idx + 1);
                out.push_str(&rest[..end]);
                rest = &rest[end..];
            }
            Some(idx) => {
                out.push_str(&rewrite(&rest[..idx]));
                rest = &rest[idx..];
            }
            None => {
                out.push_str(&rewrite(rest));
                rest = "";
            }
        }
    }
    out
}

/// Viewport rectangle of the clicked word.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
}

/// Document scroll offset at click time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Scroll {
    pub x: f32,
    pub y: f32,
}

/// Box model used to size a tooltip before it is positioned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TooltipStyle {
    pub font_size: f32,
    pub line_height: f32,
    pub padding: f32,
}

impl Default for TooltipStyle {
    fn default() -> Self {
        Self {
            font_size: 14.0,
            line_height: 1.4,
            padding: 8.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TooltipPhase {
    FadingIn,
    FadingOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tooltip {
    /// Configured key the click resolved to.
    pub word: String,
    pub lines: Vec<String>,
    pub html: String,
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
    pub phase: TooltipPhase,
}

/// Holds the single tooltip that may exist at any time.
#[derive(Debug, Default)]
pub struct TooltipLayer {
    current: Option<Tooltip>,
}

impl TooltipLayer {
    /// Replaces whatever tooltip is showing with a fresh random meaning for
    /// `word`. Unknown words only clear the layer.
    #[allow(clippy::too_many_arguments)]
    pub fn show<R: Rng + ?Sized>(
        &mut self,
        config: &WidgetConfig,
        word: &str,
        anchor: Rect,
        scroll: Scroll,
        style: TooltipStyle,
        measure: &dyn TextMeasure,
        rng: &mut R,
    ) -> Option<&Tooltip> {
        self.current = None;
        let (key, sets) = config.meanings_for(word)?;
        if sets.is_empty() {
            return None;
        }
        let lines = sets[rng.gen_range(0..sets.len())].clone();

        let widest = lines
            .iter()
            .map(|line| measure.text_width(line, style.font_size))
            .fold(0.0_f32, f32::max);
        let width = widest + style.padding * 2.0;
        let height =
            lines.len() as f32 * style.font_size * style.line_height + style.padding * 2.0;

        let html = lines
            .iter()
            .map(|line| escape_html(line))
            .collect::<Vec<_>>()
            .join("<br>");

        self.current = Some(Tooltip {
            word: key.to_string(),
            html,
            lines,
            top: anchor.top + scroll.y - height - TOOLTIP_GAP,
            left: anchor.left + scroll.x + anchor.width / 2.0 - width / 2.0,
            width,
            height,
            phase: TooltipPhase::FadingIn,
        });
        self.current.as_ref()
    }

    /// Starts the fade-out; returns how long until the tooltip may be removed.
    pub fn pointer_leave(&mut self) -> Option<Duration> {
        let tooltip = self.current.as_mut()?;
        tooltip.phase = TooltipPhase::FadingOut;
        Some(FADE_DURATION)
    }

    /// Removes a tooltip whose fade-out has completed.
    pub fn finish_fade_out(&mut self) -> bool {
        if self
            .current
            .as_ref()
            .is_some_and(|tooltip| tooltip.phase == TooltipPhase::FadingOut)
        {
            self.current = None;
            return true;
        }
        false
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&Tooltip> {
        self.current.as_ref()
    }

    pub fn count(&self) -> usize {
        usize::from(self.current.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    struct FixedAdvance;

    impl TextMeasure for FixedAdvance {
        fn text_width(&self, text: &str, _font_size: f32) -> f32 {
            text.chars().count() as f32 * 10.0
        }
    }

    fn config() -> WidgetConfig {
        let mut config = WidgetConfig::default();
        config.clickable_words.insert(
            "kut".to_string(),
            vec![vec!["uğur".to_string()], vec!["talih".to_string(), "baht".to_string()]],
        );
        config
    }

    #[test]
    fn wraps_words_case_insensitively() {
        let overlay = Overlay::new(&config()).unwrap();
        let html = overlay.apply("<p class=\"description\">+DAM ve +dam</p>");
        assert_eq!(
            html,
            "<p class=\"description\"><span class=\"clickable-word\" data-word=\"+dAm\">+DAM</span> ve <span class=\"clickable-word\" data-word=\"+dAm\">+dam</span></p>"
        );
    }

    #[test]
    fn markup_is_never_rewritten() {
        let overlay = Overlay::new(&config()).unwrap();
        let html = overlay.apply("<a href=\"/kut\" class=\"kut\">Kut</a>");
        assert_eq!(
            html,
            "<a href=\"/kut\" class=\"kut\"><span class=\"clickable-word\" data-word=\"kut\">Kut</span></a>"
        );
    }

    #[test]
    fn quoted_words_match_sanitized_text() {
        let mut config = WidgetConfig::default();
        config
            .clickable_words
            .insert("\"kut\"".to_string(), vec![vec!["uğur".to_string()]]);
        config
            .clickable_words
            .insert("ak&kara".to_string(), vec![vec!["renk".to_string()]]);
        let renderer = crate::render::Renderer::new(&config).unwrap();
        let overlay = Overlay::new(&config).unwrap();

        let html = overlay.apply(&renderer.render("bak \"kut\" sonra, ak&kara"));
        assert!(html.contains(
            "bak <span class=\"clickable-word\" data-word=\"&quot;kut&quot;\">\"kut\"</span> sonra"
        ));
        assert!(html.contains(
            "<span class=\"clickable-word\" data-word=\"ak&amp;kara\">ak&amp;kara</span>"
        ));
    }

    #[test]
    fn text_without_words_is_untouched() {
        let overlay = Overlay::new(&config()).unwrap();
        let html = "<p>elma <b>armut</b></p>";
        assert_eq!(overlay.apply(html), html);
    }

    #[test]
    fn tooltip_sits_centred_above_the_anchor() {
        let mut layer = TooltipLayer::default();
        let mut rng = SmallRng::seed_from_u64(7);
        let anchor = Rect {
            top: 100.0,
            left: 40.0,
            width: 30.0,
            height: 20.0,
        };
        let scroll = Scroll { x: 5.0, y: 200.0 };
        let style = TooltipStyle {
            font_size: 10.0,
            line_height: 1.0,
            padding: 0.0,
        };
        let tooltip = layer
            .show(&config(), "+dam", anchor, scroll, style, &FixedAdvance, &mut rng)
            .expect("tooltip")
            .clone();
        assert_eq!(tooltip.word, "+dAm");
        assert_eq!(tooltip.lines.len(), 3);
        assert_eq!(tooltip.html.matches("<br>").count(), 2);
        assert_eq!(tooltip.width, 10.0);
        assert_eq!(tooltip.height, 30.0);
        assert_eq!(tooltip.top, 100.0 + 200.0 - 30.0 - 5.0);
        assert_eq!(tooltip.left, 40.0 + 5.0 + 15.0 - 5.0);
        assert_eq!(tooltip.phase, TooltipPhase::FadingIn);
    }

    #[test]
    fn only_one_tooltip_exists_after_many_clicks() {
        let config = config();
        let mut layer = TooltipLayer::default();
        let mut rng = SmallRng::seed_from_u64(1);
        for word in ["+dAm", "kut", "KUT", "+dam", "kut"] {
            layer.show(
                &config,
                word,
                Rect::default(),
                Scroll::default(),
                TooltipStyle::default(),
                &FixedAdvance,
                &mut rng,
            );
            assert_eq!(layer.count(), 1);
        }
        assert_eq!(layer.current().map(|t| t.word.as_str()), Some("kut"));
    }

    #[test]
    fn unknown_word_clears_existing_tooltip() {
        let config = config();
        let mut layer = TooltipLayer::default();
        let mut rng = SmallRng::seed_from_u64(3);
        let measure = FixedAdvance;
        layer.show(&config, "kut", Rect::default(), Scroll::default(), TooltipStyle::default(), &measure, &mut rng);
        assert!(layer
            .show(&config, "yok", Rect::default(), Scroll::default(), TooltipStyle::default(), &measure, &mut rng)
            .is_none());
        assert_eq!(layer.count(), 0);
    }

    #[test]
    fn meanings_are_rerolled_on_every_click() {
        let config = config();
        let mut layer = TooltipLayer::default();
        let mut rng = SmallRng::seed_from_u64(11);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let tooltip = layer
                .show(&config, "kut", Rect::default(), Scroll::default(), TooltipStyle::default(), &FixedAdvance, &mut rng)
                .expect("tooltip");
            seen.insert(tooltip.lines.clone());
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn pointer_leave_fades_then_removes() {
        let config = config();
        let mut layer = TooltipLayer::default();
        let mut rng = SmallRng::seed_from_u64(5);
        assert!(!layer.finish_fade_out());
        layer.show(&config, "kut", Rect::default(), Scroll::default(), TooltipStyle::default(), &FixedAdvance, &mut rng);
        assert!(!layer.finish_fade_out(), "still fading in");
        assert_eq!(layer.pointer_leave(), Some(FADE_DURATION));
        assert_eq!(layer.current().map(|t| t.phase), Some(TooltipPhase::FadingOut));
        assert!(layer.finish_fade_out());
        assert_eq!(layer.count(), 0);
        assert_eq!(layer.pointer_leave(), None);
    }
}
