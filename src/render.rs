use std::collections::{HashMap, HashSet};

use ammonia::Builder;
use regex::{Captures, Regex};

use crate::config::WidgetConfig;
use crate::error::ConfigError;

const ALLOWED_TAGS: [&str; 7] = ["b", "span", "i", "em", "strong", "a", "br"];
const ALLOWED_ATTRIBUTES: [&str; 2] = ["href", "class"];

// Private-use delimiters keep markers from colliding with dataset text.
const MARK_OPEN: char = '\u{E000}';
const MARK_CLOSE: char = '\u{E001}';

/// Turns a raw entry description into the result fragment.
pub struct Renderer {
    sanitizer: Builder<'static>,
    highlighter: Highlighter,
}

impl Renderer {
    pub fn new(config: &WidgetConfig) -> Result<Self, ConfigError> {
        let mut sanitizer = Builder::default();
        sanitizer
            .tags(ALLOWED_TAGS.iter().copied().collect::<HashSet<_>>())
            .tag_attributes(HashMap::<&str, HashSet<&str>>::new())
            .generic_attributes(ALLOWED_ATTRIBUTES.iter().copied().collect::<HashSet<_>>())
            .link_rel(None);
        Ok(Self {
            sanitizer,
            highlighter: Highlighter::new(config)?,
        })
    }

    /// Line breaks, sanitisation, then locale-code highlighting.
    pub fn render(&self, description: &str) -> String {
        let with_breaks = description.replace('\n', "<br>");
        let clean = self.sanitize(&with_breaks);
        let highlighted = self.highlighter.apply(&clean);
        format!("<p class=\"description\">{highlighted}</p>")
    }

    /// Drops every tag and attribute outside the allow-list. `script` and
    /// `style` lose their content too; other removed tags keep their text.
    pub fn sanitize(&self, html: &str) -> String {
        self.sanitizer.clean(html).to_string()
    }
}

struct CodeRule {
    code: Regex,
    marker: String,
    follow: Regex,
    label_html: String,
}

/// Replaces `CODE word` with a bold language label and a pink word.
///
/// Codes are first swapped for markers at whole-word positions, then each
/// marker followed by whitespace and a word becomes the label. Markers that
/// are not followed by a word are deleted.
pub struct Highlighter {
    rules: Vec<CodeRule>,
    leftover: Regex,
}

impl Highlighter {
    pub fn new(config: &WidgetConfig) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(config.special_codes.len());
        for special in &config.special_codes {
            if special.code.is_empty() {
                continue;
            }
            let marker = format!("{MARK_OPEN}SPECIAL:{}{MARK_CLOSE}", special.code);
            rules.push(CodeRule {
                code: Regex::new(&format!("(?i){}", regex::escape(&special.code)))?,
                follow: Regex::new(&format!(r"{}(\s+)(\S+)", regex::escape(&marker)))?,
                marker,
                label_html: escape_html(&special.label),
            });
        }
        let leftover = Regex::new(&format!(
            "{open}SPECIAL:[^{close}]*{close}",
            open = MARK_OPEN,
            close = MARK_CLOSE
        ))?;
        Ok(Self { rules, leftover })
    }

    pub fn apply(&self, text: &str) -> String {
        let mut marked = text.to_string();
        for rule in &self.rules {
            marked = mark_whole_words(&marked, &rule.code, &rule.marker);
        }

        let mut labelled = marked;
        for rule in &self.rules {
            labelled = rule
                .follow
                .replace_all(&labelled, |caps: &Captures<'_>| {
                    format!(
                        "<b>{}</b>{}<span class=\"pink\">{}</span>",
                        rule.label_html, &caps[1], &caps[2]
                    )
                })
                .into_owned();
        }

        self.leftover.replace_all(&labelled, "").into_owned()
    }
}

/// Replaces matches of `pattern` that sit on ASCII word boundaries on both
/// sides. A rejected candidate is retried one character later, so boundary
/// handling matches a `\bCODE\b` scan.
fn mark_whole_words(text: &str, pattern: &Regex, marker: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut pos = 0;
    while pos < text.len() {
        let Some(found) = pattern.find_at(text, pos) else {
            break;
        };
        if found.is_empty() {
            break;
        }
        if is_word_boundary(text, found.start()) && is_word_boundary(text, found.end()) {
            out.push_str(&text[copied..found.start()]);
            out.push_str(marker);
            copied = found.end();
            pos = found.end();
        } else {
            pos = next_char_boundary(text, found.start());
        }
    }
    out.push_str(&text[copied..]);
    out
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn is_word_boundary(text: &str, idx: usize) -> bool {
    let before = text[..idx].chars().next_back().is_some_and(is_word_char);
    let after = text[idx..].chars().next().is_some_and(is_word_char);
    before != after
}

fn next_char_boundary(text: &str, idx: usize) -> usize {
    idx + text[idx..].chars().next().map_or(1, char::len_utf8)
}

pub(crate) fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpecialCode;

    fn renderer() -> Renderer {
        Renderer::new(&WidgetConfig::default()).expect("default tables compile")
    }

    #[test]
    fn code_followed_by_word_becomes_label_and_pink_word() {
        let html = renderer().render("bak. 00 örnek");
        assert_eq!(
            html,
            "<p class=\"description\">bak. <b>Türkiye Türkçesi</b> <span class=\"pink\">örnek</span></p>"
        );
    }

    #[test]
    fn trailing_code_is_dropped_without_label() {
        let html = renderer().render("bak. 00");
        assert_eq!(html, "<p class=\"description\">bak. </p>");
        assert!(!html.contains("Türkiye"));
    }

    #[test]
    fn whitespace_between_code_and_word_is_kept() {
        let html = renderer().render("08\t\tkelime");
        assert!(html.contains("<b>Kazak Türkçesi</b>\t\t<span class=\"pink\">kelime</span>"));
    }

    #[test]
    fn codes_inside_words_are_left_alone() {
        let html = renderer().render("1900 yılı, a00b ve 000");
        assert!(!html.contains("<b>"));
        assert!(html.contains("1900 yılı, a00b ve 000"));
    }

    #[test]
    fn non_ascii_letters_count_as_boundaries() {
        let html = renderer().render("ö02 ev");
        assert!(html.contains("ö<b>Azerbaycan Türkçesi</b> <span class=\"pink\">ev</span>"));
    }

    #[test]
    fn several_codes_in_one_description() {
        let html = renderer().render("00 ev, 02 öy; 09 üy");
        assert!(html.contains("<b>Türkiye Türkçesi</b> <span class=\"pink\">ev,</span> "));
        assert!(html.contains("<b>Azerbaycan Türkçesi</b> <span class=\"pink\">öy;</span> "));
        assert!(html.contains("<b>Kırgızca</b> <span class=\"pink\">üy</span>"));
    }

    #[test]
    fn highlighted_word_runs_to_the_next_whitespace() {
        let html = renderer().render("00 ev\nsonra gelen");
        assert!(html.contains("<span class=\"pink\">ev<br>sonra</span> gelen"));
    }

    #[test]
    fn consecutive_codes_consume_the_following_marker() {
        // The first code takes the second code's marker as its word; the
        // emptied second marker is then removed.
        let html = renderer().render("00 02 kelime");
        assert_eq!(
            html,
            "<p class=\"description\"><b>Türkiye Türkçesi</b> <span class=\"pink\"></span> kelime</p>"
        );
    }

    #[test]
    fn unknown_codes_are_untouched() {
        let html = renderer().render("01 kelime");
        assert_eq!(html, "<p class=\"description\">01 kelime</p>");
    }

    #[test]
    fn newlines_become_line_breaks() {
        let html = renderer().render("bir\niki");
        assert_eq!(html, "<p class=\"description\">bir<br>iki</p>");
    }

    #[test]
    fn script_tags_are_removed_entirely() {
        let html = renderer().render("önce<script>alert('x')</script>sonra");
        assert_eq!(html, "<p class=\"description\">öncesonra</p>");
    }

    #[test]
    fn links_and_inline_styles_survive() {
        let html = renderer().render(
            r#"<a href="https://example.com/kok">kök</a> <strong>güçlü</strong> <em>eğik</em>"#,
        );
        assert!(html.contains(r#"<a href="https://example.com/kok">kök</a>"#));
        assert!(html.contains("<strong>güçlü</strong>"));
        assert!(html.contains("<em>eğik</em>"));
    }

    #[test]
    fn disallowed_tags_and_attributes_are_stripped() {
        let html = renderer()
            .render(r#"<div onclick="x()"><span class="not" style="color:red" id="z">metin</span></div>"#);
        assert_eq!(
            html,
            "<p class=\"description\"><span class=\"not\">metin</span></p>"
        );
    }

    #[test]
    fn alternate_tables_are_honoured() {
        let config = WidgetConfig {
            special_codes: vec![SpecialCode {
                code: "11".to_string(),
                label: "Tatarca <eski>".to_string(),
            }],
            ..WidgetConfig::default()
        };
        let renderer = Renderer::new(&config).unwrap();
        let html = renderer.render("11 su 00 ev");
        assert!(html.contains("<b>Tatarca &lt;eski&gt;</b> <span class=\"pink\">su</span>"));
        assert!(html.contains("00 ev"));
    }
}
