use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::WidgetConfig;
use crate::dictionary::Dictionary;
use crate::error::{ConfigError, LOAD_FAILURE_MESSAGE, LoadError};
use crate::ghost::{self, ColumnMeasure, GhostText, InputMetrics, TextMeasure};
use crate::normalize::normalize;
use crate::overlay::{Overlay, Rect, Scroll, Tooltip, TooltipLayer, TooltipStyle};
use crate::render::Renderer;

/// Read-only half of the widget: vocabulary, tables and compiled renderers.
/// Shared by every session.
pub struct Widget {
    vocabulary: Result<Dictionary, LoadError>,
    config: WidgetConfig,
    renderer: Renderer,
    overlay: Overlay,
}

/// Result of resolving one query, before any session bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lookup {
    pub word: String,
    pub normalized: String,
    /// Part of the normalised key the user has not typed yet.
    pub remainder: String,
    pub html: String,
}

impl Widget {
    pub fn new(
        vocabulary: Result<Dictionary, LoadError>,
        config: WidgetConfig,
    ) -> Result<Self, ConfigError> {
        if let Err(err) = &vocabulary {
            warn!(error = %err, "search disabled for this session");
        }
        Ok(Self {
            renderer: Renderer::new(&config)?,
            overlay: Overlay::new(&config)?,
            vocabulary,
            config,
        })
    }

    /// Loads the vocabulary at `path`. A load failure does not fail
    /// construction; it leaves the widget in its disabled state.
    pub fn load(path: impl AsRef<Path>, config: WidgetConfig) -> Result<Self, ConfigError> {
        Self::new(Dictionary::from_path(path), config)
    }

    pub fn dictionary(&self) -> Option<&Dictionary> {
        self.vocabulary.as_ref().ok()
    }

    pub fn load_error(&self) -> Option<&LoadError> {
        self.vocabulary.as_ref().err()
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    /// Word-count banner, or the fixed failure message.
    pub fn banner_html(&self) -> String {
        match &self.vocabulary {
            Ok(dictionary) => format!(
                "Türk dilinin <span class=\"highlight\">{}</span> maddelik arkeolojisi.",
                dictionary.len()
            ),
            Err(_) => format!("<p class=\"error-message\">{LOAD_FAILURE_MESSAGE}</p>"),
        }
    }

    /// Prefix-matches `query` and renders the winning definition with the
    /// clickable-word overlay applied. Does not validate the query.
    pub fn lookup(&self, query: &str) -> Option<Lookup> {
        let dictionary = self.dictionary()?;
        let normalized_query = normalize(query);
        let found = dictionary.best_match(&normalized_query)?;
        let entry = dictionary.get(found.original)?;
        let html = self.overlay.apply(&self.renderer.render(&entry.a));
        Some(Lookup {
            word: found.original.to_string(),
            normalized: found.normalized.to_string(),
            remainder: ghost::remainder(found.normalized, &normalized_query).to_string(),
            html,
        })
    }
}

/// Per-session search bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchState {
    pub last_query: String,
    pub has_error: bool,
}

/// Everything the page shows after an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct View {
    pub result_html: String,
    pub ghost: Option<GhostText>,
    /// Error styling on the search container.
    pub error: bool,
    pub result_hidden: bool,
    pub ghost_hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Same query as the previous event; nothing was re-rendered.
    Unchanged,
    /// Input was cleared.
    Empty,
    /// Whitespace-only or leading-space input; no match attempted.
    Rejected,
    NoMatch,
    Found { word: String },
    /// The vocabulary never loaded; input has no effect.
    Disabled,
}

/// The lookup-and-render controller for one reader.
pub struct Session<M = ColumnMeasure> {
    widget: Arc<Widget>,
    state: SearchState,
    view: View,
    tooltips: TooltipLayer,
    metrics: InputMetrics,
    tooltip_style: TooltipStyle,
    measure: M,
}

impl Session<ColumnMeasure> {
    pub fn new(widget: Arc<Widget>) -> Self {
        Self::with_measure(widget, ColumnMeasure::default())
    }
}

impl<M: TextMeasure> Session<M> {
    pub fn with_measure(widget: Arc<Widget>, measure: M) -> Self {
        let disabled = widget.load_error().is_some();
        Self {
            widget,
            state: SearchState {
                last_query: String::new(),
                has_error: disabled,
            },
            view: View {
                error: disabled,
                result_hidden: disabled,
                ghost_hidden: disabled,
                ..View::default()
            },
            tooltips: TooltipLayer::default(),
            metrics: InputMetrics::default(),
            tooltip_style: TooltipStyle::default(),
            measure,
        }
    }

    pub fn set_metrics(&mut self, metrics: InputMetrics) {
        self.metrics = metrics;
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn widget(&self) -> &Arc<Widget> {
        &self.widget
    }

    pub fn tooltip(&self) -> Option<&Tooltip> {
        self.tooltips.current()
    }

    pub fn tooltip_count(&self) -> usize {
        self.tooltips.count()
    }

    /// Handles one input event with the full contents of the search box.
    pub fn input(&mut self, query: &str) -> Outcome {
        let outcome = self.process(query);
        debug!(query, ?outcome, "input processed");
        outcome
    }

    fn process(&mut self, query: &str) -> Outcome {
        if self.widget.load_error().is_some() {
            return Outcome::Disabled;
        }
        if query == self.state.last_query {
            return Outcome::Unchanged;
        }
        self.state.last_query = query.to_string();
        self.view.result_html.clear();
        self.tooltips.clear();

        if query.starts_with(' ') || query.trim().is_empty() {
            self.view.ghost = None;
            if query.is_empty() {
                self.set_error(false);
                return Outcome::Empty;
            }
            self.set_error(true);
            return Outcome::Rejected;
        }
        self.set_error(false);

        match self.widget.lookup(query) {
            Some(found) => {
                self.view.ghost = ghost::place(query, &found.remainder, self.metrics, &self.measure);
                self.view.result_html = found.html;
                Outcome::Found { word: found.word }
            }
            None => {
                self.view.ghost = None;
                self.set_error(true);
                Outcome::NoMatch
            }
        }
    }

    /// A click on a clickable word. Any previous tooltip is removed first.
    pub fn click<R: Rng + ?Sized>(
        &mut self,
        word: &str,
        anchor: Rect,
        scroll: Scroll,
        rng: &mut R,
    ) -> Option<&Tooltip> {
        self.tooltips.show(
            self.widget.config(),
            word,
            anchor,
            scroll,
            self.tooltip_style,
            &self.measure,
            rng,
        )
    }

    pub fn pointer_leave(&mut self) -> Option<std::time::Duration> {
        self.tooltips.pointer_leave()
    }

    pub fn finish_fade_out(&mut self) -> bool {
        self.tooltips.finish_fade_out()
    }

    fn set_error(&mut self, error: bool) {
        self.state.has_error = error;
        self.view.error = error;
    }
}
