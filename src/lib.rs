//! Turkish etymological dictionary lookup widget.
//!
//! The vocabulary is a JSON object of `word -> {"a": description}` records.
//! Queries are matched by prefix over Turkish-normalised keys, and the winning
//! description is sanitised, highlighted and overlaid with clickable words.

pub mod config;
pub mod controller;
pub mod dictionary;
pub mod error;
pub mod ghost;
pub mod index;
pub mod normalize;
pub mod overlay;
pub mod render;

#[cfg(feature = "web")]
pub mod sessions;
#[cfg(feature = "web")]
pub mod web;

pub use config::{MeaningSet, SpecialCode, WidgetConfig};
pub use controller::{Lookup, Outcome, SearchState, Session, View, Widget};
pub use dictionary::{DEFAULT_DATA_PATH, Dictionary, Entry};
pub use error::{ConfigError, LOAD_FAILURE_MESSAGE, LoadError};
pub use ghost::{ColumnMeasure, GhostText, InputMetrics, TextMeasure};
pub use index::{Match, PrefixIndex};
pub use normalize::normalize;
pub use overlay::{Overlay, Rect, Scroll, Tooltip, TooltipLayer, TooltipPhase, TooltipStyle};
pub use render::{Highlighter, Renderer};
