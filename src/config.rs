use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A two-digit locale code and the label it expands to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialCode {
    pub code: String,
    pub label: String,
}

/// One tooltip's worth of lines.
pub type MeaningSet = Vec<String>;

/// Tables that drive highlighting and the clickable-word overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Applied in order during highlighting.
    pub special_codes: Vec<SpecialCode>,
    pub clickable_words: IndexMap<String, Vec<MeaningSet>>,
}

const DEFAULT_SPECIAL_CODES: &[(&str, &str)] = &[
    ("00", "Türkiye Türkçesi"),
    ("02", "Azerbaycan Türkçesi"),
    ("03", "Çuvaşça"),
    ("04", "Halaçça"),
    ("05", "Moğolca"),
    ("06", "Arapça"),
    ("07", "Karahanlı Türkçesi"),
    ("08", "Kazak Türkçesi"),
    ("09", "Kırgızca"),
];

impl Default for WidgetConfig {
    fn default() -> Self {
        let special_codes = DEFAULT_SPECIAL_CODES
            .iter()
            .map(|(code, label)| SpecialCode {
                code: (*code).to_string(),
                label: (*label).to_string(),
            })
            .collect();
        let mut clickable_words = IndexMap::new();
        clickable_words.insert(
            "+dAm".to_string(),
            vec![
                vec!["a".to_string(), "b".to_string(), "c".to_string()],
                vec!["d".to_string(), "e".to_string(), "f".to_string()],
            ],
        );
        Self {
            special_codes,
            clickable_words,
        }
    }
}

impl WidgetConfig {
    /// Reads a JSON config; missing sections fall back to the built-in tables.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Meaning sets for a clickable word, matched case-insensitively.
    pub fn meanings_for(&self, word: &str) -> Option<(&str, &[MeaningSet])> {
        if let Some((key, sets)) = self.clickable_words.get_key_value(word) {
            return Some((key.as_str(), sets.as_slice()));
        }
        let folded = word.to_lowercase();
        self.clickable_words
            .iter()
            .find(|(key, _)| key.to_lowercase() == folded)
            .map(|(key, sets)| (key.as_str(), sets.as_slice()))
    }
}
