use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::LoadError;
use crate::index::{Match, PrefixIndex};

/// Path the widget reads its vocabulary from unless told otherwise.
pub const DEFAULT_DATA_PATH: &str = "data/vocabulary.json";

/// One vocabulary record. Only the description text is used; anything else in
/// the JSON object is ignored.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Entry {
    pub a: String,
}

/// Immutable word → entry mapping together with its prefix index.
///
/// Keys keep the casing and diacritics of the source file, and iteration
/// follows source order.
pub struct Dictionary {
    entries: IndexMap<String, Entry>,
    index: PrefixIndex,
}

impl Dictionary {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| {
            warn!(path = %path.display(), error = %source, "vocabulary file unavailable");
            LoadError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let dictionary = Self::from_reader(BufReader::new(file))?;
        info!(
            path = %path.display(),
            entries = dictionary.len(),
            "vocabulary loaded"
        );
        Ok(dictionary)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        let entries: IndexMap<String, Entry> = serde_json::from_reader(reader)?;
        Self::from_entries(entries)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, LoadError> {
        let entries: IndexMap<String, Entry> = serde_json::from_slice(bytes)?;
        Self::from_entries(entries)
    }

    pub fn from_entries(entries: IndexMap<String, Entry>) -> Result<Self, LoadError> {
        let index = PrefixIndex::build(entries.keys().map(String::as_str))?;
        Ok(Self { entries, index })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact lookup by the stored key.
    pub fn get(&self, word: &str) -> Option<&Entry> {
        self.entries.get(word)
    }

    /// Words in source order.
    pub fn words(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    pub fn index(&self) -> &PrefixIndex {
        &self.index
    }

    /// Best prefix match for an already normalised query.
    pub fn best_match(&self, normalized_query: &str) -> Option<Match<'_>> {
        self.index.best_match(normalized_query)
    }
}
