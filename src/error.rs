use std::fmt;
use std::io;
use std::path::PathBuf;

/// Fixed message shown to the reader whenever the dataset cannot be loaded.
pub const LOAD_FAILURE_MESSAGE: &str = "Yoksa bir yerlerde bir harf mi kayıp?";

/// Dataset load or index build failure. Terminal for the session that hit it.
#[derive(Debug)]
pub enum LoadError {
    Io { path: PathBuf, source: io::Error },
    Parse(serde_json::Error),
    Collation(String),
    Index(fst::Error),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            LoadError::Parse(err) => write!(f, "malformed vocabulary JSON: {err}"),
            LoadError::Collation(err) => write!(f, "collator unavailable: {err}"),
            LoadError::Index(err) => write!(f, "failed to build prefix index: {err}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io { source, .. } => Some(source),
            LoadError::Parse(err) => Some(err),
            LoadError::Collation(_) => None,
            LoadError::Index(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(value: serde_json::Error) -> Self {
        LoadError::Parse(value)
    }
}

impl From<fst::Error> for LoadError {
    fn from(value: fst::Error) -> Self {
        LoadError::Index(value)
    }
}

/// Widget configuration file could not be used.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Parse(serde_json::Error),
    Pattern(regex::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            ConfigError::Parse(err) => write!(f, "malformed widget config: {err}"),
            ConfigError::Pattern(err) => write!(f, "invalid highlight pattern: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(err) => Some(err),
            ConfigError::Pattern(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        ConfigError::Parse(value)
    }
}

impl From<regex::Error> for ConfigError {
    fn from(value: regex::Error) -> Self {
        ConfigError::Pattern(value)
    }
}
