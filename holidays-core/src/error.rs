//! Error types for holidays-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building domain values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("invalid country code '{0}'; expected 2-3 ASCII letters")]
    InvalidCountry(String),

    #[error("holiday name must not be empty")]
    EmptyName,

    #[error("invalid holiday date '{0}'; expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// All errors that can arise from settings operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Underlying I/O failure (permission denied, disk full, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.holidays/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A field held a value outside its domain.
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Record(#[from] RecordError),
}
