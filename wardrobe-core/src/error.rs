//! Error types for wardrobe-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::GroupName;

/// Failures of administrative group operations.
///
/// These are expected outcomes of admin input and are always returned, never
/// panicked on.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("group '{0}' already exists")]
    AlreadyExists(GroupName),

    #[error("group '{0}' does not exist")]
    NotFound(GroupName),

    /// The default group is the resolver's fallback and must always exist.
    #[error("group '{0}' is the default group and cannot be deleted")]
    DefaultGroup(GroupName),

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("group '{group}' already has pattern '{pattern}'")]
    DuplicatePattern { group: GroupName, pattern: String },

    #[error("group '{group}' has no pattern '{pattern}'")]
    PatternNotFound { group: GroupName, pattern: String },
}

/// All errors that can arise from reading or writing configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.wardrobe/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The groups file did not exist at the expected path.
    #[error("groups config not found at {path}")]
    ConfigNotFound { path: PathBuf },
}
