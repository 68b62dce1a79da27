use std::path::PathBuf;
use thiserror::Error;

/// A single entry that could not be merged. The entry is skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("proxy without a name")]
    UnnamedProxy,
    #[error("proxy group without a name")]
    UnnamedGroup,
    #[error("provider without a name")]
    UnnamedProvider,
    #[error("rule has no group field: {0}")]
    RuleWithoutGroup(String),
}

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{0} does not exist")]
    NotFound(PathBuf),
    #[error("{0} is empty")]
    Empty(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
