//! Error types for the arkimet engine

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArkiError>;

#[derive(Error, Debug)]
pub enum ArkiError {
    /// Malformed config, matcher expression, item string or binary envelope.
    #[error("parse error in {what}: {msg} (at offset {offset})")]
    Parse {
        what: &'static str,
        msg: String,
        offset: usize,
    },

    /// Unknown envelope magic or version, or unscannable data.
    #[error("format error: {0}")]
    Format(String),

    /// Metadata or segment state violates invariants.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// Unique key collision on insert.
    #[error("duplicate element: {0}")]
    Duplicate(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("lock acquisition failed on {path}: {msg}")]
    Lock { path: PathBuf, msg: String },

    #[error("shutdown requested")]
    ShutdownRequested,

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(String),
}

impl ArkiError {
    /// Build a parse error with no meaningful offset.
    pub fn parse(what: &'static str, msg: impl Into<String>) -> Self {
        ArkiError::Parse {
            what,
            msg: msg.into(),
            offset: 0,
        }
    }

    /// Build a parse error anchored at a byte offset in the input.
    pub fn parse_at(what: &'static str, msg: impl Into<String>, offset: usize) -> Self {
        ArkiError::Parse {
            what,
            msg: msg.into(),
            offset,
        }
    }

    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArkiError::Io {
            path: path.into(),
            source,
        }
    }

    /// True if this is a duplicate-insert error (the dispatcher reroutes these).
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ArkiError::Duplicate(_))
    }

    /// Error kind tag for machine-readable diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ArkiError::Parse { .. } => "parse",
            ArkiError::Format(_) => "format",
            ArkiError::Consistency(_) => "consistency",
            ArkiError::Duplicate(_) => "duplicate",
            ArkiError::Io { .. } => "io",
            ArkiError::Lock { .. } => "lock",
            ArkiError::ShutdownRequested => "shutdown",
            ArkiError::Sqlite(_) => "sqlite",
            ArkiError::Http(_) => "http",
        }
    }
}

impl From<std::io::Error> for ArkiError {
    fn from(e: std::io::Error) -> Self {
        ArkiError::Io {
            path: PathBuf::new(),
            source: e,
        }
    }
}
