//! Error types for authorized_keys operations.
//!
//! Errors carry the target path (or owner) they relate to, so a caller
//! reconciling several files can tell which one failed without wrapping.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a single line could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The options segment has an unterminated double quote.
    MalformedOptions,
    /// Fewer than two tokens follow the options segment.
    MissingTypeOrContent,
}

impl ParseErrorKind {
    /// Short human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::MalformedOptions => "unterminated quote in options",
            Self::MissingTypeOrContent => "missing key type or key content",
        }
    }
}

/// A malformed line, with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {}", .kind.description())]
pub struct ParseError {
    /// What went wrong
    pub kind: ParseErrorKind,
    /// 1-based line number within the file
    pub line: usize,
}

/// Errors that can occur while loading, editing or reconciling key files.
#[derive(Debug, Error)]
pub enum Error {
    /// Target file does not exist
    #[error("{} does not exist", .path.display())]
    NotFound {
        /// Path that was looked up
        path: PathBuf,
    },

    /// Target file has malformed content
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        /// File being parsed
        path: PathBuf,
        /// Line-level detail
        #[source]
        source: ParseError,
    },

    /// Any other filesystem failure
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Path the operation was acting on
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Could not act as the requested account
    #[error("cannot act as '{owner}': {message}")]
    Privilege {
        /// Account that was requested
        owner: String,
        /// Reason
        message: String,
    },

    /// Request is inconsistent; raised before touching the filesystem
    #[error("invalid request: {0}")]
    Config(String),

    /// Key record fields violate the record invariants
    #[error("invalid key record: {0}")]
    InvalidRecord(String),

    /// Deadline passed between two targets
    #[error("deadline exceeded after {completed} target(s)")]
    DeadlineExceeded {
        /// Number of targets fully processed before stopping
        completed: usize,
    },
}

impl Error {
    /// Map an I/O error on `path`, keeping `NotFound` distinct.
    pub fn from_io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// An I/O error that must never be read as "missing file".
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the target simply does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The target path this error relates to, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound { path } | Self::Parse { path, .. } | Self::Io { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }
}

/// Result type for authorized_keys operations.
pub type Result<T> = std::result::Result<T, Error>;
