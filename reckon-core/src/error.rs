//! Error taxonomy shared by every pipeline stage.
//!
//! Only `UnreadablePdfError` is fatal, and only to its own file. The other
//! types are recorded against a block or line and processing continues.

use std::path::PathBuf;
use thiserror::Error;

/// Why a document produced no lines at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnreadableReason {
    #[error("file could not be read ({0})")]
    Io(String),
    #[error("not a valid PDF ({0})")]
    Corrupt(String),
    #[error("document is encrypted")]
    Encrypted,
    #[error("document has no pages")]
    NoPages,
    #[error("no extractable text layer")]
    NoTextLayer,
}

/// File-level failure of the layout extractor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unreadable PDF {}: {reason}", path.display())]
pub struct UnreadablePdfError {
    pub path: PathBuf,
    pub reason: UnreadableReason,
}

impl UnreadablePdfError {
    pub fn new(path: impl Into<PathBuf>, reason: UnreadableReason) -> Self {
        Self {
            path: path.into(),
            reason,
        }
    }
}

/// A statement block that had to be dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("page {page}: {reason}")]
pub struct SegmentationError {
    /// Page of the period marker that opened the block
    pub page: u32,
    pub reason: String,
}

/// A line that looked like a transaction but could not be completed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("page {page}: {reason}: '{text}'")]
pub struct UnparsedLineWarning {
    pub page: u32,
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("not a monetary amount: '{0}'")]
    Invalid(String),
    #[error("conflicting sign markers in '{0}'")]
    ConflictingSign(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("'{0}' doesn't match any expected date format")]
    NoMatch(String),
    #[error("no date provided")]
    Empty,
}
