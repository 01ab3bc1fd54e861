//! Error types for Trellis.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while executing a command tree.
///
/// Execution errors are carried as values on result nodes rather than
/// aborted out of; a failing command never prevents its siblings from
/// being considered by the condition gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("failed to spawn process: {details}")]
    Spawn { details: String },

    #[error("process exited with code {code}")]
    ProcessExit { code: i32 },

    #[error("skipped")]
    SkipIntentional,

    #[error("skipped because a previous sibling failed")]
    SkipOnError,

    #[error("working directory does not exist: {path}")]
    CwdMissing { path: String },

    #[error("cancelled")]
    Cancelled,

    #[error("one or more children failed")]
    ChildrenHasError,

    #[error("items provider failed: {details}")]
    ProviderFailed { details: String },

    #[error("io error: {details}")]
    Io { details: String },
}

impl RunError {
    /// The persistable tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Spawn { .. } => ErrorKind::Spawn,
            Self::ProcessExit { .. } => ErrorKind::ProcessExit,
            Self::SkipIntentional => ErrorKind::SkipIntentional,
            Self::SkipOnError => ErrorKind::SkipOnError,
            Self::CwdMissing { .. } => ErrorKind::CwdMissing,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::ChildrenHasError => ErrorKind::ChildrenHasError,
            Self::ProviderFailed { .. } => ErrorKind::ProviderFailed,
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Stable tag identifying an error variant across encode/decode cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Spawn,
    ProcessExit,
    SkipIntentional,
    SkipOnError,
    CwdMissing,
    Cancelled,
    ChildrenHasError,
    ProviderFailed,
    Io,
}

/// The persistable form of a [`RunError`]: a kind tag plus the rendered
/// message. Result trees store errors in this shape so they survive a
/// serialization round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&RunError> for ErrorInfo {
    fn from(error: &RunError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<RunError> for ErrorInfo {
    fn from(error: RunError) -> Self {
        Self::from(&error)
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

pub type Result<T> = std::result::Result<T, RunError>;
