//! Hierarchical execution results.
//!
//! Every command produces exactly one result node; composites fold their
//! children's nodes into their own, so the result tree mirrors the
//! command tree (truncated past a cancellation point). Trees serialize
//! with serde and can be persisted through the bincode helpers.

use crate::domain::Status;
use crate::error::{ErrorInfo, ErrorKind, RunError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from encoding or decoding a persisted result tree.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode result tree: {0}")]
    Encode(String),

    #[error("failed to decode result tree: {0}")]
    Decode(String),
}

/// Outcome of executing one command, with one child node per child
/// command for composites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub label: String,
    pub status: Status,
    /// Exit code of the OS process for leaves; `-1` for structural nodes
    /// (composites, spawn failures, cancellations).
    pub exit_code: i32,
    pub error: Option<ErrorInfo>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub children: Vec<CommandResult>,
    /// Relocated working directory announced by a workspace-copying leaf.
    /// Consumed by the enclosing serial batch; never persisted.
    #[serde(skip)]
    pub new_cwd: Option<PathBuf>,
}

impl CommandResult {
    /// A successful structural node with no output.
    pub fn success(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status: Status::Success,
            exit_code: 0,
            error: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            children: Vec::new(),
            new_cwd: None,
        }
    }

    /// A skipped node carrying the skip reason.
    pub fn skipped(label: impl Into<String>, reason: RunError) -> Self {
        Self {
            label: label.into(),
            status: Status::Skipped,
            exit_code: -1,
            error: Some(ErrorInfo::from(reason)),
            stdout: Vec::new(),
            stderr: Vec::new(),
            children: Vec::new(),
            new_cwd: None,
        }
    }

    /// An errored node that never ran a process.
    pub fn failed(label: impl Into<String>, error: RunError) -> Self {
        Self {
            label: label.into(),
            status: Status::Error,
            exit_code: -1,
            error: Some(ErrorInfo::from(error)),
            stdout: Vec::new(),
            stderr: Vec::new(),
            children: Vec::new(),
            new_cwd: None,
        }
    }

    /// The node for a command interrupted by cancellation.
    pub fn cancelled(label: impl Into<String>) -> Self {
        Self::failed(label, RunError::Cancelled)
    }

    /// Fold child results into a composite node: Success when no child
    /// has an error anywhere beneath it, Error otherwise.
    pub fn from_children(label: impl Into<String>, children: Vec<CommandResult>) -> Self {
        let errored = children.iter().any(CommandResult::has_error);
        Self {
            label: label.into(),
            status: if errored { Status::Error } else { Status::Success },
            exit_code: -1,
            error: errored.then(|| ErrorInfo::from(RunError::ChildrenHasError)),
            stdout: Vec::new(),
            stderr: Vec::new(),
            children,
            new_cwd: None,
        }
    }

    /// Whether this node or any descendant carries an error status.
    /// Skipped nodes do not count.
    pub fn has_error(&self) -> bool {
        self.status == Status::Error || self.children.iter().any(CommandResult::has_error)
    }

    /// Whether this node's error is the given kind.
    pub fn is_error_kind(&self, kind: ErrorKind) -> bool {
        self.error.as_ref().is_some_and(|e| e.kind == kind)
    }

    /// Enumerate failing leaves with their path and last stderr line, one
    /// per line. `None` when the tree has no failures.
    pub fn failure_summary(&self) -> Option<String> {
        let mut lines = Vec::new();
        self.collect_failures(&mut Vec::new(), &mut lines);
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }

    fn collect_failures<'a>(&'a self, path: &mut Vec<&'a str>, out: &mut Vec<String>) {
        path.push(&self.label);
        if self.children.is_empty() {
            if self.status == Status::Error {
                let message = self
                    .error
                    .as_ref()
                    .map_or_else(|| "failed".to_string(), ToString::to_string);
                let mut line = format!("{}: {message}", path.join("/"));
                if let Some(stderr) = last_line(&self.stderr) {
                    line.push_str(&format!(" ({stderr})"));
                }
                out.push(line);
            }
        } else {
            for child in &self.children {
                child.collect_failures(path, out);
            }
        }
        path.pop();
    }

    /// Serialize to bytes. The encoding roundtrips labels, statuses, exit
    /// codes, output buffers, errors, and child order; it is not stable
    /// across crate versions.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Deserialize from bytes produced by [`encode`](Self::encode).
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Last non-empty line of a byte buffer, lossily decoded.
fn last_line(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(ToString::to_string)
}
