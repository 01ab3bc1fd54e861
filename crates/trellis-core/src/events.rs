//! Progress events and the reporter contract.
//!
//! Events are delivered best-effort and at most once. Reporters must
//! never block the emitting task; implementations backed by a bounded
//! channel drop events when the consumer cannot keep up.

use crate::domain::CommandPath;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One lifecycle transition or output line of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Labels from the root command down to the emitter.
    pub path: CommandPath,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl ProgressEvent {
    /// An event stamped with the current time.
    pub fn now(path: CommandPath, kind: EventKind) -> Self {
        Self {
            path,
            timestamp: Utc::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Started,
    /// A complete line observed on the command's stdout or stderr.
    Progress { line: String, is_stderr: bool },
    Completed,
    Failed { exit_code: i32, message: String },
    Skipped,
}

/// Non-blocking sink for progress events.
///
/// `report` must return promptly; `close` is idempotent and a no-op for
/// wrappers that share an underlying channel.
pub trait Reporter: Send + Sync {
    fn report(&self, event: ProgressEvent);

    fn close(&self) {}
}

/// Reporter that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _event: ProgressEvent) {}
}

/// Wrapper that prepends a fixed label to every event's path before
/// forwarding to the parent reporter.
///
/// Composites wrap their context's reporter once per level with their own
/// label, so leaf events carry full hierarchical paths without leaves
/// knowing their ancestry.
pub struct ChildReporter {
    parent: Arc<dyn Reporter>,
    prefix: String,
}

impl ChildReporter {
    pub fn new(parent: Arc<dyn Reporter>, prefix: impl Into<String>) -> Self {
        Self {
            parent,
            prefix: prefix.into(),
        }
    }
}

impl Reporter for ChildReporter {
    fn report(&self, mut event: ProgressEvent) {
        event.path = event.path.prefixed(&self.prefix);
        self.parent.report(event);
    }
}
