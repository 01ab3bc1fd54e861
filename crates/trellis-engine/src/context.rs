//! Shared execution state handed down the command tree.

use crate::registry::ProcessRegistry;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use trellis_core::{
    ChildReporter, CommandPath, CommandResult, EventKind, ProgressEvent, Reporter, RunError, Status,
};

/// Per-run handles shared by every task in a command tree: the
/// cancellation token, the global leaf-process semaphore, the progress
/// reporter for this level, and the process-group registry.
///
/// Composites derive one child context per level via [`child`](Self::child),
/// which wraps the reporter so descendant events carry full paths.
#[derive(Clone)]
pub struct RunContext {
    cancel: CancellationToken,
    permits: Arc<Semaphore>,
    reporter: Arc<dyn Reporter>,
    registry: Arc<ProcessRegistry>,
}

impl RunContext {
    pub fn new(
        cancel: CancellationToken,
        permits: Arc<Semaphore>,
        reporter: Arc<dyn Reporter>,
        registry: Arc<ProcessRegistry>,
    ) -> Self {
        Self {
            cancel,
            permits,
            reporter,
            registry,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    /// A context for the children of the command labelled `label`:
    /// events reported through it are prefixed with that label.
    pub fn child(&self, label: &str) -> Self {
        Self {
            cancel: self.cancel.clone(),
            permits: Arc::clone(&self.permits),
            reporter: Arc::new(ChildReporter::new(Arc::clone(&self.reporter), label)),
            registry: Arc::clone(&self.registry),
        }
    }

    /// Emit an event for the command labelled `label` at this level.
    pub fn emit(&self, label: &str, kind: EventKind) {
        self.reporter
            .report(ProgressEvent::now(CommandPath::new(label), kind));
    }

    /// Emit the terminal lifecycle event matching `result`.
    pub fn emit_terminal(&self, result: &CommandResult) {
        match result.status {
            Status::Success => self.emit(&result.label, EventKind::Completed),
            Status::Skipped => self.emit(&result.label, EventKind::Skipped),
            Status::Error => {
                let message = result
                    .error
                    .as_ref()
                    .map_or_else(|| "failed".to_string(), ToString::to_string);
                self.emit(
                    &result.label,
                    EventKind::Failed {
                        exit_code: result.exit_code,
                        message,
                    },
                );
            }
        }
    }

    /// Acquire one leaf-process permit, or fail with `Cancelled` if the
    /// run is cancelled while waiting.
    pub async fn acquire_permit(&self) -> trellis_core::Result<OwnedSemaphorePermit> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(RunError::Cancelled),
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| RunError::Cancelled)
            }
        }
    }
}
