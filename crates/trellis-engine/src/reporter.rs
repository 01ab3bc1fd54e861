//! Bounded-channel reporter.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use trellis_core::{ProgressEvent, Reporter};

/// Reporter backed by a bounded channel.
///
/// Delivery is best-effort: when the receiver falls behind and the
/// buffer fills, events are dropped rather than blocking the emitting
/// task. `close` is idempotent; once closed the reporter drops every
/// further event and the receiver sees the stream end when the reporter
/// is dropped.
pub struct ChannelReporter {
    tx: mpsc::Sender<ProgressEvent>,
    closed: AtomicBool,
}

impl ChannelReporter {
    /// A reporter plus the receiving end of its event stream.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                closed: AtomicBool::new(false),
            },
            rx,
        )
    }
}

impl Reporter for ChannelReporter {
    fn report(&self, event: ProgressEvent) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.tx.try_send(event) {
            log::debug!("progress event dropped: {e}");
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
