//! Trellis core: domain types, decision logic, events, and result trees.
//!
//! This crate defines the foundational types for the trellis
//! process-orchestration engine. It contains no execution logic — only
//! type definitions, the pure condition gate, error enums, and the
//! reporter/event contracts consumed by `trellis-engine`.

pub mod domain;
pub mod error;
pub mod events;
pub mod gate;
pub mod result;

// Re-export commonly used types
pub use domain::{CommandPath, EnvMap, PreviousState, RunsOn, Status};
pub use error::{ErrorInfo, ErrorKind, Result, RunError};
pub use events::{ChildReporter, EventKind, NullReporter, ProgressEvent, Reporter};
pub use gate::{evaluate_gate, GateDecision};
pub use result::{CodecError, CommandResult};
