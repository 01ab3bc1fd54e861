//! Trellis engine: the execution runtime for command trees.
//!
//! A command tree (serial, parallel, and for-each composites over
//! OS-process leaves) is handed in fully constructed by a loader. The
//! engine runs it with cooperative cancellation, a global cap on
//! concurrently running processes, conditional gating between siblings,
//! working-directory and environment inheritance, and streamed progress
//! events, and returns a result tree mirroring the command tree.

pub mod command;
pub mod context;
pub mod engine;
pub mod foreach;
pub mod parallel;
pub mod process;
pub mod provider;
pub mod registry;
pub mod reporter;
pub mod serial;
pub mod shell;
pub mod signal;
pub mod tee;
#[cfg(test)]
pub(crate) mod testutil;
pub mod workdir;

// Re-export commonly used types
pub use command::{Command, CommandBase};
pub use context::RunContext;
pub use engine::Engine;
pub use foreach::{CwdStrategy, ForEachCommand, ForEachMode};
pub use parallel::ParallelCommand;
pub use process::ProcessCommand;
pub use provider::{
    DirItemsProvider, ItemsProvider, ProviderError, ProviderErrorKind, StaticItemsProvider,
};
pub use registry::ProcessRegistry;
pub use reporter::ChannelReporter;
pub use serial::SerialCommand;
pub use shell::shell_command;
pub use signal::SignalBroker;
pub use tee::{LastLine, LineScanner};
pub use workdir::CopyCwdCommand;
