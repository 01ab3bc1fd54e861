//! The command tree contract.

use crate::context::RunContext;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use trellis_core::{CommandResult, EnvMap, RunsOn};

/// One node of a command tree.
///
/// Trees are built by a loader, run once, and consumed in the process:
/// composites hand their children to worker tasks, so a tree is not
/// reusable across runs. Fresh runs clone the tree first (every command
/// is cloneable through [`boxed_clone`](Command::boxed_clone)).
#[async_trait]
pub trait Command: Send {
    fn label(&self) -> &str;

    fn runs_on(&self) -> &RunsOn;

    /// Adopt a working directory pushed down by the parent.
    ///
    /// With `force` the directory is overwritten unconditionally (used by
    /// workspace relocation within a serial batch). Without it, the
    /// command keeps an absolute directory of its own; an empty one is
    /// inherited and a relative one is resolved under the parent's.
    fn set_cwd(&mut self, cwd: &Path, force: bool);

    /// Merge the parent's environment under this command's own entries.
    fn inherit_env(&mut self, env: &EnvMap);

    fn boxed_clone(&self) -> Box<dyn Command>;

    /// Execute and produce this command's result node.
    async fn run(&mut self, ctx: &RunContext) -> CommandResult;
}

impl Clone for Box<dyn Command> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Fields and inheritance behavior shared by every command variant.
#[derive(Debug, Clone, Default)]
pub struct CommandBase {
    pub label: String,
    /// Working directory; empty means "inherit from the parent".
    pub cwd: PathBuf,
    pub env: EnvMap,
    pub runs_on: RunsOn,
}

impl CommandBase {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn has_cwd(&self) -> bool {
        !self.cwd.as_os_str().is_empty()
    }

    pub fn set_cwd(&mut self, cwd: &Path, force: bool) {
        if force {
            self.cwd = cwd.to_path_buf();
        } else if !self.has_cwd() {
            self.cwd = cwd.to_path_buf();
        } else if self.cwd.is_relative() && !cwd.as_os_str().is_empty() {
            self.cwd = cwd.join(&self.cwd);
        }
    }

    pub fn inherit_env(&mut self, env: &EnvMap) {
        for (key, value) in env {
            if !self.env.contains_key(key) {
                self.env.insert(key.clone(), value.clone());
            }
        }
    }
}
