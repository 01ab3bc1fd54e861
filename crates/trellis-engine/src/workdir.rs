//! Workspace relocation helper.

use crate::command::{Command, CommandBase};
use crate::context::RunContext;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use trellis_core::{CommandResult, EnvMap, EventKind, RunError, RunsOn};

/// Leaf that copies its effective working directory into a fresh
/// temporary directory and announces the copy as the batch's new
/// working directory.
///
/// Later siblings of the enclosing serial batch then run inside the
/// copy, and the batch removes it on completion, so destructive steps
/// can work on a throwaway workspace.
#[derive(Debug, Clone)]
pub struct CopyCwdCommand {
    base: CommandBase,
}

impl CopyCwdCommand {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            base: CommandBase::new(label),
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.base.cwd = cwd.into();
        self
    }

    pub fn with_runs_on(mut self, runs_on: RunsOn) -> Self {
        self.base.runs_on = runs_on;
        self
    }

    fn fail(&self, ctx: &RunContext, error: RunError) -> CommandResult {
        ctx.emit(
            &self.base.label,
            EventKind::Failed {
                exit_code: -1,
                message: error.to_string(),
            },
        );
        CommandResult::failed(&self.base.label, error)
    }
}

#[async_trait]
impl Command for CopyCwdCommand {
    fn label(&self) -> &str {
        &self.base.label
    }

    fn runs_on(&self) -> &RunsOn {
        &self.base.runs_on
    }

    fn set_cwd(&mut self, cwd: &Path, force: bool) {
        self.base.set_cwd(cwd, force);
    }

    fn inherit_env(&mut self, env: &EnvMap) {
        self.base.inherit_env(env);
    }

    fn boxed_clone(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    async fn run(&mut self, ctx: &RunContext) -> CommandResult {
        ctx.emit(&self.base.label, EventKind::Started);

        if ctx.is_cancelled() {
            return self.fail(ctx, RunError::Cancelled);
        }

        let source = if self.base.has_cwd() {
            self.base.cwd.clone()
        } else {
            match std::env::current_dir() {
                Ok(cwd) => cwd,
                Err(e) => {
                    return self.fail(
                        ctx,
                        RunError::Io {
                            details: e.to_string(),
                        },
                    )
                }
            }
        };
        if !source.is_dir() {
            return self.fail(
                ctx,
                RunError::CwdMissing {
                    path: source.display().to_string(),
                },
            );
        }

        let copied = tokio::task::spawn_blocking(move || copy_to_temp(&source))
            .await
            .map_err(|e| RunError::Io {
                details: e.to_string(),
            })
            .and_then(|copied| copied);

        match copied {
            Ok(workspace) => {
                let mut result = CommandResult::success(&self.base.label);
                result.new_cwd = Some(workspace);
                ctx.emit(&self.base.label, EventKind::Completed);
                result
            }
            Err(error) => self.fail(ctx, error),
        }
    }
}

/// Copy `source` recursively into a fresh temporary directory and
/// return the directory's path. The caller owns the copy's lifetime.
fn copy_to_temp(source: &Path) -> Result<PathBuf, RunError> {
    let temp = tempfile::Builder::new()
        .prefix("trellis-workspace-")
        .tempdir()
        .map_err(|e| RunError::Io {
            details: e.to_string(),
        })?;
    let workspace = temp.keep();

    if let Err(e) = copy_dir_recursive(source, &workspace) {
        let _ = std::fs::remove_dir_all(&workspace);
        return Err(RunError::Io {
            details: format!("failed to copy {}: {e}", source.display()),
        });
    }
    Ok(workspace)
}

fn copy_dir_recursive(source: &Path, target: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let destination = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            std::fs::create_dir(&destination)?;
            copy_dir_recursive(&entry.path(), &destination)?;
        } else {
            std::fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}
