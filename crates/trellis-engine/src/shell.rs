//! Platform default shell leaf.

use crate::process::ProcessCommand;

/// A process leaf running `command_line` through the platform's default
/// shell: `$SHELL` (falling back to `/bin/sh`) on Unix-like systems,
/// `%COMSPEC%` (falling back to `cmd.exe`) on Windows.
pub fn shell_command(
    label: impl Into<String>,
    command_line: impl Into<String>,
) -> ProcessCommand {
    let (path, switch) = default_shell();
    ProcessCommand::new(label, path, vec![switch.to_string(), command_line.into()])
}

#[cfg(unix)]
fn default_shell() -> (String, &'static str) {
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    (shell, "-c")
}

#[cfg(windows)]
fn default_shell() -> (String, &'static str) {
    let shell = std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string());
    (shell, "/C")
}
