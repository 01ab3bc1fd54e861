//! Domain types for Trellis.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Environment overlay for a command, merged onto the parent environment
/// with the command's own values winning. Insertion order is preserved so
/// overlays apply deterministically.
pub type EnvMap = IndexMap<String, String>;

/// Terminal classification of one executed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Success,
    Error,
    Skipped,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Policy deciding whether a command runs given its previous sibling's
/// outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunsOn {
    /// Run unless the previous sibling errored.
    #[default]
    Success,
    /// Run only if the previous sibling errored.
    Error,
    /// Run unconditionally.
    Always,
    /// Run only if the previous sibling's exit code is in the list.
    ExitCodes(Vec<i32>),
}

/// Rolling snapshot of the previous sibling's outcome, consulted by the
/// condition gate. A batch starts from `(Success, 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviousState {
    pub status: Status,
    pub exit_code: i32,
}

impl PreviousState {
    pub fn new(status: Status, exit_code: i32) -> Self {
        Self { status, exit_code }
    }
}

impl Default for PreviousState {
    fn default() -> Self {
        Self::new(Status::Success, 0)
    }
}

/// Ordered sequence of labels from the root command down to an emitter.
///
/// Paths are assembled by reporter wrapping: each composite prefixes its
/// own label onto events bubbling up from its children, so emitters never
/// need to know their ancestry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandPath(Vec<String>);

impl CommandPath {
    pub fn new(label: impl Into<String>) -> Self {
        Self(vec![label.into()])
    }

    /// A copy of this path with `label` prepended.
    pub fn prefixed(&self, label: &str) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.push(label.to_string());
        segments.extend(self.0.iter().cloned());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for CommandPath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl std::fmt::Display for CommandPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_state_starts_successful() {
        let state = PreviousState::default();
        assert_eq!(state.status, Status::Success);
        assert_eq!(state.exit_code, 0);
    }

    #[test]
    fn path_prefixing_builds_root_to_leaf_order() {
        let path = CommandPath::new("leaf").prefixed("mid").prefixed("root");
        assert_eq!(path.to_string(), "root/mid/leaf");
    }

    #[test]
    fn runs_on_defaults_to_success() {
        assert_eq!(RunsOn::default(), RunsOn::Success);
    }
}
