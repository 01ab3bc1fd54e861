//! Sibling condition gating.
//!
//! A pure decision over the previous sibling's outcome and the command's
//! `runs-on` policy. The caller (a composite) turns `Skip`/`SkipOnError`
//! into synthetic skipped result nodes without invoking the command.

use crate::domain::{PreviousState, RunsOn, Status};

/// Outcome of consulting the gate for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Proceed normally.
    Run,
    /// Do not run; the policy disagrees with the previous state.
    Skip,
    /// Do not run; a previous sibling failed and this command only runs
    /// on success.
    SkipOnError,
}

/// Decide whether a command with the given policy runs after `previous`.
pub fn evaluate_gate(runs_on: &RunsOn, previous: &PreviousState) -> GateDecision {
    match runs_on {
        RunsOn::Success => match previous.status {
            Status::Success | Status::Skipped => GateDecision::Run,
            Status::Error => GateDecision::SkipOnError,
        },
        RunsOn::Error => match previous.status {
            Status::Error => GateDecision::Run,
            Status::Success | Status::Skipped => GateDecision::Skip,
        },
        RunsOn::Always => GateDecision::Run,
        RunsOn::ExitCodes(codes) => {
            if codes.contains(&previous.exit_code) {
                GateDecision::Run
            } else {
                GateDecision::Skip
            }
        }
    }
}
