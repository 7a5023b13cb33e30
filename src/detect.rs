//! Decides whether there is anything worth committing.

use crate::{
    error::{Error, Result},
    git::CommandRunner,
};

/// The two independent signals behind an emptiness verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeReport {
    /// `status --porcelain` listed something.
    pub local_changes: bool,
    /// `compare` differs from `origin/<base>`, or the diff could not be
    /// computed (a new branch with no merge base counts as different).
    pub branch_differences: bool,
}

impl ChangeReport {
    pub fn is_empty(&self) -> bool {
        !self.local_changes && !self.branch_differences
    }
}

pub fn inspect(runner: &impl CommandRunner, base: &str, compare: &str) -> Result<ChangeReport> {
    let local_changes = !runner
        .git(&["status", "--porcelain"])
        .map_err(|source| Error::command("Checking working tree status", source))?
        .is_empty();

    let base_ref = format!("origin/{base}");
    let branch_differences = match runner.git(&["diff", "--name-only", &base_ref, compare]) {
        Ok(out) => !out.is_empty(),
        Err(error) => {
            tracing::debug!(
                "Diff {}..{} failed, treating branch as changed: {}",
                base_ref,
                compare,
                error
            );
            true
        }
    };

    let report = ChangeReport {
        local_changes,
        branch_differences,
    };
    tracing::debug!(?report, "Change detection");
    Ok(report)
}

/// True when neither the working tree nor the branch carries changes.
///
/// Whether an empty result skips publishing is the caller's decision.
pub fn is_empty(runner: &impl CommandRunner, base: &str, compare: &str) -> Result<bool> {
    inspect(runner, base, compare).map(|report| report.is_empty())
}
