//! The retried commit workflow: validate, reconcile, detect, publish.

use chrono::{DateTime, Utc};

use crate::{
    config::{EmptyPolicy, PrSource, WorkflowConfig},
    detect,
    error::{Error, Result},
    git::CommandRunner,
    publish,
    reconcile::{self, ReconcileOutcome},
    retry::{CancelToken, with_retry},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// Nothing changed and empty runs are skipped.
    Skipped { branch: String },
    Published {
        branch: String,
        sha: String,
        reconcile: ReconcileOutcome,
    },
}

/// Branch the commit lands on. Auto-branch names are derived from `now` so a
/// run computes it once and every retry reuses it.
pub fn head_branch(cfg: &WorkflowConfig, now: DateTime<Utc>) -> String {
    match cfg.pull_request().map(|pr| pr.source) {
        Some(PrSource::AutoBranch { .. }) => {
            format!("{}-{}", cfg.branch, now.format("%Y%m%d%H%M%S"))
        }
        _ => cfg.branch.clone(),
    }
}

/// Run the whole workflow under `token`, retrying failed attempts.
pub fn run(
    runner: &impl CommandRunner,
    cfg: &WorkflowConfig,
    token: &CancelToken,
) -> Result<WorkflowOutcome> {
    let branch = head_branch(cfg, Utc::now());
    with_retry(token, cfg.retry, |attempt| {
        tracing::info!(
            attempt,
            max_attempts = cfg.retry.max_attempts,
            "Running workflow on '{}'",
            branch
        );
        attempt_once(runner, cfg, &branch)
    })
}

fn attempt_once(
    runner: &impl CommandRunner,
    cfg: &WorkflowConfig,
    branch: &str,
) -> Result<WorkflowOutcome> {
    runner
        .git(&["rev-parse", "--is-inside-work-tree"])
        .map_err(|source| {
            Error::command(
                format!("Validating repository at {}", runner.workdir().display()),
                source,
            )
        })?;
    publish::configure_identity(runner, &cfg.identity)?;

    let reconcile = reconcile::reconcile(runner, branch)?;
    if let ReconcileOutcome::ConflictDiscarded { discarded } = &reconcile {
        tracing::warn!(
            "{} local file(s) were discarded because they conflicted with origin/{}",
            discarded.len(),
            branch
        );
    }

    if detect::is_empty(runner, &cfg.base_branch, branch)? {
        match cfg.empty_policy {
            EmptyPolicy::Skip => {
                tracing::info!("No changes detected, skipping");
                return Ok(WorkflowOutcome::Skipped {
                    branch: branch.to_string(),
                });
            }
            EmptyPolicy::Proceed => tracing::info!("No changes detected, publishing anyway"),
        }
    }

    publish::publish(runner, &cfg.file_patterns, &cfg.commit_message, branch)?;
    let sha = publish::head_sha(runner)?;
    Ok(WorkflowOutcome::Published {
        branch: branch.to_string(),
        sha,
        reconcile,
    })
}
