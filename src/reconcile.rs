//! Moves the working tree onto the target branch without losing local work.
//!
//! The branch's existence is probed locally and on `origin` on every call:
//!
//! | local | remote | action                                   |
//! |-------|--------|------------------------------------------|
//! | no    | no     | create locally, push with upstream        |
//! | no    | yes    | preserve local changes, check out remote  |
//! | yes   | any    | nothing; the branch is already usable     |
//!
//! Preserving local changes means: back up the bytes of every modified or
//! untracked file, stash everything, check out and hard-reset to the remote
//! tip, then re-apply the stash and rewrite the backups.
//!
//! When re-applying the stash conflicts with the remote tip, the remote wins:
//! the partial apply is hard-reset away, the stash entry is dropped, and the
//! local edits are lost. The discarded paths are reported in
//! [`ReconcileOutcome::ConflictDiscarded`] and logged as a warning, but their
//! backed-up contents are not written back.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    batch::{GitCommand, run_batch, run_step},
    error::{Error, Result},
    git::CommandRunner,
};

/// Marker git prints when `stash apply` hits a merge conflict.
const CONFLICT_MARKER: &str = "CONFLICT";

/// Reply from `stash push` when there was nothing to stash.
const NOTHING_TO_STASH: &str = "No local changes to save";

/// Where the target branch exists, derived fresh on each call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    NoBranch,
    LocalOnly,
    RemoteOnly,
    LocalAndRemote,
}

impl BranchState {
    pub fn from_existence(local: bool, remote: bool) -> Self {
        match (local, remote) {
            (false, false) => Self::NoBranch,
            (true, false) => Self::LocalOnly,
            (false, true) => Self::RemoteOnly,
            (true, true) => Self::LocalAndRemote,
        }
    }
}

/// Contents of one working-tree file captured before a destructive checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBackup {
    /// Relative to the repository root.
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The branch did not exist anywhere and was created from HEAD.
    Created,
    /// The branch already existed locally.
    AlreadyPresent(BranchState),
    /// The remote branch was checked out and `restored` files rewritten.
    CheckedOut { restored: usize },
    /// The stash conflicted with the remote tip; these local edits are gone.
    ConflictDiscarded { discarded: Vec<PathBuf> },
}

/// One entry from `git status --porcelain -z`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub code: [u8; 2],
    pub path: PathBuf,
}

impl StatusEntry {
    pub fn is_deleted(&self) -> bool {
        self.code.contains(&b'D')
    }
}

/// Parse NUL-separated porcelain v1 status. Rename and copy entries carry an
/// extra field with the source path, which is skipped.
pub fn parse_porcelain_z(raw: &str) -> Vec<StatusEntry> {
    let mut entries = Vec::new();
    let mut fields = raw.split('\0').filter(|f| !f.is_empty());
    while let Some(field) = fields.next() {
        let bytes = field.as_bytes();
        if bytes.len() < 4 {
            continue;
        }
        let code = [bytes[0], bytes[1]];
        entries.push(StatusEntry {
            code,
            path: PathBuf::from(&field[3..]),
        });
        if matches!(code[0], b'R' | b'C') {
            fields.next();
        }
    }
    entries
}

fn local_branch_exists(runner: &impl CommandRunner, branch: &str) -> Result<bool> {
    let refname = format!("refs/heads/{branch}");
    match runner.git(&["rev-parse", "--verify", "--quiet", &refname]) {
        Ok(_) => Ok(true),
        Err(error) if error.exit_code() == Some(1) => Ok(false),
        Err(error) => Err(Error::command(
            format!("Checking local branch '{branch}'"),
            error,
        )),
    }
}

fn remote_branch_exists(runner: &impl CommandRunner, branch: &str) -> Result<bool> {
    match runner.git(&["ls-remote", "--exit-code", "--heads", "origin", branch]) {
        Ok(_) => Ok(true),
        Err(error) if error.exit_code() == Some(2) => Ok(false),
        Err(error) => Err(Error::command(
            format!("Checking remote branch '{branch}'"),
            error,
        )),
    }
}

pub fn branch_state(runner: &impl CommandRunner, branch: &str) -> Result<BranchState> {
    let local = local_branch_exists(runner, branch)?;
    let remote = remote_branch_exists(runner, branch)?;
    Ok(BranchState::from_existence(local, remote))
}

/// Get the working tree onto `branch`.
pub fn reconcile(runner: &impl CommandRunner, branch: &str) -> Result<ReconcileOutcome> {
    let state = branch_state(runner, branch)?;
    tracing::info!(?state, "Reconciling branch '{}'", branch);
    match state {
        BranchState::NoBranch => {
            run_batch(
                runner,
                &[
                    GitCommand::checkout_new(branch),
                    GitCommand::push_set_upstream(branch),
                ],
            )?;
            Ok(ReconcileOutcome::Created)
        }
        BranchState::RemoteOnly => preserve_and_checkout(runner, branch),
        BranchState::LocalOnly | BranchState::LocalAndRemote => {
            tracing::debug!("Branch '{}' already usable", branch);
            Ok(ReconcileOutcome::AlreadyPresent(state))
        }
    }
}

/// Top level of the work tree. Porcelain paths are relative to it, whatever
/// directory the runner sits in.
pub fn repo_root(runner: &impl CommandRunner) -> Result<PathBuf> {
    let out = runner
        .git(&["rev-parse", "--show-toplevel"])
        .map_err(|source| Error::command("Locating repository root", source))?;
    Ok(PathBuf::from(out.stdout()))
}

/// Snapshot modified and untracked files under `root`. Deleted paths are
/// never captured, so a restore cannot resurrect them.
pub fn backup_changes(runner: &impl CommandRunner, root: &Path) -> Result<Vec<FileBackup>> {
    let status = runner
        .git(&["status", "--porcelain", "-z", "--untracked-files=all"])
        .map_err(|source| Error::command("Snapshotting working tree status", source))?;

    let mut backups = Vec::new();
    for entry in parse_porcelain_z(&status.stdout) {
        if entry.is_deleted() {
            continue;
        }
        let full = root.join(&entry.path);
        let metadata = fs::symlink_metadata(&full).map_err(|source| Error::Io {
            operation: "inspecting",
            path: entry.path.clone(),
            source,
        })?;
        if !metadata.is_file() {
            tracing::debug!("Not backing up non-regular file {}", entry.path.display());
            continue;
        }
        let contents = fs::read(&full).map_err(|source| Error::Io {
            operation: "reading",
            path: entry.path.clone(),
            source,
        })?;
        backups.push(FileBackup {
            path: entry.path,
            contents,
        });
    }
    tracing::debug!("Backed up {} file(s)", backups.len());
    Ok(backups)
}

/// Write every backup back under `root` verbatim, creating parent
/// directories.
pub fn restore_backups(root: &Path, backups: &[FileBackup]) -> Result<()> {
    for backup in backups {
        let full = root.join(&backup.path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Io {
                operation: "creating directory for",
                path: backup.path.clone(),
                source,
            })?;
        }
        fs::write(&full, &backup.contents).map_err(|source| Error::Io {
            operation: "restoring",
            path: backup.path.clone(),
            source,
        })?;
    }
    Ok(())
}

fn preserve_and_checkout(runner: &impl CommandRunner, branch: &str) -> Result<ReconcileOutcome> {
    let root = repo_root(runner)?;
    let backups = backup_changes(runner, &root)?;

    let stashed = if backups.is_empty() && !has_status(runner)? {
        false
    } else {
        let stash = GitCommand::stash_push();
        let out = stash.output(runner)?;
        tracing::info!("{}", stash.description);
        !out.combined().contains(NOTHING_TO_STASH)
    };

    let remote_tip = format!("origin/{branch}");
    let checkout = run_batch(
        runner,
        &[
            GitCommand::fetch(branch),
            GitCommand::checkout_tracking(branch),
            GitCommand::reset_hard(Some(&remote_tip)),
        ],
    );
    if let Err(error) = checkout {
        return Err(if stashed {
            put_back_after_failure(&root, &backups, error)
        } else {
            error
        });
    }

    if !stashed {
        return Ok(ReconcileOutcome::CheckedOut { restored: 0 });
    }

    match GitCommand::stash_apply().run(runner) {
        Ok(_) => {
            run_step(runner, &GitCommand::stash_drop())?;
            restore_backups(&root, &backups)?;
            tracing::info!("Restored {} local file(s) onto '{}'", backups.len(), branch);
            Ok(ReconcileOutcome::CheckedOut {
                restored: backups.len(),
            })
        }
        Err(Error::Command { source, .. }) if source.output().contains(CONFLICT_MARKER) => {
            let discarded: Vec<PathBuf> = backups.into_iter().map(|b| b.path).collect();
            tracing::warn!(
                "Local changes conflict with '{}'; discarding them in favour of the remote: {:?}",
                remote_tip,
                discarded
            );
            run_batch(
                runner,
                &[GitCommand::reset_hard(None), GitCommand::stash_drop()],
            )?;
            Ok(ReconcileOutcome::ConflictDiscarded { discarded })
        }
        Err(error) => Err(put_back_after_failure(&root, &backups, error)),
    }
}

/// Rewrite the backed-up files after a failure that left them only in the
/// stash, so the next attempt still publishes them. The stash entry stays.
fn put_back_after_failure(root: &Path, backups: &[FileBackup], error: Error) -> Error {
    tracing::warn!(
        "Reconciliation failed after stashing; rewriting {} local file(s), stash entry kept",
        backups.len()
    );
    if let Err(restore_error) = restore_backups(root, backups) {
        tracing::error!("Could not rewrite local files: {}", restore_error);
    }
    error
}

/// Whether status reports anything, including entries that were not backed
/// up (deletions, non-regular files).
fn has_status(runner: &impl CommandRunner) -> Result<bool> {
    Ok(!runner
        .git(&["status", "--porcelain"])
        .map_err(|source| Error::command("Checking working tree status", source))?
        .is_empty())
}
