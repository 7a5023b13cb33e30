use crate::{
    batch::{GitCommand, run_batch},
    config::{TagAction, TagConfig},
    error::{Error, Result},
    git::CommandRunner,
    retry::{CancelToken, RetryPolicy, with_retry},
};

/// Resolve `reference` (branch, tag or SHA) to the commit it points at.
///
/// An empty reference resolves to `None`, meaning "tag HEAD".
pub fn resolve(runner: &impl CommandRunner, reference: &str) -> Result<Option<String>> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Ok(None);
    }
    runner
        .git(&["rev-parse", "--verify", reference])
        .map_err(|source| Error::command(format!("Verifying reference '{reference}'"), source))?;
    let sha = runner
        .git(&["rev-list", "-n", "1", reference])
        .map_err(|source| Error::command(format!("Resolving reference '{reference}'"), source))?
        .stdout()
        .to_string();
    tracing::debug!("Resolved '{}' to {}", reference, sha);
    Ok(Some(sha))
}

/// Commit the local tag `name` peels to, if the tag exists.
fn local_tag_target(runner: &impl CommandRunner, name: &str) -> Result<Option<String>> {
    let peeled = format!("refs/tags/{name}^{{commit}}");
    match runner.git(&["rev-parse", "--verify", "--quiet", &peeled]) {
        Ok(out) => Ok(Some(out.stdout().to_string())),
        Err(error) if error.exit_code() == Some(1) => Ok(None),
        Err(error) => Err(Error::command(format!("Checking local tag '{name}'"), error)),
    }
}

fn remote_tag_exists(runner: &impl CommandRunner, name: &str) -> Result<bool> {
    let refname = format!("refs/tags/{name}");
    match runner.git(&["ls-remote", "--exit-code", "--tags", "origin", &refname]) {
        Ok(_) => Ok(true),
        Err(error) if error.exit_code() == Some(2) => Ok(false),
        Err(error) => Err(Error::command(format!("Checking remote tag '{name}'"), error)),
    }
}

/// Create `name` at `reference` (HEAD when empty) and push it. A local tag
/// already at the target is left alone, so a retry after a failed push goes
/// straight to the push.
fn create_tag(
    runner: &impl CommandRunner,
    name: &str,
    message: Option<&str>,
    reference: &str,
    force: bool,
) -> Result<()> {
    let commit = resolve(runner, reference)?;
    let target = match &commit {
        Some(sha) => sha.clone(),
        None => runner
            .git(&["rev-parse", "HEAD"])
            .map_err(|source| Error::command("Reading HEAD", source))?
            .stdout()
            .to_string(),
    };

    let mut steps = Vec::new();
    if local_tag_target(runner, name)?.as_deref() == Some(target.as_str()) {
        tracing::info!("Tag '{}' already points at {}, only pushing", name, target);
    } else {
        steps.push(GitCommand::tag(name, message, commit.as_deref(), force));
    }
    steps.push(GitCommand::push_tag(name, force));
    run_batch(runner, &steps)
}

/// Delete `name` locally and on `origin`, skipping whichever side no longer
/// has it.
fn delete_tag(runner: &impl CommandRunner, name: &str) -> Result<()> {
    let mut steps = Vec::new();
    if local_tag_target(runner, name)?.is_some() {
        steps.push(GitCommand::delete_tag(name));
    } else {
        tracing::info!("Tag '{}' is not present locally", name);
    }
    if remote_tag_exists(runner, name)? {
        steps.push(GitCommand::delete_remote_tag(name));
    } else {
        tracing::info!("Tag '{}' is not present on origin", name);
    }
    run_batch(runner, &steps)
}

/// Create or delete the configured tag locally and on `origin`.
pub fn handle_tag(
    runner: &impl CommandRunner,
    token: &CancelToken,
    policy: RetryPolicy,
    tag: &TagConfig,
) -> Result<()> {
    with_retry(token, policy, |attempt| {
        tracing::debug!(attempt, "Tag attempt");
        match &tag.action {
            TagAction::Create {
                message,
                reference,
                force,
            } => create_tag(runner, &tag.name, message.as_deref(), reference, *force),
            TagAction::Delete => delete_tag(runner, &tag.name),
        }
    })
}
