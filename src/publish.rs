use colored::Colorize;

use crate::{
    batch::{GitCommand, run_batch},
    config::Identity,
    error::{Error, Result},
    git::CommandRunner,
};

/// Set the commit identity for this repository.
pub fn configure_identity(runner: &impl CommandRunner, identity: &Identity) -> Result<()> {
    run_batch(
        runner,
        &[
            GitCommand::config("user.name", &identity.name),
            GitCommand::config("user.email", &identity.email),
        ],
    )
}

/// Stage each pattern independently, then commit and push `branch`.
///
/// A pattern that fails to stage (for example one matching no files) is
/// logged and skipped; patterns already staged stay staged. A clean tree is
/// not an error: the commit is skipped and the push still runs.
pub fn publish(
    runner: &impl CommandRunner,
    patterns: &[String],
    message: &str,
    branch: &str,
) -> Result<()> {
    for pattern in patterns {
        let add = GitCommand::add(pattern);
        match add.run(runner) {
            Ok(_) => println!("{} {}", "✓".green(), add.description),
            Err(error) => {
                println!("{} {}", "✗".red(), add.description);
                tracing::warn!("Could not stage '{}', continuing: {}", pattern, error);
            }
        }
    }
    run_batch(
        runner,
        &[GitCommand::commit(message), GitCommand::push(branch)],
    )
}

/// SHA of HEAD after publishing.
pub fn head_sha(runner: &impl CommandRunner) -> Result<String> {
    Ok(runner
        .git(&["rev-parse", "HEAD"])
        .map_err(|source| Error::command("Reading HEAD", source))?
        .stdout()
        .to_string())
}
