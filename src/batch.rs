//! Named command sequences.
//!
//! [`GitCommand`] is the single description type for every mutation the tool
//! performs. [`run_batch`] executes a list of them in order.

use colored::Colorize;

use crate::{
    error::{Error, Result},
    git::{CommandOutput, CommandRunner, display_command},
};

/// Exit status `git commit` uses for "nothing to commit".
const NOTHING_TO_COMMIT_STATUS: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommand {
    pub program: String,
    pub args: Vec<String>,
    pub description: String,
}

impl GitCommand {
    pub fn new<I, S>(program: &str, args: I, description: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            description: description.into(),
        }
    }

    pub fn git<I, S>(args: I, description: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new("git", args, description)
    }

    pub fn add(pattern: &str) -> Self {
        Self::git(["add", "--", pattern], format!("Staging '{pattern}'"))
    }

    pub fn commit(message: &str) -> Self {
        Self::git(["commit", "-m", message], "Committing changes")
    }

    pub fn push(branch: &str) -> Self {
        Self::git(["push", "origin", branch], format!("Pushing '{branch}'"))
    }

    pub fn push_set_upstream(branch: &str) -> Self {
        Self::git(
            ["push", "--set-upstream", "origin", branch],
            format!("Publishing '{branch}' with upstream tracking"),
        )
    }

    pub fn checkout_new(branch: &str) -> Self {
        Self::git(
            ["checkout", "-b", branch],
            format!("Creating branch '{branch}'"),
        )
    }

    pub fn checkout_tracking(branch: &str) -> Self {
        Self::git(
            [
                "checkout".to_string(),
                "-b".to_string(),
                branch.to_string(),
                "--track".to_string(),
                format!("origin/{branch}"),
            ],
            format!("Checking out '{branch}' from origin"),
        )
    }

    pub fn fetch(branch: &str) -> Self {
        Self::git(
            ["fetch", "origin", branch],
            format!("Fetching '{branch}' from origin"),
        )
    }

    pub fn reset_hard(target: Option<&str>) -> Self {
        match target {
            Some(target) => Self::git(
                ["reset", "--hard", target],
                format!("Resetting to '{target}'"),
            ),
            None => Self::git(["reset", "--hard"], "Discarding working tree changes"),
        }
    }

    pub fn stash_push() -> Self {
        Self::git(
            ["stash", "push", "--include-untracked"],
            "Stashing local changes",
        )
    }

    pub fn stash_apply() -> Self {
        Self::git(["stash", "apply"], "Re-applying stashed changes")
    }

    pub fn stash_drop() -> Self {
        Self::git(["stash", "drop"], "Dropping stash entry")
    }

    pub fn config(key: &str, value: &str) -> Self {
        Self::git(["config", key, value], format!("Setting {key}"))
    }

    /// One of the four tag shapes: annotated when `message` is set, pointed
    /// at `commit` when resolved, otherwise at HEAD.
    pub fn tag(name: &str, message: Option<&str>, commit: Option<&str>, force: bool) -> Self {
        let mut args = vec!["tag".to_string()];
        if force {
            args.push("-f".to_string());
        }
        if let Some(message) = message {
            args.extend(["-a".to_string(), "-m".to_string(), message.to_string()]);
        }
        args.push(name.to_string());
        if let Some(commit) = commit {
            args.push(commit.to_string());
        }
        let kind = if message.is_some() {
            "annotated"
        } else {
            "lightweight"
        };
        let target = commit.unwrap_or("HEAD");
        Self::git(args, format!("Creating {kind} tag '{name}' at {target}"))
    }

    pub fn push_tag(name: &str, force: bool) -> Self {
        let mut args = vec!["push".to_string()];
        if force {
            args.push("--force".to_string());
        }
        args.extend(["origin".to_string(), format!("refs/tags/{name}")]);
        Self::git(args, format!("Pushing tag '{name}'"))
    }

    pub fn delete_tag(name: &str) -> Self {
        Self::git(["tag", "-d", name], format!("Deleting local tag '{name}'"))
    }

    pub fn delete_remote_tag(name: &str) -> Self {
        Self::git(
            [
                "push".to_string(),
                "origin".to_string(),
                "--delete".to_string(),
                format!("refs/tags/{name}"),
            ],
            format!("Deleting remote tag '{name}'"),
        )
    }

    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    pub fn display(&self) -> String {
        display_command(&self.program, &self.arg_refs())
    }

    fn arg_refs(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }

    /// Run this single command, wrapping failures with its description.
    pub fn output(&self, runner: &impl CommandRunner) -> Result<CommandOutput> {
        runner
            .run(&self.program, &self.arg_refs())
            .map_err(|source| Error::command(&self.description, source))
    }

    /// Like [`GitCommand::output`], keeping only the trimmed stdout.
    pub fn run(&self, runner: &impl CommandRunner) -> Result<String> {
        self.output(runner).map(|out| out.stdout().to_string())
    }
}

/// Run one command with a progress line, returning its trimmed stdout.
pub fn run_step(runner: &impl CommandRunner, command: &GitCommand) -> Result<String> {
    println!("{} {}", "→".blue(), command.description);
    match command.run(runner) {
        Ok(stdout) => {
            println!("{} {}", "✓".green(), command.description);
            Ok(stdout)
        }
        Err(error) => {
            println!("{} {}", "✗".red(), command.description);
            Err(error)
        }
    }
}

/// Run `commands` in order, printing a progress line for each.
///
/// Stops at the first failure, except that a `commit` exiting with status 1
/// means the tree was clean and the batch moves on.
pub fn run_batch(runner: &impl CommandRunner, commands: &[GitCommand]) -> Result<()> {
    for command in commands {
        println!("{} {}", "→".blue(), command.description);
        match runner.run(&command.program, &command.arg_refs()) {
            Ok(_) => {
                println!("{} {}", "✓".green(), command.description);
            }
            Err(source)
                if command.subcommand() == Some("commit")
                    && source.exit_code() == Some(NOTHING_TO_COMMIT_STATUS) =>
            {
                tracing::info!("Nothing to commit, continuing");
                println!("{} {} (nothing to commit)", "↷".yellow(), command.description);
            }
            Err(source) => {
                println!("{} {}", "✗".red(), command.description);
                return Err(Error::command(&command.description, source));
            }
        }
    }
    Ok(())
}
