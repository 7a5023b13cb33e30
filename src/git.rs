use std::{
    fmt, io,
    path::{Path, PathBuf},
    process::Command,
    time::Instant,
};

use crate::stats::record_command;

/// Captured result of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Trimmed stdout.
    pub fn stdout(&self) -> &str {
        self.stdout.trim()
    }

    pub fn is_empty(&self) -> bool {
        self.stdout().is_empty()
    }

    pub fn combined(&self) -> String {
        combine(&self.stdout, &self.stderr)
    }
}

#[derive(Debug)]
pub enum CommandError {
    /// The process could not be started at all.
    Spawn { command: String, source: io::Error },
    /// The process ran and exited unsuccessfully. `code` is `None` when it
    /// was killed by a signal.
    Exit {
        command: String,
        code: Option<i32>,
        output: String,
    },
}

impl CommandError {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exit { code, .. } => *code,
            Self::Spawn { .. } => None,
        }
    }

    pub fn output(&self) -> &str {
        match self {
            Self::Exit { output, .. } => output,
            Self::Spawn { .. } => "",
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { command, source } => write!(f, "failed to run `{command}`: {source}"),
            Self::Exit {
                command,
                code,
                output,
            } => {
                match code {
                    Some(code) => write!(f, "`{command}` exited with status {code}")?,
                    None => write!(f, "`{command}` was terminated by a signal")?,
                }
                let output = output.trim();
                if !output.is_empty() {
                    write!(f, ": {output}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            Self::Exit { .. } => None,
        }
    }
}

/// Executes external programs inside a fixed working directory.
///
/// Every component takes a runner instead of changing the process-wide
/// current directory, so the checkout location is always explicit.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError>;

    /// Directory the commands execute in; relative paths resolve against it.
    fn workdir(&self) -> &Path;

    fn git(&self, args: &[&str]) -> Result<CommandOutput, CommandError> {
        self.run("git", args)
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        (**self).run(program, args)
    }

    fn workdir(&self) -> &Path {
        (**self).workdir()
    }
}

/// Spawns real processes with arguments passed as a vector (no shell).
#[derive(Debug, Clone)]
pub struct SystemRunner {
    workdir: PathBuf,
}

impl SystemRunner {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let command = display_command(program, args);
        tracing::debug!("Running `{}` in {}", command, self.workdir.display());
        let start = Instant::now();
        let out = Command::new(program)
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(|source| CommandError::Spawn {
                command: command.clone(),
                source,
            })?;
        record_command(program, args, start.elapsed(), out.status.success());

        let stdout = String::from_utf8_lossy(&out.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
        if !out.status.success() {
            return Err(CommandError::Exit {
                command,
                code: out.status.code(),
                output: combine(&stdout, &stderr),
            });
        }
        Ok(CommandOutput { stdout, stderr })
    }

    fn workdir(&self) -> &Path {
        &self.workdir
    }
}

/// Git subcommands that never mutate the repository or the remote.
const READ_ONLY_GIT: &[&str] = &[
    "status", "rev-parse", "ls-remote", "diff", "rev-list", "log", "show-ref", "remote",
];

/// Passes read-only git queries through and reports everything else as a
/// successful no-op.
#[derive(Debug, Clone)]
pub struct DryRunRunner<R> {
    inner: R,
}

impl<R: CommandRunner> DryRunRunner<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: CommandRunner> CommandRunner for DryRunRunner<R> {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let read_only = program == "git"
            && args
                .first()
                .is_some_and(|subcommand| READ_ONLY_GIT.contains(subcommand));
        if read_only {
            return self.inner.run(program, args);
        }
        tracing::info!("[dry-run] {}", display_command(program, args));
        Ok(CommandOutput::default())
    }

    fn workdir(&self) -> &Path {
        self.inner.workdir()
    }
}

pub(crate) fn display_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

fn combine(stdout: &str, stderr: &str) -> String {
    match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (_, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) => format!("{stdout}\n{stderr}"),
    }
}

/// Name of the currently checked out branch.
pub fn current_branch(runner: &impl CommandRunner) -> Result<String, CommandError> {
    Ok(runner
        .git(&["rev-parse", "--abbrev-ref", "HEAD"])?
        .stdout()
        .to_string())
}

/// URL of the `origin` remote.
pub fn origin_url(runner: &impl CommandRunner) -> Result<String, CommandError> {
    Ok(runner
        .git(&["remote", "get-url", "origin"])?
        .stdout()
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRunner, init_repo};

    #[test]
    fn system_runner_captures_stdout_in_workdir() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let runner = SystemRunner::new(dir.path());
        let out = runner.git(&["rev-parse", "--is-inside-work-tree"]).unwrap();
        assert_eq!(out.stdout(), "true");
    }

    #[test]
    fn system_runner_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let runner = SystemRunner::new(dir.path());
        let err = runner
            .git(&["rev-parse", "--verify", "--quiet", "refs/heads/missing"])
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
        assert!(err.to_string().contains("git rev-parse --verify"));
    }

    #[test]
    fn system_runner_reports_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemRunner::new(dir.path());
        let err = runner
            .run("definitely-not-a-real-binary-xyz", &[])
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
        assert_eq!(err.exit_code(), None);
    }

    #[test]
    fn arguments_are_not_shell_interpreted() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemRunner::new(dir.path());
        let out = runner.run("echo", &["$(whoami); ls"]).unwrap();
        assert_eq!(out.stdout(), "$(whoami); ls");
    }

    #[test]
    fn dry_run_skips_mutations_but_forwards_queries() {
        let fake = FakeRunner::new(|_| Ok(CommandOutput::new("abc\n", "")));
        let runner = DryRunRunner::new(&fake);

        let out = runner.git(&["rev-parse", "HEAD"]).unwrap();
        assert_eq!(out.stdout(), "abc");
        let out = runner.git(&["push", "origin", "main"]).unwrap();
        assert!(out.is_empty());

        assert_eq!(fake.executed_args(), vec![vec!["rev-parse", "HEAD"]]);
    }

    #[test]
    fn combined_output_joins_streams() {
        let out = CommandOutput::new("out\n", "err\n");
        assert_eq!(out.combined(), "out\n\nerr\n");
        assert_eq!(CommandOutput::new("", "err").combined(), "err");
    }
}
