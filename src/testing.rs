//! Test doubles and scratch-repository fixtures.

use std::{
    cell::RefCell,
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use crate::git::{CommandError, CommandOutput, CommandRunner};

/// A command observed by [`FakeRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ExecutedCommand {
    pub fn args(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }

    /// True when the args start with `prefix`.
    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        self.args.len() >= prefix.len() && self.args.iter().zip(prefix).all(|(a, p)| a == p)
    }
}

type Responder = Box<dyn Fn(&ExecutedCommand) -> Result<CommandOutput, CommandError>>;

/// Records every command and answers from a scripted responder.
pub struct FakeRunner {
    workdir: PathBuf,
    executed: RefCell<Vec<ExecutedCommand>>,
    responder: Responder,
}

impl FakeRunner {
    pub fn new(
        responder: impl Fn(&ExecutedCommand) -> Result<CommandOutput, CommandError> + 'static,
    ) -> Self {
        Self {
            workdir: PathBuf::from("."),
            executed: RefCell::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    pub fn executed(&self) -> Vec<ExecutedCommand> {
        self.executed.borrow().clone()
    }

    pub fn executed_args(&self) -> Vec<Vec<String>> {
        self.executed
            .borrow()
            .iter()
            .map(|c| c.args.clone())
            .collect()
    }

    pub fn ran(&self, prefix: &[&str]) -> bool {
        self.executed.borrow().iter().any(|c| c.starts_with(prefix))
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let command = ExecutedCommand {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        };
        self.executed.borrow_mut().push(command.clone());
        (self.responder)(&command)
    }

    fn workdir(&self) -> &Path {
        &self.workdir
    }
}

/// Shorthand for a failed exit in scripted responses.
pub fn exit_error(command: &ExecutedCommand, code: i32, output: &str) -> CommandError {
    CommandError::Exit {
        command: format!("{} {}", command.program, command.args.join(" ")),
        code: Some(code),
        output: output.to_string(),
    }
}

/// Run git in `dir`, panicking on failure; returns trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .expect("git command to run");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

pub fn write(dir: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

fn configure_identity(dir: &Path) {
    git(dir, &["config", "user.email", "ci@example.com"]);
    git(dir, &["config", "user.name", "CI"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    git(dir, &["config", "tag.gpgsign", "false"]);
}

/// Initialise a repository on `main` with one commit containing `a.txt`.
pub fn init_repo(dir: &Path) {
    git(dir, &["init", "-b", "main"]);
    configure_identity(dir);
    write(dir, "a.txt", "base\n");
    git(dir, &["add", "a.txt"]);
    git(dir, &["commit", "-m", "init"]);
}

/// A bare `origin` with a cloned working copy, both seeded from `main`.
pub struct RemoteFixture {
    _root: tempfile::TempDir,
    pub remote: PathBuf,
    pub work: PathBuf,
}

impl RemoteFixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let seed = root.path().join("seed");
        let remote = root.path().join("remote.git");
        let work = root.path().join("work");
        fs::create_dir_all(&seed).unwrap();

        init_repo(&seed);
        git(
            root.path(),
            &["clone", "--bare", seed.to_str().unwrap(), remote.to_str().unwrap()],
        );
        git(
            root.path(),
            &["clone", remote.to_str().unwrap(), work.to_str().unwrap()],
        );
        configure_identity(&work);

        Self {
            _root: root,
            remote,
            work,
        }
    }

    /// Publish `branch` on the remote only, with one commit writing `file`.
    /// The working copy learns nothing about it.
    pub fn push_remote_only_branch(&self, branch: &str, file: &str, contents: &str) -> String {
        let scratch = self._root.path().join(format!("scratch-{branch}"));
        git(
            self._root.path(),
            &["clone", self.remote.to_str().unwrap(), scratch.to_str().unwrap()],
        );
        configure_identity(&scratch);
        git(&scratch, &["checkout", "-b", branch]);
        write(&scratch, file, contents);
        git(&scratch, &["add", file]);
        git(&scratch, &["commit", "-m", &format!("{branch} work")]);
        git(&scratch, &["push", "origin", branch]);
        git(&scratch, &["rev-parse", "HEAD"])
    }
}
