//! Error types shared by the workflow components.
//!
//! Components return [`Error`]; the binary boundary converts it into
//! `anyhow::Error` for reporting.

use std::{fmt, io, path::PathBuf};

use crate::{git::CommandError, github::GitHubError};

/// Why a [`crate::retry::CancelToken`] fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// SIGINT or SIGTERM was received.
    Interrupted,
    /// The configured timeout elapsed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => write!(f, "interrupted by signal"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    /// An external command failed while performing `operation`.
    Command {
        operation: String,
        source: CommandError,
    },
    /// Reading or writing a working-tree file failed.
    Io {
        operation: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    /// Every attempt failed; `last` is the final attempt's error.
    RetryExhausted { attempts: u32, last: Box<Error> },
    /// The run was cancelled before it could finish.
    Cancelled(CancelReason),
    /// The GitHub API rejected a request.
    Api(GitHubError),
}

impl Error {
    pub fn command(operation: impl Into<String>, source: CommandError) -> Self {
        Self::Command {
            operation: operation.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command { operation, source } => write!(f, "{operation}: {source}"),
            Self::Io {
                operation,
                path,
                source,
            } => write!(f, "{operation} '{}': {source}", path.display()),
            Self::RetryExhausted { attempts, last } => {
                write!(f, "failed after {attempts} attempts: {last}")
            }
            Self::Cancelled(reason) => write!(f, "cancelled: {reason}"),
            Self::Api(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Command { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            Self::RetryExhausted { last, .. } => Some(last.as_ref()),
            Self::Cancelled(_) => None,
            Self::Api(error) => Some(error),
        }
    }
}

impl From<GitHubError> for Error {
    fn from(error: GitHubError) -> Self {
        Self::Api(error)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
