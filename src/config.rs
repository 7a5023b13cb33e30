//! Workflow inputs.
//!
//! Every input arrives as an `INPUT_*` environment variable (the GitHub
//! Actions convention) or the matching long flag. [`Inputs`] is the raw,
//! defaulted form; [`WorkflowConfig`] is the validated, immutable form the
//! components consume, with boolean switches folded into explicit modes.

use std::{fmt, path::PathBuf, time::Duration};

use clap::{ArgAction, Parser};

use crate::retry::RetryPolicy;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Inputs {
    #[arg(long, short, env = "INPUT_VERBOSE", action = ArgAction::Set, default_value_t = false)]
    pub verbose: bool,

    #[arg(long, env = "INPUT_USER_NAME", default_value = "github-actions[bot]")]
    pub user_name: String,

    #[arg(
        long,
        env = "INPUT_USER_EMAIL",
        default_value = "41898282+github-actions[bot]@users.noreply.github.com"
    )]
    pub user_email: String,

    /// Branch to commit to. Defaults to the checked out branch.
    #[arg(long, env = "INPUT_BRANCH")]
    pub branch: Option<String>,

    /// Branch that change detection and pull requests compare against.
    #[arg(long, env = "INPUT_BASE_BRANCH", default_value = "main")]
    pub base_branch: String,

    #[arg(long, env = "INPUT_REPO_PATH", default_value = ".")]
    pub repo_path: PathBuf,

    /// Space-separated pathspecs to stage.
    #[arg(long, env = "INPUT_FILE_PATTERN", default_value = ".")]
    pub file_pattern: String,

    #[arg(
        long,
        env = "INPUT_COMMIT_MESSAGE",
        default_value = "chore: automated commit"
    )]
    pub commit_message: String,

    #[arg(long, env = "INPUT_RETRIES", default_value_t = 3)]
    pub retries: u32,

    #[arg(long, env = "INPUT_TIMEOUT", default_value = "5m", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    #[arg(long, env = "INPUT_SKIP_IF_EMPTY", action = ArgAction::Set, default_value_t = false)]
    pub skip_if_empty: bool,

    /// Log mutations instead of running them.
    #[arg(long, env = "INPUT_DRY_RUN", action = ArgAction::Set, default_value_t = false)]
    pub dry_run: bool,

    #[arg(long, env = "INPUT_CREATE_PR", action = ArgAction::Set, default_value_t = false)]
    pub create_pr: bool,

    #[arg(long, env = "INPUT_GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// `owner/repo`; falls back to the origin remote URL.
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repository: Option<String>,

    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    pub api_url: String,

    #[arg(long, env = "INPUT_PR_TITLE")]
    pub pr_title: Option<String>,

    #[arg(long, env = "INPUT_PR_BODY", default_value = "")]
    pub pr_body: String,

    /// Comma-separated labels for the pull request.
    #[arg(long, env = "INPUT_PR_LABELS", value_delimiter = ',')]
    pub pr_labels: Vec<String>,

    #[arg(long, env = "INPUT_PR_DRAFT", action = ArgAction::Set, default_value_t = false)]
    pub pr_draft: bool,

    /// Commit to a freshly generated branch instead of `branch`.
    #[arg(long, env = "INPUT_AUTO_BRANCH", action = ArgAction::Set, default_value_t = false)]
    pub auto_branch: bool,

    /// Close earlier auto-branch pull requests and delete their branches.
    #[arg(long, env = "INPUT_DELETE_SOURCE", action = ArgAction::Set, default_value_t = false)]
    pub delete_source: bool,

    #[arg(long, env = "INPUT_TAG_NAME")]
    pub tag_name: Option<String>,

    #[arg(long, env = "INPUT_TAG_MESSAGE")]
    pub tag_message: Option<String>,

    /// Branch, tag or SHA to tag. Empty tags HEAD.
    #[arg(long, env = "INPUT_TAG_REFERENCE")]
    pub tag_reference: Option<String>,

    #[arg(long, env = "INPUT_FORCE_TAG", action = ArgAction::Set, default_value_t = false)]
    pub force_tag: bool,

    #[arg(long, env = "INPUT_DELETE_TAG", action = ArgAction::Set, default_value_t = false)]
    pub delete_tag: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingField {
        field: &'static str,
        mode: &'static str,
    },
    InvalidCombination(&'static str),
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field, mode } => {
                write!(f, "'{field}' is required for {mode}")
            }
            Self::InvalidCombination(message) => write!(f, "{message}"),
            Self::InvalidValue { field, reason } => write!(f, "invalid '{field}': {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyPolicy {
    /// Publish even when nothing changed.
    Proceed,
    /// Stop before publishing when nothing changed.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Live,
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrSource {
    /// The pull request's head is the configured branch.
    ConfiguredBranch,
    /// Changes land on a generated `<branch>-<timestamp>` branch.
    AutoBranch { close_superseded: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestConfig {
    pub token: String,
    pub repository: Option<String>,
    pub api_url: String,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub draft: bool,
    pub source: PrSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishMode {
    /// Commit and push straight to the branch.
    Direct,
    PullRequest(PullRequestConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagAction {
    Create {
        message: Option<String>,
        reference: String,
        force: bool,
    },
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagConfig {
    pub name: String,
    pub action: TagAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub identity: Identity,
    pub branch: String,
    pub base_branch: String,
    pub repo_path: PathBuf,
    pub file_patterns: Vec<String>,
    pub commit_message: String,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub empty_policy: EmptyPolicy,
    pub execution: ExecutionMode,
    pub publish: PublishMode,
    pub tag: Option<TagConfig>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl WorkflowConfig {
    /// Validate raw inputs. `branch` is the resolved target branch, used when
    /// no branch input was given.
    pub fn from_inputs(inputs: Inputs, branch: String) -> Result<Self, ConfigError> {
        if inputs.retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retries",
                reason: "must be at least 1".to_string(),
            });
        }
        if inputs.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        let branch = non_empty(inputs.branch).unwrap_or(branch);
        if branch.is_empty() || branch == "HEAD" {
            return Err(ConfigError::MissingField {
                field: "branch",
                mode: "a detached checkout",
            });
        }

        let file_patterns: Vec<String> = inputs
            .file_pattern
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if file_patterns.is_empty() {
            return Err(ConfigError::MissingField {
                field: "file_pattern",
                mode: "committing",
            });
        }

        let publish = Self::publish_mode(
            inputs.create_pr,
            inputs.auto_branch,
            inputs.delete_source,
            PullRequestConfig {
                token: non_empty(inputs.github_token).unwrap_or_default(),
                repository: non_empty(inputs.repository),
                api_url: inputs.api_url.trim_end_matches('/').to_string(),
                title: non_empty(inputs.pr_title)
                    .unwrap_or_else(|| inputs.commit_message.clone()),
                body: inputs.pr_body,
                labels: inputs
                    .pr_labels
                    .into_iter()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect(),
                draft: inputs.pr_draft,
                source: PrSource::ConfiguredBranch,
            },
        )?;

        let tag = match non_empty(inputs.tag_name) {
            None if inputs.delete_tag => {
                return Err(ConfigError::MissingField {
                    field: "tag_name",
                    mode: "tag deletion",
                });
            }
            None => None,
            Some(name) if inputs.delete_tag => Some(TagConfig {
                name,
                action: TagAction::Delete,
            }),
            Some(name) => Some(TagConfig {
                name,
                action: TagAction::Create {
                    message: non_empty(inputs.tag_message),
                    reference: non_empty(inputs.tag_reference).unwrap_or_default(),
                    force: inputs.force_tag,
                },
            }),
        };

        Ok(Self {
            identity: Identity {
                name: inputs.user_name,
                email: inputs.user_email,
            },
            branch,
            base_branch: inputs.base_branch,
            repo_path: inputs.repo_path,
            file_patterns,
            commit_message: inputs.commit_message,
            retry: RetryPolicy::new(inputs.retries),
            timeout: inputs.timeout,
            empty_policy: if inputs.skip_if_empty {
                EmptyPolicy::Skip
            } else {
                EmptyPolicy::Proceed
            },
            execution: if inputs.dry_run {
                ExecutionMode::DryRun
            } else {
                ExecutionMode::Live
            },
            publish,
            tag,
        })
    }

    fn publish_mode(
        create_pr: bool,
        auto_branch: bool,
        delete_source: bool,
        mut pr: PullRequestConfig,
    ) -> Result<PublishMode, ConfigError> {
        if delete_source && !auto_branch {
            return Err(ConfigError::InvalidCombination(
                "delete_source requires auto_branch",
            ));
        }
        if !create_pr {
            if auto_branch {
                return Err(ConfigError::InvalidCombination(
                    "auto_branch requires create_pr",
                ));
            }
            return Ok(PublishMode::Direct);
        }
        if pr.token.is_empty() {
            return Err(ConfigError::MissingField {
                field: "github_token",
                mode: "pull request creation",
            });
        }
        if auto_branch {
            pr.source = PrSource::AutoBranch {
                close_superseded: delete_source,
            };
        }
        Ok(PublishMode::PullRequest(pr))
    }

    pub fn pull_request(&self) -> Option<&PullRequestConfig> {
        match &self.publish {
            PublishMode::Direct => None,
            PublishMode::PullRequest(pr) => Some(pr),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.execution == ExecutionMode::DryRun
    }
}
