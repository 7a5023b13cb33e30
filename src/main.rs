use crate::{
    config::{ExecutionMode, Inputs, PullRequestConfig, WorkflowConfig},
    git::{CommandRunner, DryRunRunner, SystemRunner},
    github::{GitHubClient, GitHubConfig, RepoIdentifier},
    retry::CancelToken,
    workflow::WorkflowOutcome,
};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod batch;
mod config;
mod detect;
mod error;
mod git;
mod github;
mod publish;
mod pull_request;
mod reconcile;
mod retry;
mod stats;
mod tag;
#[cfg(test)]
mod testing;
mod workflow;

fn main() {
    if let Err(e) = inner_main() {
        tracing::error!(error = ?e);
        std::process::exit(1);
    }
    std::process::exit(0);
}

fn inner_main() -> Result<()> {
    let inputs = Inputs::parse();
    let verbose = inputs.verbose;
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let token = CancelToken::new();
    token
        .install_signal_handlers()
        .context("installing signal handlers")?;

    let runner = SystemRunner::new(&inputs.repo_path);
    let branch_given = inputs.branch.as_deref().is_some_and(|b| !b.trim().is_empty());
    let current_branch = if branch_given {
        String::new()
    } else {
        git::current_branch(&runner).context("determining the current branch")?
    };
    let cfg = WorkflowConfig::from_inputs(inputs, current_branch)?;
    tracing::debug!(
        repo = %cfg.repo_path.display(),
        branch = %cfg.branch,
        base = %cfg.base_branch,
        execution = ?cfg.execution,
        "Configuration loaded"
    );

    let result = match cfg.execution {
        ExecutionMode::Live => execute(&runner, &cfg, &token),
        ExecutionMode::DryRun => execute(&DryRunRunner::new(runner.clone()), &cfg, &token),
    };
    if verbose {
        stats::print_summary();
    }
    result?;

    println!("\n{}", "All steps completed successfully.".green().bold());
    Ok(())
}

fn execute(runner: &impl CommandRunner, cfg: &WorkflowConfig, token: &CancelToken) -> Result<()> {
    let outcome = workflow::run(runner, cfg, &token.with_deadline(cfg.timeout))
        .context("commit workflow failed")?;

    match &outcome {
        WorkflowOutcome::Skipped { branch } => {
            println!(
                "{} No changes for '{}', nothing published",
                "↷".yellow(),
                branch
            );
        }
        WorkflowOutcome::Published { branch, sha, .. } => {
            println!(
                "{} Published {} to '{}'",
                "✓".green(),
                &sha[..sha.len().min(12)],
                branch.green()
            );
            if let Some(pr) = cfg.pull_request() {
                handle_pull_request(runner, cfg, pr, branch, sha)
                    .context("pull request handling failed")?;
            }
        }
    }

    if let Some(tag) = &cfg.tag {
        tag::handle_tag(runner, &token.with_deadline(cfg.timeout), cfg.retry, tag)
            .with_context(|| format!("tag handling for '{}' failed", tag.name))?;
    }
    Ok(())
}

fn repo_identifier(runner: &impl CommandRunner, pr: &PullRequestConfig) -> Result<RepoIdentifier> {
    match &pr.repository {
        Some(full_name) => github::parse_repository(full_name, "github.com"),
        None => {
            let url = git::origin_url(runner).context("reading the origin remote URL")?;
            github::parse_remote_url(&url)
        }
    }
}

fn handle_pull_request(
    runner: &impl CommandRunner,
    cfg: &WorkflowConfig,
    pr: &PullRequestConfig,
    head: &str,
    sha: &str,
) -> Result<()> {
    let repo = repo_identifier(runner, pr)?;
    if cfg.is_dry_run() {
        tracing::info!(
            "[dry-run] Would open pull request {} -> {} on {}",
            head,
            cfg.base_branch,
            repo.full_name()
        );
        return Ok(());
    }

    let client = GitHubClient::new(GitHubConfig {
        token: pr.token.clone(),
        api_base: pr.api_url.clone(),
    })?;
    let outcome = pull_request::open_pull_request(
        &client,
        &repo,
        pr,
        &cfg.branch,
        &cfg.base_branch,
        head,
        sha,
    )?;
    tracing::info!(
        number = outcome.number,
        created = outcome.created,
        superseded = ?outcome.superseded,
        "Pull request ready: {}",
        outcome.html_url
    );
    Ok(())
}
