use colored::Colorize;

use crate::{
    config::{PrSource, PullRequestConfig},
    error::Result,
    github::{CreatePrRequest, PullRequestApi, RepoIdentifier},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrOutcome {
    pub number: u64,
    pub html_url: String,
    /// False when an open pull request for the head already existed.
    pub created: bool,
    /// Pull requests closed because this one supersedes them.
    pub superseded: Vec<u64>,
}

/// Open (or reuse) the pull request from `head` into `base`.
///
/// Safe to repeat: an existing open pull request for the same head is reused
/// rather than duplicated.
pub fn open_pull_request(
    api: &impl PullRequestApi,
    repo: &RepoIdentifier,
    cfg: &PullRequestConfig,
    branch: &str,
    base: &str,
    head: &str,
    sha: &str,
) -> Result<PrOutcome> {
    tracing::info!("Opening pull request {} -> {} at {}", head, base, sha);
    let (pr, created) = match api.find_open_pr(repo, head, base)? {
        Some(pr) => {
            println!(
                "{} Pull request #{} already open: {}",
                "↷".yellow(),
                pr.number,
                pr.html_url
            );
            (pr, false)
        }
        None => {
            let pr = api.create_pr(
                repo,
                CreatePrRequest {
                    title: &cfg.title,
                    body: &cfg.body,
                    head,
                    base,
                    draft: cfg.draft.then_some(true),
                },
            )?;
            println!(
                "{} Created pull request #{}: {}",
                "✓".green(),
                pr.number.to_string().green(),
                pr.html_url.blue()
            );
            (pr, true)
        }
    };

    if !cfg.labels.is_empty() {
        api.add_labels(repo, pr.number, &cfg.labels)?;
        println!("{} Labelled #{}: {}", "✓".green(), pr.number, cfg.labels.join(", "));
    }

    let superseded = match cfg.source {
        PrSource::AutoBranch {
            close_superseded: true,
        } => close_superseded(api, repo, branch, base, head)?,
        _ => Vec::new(),
    };

    Ok(PrOutcome {
        number: pr.number,
        html_url: pr.html_url,
        created,
        superseded,
    })
}

/// Close earlier auto-branch pull requests for `branch` and delete their
/// head branches.
fn close_superseded(
    api: &impl PullRequestApi,
    repo: &RepoIdentifier,
    branch: &str,
    base: &str,
    head: &str,
) -> Result<Vec<u64>> {
    let prefix = format!("{branch}-");
    let mut closed = Vec::new();
    for pr in api.list_open_prs(repo, base)? {
        let pr_head = &pr.head.ref_name;
        if pr_head == head || !pr_head.starts_with(&prefix) {
            continue;
        }
        api.close_pr(repo, pr.number)?;
        println!("{} Closed superseded pull request #{}", "✓".green(), pr.number);
        match api.delete_branch(repo, pr_head) {
            Ok(()) => println!("{} Deleted branch '{}'", "✓".green(), pr_head),
            // Already gone, or protected; the pull request is closed either way.
            Err(error) if matches!(error.status(), Some(404 | 422)) => {
                tracing::warn!("Could not delete branch '{}': {}", pr_head, error);
            }
            Err(error) => return Err(error.into()),
        }
        closed.push(pr.number);
    }
    Ok(closed)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::github::{GitHubError, PrBranchRef, PullRequest};

    fn pr(number: u64, head: &str) -> PullRequest {
        PullRequest {
            number,
            html_url: format!("https://github.com/acme/widgets/pull/{number}"),
            head: PrBranchRef {
                ref_name: head.to_string(),
            },
        }
    }

    #[derive(Default)]
    struct FakeApi {
        existing: Option<u64>,
        open: Vec<(u64, &'static str)>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeApi {
        fn log(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl PullRequestApi for FakeApi {
        fn find_open_pr(
            &self,
            _repo: &RepoIdentifier,
            head: &str,
            base: &str,
        ) -> std::result::Result<Option<PullRequest>, GitHubError> {
            self.log(format!("find {head}->{base}"));
            Ok(self.existing.map(|n| pr(n, head)))
        }

        fn create_pr(
            &self,
            _repo: &RepoIdentifier,
            request: CreatePrRequest,
        ) -> std::result::Result<PullRequest, GitHubError> {
            self.log(format!(
                "create {}->{} draft={:?}",
                request.head, request.base, request.draft
            ));
            Ok(pr(42, request.head))
        }

        fn add_labels(
            &self,
            _repo: &RepoIdentifier,
            number: u64,
            labels: &[String],
        ) -> std::result::Result<(), GitHubError> {
            self.log(format!("label #{number} {}", labels.join(",")));
            Ok(())
        }

        fn close_pr(
            &self,
            _repo: &RepoIdentifier,
            number: u64,
        ) -> std::result::Result<(), GitHubError> {
            self.log(format!("close #{number}"));
            Ok(())
        }

        fn list_open_prs(
            &self,
            _repo: &RepoIdentifier,
            _base: &str,
        ) -> std::result::Result<Vec<PullRequest>, GitHubError> {
            Ok(self.open.iter().map(|(n, head)| pr(*n, head)).collect())
        }

        fn delete_branch(
            &self,
            _repo: &RepoIdentifier,
            branch: &str,
        ) -> std::result::Result<(), GitHubError> {
            self.log(format!("delete {branch}"));
            if branch == "update-deps-gone" {
                return Err(GitHubError::Api {
                    operation: "delete branch",
                    status: 422,
                    message: "Reference does not exist".to_string(),
                });
            }
            Ok(())
        }
    }

    fn repo() -> RepoIdentifier {
        RepoIdentifier {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            host: "github.com".to_string(),
        }
    }

    fn pr_config(source: PrSource, labels: &[&str]) -> PullRequestConfig {
        PullRequestConfig {
            token: "t".to_string(),
            repository: None,
            api_url: "https://api.github.com".to_string(),
            title: "Update deps".to_string(),
            body: String::new(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            draft: true,
            source,
        }
    }

    #[test]
    fn creates_and_labels_new_pull_request() {
        let api = FakeApi::default();
        let cfg = pr_config(PrSource::ConfiguredBranch, &["bot"]);

        let outcome =
            open_pull_request(&api, &repo(), &cfg, "update-deps", "main", "update-deps", "abc")
                .unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.number, 42);
        assert_eq!(
            *api.calls.borrow(),
            [
                "find update-deps->main",
                "create update-deps->main draft=Some(true)",
                "label #42 bot",
            ]
        );
    }

    #[test]
    fn reuses_existing_open_pull_request() {
        let api = FakeApi {
            existing: Some(7),
            ..FakeApi::default()
        };
        let cfg = pr_config(PrSource::ConfiguredBranch, &[]);

        let outcome =
            open_pull_request(&api, &repo(), &cfg, "update-deps", "main", "update-deps", "abc")
                .unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.number, 7);
        assert_eq!(*api.calls.borrow(), ["find update-deps->main"]);
    }

    #[test]
    fn auto_branch_closes_superseded_pull_requests() {
        let api = FakeApi {
            open: vec![
                (3, "update-deps-20240101000000"),
                (4, "unrelated"),
                (5, "update-deps-gone"),
                (42, "update-deps-20250101000000"),
            ],
            ..FakeApi::default()
        };
        let cfg = pr_config(
            PrSource::AutoBranch {
                close_superseded: true,
            },
            &[],
        );

        let outcome = open_pull_request(
            &api,
            &repo(),
            &cfg,
            "update-deps",
            "main",
            "update-deps-20250101000000",
            "abc",
        )
        .unwrap();

        assert_eq!(outcome.superseded, [3, 5]);
        let calls = api.calls.borrow();
        assert!(calls.contains(&"close #3".to_string()));
        assert!(calls.contains(&"delete update-deps-20240101000000".to_string()));
        assert!(!calls.contains(&"close #4".to_string()));
        assert!(!calls.contains(&"close #42".to_string()));
    }

    #[test]
    fn auto_branch_without_cleanup_leaves_others_open() {
        let api = FakeApi {
            open: vec![(3, "update-deps-20240101000000")],
            ..FakeApi::default()
        };
        let cfg = pr_config(
            PrSource::AutoBranch {
                close_superseded: false,
            },
            &[],
        );

        let outcome =
            open_pull_request(&api, &repo(), &cfg, "update-deps", "main", "update-deps-1", "abc")
                .unwrap();

        assert!(outcome.superseded.is_empty());
    }
}
