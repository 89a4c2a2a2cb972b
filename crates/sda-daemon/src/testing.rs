//! Test doubles shared by the unit tests of this crate.

use async_trait::async_trait;
use sda_github::{
    Branch, Commit, GitHubApi, GitHubError, GitRef, Issue, ListOptions, NewIssue,
    NewPullRequest, PullRequest, Repository, User,
};
use serde_json::json;
use std::path::Path;
use std::sync::Mutex;

/// Records every call; repositories exist unless `missing_repo` is set.
#[derive(Default)]
pub struct FakeGitHub {
    pub(crate) calls: Mutex<Vec<String>>,
    pub missing_repo: bool,
    pub unauthenticated: bool,
    pub fail_create: bool,
    pub issues: Vec<Issue>,
}

impl FakeGitHub {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn repository(owner: &str, repo: &str) -> Repository {
        serde_json::from_value(json!({
            "name": repo,
            "full_name": format!("{owner}/{repo}"),
            "html_url": format!("https://github.com/{owner}/{repo}"),
        }))
        .unwrap()
    }
}

#[async_trait]
impl GitHubApi for FakeGitHub {
    async fn get_user(&self) -> Result<User, GitHubError> {
        self.record("get_user");
        if self.unauthenticated {
            return Err(GitHubError::AuthConfiguration);
        }
        Ok(User {
            login: "octo".to_string(),
            name: Some("Octo Cat".to_string()),
            html_url: None,
        })
    }

    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, GitHubError> {
        self.record(format!("get_repository {owner}/{repo}"));
        if self.missing_repo {
            return Err(GitHubError::NotFound(format!("/repos/{owner}/{repo}")));
        }
        Ok(Self::repository(owner, repo))
    }

    async fn create_repository(&self, name: &str, _description: &str) -> Result<Repository, GitHubError> {
        self.record(format!("create_repository {name}"));
        if self.fail_create {
            return Err(GitHubError::Api {
                status: 422,
                message: "name already exists on this account".to_string(),
            });
        }
        Ok(Self::repository("octo", name))
    }

    async fn list_repositories(&self, options: &ListOptions) -> Result<Vec<Repository>, GitHubError> {
        self.record(format!("list_repositories {}", options.per_page));
        Ok(vec![Self::repository("octo", "site")])
    }

    async fn list_branches(&self, owner: &str, repo: &str) -> Result<Vec<Branch>, GitHubError> {
        self.record(format!("list_branches {owner}/{repo}"));
        Ok(vec![
            Branch { name: "main".to_string(), protected: true },
            Branch { name: "dev".to_string(), protected: false },
        ])
    }

    async fn create_branch(&self, owner: &str, repo: &str, branch: &str, from: &str) -> Result<GitRef, GitHubError> {
        self.record(format!("create_branch {owner}/{repo} {branch} {from}"));
        Ok(serde_json::from_value(json!({
            "ref": format!("refs/heads/{branch}"),
            "object": { "sha": "abc123" }
        }))
        .unwrap())
    }

    async fn list_commits(&self, owner: &str, repo: &str, _options: &ListOptions) -> Result<Vec<Commit>, GitHubError> {
        self.record(format!("list_commits {owner}/{repo}"));
        Ok(vec![serde_json::from_value(json!({
            "sha": "0123456789abcdef",
            "commit": {
                "message": "Add header\n\nLonger body",
                "author": { "name": "Octo Cat", "date": "2024-05-01T10:00:00Z" }
            }
        }))
        .unwrap()])
    }

    async fn list_pull_requests(&self, owner: &str, repo: &str, _options: &ListOptions) -> Result<Vec<PullRequest>, GitHubError> {
        self.record(format!("list_pull_requests {owner}/{repo}"));
        Ok(Vec::new())
    }

    async fn create_pull_request(&self, owner: &str, repo: &str, pull: &NewPullRequest) -> Result<PullRequest, GitHubError> {
        self.record(format!("create_pull_request {owner}/{repo} {} {} {}", pull.title, pull.head, pull.base));
        Ok(serde_json::from_value(json!({
            "number": 7,
            "title": pull.title,
            "html_url": format!("https://github.com/{owner}/{repo}/pull/7"),
            "base": { "ref": pull.base },
            "head": { "ref": pull.head }
        }))
        .unwrap())
    }

    async fn list_issues(&self, owner: &str, repo: &str, _options: &ListOptions) -> Result<Vec<Issue>, GitHubError> {
        self.record(format!("list_issues {owner}/{repo}"));
        Ok(self.issues.clone())
    }

    async fn create_issue(&self, owner: &str, repo: &str, issue: &NewIssue) -> Result<Issue, GitHubError> {
        self.record(format!("create_issue {owner}/{repo} {}", issue.title));
        Ok(serde_json::from_value(json!({
            "number": 12,
            "title": issue.title,
            "html_url": format!("https://github.com/{owner}/{repo}/issues/12")
        }))
        .unwrap())
    }
}

pub fn bare_remote(root: &Path, owner: &str, repo: &str) {
    let path = root.join(owner).join(format!("{repo}.git"));
    std::fs::create_dir_all(&path).unwrap();
    let path = path.to_str().unwrap();
    for args in [
        vec!["init", "--bare", "--quiet", path],
        vec!["--git-dir", path, "symbolic-ref", "HEAD", "refs/heads/main"],
    ] {
        let status = std::process::Command::new("git").args(&args).status().unwrap();
        assert!(status.success());
    }
}
