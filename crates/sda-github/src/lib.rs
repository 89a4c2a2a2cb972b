//! Authenticated facade over the GitHub REST API.
//!
//! The daemon constructs one [`GitHubClient`] and shares it behind the
//! [`GitHubApi`] trait, so the command dispatcher can be exercised against
//! fakes in tests.

mod client;
mod types;

pub use client::GitHubClient;
pub use types::*;

use async_trait::async_trait;
use sda_protocol::ConnectionCheck;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_GIT_URL: &str = "https://github.com";
pub const DEFAULT_BRANCH: &str = "main";

/// Environment variable holding the personal access token.
pub const TOKEN_ENV: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";
/// Environment variable overriding the repository owner.
pub const OWNER_ENV: &str = "GITHUB_DEFAULT_OWNER";

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub Personal Access Token not configured. Set {TOKEN_ENV}.")]
    AuthConfiguration,

    #[error("GitHub authentication failed: {0}")]
    AuthFailure(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response from GitHub: {0}")]
    Decode(String),
}

/// `[github]` configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub default_owner: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_git_url")]
    pub git_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_git_url() -> String {
    DEFAULT_GIT_URL.to_string()
}

fn default_timeout() -> u64 {
    30_000
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            default_owner: None,
            api_url: default_api_url(),
            git_url: default_git_url(),
            timeout_ms: default_timeout(),
        }
    }
}

impl GitHubConfig {
    /// Apply `GITHUB_PERSONAL_ACCESS_TOKEN` / `GITHUB_DEFAULT_OWNER` on top of file values.
    pub fn apply_env(&mut self) {
        self.apply_overrides(std::env::var(TOKEN_ENV).ok(), std::env::var(OWNER_ENV).ok());
    }

    /// Non-empty overrides replace the configured values.
    pub fn apply_overrides(&mut self, token: Option<String>, owner: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.token = Some(token.trim().to_string());
        }
        if let Some(owner) = owner.filter(|o| !o.trim().is_empty()) {
            self.default_owner = Some(owner.trim().to_string());
        }
    }
}

/// Listing options shared by the paginated endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub per_page: u32,
    pub state: String,
    pub sort: String,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            per_page: 10,
            state: "open".to_string(),
            sort: "updated".to_string(),
        }
    }
}

impl ListOptions {
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }
}

/// Operations the dispatcher needs from GitHub.
///
/// Every call lazily authenticates on first use.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// The authenticated account.
    async fn get_user(&self) -> Result<User, GitHubError>;

    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, GitHubError>;

    /// Create a public repository (with an initial README) for the authenticated user.
    async fn create_repository(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Repository, GitHubError>;

    async fn list_repositories(&self, options: &ListOptions)
        -> Result<Vec<Repository>, GitHubError>;

    async fn list_branches(&self, owner: &str, repo: &str) -> Result<Vec<Branch>, GitHubError>;

    /// Create `branch` pointing at the current head of `from`.
    async fn create_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        from: &str,
    ) -> Result<GitRef, GitHubError>;

    async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        options: &ListOptions,
    ) -> Result<Vec<Commit>, GitHubError>;

    async fn list_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        options: &ListOptions,
    ) -> Result<Vec<PullRequest>, GitHubError>;

    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        pull: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError>;

    async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        options: &ListOptions,
    ) -> Result<Vec<Issue>, GitHubError>;

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: &NewIssue,
    ) -> Result<Issue, GitHubError>;
}

/// Verify the credential by resolving the authenticated user.
pub async fn check_connection(api: &dyn GitHubApi) -> ConnectionCheck {
    match api.get_user().await {
        Ok(user) => {
            info!(login = %user.login, "GitHub connection successful");
            ConnectionCheck {
                success: true,
                user: Some(user.login),
                error: None,
            }
        }
        Err(e) => {
            warn!(error = %e, "GitHub connection failed");
            ConnectionCheck {
                success: false,
                user: None,
                error: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_list_options() {
        let options = ListOptions::default();
        assert_eq!(options.per_page, 10);
        assert_eq!(options.state, "open");
        assert_eq!(options.sort, "updated");
        assert_eq!(options.per_page(5).per_page, 5);
    }

    #[test]
    fn overrides_ignore_blank_values() {
        let mut config = GitHubConfig {
            token: Some("from-file".to_string()),
            ..GitHubConfig::default()
        };
        config.apply_overrides(Some("  ".to_string()), Some("acme".to_string()));
        assert_eq!(config.token.as_deref(), Some("from-file"));
        assert_eq!(config.default_owner.as_deref(), Some("acme"));

        config.apply_overrides(Some("ghp_env\n".to_string()), None);
        assert_eq!(config.token.as_deref(), Some("ghp_env"));
    }

    #[test]
    fn parse_github_section() {
        let config: GitHubConfig = serde_json::from_str(r#"{"token": "ghp_x"}"#).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.git_url, DEFAULT_GIT_URL);
        assert_eq!(config.timeout_ms, 30_000);
    }
}
