use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::{
    Branch, Commit, GitHubApi, GitHubConfig, GitHubError, GitRef, Issue, ListOptions, NewIssue,
    NewPullRequest, PullRequest, Repository, User,
};

const API_VERSION: &str = "2022-11-28";

/// `/repos/{owner}/{repo}{rest}` with both names percent-encoded.
fn repo_path(owner: &str, repo: &str, rest: &str) -> String {
    format!(
        "/repos/{}/{}{rest}",
        urlencoding::encode(owner),
        urlencoding::encode(repo)
    )
}

/// A branch name as a ref path: each `/`-separated part is encoded.
fn ref_path(branch: &str) -> String {
    branch
        .split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}

/// GitHub REST client holding one lazily established authenticated session.
///
/// Authentication is single-flight: concurrent first calls share one
/// `GET /user` round trip. A failed attempt is not remembered, so the next
/// call tries again.
pub struct GitHubClient {
    http: Client,
    token: Option<String>,
    api_url: String,
    session: OnceCell<User>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, GitHubError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("sda-sync"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(config.timeout_ms.max(1)))
            .build()?;

        Ok(Self {
            http,
            token: config.token.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            session: OnceCell::new(),
        })
    }

    /// Whether a token is configured at all.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    async fn session(&self) -> Result<&User, GitHubError> {
        self.session.get_or_try_init(|| self.authenticate()).await
    }

    async fn authenticate(&self) -> Result<User, GitHubError> {
        if self.token.is_none() {
            return Err(GitHubError::AuthConfiguration);
        }

        let user: User = self
            .send(self.request(Method::GET, "/user"))
            .await
            .map_err(|e| match e {
                GitHubError::Http(e) => GitHubError::AuthFailure(e.to_string()),
                GitHubError::NotFound(message) | GitHubError::Api { message, .. } => {
                    GitHubError::AuthFailure(message)
                }
                other => other,
            })?;

        info!(login = %user.login, "GitHub authenticated");
        Ok(user)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.api_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, GitHubError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or(body);
            debug!(status = status.as_u16(), message = %message, "GitHub API error");
            return Err(match status {
                StatusCode::NOT_FOUND => GitHubError::NotFound(message),
                _ => GitHubError::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| GitHubError::Decode(e.to_string()))
    }

    /// Authenticate, then send `builder`.
    async fn call<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, GitHubError> {
        self.session().await?;
        self.send(builder).await
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn get_user(&self) -> Result<User, GitHubError> {
        self.session().await.cloned()
    }

    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, GitHubError> {
        let path = repo_path(owner, repo, "");
        self.call(self.request(Method::GET, &path)).await
    }

    async fn create_repository(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Repository, GitHubError> {
        debug!(name = %name, "Creating repository");
        let body = json!({
            "name": name,
            "description": description,
            "private": false,
            "auto_init": true,
        });
        self.call(self.request(Method::POST, "/user/repos").json(&body))
            .await
    }

    async fn list_repositories(
        &self,
        options: &ListOptions,
    ) -> Result<Vec<Repository>, GitHubError> {
        let query = [
            ("sort", options.sort.clone()),
            ("per_page", options.per_page.to_string()),
        ];
        self.call(self.request(Method::GET, "/user/repos").query(&query))
            .await
    }

    async fn list_branches(&self, owner: &str, repo: &str) -> Result<Vec<Branch>, GitHubError> {
        let path = repo_path(owner, repo, "/branches");
        self.call(self.request(Method::GET, &path)).await
    }

    async fn create_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        from: &str,
    ) -> Result<GitRef, GitHubError> {
        let lookup = repo_path(owner, repo, &format!("/git/ref/heads/{}", ref_path(from)));
        let source: GitRef = self.call(self.request(Method::GET, &lookup)).await?;

        let body = json!({
            "ref": format!("refs/heads/{branch}"),
            "sha": source.object.sha,
        });
        self.call(
            self.request(Method::POST, &repo_path(owner, repo, "/git/refs"))
                .json(&body),
        )
        .await
    }

    async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        options: &ListOptions,
    ) -> Result<Vec<Commit>, GitHubError> {
        let path = repo_path(owner, repo, "/commits");
        let query = [("per_page", options.per_page.to_string())];
        self.call(self.request(Method::GET, &path).query(&query))
            .await
    }

    async fn list_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        options: &ListOptions,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        let path = repo_path(owner, repo, "/pulls");
        let query = [
            ("state", options.state.clone()),
            ("per_page", options.per_page.to_string()),
        ];
        self.call(self.request(Method::GET, &path).query(&query))
            .await
    }

    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        pull: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError> {
        let path = repo_path(owner, repo, "/pulls");
        self.call(self.request(Method::POST, &path).json(pull)).await
    }

    async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        options: &ListOptions,
    ) -> Result<Vec<Issue>, GitHubError> {
        let path = repo_path(owner, repo, "/issues");
        let query = [
            ("state", options.state.clone()),
            ("per_page", options.per_page.to_string()),
        ];
        self.call(self.request(Method::GET, &path).query(&query))
            .await
    }

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: &NewIssue,
    ) -> Result<Issue, GitHubError> {
        let path = repo_path(owner, repo, "/issues");
        self.call(self.request(Method::POST, &path).json(issue)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer, token: Option<&str>) -> GitHubClient {
        GitHubClient::new(&GitHubConfig {
            token: token.map(str::to_string),
            api_url: server.base_url(),
            ..GitHubConfig::default()
        })
        .unwrap()
    }

    async fn mock_user(server: &MockServer) -> httpmock::Mock<'_> {
        server
            .mock_async(|when, then| {
                when.method(GET).path("/user");
                then.status(200)
                    .json_body(serde_json::json!({"login": "octocat", "name": "Octo Cat"}));
            })
            .await
    }

    #[tokio::test]
    async fn missing_token_is_a_configuration_error() {
        let server = MockServer::start_async().await;
        let client = client_for(&server, None);

        let err = client.get_user().await.unwrap_err();
        assert!(matches!(err, GitHubError::AuthConfiguration));
        assert!(!client.has_token());
    }

    #[tokio::test]
    async fn rejected_token_is_not_cached() {
        let server = MockServer::start_async().await;
        let user = server
            .mock_async(|when, then| {
                when.method(GET).path("/user");
                then.status(401)
                    .json_body(serde_json::json!({"message": "Bad credentials"}));
            })
            .await;
        let client = client_for(&server, Some("ghp_bad"));

        let first = client.get_user().await.unwrap_err();
        assert!(matches!(first, GitHubError::AuthFailure(ref m) if m == "Bad credentials"));
        let second = client.list_branches("o", "r").await.unwrap_err();
        assert!(matches!(second, GitHubError::AuthFailure(_)));

        user.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn session_is_established_once() {
        let server = MockServer::start_async().await;
        let user = mock_user(&server).await;
        let repo = server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/octocat/demo");
                then.status(200).json_body(serde_json::json!({
                    "name": "demo",
                    "full_name": "octocat/demo",
                    "private": false,
                    "html_url": "https://github.com/octocat/demo"
                }));
            })
            .await;
        let client = client_for(&server, Some("ghp_test"));

        let first = client.get_repository("octocat", "demo").await.unwrap();
        let second = client.get_repository("octocat", "demo").await.unwrap();
        assert_eq!(first.full_name, "octocat/demo");
        assert_eq!(second.name, "demo");
        assert_eq!(client.get_user().await.unwrap().login, "octocat");

        user.assert_hits_async(1).await;
        repo.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn missing_repository_maps_to_not_found() {
        let server = MockServer::start_async().await;
        mock_user(&server).await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/octocat/missing");
                then.status(404)
                    .json_body(serde_json::json!({"message": "Not Found"}));
            })
            .await;
        let client = client_for(&server, Some("ghp_test"));

        let err = client.get_repository("octocat", "missing").await.unwrap_err();
        assert!(matches!(err, GitHubError::NotFound(ref m) if m == "Not Found"));
    }

    #[test]
    fn path_segments_are_encoded() {
        assert_eq!(repo_path("octo", "demo", ""), "/repos/octo/demo");
        assert_eq!(repo_path("octo", "a?b", "/issues"), "/repos/octo/a%3Fb/issues");
        assert_eq!(ref_path("feature/login"), "feature/login");
        assert_eq!(ref_path("fix/#12 crash"), "fix/%2312%20crash");
    }

    #[tokio::test]
    async fn create_branch_resolves_base_sha() {
        let server = MockServer::start_async().await;
        mock_user(&server).await;
        let lookup = server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/o/r/git/ref/heads/develop");
                then.status(200).json_body(serde_json::json!({
                    "ref": "refs/heads/develop",
                    "object": {"sha": "abc123", "type": "commit"}
                }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/repos/o/r/git/refs")
                    .json_body(serde_json::json!({"ref": "refs/heads/feature", "sha": "abc123"}));
                then.status(201).json_body(serde_json::json!({
                    "ref": "refs/heads/feature",
                    "object": {"sha": "abc123"}
                }));
            })
            .await;
        let client = client_for(&server, Some("ghp_test"));

        let created = client
            .create_branch("o", "r", "feature", "develop")
            .await
            .unwrap();
        assert_eq!(created.ref_name, "refs/heads/feature");
        lookup.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn list_issues_sends_filters() {
        let server = MockServer::start_async().await;
        mock_user(&server).await;
        let issues = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/repos/o/r/issues")
                    .query_param("state", "closed")
                    .query_param("per_page", "10");
                then.status(200).json_body(serde_json::json!([
                    {"number": 3, "title": "Crash on save", "labels": [{"name": "bug"}]}
                ]));
            })
            .await;
        let client = client_for(&server, Some("ghp_test"));

        let listed = client
            .list_issues("o", "r", &ListOptions::default().state("closed"))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Crash on save");
        issues.assert_async().await;
    }

    #[tokio::test]
    async fn api_errors_keep_status_and_message() {
        let server = MockServer::start_async().await;
        mock_user(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/user/repos");
                then.status(422).json_body(serde_json::json!({
                    "message": "Repository creation failed."
                }));
            })
            .await;
        let client = client_for(&server, Some("ghp_test"));

        let err = client.create_repository("demo", "").await.unwrap_err();
        match err {
            GitHubError::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "Repository creation failed.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
