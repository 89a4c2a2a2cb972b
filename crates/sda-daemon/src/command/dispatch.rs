use sda_github::{GitHubApi, GitHubError, Issue, ListOptions, NewIssue, NewPullRequest, DEFAULT_BRANCH};
use sda_protocol::{CommandResponse, Project};
use sda_sync::{locate_repository, ProjectStore, SyncEngine, SyncError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::parse::Request;

const WEB_URL: &str = "https://github.com";

const HELP: &str = "🔧 **GitHub Commands:**

| Command | Description |
|---------|-------------|
| `@github push [msg]` | Push project to GitHub (creates repo if needed) |
| `@github pull` | Pull latest changes from GitHub |
| `@github status` | Get connection status and user info |
| `@github repos` | List your repositories |
| `@github branches` | List branches |
| `@github commits` | Show recent commits |
| `@github prs` | List open pull requests |
| `@github issues` | List open issues |
| `@github create branch <name> [from <base>]` | Create a new branch |
| `@github create issue \"title\"` | Create a new issue |
| `@github create pr \"title\" <head> [into <base>]` | Open a pull request |
| `@github help` | Show this help message |
";

#[derive(Debug, Error)]
enum DispatchError {
    #[error(transparent)]
    GitHub(#[from] GitHubError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Turns chat commands into GitHub and sync operations.
///
/// Stateless between invocations. Every failure is converted into an error
/// reply; nothing escapes [`Dispatcher::dispatch`].
pub struct Dispatcher {
    github: Arc<dyn GitHubApi>,
    sync: Arc<SyncEngine>,
    store: Arc<dyn ProjectStore>,
    default_owner: Option<String>,
}

/// Target repository of one command.
struct Target {
    owner: String,
    repo: String,
}

impl Target {
    fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    fn link(&self) -> String {
        format!("{WEB_URL}/{}/{}", self.owner, self.repo)
    }
}

impl Dispatcher {
    pub fn new(
        github: Arc<dyn GitHubApi>,
        sync: Arc<SyncEngine>,
        store: Arc<dyn ProjectStore>,
        default_owner: Option<String>,
    ) -> Self {
        Self {
            github,
            sync,
            store,
            default_owner: default_owner.filter(|o| !o.trim().is_empty()),
        }
    }

    /// Run the command text (trigger already stripped) against `project`.
    pub async fn dispatch(&self, input: &str, project: &Project) -> CommandResponse {
        let request = Request::parse(input);
        debug!(project = %project.id, request = ?request, "Dispatching command");

        match self.run(request, project).await {
            Ok(response) => response,
            Err(e) => {
                warn!(project = %project.id, error = %e, "GitHub command failed");
                CommandResponse::error(format!(
                    "❌ **GitHub Error**\n\n{e}\n\nMake sure your GitHub token is valid and has the required permissions."
                ))
            }
        }
    }

    async fn run(&self, request: Request, project: &Project) -> Result<CommandResponse, DispatchError> {
        if let Some(response) = validate(&request) {
            return Ok(response);
        }

        match request {
            Request::Help => Ok(CommandResponse::info(HELP)),
            Request::Unknown(phrase) => Ok(CommandResponse::warning(format!(
                "❓ Unknown command: `{phrase}`\n\nType `@github help` to see available commands."
            ))),
            Request::Status => self.status(project).await,
            Request::ListRepositories => self.list_repositories().await,
            Request::Push { message } => {
                let target = self.target(project).await?;
                self.push(project, &target, message.as_deref()).await
            }
            Request::Pull => {
                let target = self.target(project).await?;
                self.pull(project, &target).await
            }
            Request::ListBranches => self.list_branches(&self.target(project).await?).await,
            Request::CreateBranch { name, from } => {
                let target = self.target(project).await?;
                let from = from.unwrap_or_else(|| DEFAULT_BRANCH.to_string());
                self.create_branch(&target, &name.unwrap_or_default(), &from)
                    .await
            }
            Request::ListCommits => self.list_commits(&self.target(project).await?).await,
            Request::ListPullRequests => {
                self.list_pull_requests(&self.target(project).await?).await
            }
            Request::CreatePullRequest { title, head, base } => {
                let target = self.target(project).await?;
                let pull = NewPullRequest {
                    title: title.unwrap_or_default(),
                    head: head.unwrap_or_default(),
                    base: base.unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
                    body: String::new(),
                };
                self.create_pull_request(&target, &pull).await
            }
            Request::ListIssues => self.list_issues(&self.target(project).await?).await,
            Request::CreateIssue { title } => {
                let target = self.target(project).await?;
                self.create_issue(&target, &title.unwrap_or_default()).await
            }
        }
    }

    async fn owner(&self) -> Result<String, GitHubError> {
        match &self.default_owner {
            Some(owner) => Ok(owner.clone()),
            None => Ok(self.github.get_user().await?.login),
        }
    }

    async fn target(&self, project: &Project) -> Result<Target, GitHubError> {
        let repo = locate_repository(project);
        debug!(project = %project.id, repo = %repo.name, source = ?repo.source, "Resolved repository name");
        Ok(Target {
            owner: self.owner().await?,
            repo: repo.name,
        })
    }

    async fn push(
        &self,
        project: &Project,
        target: &Target,
        message: Option<&str>,
    ) -> Result<CommandResponse, DispatchError> {
        let mut text = String::new();

        match self.github.get_repository(&target.owner, &target.repo).await {
            Ok(_) => {}
            Err(GitHubError::NotFound(_)) => {
                text.push_str(&format!(
                    "Repository {} does not exist. Creating it...\n",
                    target.full_name()
                ));
                let description = format!("Project: {}", project.name);
                if let Err(e) = self.github.create_repository(&target.repo, &description).await {
                    warn!(repo = %target.full_name(), error = %e, "Repository creation failed");
                    return Ok(CommandResponse::error(format!(
                        "❌ Failed to create repository: {e}"
                    )));
                }
                info!(repo = %target.full_name(), "Repository created");
                text.push_str("✅ Repository created successfully.\n");
            }
            Err(e) => return Err(e.into()),
        }

        text.push_str(&format!("Pushing code to {}...\n", target.full_name()));
        let outcome = self
            .sync
            .push(project, &target.owner, &target.repo, message)
            .await?;
        text.push_str(&format!("✅ {}\nLink: {}", outcome.message, target.link()));
        Ok(CommandResponse::success(text))
    }

    async fn pull(&self, project: &Project, target: &Target) -> Result<CommandResponse, DispatchError> {
        match self.github.get_repository(&target.owner, &target.repo).await {
            Ok(_) => {}
            Err(GitHubError::NotFound(_)) => {
                return Ok(CommandResponse::error(format!(
                    "❌ Repository {} not found. Cannot pull.",
                    target.full_name()
                )))
            }
            Err(e) => return Err(e.into()),
        }

        let mut project = project.clone();
        let outcome = self
            .sync
            .pull(&mut project, &target.owner, &target.repo, self.store.as_ref())
            .await?;
        Ok(CommandResponse::success(format!("✅ {}", outcome.message)).with_file_tree(outcome.file_tree))
    }

    async fn status(&self, project: &Project) -> Result<CommandResponse, DispatchError> {
        let user = self.github.get_user().await?;
        let target = Target {
            owner: self.default_owner.clone().unwrap_or_else(|| user.login.clone()),
            repo: locate_repository(project).name,
        };

        let synced = match self.github.get_repository(&target.owner, &target.repo).await {
            Ok(_) => "✅ Found",
            Err(GitHubError::NotFound(_)) => "❌ Not synced yet",
            Err(e) => return Err(e.into()),
        };
        let repos = self
            .github
            .list_repositories(&ListOptions::default().per_page(5))
            .await?;

        let recent = repos
            .iter()
            .map(|r| format!("- [{}]({})", r.name, r.html_url))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(CommandResponse::success(format!(
            "✅ **GitHub Connected**\n\n**User:** {}\n**Name:** {}\n\n**Project Target Repo:** [{}]({}) {synced}\n\n**Recent Repositories:**\n{recent}",
            user.login,
            user.name.as_deref().unwrap_or("N/A"),
            target.full_name(),
            target.link(),
        )))
    }

    async fn list_repositories(&self) -> Result<CommandResponse, DispatchError> {
        let repos = self
            .github
            .list_repositories(&ListOptions::default().per_page(10))
            .await?;
        if repos.is_empty() {
            return Ok(CommandResponse::info("📁 **No repositories found**"));
        }

        let lines = repos
            .iter()
            .map(|r| {
                format!(
                    "- **{}** {} - {}\n  ⭐ {} | 🍴 {} | [View]({})",
                    r.name,
                    if r.private { "🔒" } else { "🌐" },
                    r.description.as_deref().filter(|d| !d.is_empty()).unwrap_or("No description"),
                    r.stargazers_count,
                    r.forks_count,
                    r.html_url,
                )
            })
            .collect::<Vec<_>>();
        Ok(CommandResponse::success(format!(
            "📁 **Your Repositories:**\n\n{}",
            lines.join("\n\n")
        )))
    }

    async fn list_branches(&self, target: &Target) -> Result<CommandResponse, DispatchError> {
        let branches = self.github.list_branches(&target.owner, &target.repo).await?;
        let lines = branches
            .iter()
            .map(|b| {
                if b.protected {
                    format!("- `{}` 🔒", b.name)
                } else {
                    format!("- `{}`", b.name)
                }
            })
            .collect::<Vec<_>>();
        Ok(CommandResponse::success(format!(
            "🌿 **Branches in {}:**\n\n{}",
            target.full_name(),
            lines.join("\n")
        )))
    }

    async fn create_branch(
        &self,
        target: &Target,
        name: &str,
        from: &str,
    ) -> Result<CommandResponse, DispatchError> {
        self.github
            .create_branch(&target.owner, &target.repo, name, from)
            .await?;
        info!(repo = %target.full_name(), branch = %name, from = %from, "Branch created");
        Ok(CommandResponse::success(format!(
            "✅ **Branch Created**\n\nBranch `{name}` created from `{from}` in {}",
            target.full_name()
        )))
    }

    async fn list_commits(&self, target: &Target) -> Result<CommandResponse, DispatchError> {
        let commits = self
            .github
            .list_commits(&target.owner, &target.repo, &ListOptions::default().per_page(5))
            .await?;
        let lines = commits
            .iter()
            .map(|c| {
                let author = c.commit.author.as_ref();
                let date = author
                    .and_then(|a| a.date)
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "unknown date".to_string());
                format!(
                    "- `{}` - {}\n  by {} on {date}",
                    c.short_sha(),
                    c.summary(),
                    author.map(|a| a.name.as_str()).unwrap_or("unknown"),
                )
            })
            .collect::<Vec<_>>();
        Ok(CommandResponse::success(format!(
            "📝 **Recent Commits in {}:**\n\n{}",
            target.full_name(),
            lines.join("\n\n")
        )))
    }

    async fn list_pull_requests(&self, target: &Target) -> Result<CommandResponse, DispatchError> {
        let pulls = self
            .github
            .list_pull_requests(&target.owner, &target.repo, &ListOptions::default())
            .await?;
        if pulls.is_empty() {
            return Ok(CommandResponse::info(format!(
                "📋 **No open pull requests in {}**",
                target.full_name()
            )));
        }

        let lines = pulls
            .iter()
            .map(|pr| {
                format!(
                    "- #{} **{}**\n  {} → `{}` | [View]({})",
                    pr.number,
                    pr.title,
                    pr.user.as_ref().map(|u| u.login.as_str()).unwrap_or("unknown"),
                    pr.base.ref_name,
                    pr.html_url,
                )
            })
            .collect::<Vec<_>>();
        Ok(CommandResponse::success(format!(
            "📋 **Open Pull Requests in {}:**\n\n{}",
            target.full_name(),
            lines.join("\n\n")
        )))
    }

    async fn create_pull_request(
        &self,
        target: &Target,
        pull: &NewPullRequest,
    ) -> Result<CommandResponse, DispatchError> {
        let pr = self
            .github
            .create_pull_request(&target.owner, &target.repo, pull)
            .await?;
        info!(repo = %target.full_name(), number = pr.number, "Pull request created");
        Ok(CommandResponse::success(format!(
            "✅ **Pull Request Created**\n\n#{} - {}\n`{}` → `{}`\n[View Pull Request]({})",
            pr.number, pr.title, pull.head, pull.base, pr.html_url
        )))
    }

    async fn list_issues(&self, target: &Target) -> Result<CommandResponse, DispatchError> {
        let issues: Vec<Issue> = self
            .github
            .list_issues(&target.owner, &target.repo, &ListOptions::default())
            .await?
            .into_iter()
            .filter(|issue| !issue.is_pull_request())
            .collect();
        if issues.is_empty() {
            return Ok(CommandResponse::info(format!(
                "📋 **No open issues in {}**",
                target.full_name()
            )));
        }

        let lines = issues
            .iter()
            .map(|issue| {
                let labels = issue
                    .labels
                    .iter()
                    .map(|l| format!("`{}`", l.name))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!(
                    "- #{} **{}**\n  by {} | {labels} | [View]({})",
                    issue.number,
                    issue.title,
                    issue.user.as_ref().map(|u| u.login.as_str()).unwrap_or("unknown"),
                    issue.html_url,
                )
            })
            .collect::<Vec<_>>();
        Ok(CommandResponse::success(format!(
            "🐛 **Open Issues in {}:**\n\n{}",
            target.full_name(),
            lines.join("\n\n")
        )))
    }

    async fn create_issue(&self, target: &Target, title: &str) -> Result<CommandResponse, DispatchError> {
        let issue = self
            .github
            .create_issue(&target.owner, &target.repo, &NewIssue::titled(title))
            .await?;
        info!(repo = %target.full_name(), number = issue.number, "Issue created");
        Ok(CommandResponse::success(format!(
            "✅ **Issue Created**\n\n#{} - {}\n[View Issue]({})",
            issue.number, issue.title, issue.html_url
        )))
    }
}

/// Usage errors that can be answered without contacting GitHub.
fn validate(request: &Request) -> Option<CommandResponse> {
    match request {
        Request::CreateBranch { name: None, .. } => Some(CommandResponse::error(
            "❌ Please specify a branch name: `@github create branch <name>`",
        )),
        Request::CreateIssue { title: None } => Some(CommandResponse::error(
            "❌ Please specify an issue title: `@github create issue \"Title\"`",
        )),
        Request::CreatePullRequest { title: None, .. } | Request::CreatePullRequest { head: None, .. } => {
            Some(CommandResponse::error(
                "❌ Please specify a title and head branch: `@github create pr \"Title\" <head> [into <base>]`",
            ))
        }
        _ => None,
    }
}
