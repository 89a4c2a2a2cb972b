use crate::git::Git;
use crate::store::ProjectStore;
use crate::tree::{clear_worktree, read_tree, write_tree};
use crate::SyncError;
use sda_protocol::{FileTree, Project};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

pub const DEFAULT_COMMIT_MESSAGE: &str = "Updates from SDA";

const COMMITTER_NAME: &str = "SDA Assistant";
const COMMITTER_EMAIL: &str = "assistant@sda.com";
const BRANCH: &str = "main";
const PUSH_PREFIX: &str = "sda-git-push-";
const PULL_PREFIX: &str = "sda-git-pull-";
const LISTED_FILES: usize = 5;

/// Where repositories are cloned from and pushed to.
#[derive(Debug, Clone)]
pub struct GitRemote {
    base: String,
    token: Option<String>,
}

impl GitRemote {
    pub fn new(base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Clone URL for `owner/repo`.
    ///
    /// HTTP(S) bases carry the token as userinfo and require one. Any other
    /// base (a local directory, a mirror path) is used as is.
    pub fn url(&self, owner: &str, repo: &str) -> Result<String, SyncError> {
        for scheme in ["https://", "http://"] {
            if let Some(host) = self.base.strip_prefix(scheme) {
                let token = self.token.as_deref().ok_or(SyncError::MissingToken)?;
                return Ok(format!("{scheme}{token}@{host}/{owner}/{repo}.git"));
            }
        }
        Ok(format!("{}/{owner}/{repo}.git", self.base))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    /// Paths git reported as changed; empty when nothing was committed.
    pub changed_files: Vec<String>,
    pub message: String,
}

impl PushOutcome {
    pub fn is_noop(&self) -> bool {
        self.changed_files.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PullOutcome {
    pub message: String,
    pub file_tree: FileTree,
}

/// Mirrors project file trees to and from remote git repositories.
///
/// Every operation works in its own temporary clone under `work_dir`, which
/// is removed whether the operation succeeds or not. Operations on the same
/// project are not serialized against each other.
pub struct SyncEngine {
    remote: GitRemote,
    work_dir: PathBuf,
}

impl SyncEngine {
    pub fn new(remote: GitRemote, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            remote,
            work_dir: work_dir.into(),
        }
    }

    /// Make the remote `main` branch mirror the project's file tree.
    ///
    /// Files present remotely but absent from the tree are deleted. A tree
    /// identical to the remote produces no commit.
    pub async fn push(
        &self,
        project: &Project,
        owner: &str,
        repo: &str,
        message: Option<&str>,
    ) -> Result<PushOutcome, SyncError> {
        let url = self.remote.url(owner, repo)?;
        let workspace = self.workspace(PUSH_PREFIX).await?;
        let git = Git::new(workspace.path()).with_secret(self.remote.token());

        let result = self
            .push_in(&git, workspace.path(), &url, project, owner, repo, message)
            .await;
        release(workspace);
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn push_in(
        &self,
        git: &Git,
        dir: &Path,
        url: &str,
        project: &Project,
        owner: &str,
        repo: &str,
        message: Option<&str>,
    ) -> Result<PushOutcome, SyncError> {
        git.clone_into(url)
            .await
            .map_err(|e| SyncError::repository_access(owner, repo, e))?;
        git.configure_identity(COMMITTER_NAME, COMMITTER_EMAIL)
            .await?;

        clear_worktree(dir).await?;
        let report = write_tree(dir, &project.file_tree).await;

        git.add_all().await?;
        let changed = git.changed_files().await?;
        info!(
            project = %project.id,
            repo = %format!("{owner}/{repo}"),
            changed = changed.len(),
            "Staged project files"
        );

        if changed.is_empty() {
            let logs = if report.diagnostics.is_empty() {
                "None".to_string()
            } else {
                report.diagnostics.join(", ")
            };
            return Ok(PushOutcome {
                changed_files: changed,
                message: format!(
                    "No changes detected to push.\nDebug Stats:\n- Files in tree: {}\n- Files written: {}\n- Changed files: 0\n- Logs: {logs}",
                    project.file_tree.len(),
                    report.written,
                ),
            });
        }

        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_COMMIT_MESSAGE);
        git.commit(message).await?;
        git.push("origin", BRANCH).await?;

        let message = format!("Pushed successfully.\nFiles: {}", summarize_files(&changed));
        Ok(PushOutcome {
            changed_files: changed,
            message,
        })
    }

    /// Replace the project's file tree with the contents of the remote
    /// default branch and persist it through `store`.
    pub async fn pull(
        &self,
        project: &mut Project,
        owner: &str,
        repo: &str,
        store: &dyn ProjectStore,
    ) -> Result<PullOutcome, SyncError> {
        let url = self.remote.url(owner, repo)?;
        let workspace = self.workspace(PULL_PREFIX).await?;
        let git = Git::new(workspace.path()).with_secret(self.remote.token());

        let result = async {
            git.clone_into(&url)
                .await
                .map_err(|e| SyncError::repository_access(owner, repo, e))?;
            Ok::<_, SyncError>(read_tree(workspace.path()).await?)
        }
        .await;
        release(workspace);
        let file_tree = result?;

        store.save_file_tree(&project.id, &file_tree).await?;
        project.file_tree = file_tree.clone();
        info!(project = %project.id, files = file_tree.len(), "Project updated from remote");

        Ok(PullOutcome {
            message: "Pulled successfully. Project updated.".to_string(),
            file_tree,
        })
    }

    async fn workspace(&self, prefix: &str) -> Result<TempDir, SyncError> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.work_dir)?;
        debug!(dir = %dir.path().display(), "Created sync workspace");
        Ok(dir)
    }
}

fn release(workspace: TempDir) {
    let path = workspace.path().to_path_buf();
    if let Err(e) = workspace.close() {
        warn!(dir = %path.display(), error = %e, "Failed to remove sync workspace");
    }
}

fn summarize_files(files: &[String]) -> String {
    let listed = files
        .iter()
        .take(LISTED_FILES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if files.len() > LISTED_FILES {
        format!("{listed} and {} more", files.len() - LISTED_FILES)
    } else {
        listed
    }
}
