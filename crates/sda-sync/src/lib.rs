//! Moving project file trees between the project store and git remotes.
//!
//! - [`locator`] derives the remote repository name for a project
//! - [`engine`] pushes and pulls through temporary clones
//! - [`store`] persists projects

pub mod engine;
pub mod git;
pub mod locator;
pub mod store;
pub mod tree;

pub use engine::{GitRemote, PullOutcome, PushOutcome, SyncEngine, DEFAULT_COMMIT_MESSAGE};
pub use git::GitError;
pub use locator::{locate_repository, NameSource, RepoName};
pub use store::{JsonProjectStore, MemoryProjectStore, ProjectStore, StoreError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("GitHub token is not configured (set GITHUB_PERSONAL_ACCESS_TOKEN)")]
    MissingToken,
    #[error("Cannot access repository {repo}: {reason}")]
    RepositoryAccess { repo: String, reason: String },
    #[error(transparent)]
    Git(#[from] GitError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    fn repository_access(owner: &str, repo: &str, source: GitError) -> Self {
        Self::RepositoryAccess {
            repo: format!("{owner}/{repo}"),
            reason: source.to_string(),
        }
    }
}
