use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs `git` inside one working directory.
///
/// `secret` is scrubbed from every error message, so a token embedded in a
/// remote URL never reaches logs or chat replies.
pub struct Git {
    dir: PathBuf,
    secret: Option<String>,
}

impl Git {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            secret: None,
        }
    }

    pub fn with_secret(mut self, secret: Option<&str>) -> Self {
        self.secret = secret.filter(|s| !s.is_empty()).map(str::to_string);
        self
    }

    /// Clone `url` into the (empty) working directory itself.
    pub async fn clone_into(&self, url: &str) -> Result<(), GitError> {
        self.run(&["clone", url, "."]).await.map(drop)
    }

    /// Set the commit identity for this clone only.
    pub async fn configure_identity(&self, name: &str, email: &str) -> Result<(), GitError> {
        self.run(&["config", "user.name", name]).await?;
        self.run(&["config", "user.email", email]).await?;
        self.run(&["config", "commit.gpgsign", "false"]).await?;
        Ok(())
    }

    /// Stage additions, modifications and deletions.
    pub async fn add_all(&self) -> Result<(), GitError> {
        self.run(&["add", "-A"]).await.map(drop)
    }

    /// Paths with staged or unstaged changes relative to `HEAD`.
    pub async fn changed_files(&self) -> Result<Vec<String>, GitError> {
        let output = self.run(&["status", "--porcelain", "-z"]).await?;
        Ok(parse_porcelain_z(&output))
    }

    pub async fn commit(&self, message: &str) -> Result<(), GitError> {
        self.run(&["commit", "--no-verify", "-m", message])
            .await
            .map(drop)
    }

    /// Push the current `HEAD` to `branch` on `remote`.
    pub async fn push(&self, remote: &str, branch: &str) -> Result<(), GitError> {
        let refspec = format!("HEAD:refs/heads/{branch}");
        self.run(&["push", remote, &refspec]).await.map(drop)
    }

    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        debug!(command = args.first().copied().unwrap_or_default(), dir = %self.dir.display(), "Running git");

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(GitError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: self.redact(&stderr),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn redact(&self, text: &str) -> String {
        match &self.secret {
            Some(secret) => text.replace(secret.as_str(), "***"),
            None => text.to_string(),
        }
    }
}

/// Parse `git status --porcelain -z` output into paths.
///
/// Rename and copy records are followed by their source path, which is skipped.
fn parse_porcelain_z(output: &str) -> Vec<String> {
    let mut files = Vec::new();
    let mut records = output.split('\0').filter(|r| !r.is_empty());
    while let Some(record) = records.next() {
        if record.len() < 4 {
            continue;
        }
        let (status, path) = record.split_at(3);
        files.push(path.to_string());
        if status.starts_with('R') || status.starts_with('C') {
            records.next();
        }
    }
    files
}
