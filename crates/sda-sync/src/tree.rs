use sda_protocol::{is_valid_tree_path, FileEntry, FileTree};
use std::path::{Component, Path};
use tracing::{debug, warn};

const GIT_DIR: &str = ".git";

/// What happened while materializing a [`FileTree`] on disk.
#[derive(Debug, Default)]
pub struct WriteReport {
    pub written: usize,
    /// Per-file problems; none of them abort the write.
    pub diagnostics: Vec<String>,
}

/// Delete every top-level entry of `dir` except the `.git` directory.
pub async fn clear_worktree(dir: &Path) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name() == GIT_DIR {
            continue;
        }
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
    }
    Ok(())
}

/// Write every usable entry of `tree` below `dir`, creating parent directories.
pub async fn write_tree(dir: &Path, tree: &FileTree) -> WriteReport {
    let mut report = WriteReport::default();

    for (path, entry) in tree {
        if !is_valid_tree_path(path) {
            warn!(path = %path, "Skipping file with unsafe path");
            report.diagnostics.push(format!("Skipped {path} (invalid path)"));
            continue;
        }

        let Some(contents) = entry.contents() else {
            warn!(path = %path, "Skipping file without text contents");
            report.diagnostics.push(format!("Skipped {path} (invalid data)"));
            continue;
        };

        let full = dir.join(path);
        let written = async {
            if let Some(parent) = full.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&full, contents).await
        }
        .await;

        match written {
            Ok(()) => report.written += 1,
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to write file");
                report.diagnostics.push(format!("Error writing {path}: {e}"));
            }
        }
    }

    debug!(
        written = report.written,
        skipped = report.diagnostics.len(),
        "File tree written"
    );
    report
}

/// Read every file below `root` (skipping `.git`) into a fresh tree.
///
/// Keys use `/` separators regardless of platform. Files that are not valid
/// UTF-8 are decoded lossily. Symbolic links are skipped, never followed.
pub async fn read_tree(root: &Path) -> std::io::Result<FileTree> {
    let mut tree = FileTree::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name() == GIT_DIR {
                continue;
            }
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_symlink() {
                warn!(path = %tree_key(root, &path), "Skipping symbolic link");
                continue;
            }
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                    continue;
                }
            };
            let key = tree_key(root, &path);
            let contents = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %key, "File is not valid UTF-8, decoding lossily");
                    String::from_utf8_lossy(e.as_bytes()).into_owned()
                }
            };
            tree.insert(key, FileEntry::file(contents));
        }
    }

    Ok(tree)
}

fn tree_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
