use async_trait::async_trait;
use sda_protocol::{FileTree, Project};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Project not found: {0}")]
    NotFound(String),
    #[error("Project name is required")]
    InvalidName,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt project record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Owner of project state. Saves are last-write-wins.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Create a project; the name is trimmed and lowercased.
    async fn create(&self, name: &str, file_tree: FileTree) -> Result<Project, StoreError>;

    async fn get(&self, id: &str) -> Result<Project, StoreError>;

    /// Replace the project's file tree.
    async fn save_file_tree(&self, id: &str, file_tree: &FileTree) -> Result<(), StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

fn new_project(name: &str, file_tree: FileTree) -> Result<Project, StoreError> {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return Err(StoreError::InvalidName);
    }
    Ok(Project::new(uuid::Uuid::new_v4().to_string(), name).with_file_tree(file_tree))
}

/// Process-local store, used when no data directory is configured.
#[derive(Default)]
pub struct MemoryProjectStore {
    projects: RwLock<HashMap<String, Project>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn create(&self, name: &str, file_tree: FileTree) -> Result<Project, StoreError> {
        let project = new_project(name, file_tree)?;
        self.projects
            .write()
            .await
            .insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn get(&self, id: &str) -> Result<Project, StoreError> {
        self.projects
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn save_file_tree(&self, id: &str, file_tree: &FileTree) -> Result<(), StoreError> {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        project.file_tree = file_tree.clone();
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.projects.read().await.len())
    }
}

/// One `<id>.json` document per project under a data directory.
pub struct JsonProjectStore {
    dir: PathBuf,
}

impl JsonProjectStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        info!(dir = %dir.display(), "Project store opened");
        Ok(Self { dir })
    }

    /// Ids are UUIDs; anything else cannot name a record.
    fn record_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        let id = uuid::Uuid::parse_str(id).map_err(|_| StoreError::NotFound(id.to_string()))?;
        Ok(self.dir.join(format!("{id}.json")))
    }

    /// Each write goes through its own temp file, so overlapping saves of
    /// one project never see each other's partial output.
    async fn write(&self, project: &Project) -> Result<(), StoreError> {
        let path = self.record_path(&project.id)?;
        let bytes = serde_json::to_vec_pretty(project)?;
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)??;
        debug!(project = %project.id, "Project saved");
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for JsonProjectStore {
    async fn create(&self, name: &str, file_tree: FileTree) -> Result<Project, StoreError> {
        let project = new_project(name, file_tree)?;
        self.write(&project).await?;
        Ok(project)
    }

    async fn get(&self, id: &str) -> Result<Project, StoreError> {
        let path = self.record_path(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save_file_tree(&self, id: &str, file_tree: &FileTree) -> Result<(), StoreError> {
        let mut project = self.get(id).await?;
        project.file_tree = file_tree.clone();
        self.write(&project).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sda_protocol::FileEntry;

    fn sample_tree() -> FileTree {
        FileTree::from([("index.js".to_string(), FileEntry::file("1"))])
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryProjectStore::new();
        let project = store.create("  My Project ", sample_tree()).await.unwrap();
        assert_eq!(project.name, "my project");

        let updated = FileTree::from([("b.txt".to_string(), FileEntry::file("2"))]);
        store.save_file_tree(&project.id, &updated).await.unwrap();

        let loaded = store.get(&project.id).await.unwrap();
        assert_eq!(loaded.file_tree, updated);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let store = MemoryProjectStore::new();
        let err = store.create("   ", FileTree::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidName));
    }

    #[tokio::test]
    async fn json_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let project = {
            let store = JsonProjectStore::open(dir.path()).await.unwrap();
            store.create("demo", sample_tree()).await.unwrap()
        };

        let store = JsonProjectStore::open(dir.path()).await.unwrap();
        let loaded = store.get(&project.id).await.unwrap();
        assert_eq!(loaded, project);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn json_store_overlapping_saves_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(JsonProjectStore::open(dir.path()).await.unwrap());
        let project = store.create("busy", FileTree::new()).await.unwrap();

        let trees: Vec<FileTree> = (0..8)
            .map(|i| FileTree::from([(format!("f{i}.txt"), FileEntry::file(i.to_string()))]))
            .collect();

        for _ in 0..10 {
            let handles: Vec<_> = trees
                .iter()
                .cloned()
                .map(|tree| {
                    let store = store.clone();
                    let id = project.id.clone();
                    tokio::spawn(async move { store.save_file_tree(&id, &tree).await })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
        }

        let saved = store.get(&project.id).await.unwrap();
        assert!(trees.contains(&saved.file_tree));
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn json_store_rejects_non_uuid_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonProjectStore::open(dir.path()).await.unwrap();
        let err = store.get("../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err = store
            .save_file_tree(&uuid::Uuid::new_v4().to_string(), &sample_tree())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
