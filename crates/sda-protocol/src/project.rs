use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A project's full source tree: relative POSIX path to file entry.
///
/// Only leaf files are stored. Keys never start with `/` and never contain
/// a `..` segment (see [`is_valid_tree_path`]).
pub type FileTree = BTreeMap<String, FileEntry>;

/// One file in a [`FileTree`].
///
/// The IDE produces two shapes: `{"file": {"contents": "..."}}` and a bare
/// string. Anything else is kept verbatim so it survives a round trip, but
/// it has no usable contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileEntry {
    File { file: FileContents },
    Text(String),
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContents {
    pub contents: String,
}

impl FileEntry {
    /// Build an entry in the canonical `{"file": {"contents"}}` shape.
    pub fn file(contents: impl Into<String>) -> Self {
        FileEntry::File {
            file: FileContents {
                contents: contents.into(),
            },
        }
    }

    /// The UTF-8 body of this file, if the entry has one.
    pub fn contents(&self) -> Option<&str> {
        match self {
            FileEntry::File { file } => Some(&file.contents),
            FileEntry::Text(text) => Some(text),
            FileEntry::Other(_) => None,
        }
    }
}

/// Check that a tree key is a safe relative path.
///
/// Rejects empty paths, absolute paths, backslashes, empty / `.` / `..`
/// segments, and anything inside the `.git` metadata directory.
pub fn is_valid_tree_path(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return false;
    }
    let mut segments = path.split('/').peekable();
    if segments.peek() == Some(&".git") {
        return false;
    }
    segments.all(|s| !s.is_empty() && s != "." && s != "..")
}

/// A collaborative project as seen by the sync subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(rename = "fileTree", alias = "file_tree", default)]
    pub file_tree: FileTree,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            file_tree: FileTree::new(),
        }
    }

    pub fn with_file_tree(mut self, file_tree: FileTree) -> Self {
        self.file_tree = file_tree;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_shapes_deserialize() {
        let tree: FileTree = serde_json::from_str(
            r#"{
                "a.txt": {"file": {"contents": "x"}},
                "b.txt": "plain",
                "c.bin": {"directory": {}}
            }"#,
        )
        .unwrap();

        assert_eq!(tree["a.txt"].contents(), Some("x"));
        assert_eq!(tree["b.txt"].contents(), Some("plain"));
        assert_eq!(tree["c.bin"].contents(), None);
    }

    #[test]
    fn non_string_contents_are_unusable() {
        let entry: FileEntry = serde_json::from_str(r#"{"file": {"contents": 42}}"#).unwrap();
        assert!(matches!(entry, FileEntry::Other(_)));
        assert_eq!(entry.contents(), None);
    }

    #[test]
    fn unusable_entries_survive_serialization() {
        let raw = serde_json::json!({"file": {"contents": null}});
        let entry: FileEntry = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&entry).unwrap(), raw);
    }

    #[test]
    fn tree_path_validation() {
        assert!(is_valid_tree_path("src/App.jsx"));
        assert!(is_valid_tree_path(".gitignore"));
        assert!(is_valid_tree_path("a.b/c..d"));
        assert!(!is_valid_tree_path(""));
        assert!(!is_valid_tree_path("/etc/passwd"));
        assert!(!is_valid_tree_path("../escape"));
        assert!(!is_valid_tree_path("src/../../escape"));
        assert!(!is_valid_tree_path("src//double"));
        assert!(!is_valid_tree_path(".git/config"));
        assert!(!is_valid_tree_path("dir\\file"));
    }

    #[test]
    fn project_uses_ide_field_name() {
        let project = Project::new("p1", "demo")
            .with_file_tree(FileTree::from([("a.txt".to_string(), FileEntry::file("x"))]));
        let json = serde_json::to_value(&project).unwrap();
        assert_eq!(json["fileTree"]["a.txt"]["file"]["contents"], "x");

        let parsed: Project =
            serde_json::from_str(r#"{"id": "p1", "name": "demo", "file_tree": {}}"#).unwrap();
        assert!(parsed.file_tree.is_empty());
    }
}
