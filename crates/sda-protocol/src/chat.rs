use serde::{Deserialize, Serialize};

use crate::project::FileTree;

/// Sender name used for replies produced by the GitHub command dispatcher.
pub const GITHUB_SENDER: &str = "github";

/// Severity of a dispatcher reply, rendered by the IDE as a colored badge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Success,
    Error,
    Info,
    Warning,
}

/// Reply produced for one chat command.
///
/// When `file_tree` is present the room's project must be persisted with
/// that tree before the reply is broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    #[serde(rename = "fileTree", default, skip_serializing_if = "Option::is_none")]
    pub file_tree: Option<FileTree>,
}

impl CommandResponse {
    fn new(kind: ResponseKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind,
            file_tree: None,
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(ResponseKind::Success, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(ResponseKind::Error, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(ResponseKind::Info, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(ResponseKind::Warning, text)
    }

    pub fn with_file_tree(mut self, file_tree: FileTree) -> Self {
        self.file_tree = Some(file_tree);
        self
    }
}

/// A chat message posted to a project room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub project_id: String,
    pub message: String,
    #[serde(default = "default_sender")]
    pub sender: String,
}

fn default_sender() -> String {
    "anonymous".to_string()
}

/// Result of `project/message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageOutcome {
    /// Number of other room members the message was forwarded to.
    pub delivered: usize,
    /// Dispatcher reply, when the message carried a command trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<CommandResponse>,
}

/// Params for `project/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub file_tree: FileTree,
}

/// Params for methods addressing a single project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRef {
    pub project_id: String,
}

/// Params for `project/update_files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateFilesRequest {
    pub project_id: String,
    pub file_tree: FileTree,
}

/// Result of `github/check`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionCheck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileEntry;

    #[test]
    fn response_wire_shape() {
        let resp = CommandResponse::warning("Unknown command");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], "warning");
        assert!(json.get("fileTree").is_none());
    }

    #[test]
    fn response_carries_file_tree() {
        let tree = FileTree::from([("a.txt".to_string(), FileEntry::file("x"))]);
        let resp = CommandResponse::success("Pulled").with_file_tree(tree);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], "success");
        assert_eq!(json["fileTree"]["a.txt"]["file"]["contents"], "x");
    }

    #[test]
    fn chat_message_defaults_sender() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"project_id": "p1", "message": "hello"}"#).unwrap();
        assert_eq!(msg.sender, "anonymous");
    }
}
