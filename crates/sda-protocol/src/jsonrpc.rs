use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::ChatMessage;
use crate::error::ProtocolError;

const VERSION: &str = "2.0";

/// JSON-RPC 2.0 request, one per line on the daemon socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: RequestId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: RequestId,
}

/// Pushed by the daemon to room members; carries no id and expects no reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

// Standard JSON-RPC error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Daemon method names.
pub mod methods {
    pub const PROJECT_CREATE: &str = "project/create";
    pub const PROJECT_GET: &str = "project/get";
    pub const PROJECT_UPDATE_FILES: &str = "project/update_files";
    pub const PROJECT_JOIN: &str = "project/join";
    /// Both the request posting a chat message and the notification relaying it.
    pub const PROJECT_MESSAGE: &str = "project/message";
    pub const GITHUB_CHECK: &str = "github/check";
    pub const STATUS: &str = "status";
    pub const SHUTDOWN: &str = "shutdown";
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Decode the params object into the method's parameter type.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| ProtocolError::InvalidParams("missing params".to_string()))?;
        T::deserialize(params).map_err(|e| ProtocolError::InvalidParams(e.to_string()))
    }
}

impl JsonRpcResponse {
    pub fn success(result: Value, id: RequestId) -> Self {
        Self {
            jsonrpc: VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(code: i32, message: impl Into<String>, id: RequestId) -> Self {
        Self {
            jsonrpc: VERSION.to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }

    pub fn from_error(err: &ProtocolError, id: RequestId) -> Self {
        Self::error(err.code(), err.to_string(), id)
    }
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: VERSION.to_string(),
            method: method.into(),
            params,
        }
    }

    /// Relay of a chat message to the other members of its room.
    pub fn room_message(message: &ChatMessage) -> Result<Self, serde_json::Error> {
        Ok(Self::new(methods::PROJECT_MESSAGE, serde_json::to_value(message)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_params_decode_from_a_client_line() {
        let line = r#"{"jsonrpc":"2.0","method":"project/message","params":{"project_id":"p1","message":"@github status","sender":"alice"},"id":"web-7"}"#;
        let request: JsonRpcRequest = serde_json::from_str(line).unwrap();
        assert_eq!(request.id, RequestId::String("web-7".to_string()));

        let message: ChatMessage = request.params().unwrap();
        assert_eq!(message.project_id, "p1");
        assert_eq!(message.message, "@github status");
    }

    #[test]
    fn missing_or_mistyped_params_are_invalid() {
        let request = JsonRpcRequest::new(methods::PROJECT_JOIN, None, RequestId::Number(1));
        let err = request.params::<ChatMessage>().unwrap_err();
        assert_eq!(err.code(), INVALID_PARAMS);

        let request = JsonRpcRequest::new(
            methods::PROJECT_MESSAGE,
            Some(json!({ "project_id": 42 })),
            RequestId::Number(2),
        );
        let response = JsonRpcResponse::from_error(
            &request.params::<ChatMessage>().unwrap_err(),
            request.id.clone(),
        );
        let error = response.error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
        assert!(error.message.starts_with("Invalid params:"));
        assert!(response.result.is_none());
    }

    #[test]
    fn room_message_relays_the_chat_message_without_id() {
        let message = ChatMessage {
            project_id: "p1".to_string(),
            message: "hello".to_string(),
            sender: "bob".to_string(),
        };
        let note = JsonRpcNotification::room_message(&message).unwrap();
        assert_eq!(note.method, methods::PROJECT_MESSAGE);

        let value = serde_json::to_value(&note).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["params"]["sender"], "bob");
    }
}
