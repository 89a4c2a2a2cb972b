use sda_github::{check_connection, GitHubApi};
use sda_protocol::*;
use sda_sync::{ProjectStore, StoreError, SyncEngine};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{extract_trigger, Dispatcher};
use crate::config::Config;
use crate::rooms::{ConnectionId, RoomEvent, Rooms};

/// Per-connection state: the outgoing line queue and room subscriptions.
pub struct Session {
    pub id: ConnectionId,
    outbox: mpsc::UnboundedSender<String>,
    subscriptions: std::sync::Mutex<Subscriptions>,
}

#[derive(Default)]
struct Subscriptions {
    projects: HashSet<String>,
    forwarders: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn new(id: ConnectionId, outbox: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id,
            outbox,
            subscriptions: std::sync::Mutex::new(Subscriptions::default()),
        }
    }

    /// Queue one line for the client. Returns false once the writer is gone.
    pub fn send(&self, line: String) -> bool {
        self.outbox.send(line).is_ok()
    }

    /// Stop forwarding room events to this connection.
    pub fn close(&self) {
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            for forwarder in subscriptions.forwarders.drain(..) {
                forwarder.abort();
            }
            subscriptions.projects.clear();
        }
    }
}

/// Handles incoming JSON-RPC requests.
pub struct RequestHandler {
    config: Arc<Config>,
    store: Arc<dyn ProjectStore>,
    github: Arc<dyn GitHubApi>,
    dispatcher: Dispatcher,
    rooms: Rooms,
}

impl RequestHandler {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ProjectStore>,
        github: Arc<dyn GitHubApi>,
        sync: Arc<SyncEngine>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            github.clone(),
            sync,
            store.clone(),
            config.github.default_owner.clone(),
        );
        Self {
            config,
            store,
            github,
            dispatcher,
            rooms: Rooms::new(),
        }
    }

    /// Process a JSON-RPC request and return a response.
    pub async fn handle(&self, request: JsonRpcRequest, session: &Session) -> JsonRpcResponse {
        debug!(method = %request.method, connection = session.id, "Handling request");

        match request.method.as_str() {
            methods::PROJECT_CREATE => self.handle_create(request).await,
            methods::PROJECT_GET => self.handle_get(request).await,
            methods::PROJECT_UPDATE_FILES => self.handle_update_files(request).await,
            methods::PROJECT_JOIN => self.handle_join(request, session).await,
            methods::PROJECT_MESSAGE => self.handle_message(request, session).await,
            methods::GITHUB_CHECK => self.handle_github_check(request).await,
            methods::STATUS => self.handle_status(request).await,
            methods::SHUTDOWN => self.handle_shutdown(request).await,
            _ => {
                let err = ProtocolError::UnknownMethod(request.method.clone());
                JsonRpcResponse::from_error(&err, request.id)
            }
        }
    }

    /// Forget everything tied to a closed connection.
    pub async fn disconnect(&self, session: &Session) {
        session.close();
        self.rooms.leave_all(session.id).await;
    }

    async fn handle_create(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let params: CreateProjectRequest = match request.params() {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::from_error(&e, request.id),
        };

        match self.store.create(&params.name, params.file_tree).await {
            Ok(project) => {
                info!(project = %project.id, name = %project.name, "Project created");
                to_response(&project, request.id)
            }
            Err(e) => store_error(e, request.id),
        }
    }

    async fn handle_get(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let params: ProjectRef = match request.params() {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::from_error(&e, request.id),
        };

        match self.store.get(&params.project_id).await {
            Ok(project) => to_response(&project, request.id),
            Err(e) => store_error(e, request.id),
        }
    }

    async fn handle_update_files(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let params: UpdateFilesRequest = match request.params() {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::from_error(&e, request.id),
        };

        let saved = self
            .store
            .save_file_tree(&params.project_id, &params.file_tree)
            .await;
        if let Err(e) = saved {
            return store_error(e, request.id);
        }
        debug!(project = %params.project_id, files = params.file_tree.len(), "File tree saved");

        match self.store.get(&params.project_id).await {
            Ok(project) => to_response(&project, request.id),
            Err(e) => store_error(e, request.id),
        }
    }

    async fn handle_join(&self, request: JsonRpcRequest, session: &Session) -> JsonRpcResponse {
        let params: ProjectRef = match request.params() {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::from_error(&e, request.id),
        };
        if let Err(e) = self.store.get(&params.project_id).await {
            return store_error(e, request.id);
        }

        let already_joined = match session.subscriptions.lock() {
            Ok(subscriptions) => subscriptions.projects.contains(&params.project_id),
            Err(_) => false,
        };
        if !already_joined {
            let events = self.rooms.join(&params.project_id, session.id).await;
            let forwarder = tokio::spawn(forward_events(
                events,
                session.id,
                session.outbox.clone(),
            ));
            if let Ok(mut subscriptions) = session.subscriptions.lock() {
                subscriptions.projects.insert(params.project_id.clone());
                subscriptions.forwarders.push(forwarder);
            }
            info!(project = %params.project_id, connection = session.id, "Connection joined project room");
        }

        JsonRpcResponse::success(serde_json::json!({ "joined": params.project_id }), request.id)
    }

    async fn handle_message(&self, request: JsonRpcRequest, session: &Session) -> JsonRpcResponse {
        let message: ChatMessage = match request.params() {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::from_error(&e, request.id),
        };
        let project_id = message.project_id.clone();

        let delivered = self
            .rooms
            .publish(
                &project_id,
                RoomEvent {
                    origin: Some(session.id),
                    message: message.clone(),
                },
            )
            .await;

        let reply = match extract_trigger(&message.message) {
            Some(command) => Some(self.run_command(&project_id, &command).await),
            None => None,
        };

        if let Some(reply) = &reply {
            match serde_json::to_string(reply) {
                Ok(text) => {
                    let event = RoomEvent {
                        origin: None,
                        message: ChatMessage {
                            project_id: project_id.clone(),
                            message: text,
                            sender: GITHUB_SENDER.to_string(),
                        },
                    };
                    self.rooms.publish(&project_id, event).await;
                }
                Err(e) => warn!(error = %e, "Failed to serialize command reply"),
            }
        }

        to_response(&MessageOutcome { delivered, reply }, request.id)
    }

    /// Load the latest project state and dispatch. A pull persists its tree
    /// through the sync engine, so the reply is only relayed here.
    async fn run_command(&self, project_id: &str, command: &str) -> CommandResponse {
        let project = match self.store.get(project_id).await {
            Ok(project) => project,
            Err(e) => {
                warn!(project = %project_id, error = %e, "Cannot load project for command");
                return CommandResponse::error(format!("GitHub processing error: {e}"));
            }
        };

        info!(project = %project_id, command = %command, "Running GitHub command");
        self.dispatcher.dispatch(command, &project).await
    }

    async fn handle_github_check(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let check = check_connection(self.github.as_ref()).await;
        to_response(&check, request.id)
    }

    async fn handle_status(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let projects = match self.store.count().await {
            Ok(count) => count,
            Err(e) => return store_error(e, request.id),
        };
        let status = serde_json::json!({
            "status": "running",
            "projects": projects,
            "rooms": self.rooms.count().await,
            "github_configured": self.config.github.token.is_some(),
            "default_owner": self.config.github.default_owner,
            "persistent": self.config.store.data_dir.is_some(),
        });
        JsonRpcResponse::success(status, request.id)
    }

    async fn handle_shutdown(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        info!("Shutdown requested");
        JsonRpcResponse::success(Value::String("shutting down".to_string()), request.id)
    }
}

/// Relay room events to one connection until it goes away.
async fn forward_events(
    mut events: tokio::sync::broadcast::Receiver<RoomEvent>,
    connection: ConnectionId,
    outbox: mpsc::UnboundedSender<String>,
) {
    loop {
        match events.recv().await {
            Ok(event) if event.is_visible_to(connection) => {
                match JsonRpcNotification::room_message(&event.message)
                    .and_then(|note| serde_json::to_string(&note))
                {
                    Ok(line) => {
                        if outbox.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to serialize notification"),
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(connection, skipped, "Connection fell behind, messages dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn store_error(err: StoreError, id: RequestId) -> JsonRpcResponse {
    let code = match err {
        StoreError::NotFound(_) | StoreError::InvalidName => INVALID_PARAMS,
        StoreError::Io(_) | StoreError::Serialization(_) => INTERNAL_ERROR,
    };
    JsonRpcResponse::error(code, err.to_string(), id)
}

fn to_response<T: serde::Serialize>(value: &T, id: RequestId) -> JsonRpcResponse {
    match serde_json::to_value(value) {
        Ok(result) => JsonRpcResponse::success(result, id),
        Err(e) => JsonRpcResponse::error(INTERNAL_ERROR, format!("Serialization failed: {e}"), id),
    }
}
