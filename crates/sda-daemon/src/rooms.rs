use sda_protocol::ChatMessage;
use std::collections::{HashMap, HashSet};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

/// Identifies one client connection for the lifetime of the daemon.
pub type ConnectionId = u64;

const ROOM_CAPACITY: usize = 256;

/// A chat message fanned out to a project room.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    /// Sending connection, which does not receive its own event. `None`
    /// reaches every member.
    pub origin: Option<ConnectionId>,
    pub message: ChatMessage,
}

impl RoomEvent {
    pub fn is_visible_to(&self, connection: ConnectionId) -> bool {
        self.origin != Some(connection)
    }
}

struct Room {
    sender: broadcast::Sender<RoomEvent>,
    members: HashSet<ConnectionId>,
}

/// One broadcast channel per project that has members.
#[derive(Default)]
pub struct Rooms {
    rooms: Mutex<HashMap<String, Room>>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection` to the project's room and subscribe it.
    pub async fn join(
        &self,
        project_id: &str,
        connection: ConnectionId,
    ) -> broadcast::Receiver<RoomEvent> {
        let mut rooms = self.rooms.lock().await;
        let room = rooms.entry(project_id.to_string()).or_insert_with(|| Room {
            sender: broadcast::channel(ROOM_CAPACITY).0,
            members: HashSet::new(),
        });
        room.members.insert(connection);
        debug!(project = %project_id, connection, members = room.members.len(), "Joined room");
        room.sender.subscribe()
    }

    /// Remove `connection` from every room, dropping rooms left empty.
    pub async fn leave_all(&self, connection: ConnectionId) {
        let mut rooms = self.rooms.lock().await;
        rooms.retain(|_, room| {
            room.members.remove(&connection);
            !room.members.is_empty()
        });
    }

    /// Send `event` to the room. Returns how many members it reaches.
    pub async fn publish(&self, project_id: &str, event: RoomEvent) -> usize {
        let rooms = self.rooms.lock().await;
        let Some(room) = rooms.get(project_id) else {
            return 0;
        };
        let delivered = room
            .members
            .iter()
            .filter(|member| event.is_visible_to(**member))
            .count();
        // No live receivers is not an error; members may be mid-disconnect.
        let _ = room.sender.send(event);
        delivered
    }

    pub async fn count(&self) -> usize {
        self.rooms.lock().await.len()
    }
}
