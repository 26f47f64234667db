//! Registry of rooms and task orchestration.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config;
use crate::games::{self, GameKind};
use crate::protocol::{JoinOptions, ServerToClient, SessionId};
use crate::room::{JoinError, Room, RoomHandle, Visibility};
use crate::util::id::new_room_id;

#[derive(Clone, Default)]
pub struct RoomManager {
    rooms: Arc<DashMap<String, RoomHandle>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub id: String,
    pub game: GameKind,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room and spawn its task. The registry entry is removed when
    /// the task ends (empty past grace, or cancelled).
    pub fn create_room(&self, kind: GameKind, visibility: Visibility) -> RoomHandle {
        let id = new_room_id();
        let logic = games::build(kind);
        let (handle, task) = Room::spawn(id.clone(), visibility, logic, config::empty_room_grace());
        self.rooms.insert(id.clone(), handle.clone());
        tracing::info!(room = %id, game = ?kind, "room created");

        let rooms = Arc::clone(&self.rooms);
        tokio::spawn(async move {
            let _ = task.await;
            rooms.remove(&id);
            tracing::debug!(room = %id, "room removed from registry");
        });
        handle
    }

    pub fn get(&self, id: &str) -> Option<RoomHandle> {
        self.rooms.get(id).map(|r| r.clone())
    }

    pub fn list_public(&self) -> Vec<RoomSummary> {
        self.rooms
            .iter()
            .filter(|r| r.value().visibility() == Visibility::Public)
            .map(|r| RoomSummary { id: r.value().id().to_string(), game: r.value().kind() })
            .collect()
    }

    /// Join an existing public room of `kind`, or create a fresh one. Full
    /// or already-closed rooms are skipped; the capacity check itself lives
    /// in the room task, before any state mutation.
    pub async fn join_or_create(
        &self,
        kind: GameKind,
        visibility: Visibility,
        session: SessionId,
        opts: JoinOptions,
        client_tx: mpsc::UnboundedSender<ServerToClient>,
    ) -> Result<RoomHandle, JoinError> {
        if visibility == Visibility::Public {
            for room in self.public_rooms(kind) {
                match room.join(session, opts.clone(), client_tx.clone()).await {
                    Ok(()) => return Ok(room),
                    Err(JoinError::Full | JoinError::Closed) => continue,
                    Err(err) => return Err(err),
                }
            }
        }
        let room = self.create_room(kind, visibility);
        room.join(session, opts, client_tx).await?;
        Ok(room)
    }

    fn public_rooms(&self, kind: GameKind) -> Vec<RoomHandle> {
        self.rooms
            .iter()
            .filter(|r| r.value().kind() == kind && r.value().visibility() == Visibility::Public)
            .map(|r| r.value().clone())
            .collect()
    }
}
