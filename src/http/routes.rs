//! HTTP routes: room creation and listing, health probe.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::games::GameKind;
use crate::room::Visibility;
use crate::room::manager::{RoomManager, RoomSummary};

#[derive(Clone)]
pub struct AppState {
    pub rooms: RoomManager,
}

pub async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub game: GameKind,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    pub room_id: String,
}

pub async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Json<CreateRoomResponse> {
    let visibility = if req.private { Visibility::Private } else { Visibility::Public };
    let room = state.rooms.create_room(req.game, visibility);
    Json(CreateRoomResponse { room_id: room.id().to_string() })
}

pub async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomSummary>> {
    Json(state.rooms.list_public())
}
