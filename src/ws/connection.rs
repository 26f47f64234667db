//! WebSocket connection lifecycle: upgrade, join resolution, socket pump.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::games::GameKind;
use crate::http::routes::AppState;
use crate::protocol::{ClientToServer, JoinOptions, ServerToClient, SessionId};
use crate::room::{JoinError, RoomHandle, Visibility};
use crate::util::id::new_session_id;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub game: GameKind,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub private: bool,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // joining an explicit room id that no longer exists fails before upgrade
    if let Some(id) = &params.room {
        if state.rooms.get(id).is_none() {
            return (StatusCode::NOT_FOUND, "room not found").into_response();
        }
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

async fn handle_socket(socket: WebSocket, state: AppState, params: WsParams) {
    let session = new_session_id();
    let (sv_tx, mut sv_rx) = mpsc::unbounded_channel::<ServerToClient>();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // forward server pushes to the socket
    let pump = tokio::spawn(async move {
        while let Some(msg) = sv_rx.recv().await {
            let Ok(text) = serde_json::to_string(&msg) else { continue };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let room = match resolve_room(&state, session, &params, sv_tx.clone()).await {
        Ok(room) => room,
        Err(err) => {
            // join errors go to the requesting client only
            let _ = sv_tx.send(ServerToClient::Error { message: err.to_string() });
            drop(sv_tx);
            let _ = pump.await;
            return;
        }
    };
    tracing::info!(room = %room.id(), %session, "ws connected");

    let mut consented = false;
    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientToServer>(&text) {
                // keepalive is answered here, the room never sees it
                Ok(ClientToServer::Ping) => {
                    let _ = sv_tx.send(ServerToClient::Pong);
                }
                Ok(msg) => room.message(session, msg),
                Err(err) => {
                    // malformed or unknown names are dropped, never fatal
                    tracing::debug!(%session, %err, "ignoring malformed message");
                }
            },
            Message::Close(_) => {
                consented = true;
                break;
            }
            _ => {}
        }
    }

    room.leave(session, consented);
    drop(sv_tx);
    let _ = pump.await;
    tracing::debug!(room = %room.id(), %session, consented, "ws closed");
}

async fn resolve_room(
    state: &AppState,
    session: SessionId,
    params: &WsParams,
    tx: mpsc::UnboundedSender<ServerToClient>,
) -> Result<RoomHandle, JoinError> {
    let opts = JoinOptions { user_id: params.user_id.clone(), name: params.name.clone() };
    if let Some(id) = &params.room {
        let room = state.rooms.get(id).ok_or(JoinError::NotFound)?;
        room.join(session, opts, tx).await?;
        return Ok(room);
    }
    let visibility = if params.private { Visibility::Private } else { Visibility::Public };
    state.rooms.join_or_create(params.game, visibility, session, opts, tx).await
}
