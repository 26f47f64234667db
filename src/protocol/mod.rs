//! Wire messages: everything that crosses the WebSocket in either direction.
//!
//! Both enums are internally tagged JSON. Malformed payloads and unknown
//! message names fail deserialization at the connection layer and are
//! dropped there, so game logic only ever sees well-formed variants.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::games::billiards::TablePhase;
use crate::games::drawing::RoundPhase;

/// Ephemeral identifier for one active connection. Distinct from the
/// persistent external user id supplied by the auth collaborator.
pub type SessionId = Uuid;

/// Join-time fields handed over by the external auth/profile collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinOptions {
    pub user_id: Option<String>,
    pub name: Option<String>,
}

impl JoinOptions {
    /// Display name to use for a joiner, generated when the collaborator
    /// supplied none.
    pub fn display_name(&self, session: SessionId) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => format!("guest-{}", &session.as_simple().to_string()[..6]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Online,
    Playing,
    Idle,
    Offline,
}

/// One participant as replicated to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub session_id: SessionId,
    pub user_id: Option<String>,
    pub name: String,
    pub status: UserStatus,
}

impl PlayerEntry {
    pub fn new(session: SessionId, opts: &JoinOptions) -> Self {
        Self {
            session_id: session,
            user_id: opts.user_id.clone(),
            name: opts.display_name(session),
            status: UserStatus::Online,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    #[default]
    Normal,
    System,
    Invite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: SessionId,
    pub user_id: Option<String>,
    pub name: String,
    pub content: String,
    pub kind: ChatKind,
    pub created_at: i64,
}

impl ChatMessage {
    pub fn new(sender: &PlayerEntry, content: String, kind: ChatKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: sender.session_id,
            user_id: sender.user_id.clone(),
            name: sender.name.clone(),
            content,
            kind,
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    /// Server-originated notice (join/leave announcements and the like).
    pub fn system(content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            user_id: None,
            name: "system".to_string(),
            content,
            kind: ChatKind::System,
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }
}

/// Ball position as replicated to clients; velocities stay server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BallView {
    pub id: u8,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub session_id: SessionId,
    pub name: String,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientToServer {
    Ping,
    // lobby
    Chat {
        content: String,
        #[serde(default)]
        kind: ChatKind,
    },
    PrivateMessage {
        target_user_id: String,
        content: String,
    },
    UpdateStatus {
        status: UserStatus,
    },
    // billiards
    Shoot {
        angle: f32,
        power: f32,
    },
    PlaceBall {
        x: f32,
        y: f32,
    },
    // drawing
    StartGame,
    SelectWord {
        index: usize,
    },
    Guess {
        content: String,
    },
    Stroke {
        points: Vec<[f32; 2]>,
    },
    // terminal-phase games only
    Restart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerToClient {
    /// Full-state snapshot, sent once to the joining session. Everything
    /// after it is an incremental, typed event.
    Welcome {
        session_id: SessionId,
        room_id: String,
        state: serde_json::Value,
    },
    Pong,
    Error {
        message: String,
    },
    // participants (all game kinds)
    UserJoined {
        user: PlayerEntry,
    },
    UserLeft {
        session_id: SessionId,
    },
    StatusChanged {
        session_id: SessionId,
        status: UserStatus,
    },
    // lobby chat
    Chat {
        message: ChatMessage,
    },
    Private {
        message: ChatMessage,
    },
    // billiards
    SeatAssigned {
        session_id: SessionId,
        seat: u8,
    },
    TableState {
        phase: TablePhase,
        current_turn: Option<SessionId>,
        moving: bool,
        foul: Option<String>,
        winner: Option<SessionId>,
    },
    BallsMoved {
        balls: Vec<BallView>,
    },
    BallPocketed {
        ball_id: u8,
    },
    CuePlaced {
        x: f32,
        y: f32,
    },
    GameOver {
        winner: Option<SessionId>,
    },
    // drawing
    RoundState {
        phase: RoundPhase,
        round: u8,
        time_left: u32,
    },
    DrawerSelected {
        session_id: SessionId,
    },
    /// Direct to the drawer only.
    WordChoices {
        words: Vec<String>,
    },
    WordHint {
        hint: String,
    },
    TimeLeft {
        seconds: u32,
    },
    Stroke {
        session_id: SessionId,
        points: Vec<[f32; 2]>,
    },
    GuessShown {
        session_id: SessionId,
        name: String,
        content: String,
    },
    CorrectGuess {
        session_id: SessionId,
        score: u32,
    },
    Scoreboard {
        scores: Vec<ScoreEntry>,
    },
    RoundResult {
        word: String,
        scores: Vec<ScoreEntry>,
    },
}
