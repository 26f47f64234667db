//! ID utilities (room ids, session ids).

use ulid::Ulid;
use uuid::Uuid;

/// Generate a short room ID using ULID, truncated for readability.
pub fn new_room_id() -> String {
    let ulid = Ulid::new().to_string();
    // 26-char ULID, take first 10. Collisions are vanishingly unlikely at
    // this fleet size.
    ulid.chars().take(10).collect()
}

/// Generate a session identifier for one WebSocket connection.
///
/// Ephemeral: a reconnecting client gets a fresh one. Distinct from the
/// external user id supplied by the auth collaborator.
pub fn new_session_id() -> Uuid {
    Uuid::new_v4()
}
