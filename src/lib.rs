//! Authoritative multiplayer room server for the game portal.
//!
//! Each room is one in-memory, server-owned game session (lobby chat,
//! billiards table, or drawing game) running on its own task. Clients join
//! over WebSocket, receive a full state snapshot, then typed update events
//! for every mutation. All game state is mutated by the room task only.

pub mod config;
pub mod games;
pub mod http;
pub mod protocol;
pub mod room;
pub mod telemetry;
pub mod util;
pub mod ws;
