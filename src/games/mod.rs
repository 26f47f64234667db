//! Game types hosted by the room layer and the trait they implement.

pub mod billiards;
pub mod drawing;
pub mod lobby;
pub mod phase;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::{ClientToServer, JoinOptions, SessionId};
use crate::room::RoomCtx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    Lobby,
    Billiards,
    Drawing,
}

/// Per-game behavior behind the room actor. Every method runs on the room's
/// own task, so implementations mutate their state freely and push updates
/// through the [`RoomCtx`] without any locking.
pub trait GameLogic: Send + 'static {
    fn kind(&self) -> GameKind;

    /// Hard client cap for one room of this game, spectators included.
    fn max_clients(&self) -> usize;

    /// Full replicated state, as sent to a joining client in `welcome`.
    fn snapshot(&self) -> serde_json::Value;

    /// The session is already registered with the room; insert the player
    /// entry and announce it.
    fn on_join(&mut self, ctx: &RoomCtx, session: SessionId, opts: &JoinOptions);

    /// The session is already unregistered. `consented` distinguishes a
    /// graceful close from a dropped connection.
    fn on_leave(&mut self, ctx: &RoomCtx, session: SessionId, consented: bool);

    /// Dispatch one validated client message. Messages that fail a
    /// phase/turn/sender precondition are dropped without mutation.
    fn on_message(&mut self, ctx: &RoomCtx, session: SessionId, msg: ClientToServer);

    /// Some(interval) if this game wants periodic simulation ticks.
    fn tick_interval(&self) -> Option<Duration> {
        None
    }

    fn on_tick(&mut self, _ctx: &RoomCtx, _dt: f32) {}
}

pub fn build(kind: GameKind) -> Box<dyn GameLogic> {
    match kind {
        GameKind::Lobby => Box::new(lobby::LobbyGame::new()),
        GameKind::Billiards => Box::new(billiards::BilliardsGame::new()),
        GameKind::Drawing => Box::new(drawing::DrawingGame::new()),
    }
}
