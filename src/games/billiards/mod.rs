//! Billiards room: seats, shot lifecycle, table phase machine.
//!
//! Two seats, assigned in join order; everyone past the second seat is a
//! spectator who receives state but whose action messages are dropped by the
//! seat/turn gates. Ball motion is advanced by the room tick and the shot is
//! judged only once the table settles.

pub mod physics;

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::games::phase::{Phase, PhaseMachine};
use crate::games::{GameKind, GameLogic};
use crate::protocol::{
    BallView, ClientToServer, JoinOptions, PlayerEntry, ServerToClient, SessionId,
};
use crate::room::RoomCtx;
use self::physics::{BALL_RADIUS, BLACK_ID, Ball, BallKind, CUE_ID, TABLE_HEIGHT, TABLE_WIDTH};

pub const MAX_CLIENTS: usize = 8;
pub const TICK: Duration = Duration::from_millis(16);
const MAX_SHOT_POWER: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TablePhase {
    Waiting,
    Playing,
    Placing,
    Ended,
    Disconnected,
}

impl Phase for TablePhase {
    fn can_transition(self, next: Self) -> bool {
        use TablePhase::*;
        matches!(
            (self, next),
            (Waiting, Playing)
                | (Playing, Placing)
                | (Playing, Ended)
                | (Playing, Disconnected)
                | (Placing, Playing)
                | (Placing, Disconnected)
                | (Ended, Waiting)
                | (Disconnected, Waiting)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, TablePhase::Ended | TablePhase::Disconnected)
    }
}

/// Outcome of the seat policy for one joiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatDecision {
    Seat(usize),
    Spectator,
}

/// Deterministic by join order: first free seat, everyone after that
/// spectates. Standalone so the policy is testable without a live room.
pub fn assign_seat(seats: &[Option<SessionId>; 2]) -> SeatDecision {
    match seats.iter().position(|s| s.is_none()) {
        Some(i) => SeatDecision::Seat(i),
        None => SeatDecision::Spectator,
    }
}

fn other_group(kind: BallKind) -> BallKind {
    match kind {
        BallKind::Solid => BallKind::Stripe,
        BallKind::Stripe => BallKind::Solid,
        other => other,
    }
}

#[derive(Serialize)]
pub struct BilliardsGame {
    players: HashMap<SessionId, PlayerEntry>,
    seats: [Option<SessionId>; 2],
    /// Solid/stripe assignment per seat, decided by the first potted object
    /// ball.
    groups: [Option<BallKind>; 2],
    phase: PhaseMachine<TablePhase>,
    current_turn: Option<SessionId>,
    moving: bool,
    balls: Vec<Ball>,
    foul_message: Option<String>,
    winner: Option<SessionId>,
    #[serde(skip)]
    arrival: Vec<SessionId>,
    #[serde(skip)]
    pocketed_this_shot: Vec<u8>,
    #[serde(skip)]
    pending_disconnect: bool,
}

impl Default for BilliardsGame {
    fn default() -> Self {
        Self::new()
    }
}

impl BilliardsGame {
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
            seats: [None, None],
            groups: [None, None],
            phase: PhaseMachine::new(TablePhase::Waiting),
            current_turn: None,
            moving: false,
            balls: physics::rack(),
            foul_message: None,
            winner: None,
            arrival: Vec::new(),
            pocketed_this_shot: Vec::new(),
            pending_disconnect: false,
        }
    }

    fn seat_of(&self, session: SessionId) -> Option<usize> {
        self.seats.iter().position(|s| *s == Some(session))
    }

    fn opponent_of(&self, session: SessionId) -> Option<SessionId> {
        let seat = self.seat_of(session)?;
        self.seats[1 - seat]
    }

    fn kind_of(&self, id: u8) -> Option<BallKind> {
        self.balls.iter().find(|b| b.id == id).map(|b| b.kind)
    }

    fn visible_balls(&self) -> Vec<BallView> {
        self.balls
            .iter()
            .filter(|b| b.visible)
            .map(|b| BallView { id: b.id, x: b.x, y: b.y })
            .collect()
    }

    fn broadcast_table(&self, ctx: &RoomCtx) {
        ctx.broadcast(&ServerToClient::TableState {
            phase: self.phase.current(),
            current_turn: self.current_turn,
            moving: self.moving,
            foul: self.foul_message.clone(),
            winner: self.winner,
        });
    }

    fn try_start(&mut self, ctx: &RoomCtx) {
        if self.phase.current() != TablePhase::Waiting {
            return;
        }
        if self.seats.iter().all(|s| s.is_some()) && self.phase.transition(TablePhase::Playing) {
            // coin toss for the break, like the card tables do
            let first = if rand::random::<bool>() { 0 } else { 1 };
            self.current_turn = self.seats[first];
            self.broadcast_table(ctx);
        }
    }

    fn handle_shoot(&mut self, ctx: &RoomCtx, session: SessionId, angle: f32, power: f32) {
        if self.phase.current() != TablePhase::Playing || self.moving {
            return;
        }
        if self.current_turn != Some(session) {
            return;
        }
        if !angle.is_finite() || !power.is_finite() {
            return;
        }
        let power = power.clamp(0.0, MAX_SHOT_POWER);
        if power <= 0.0 {
            return;
        }
        let Some(cue) = self.balls.iter_mut().find(|b| b.id == CUE_ID && b.visible) else {
            return;
        };
        cue.vx = angle.cos() * power;
        cue.vy = angle.sin() * power;
        self.moving = true;
        self.pocketed_this_shot.clear();
        self.foul_message = None;
        self.broadcast_table(ctx);
    }

    fn handle_place(&mut self, ctx: &RoomCtx, session: SessionId, x: f32, y: f32) {
        if self.phase.current() != TablePhase::Placing {
            return;
        }
        if self.current_turn != Some(session) {
            return;
        }
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        if !(BALL_RADIUS..=TABLE_WIDTH - BALL_RADIUS).contains(&x)
            || !(BALL_RADIUS..=TABLE_HEIGHT - BALL_RADIUS).contains(&y)
        {
            return;
        }
        // cannot drop the cue onto another ball
        let blocked = self.balls.iter().any(|b| {
            if !b.visible || b.id == CUE_ID {
                return false;
            }
            let dx = b.x - x;
            let dy = b.y - y;
            (dx * dx + dy * dy).sqrt() < BALL_RADIUS * 2.0
        });
        if blocked {
            return;
        }
        let Some(cue) = self.balls.iter_mut().find(|b| b.id == CUE_ID) else {
            return;
        };
        cue.x = x;
        cue.y = y;
        cue.vx = 0.0;
        cue.vy = 0.0;
        cue.visible = true;
        self.foul_message = None;
        self.phase.transition(TablePhase::Playing);
        ctx.broadcast(&ServerToClient::CuePlaced { x, y });
        self.broadcast_table(ctx);
    }

    fn handle_restart(&mut self, ctx: &RoomCtx, session: SessionId) {
        if !self.phase.is_terminal() {
            return;
        }
        if self.seat_of(session).is_none() {
            return;
        }
        self.reset(ctx);
    }

    /// Back to a fresh table, reseating the connected players in arrival
    /// order.
    fn reset(&mut self, ctx: &RoomCtx) {
        self.balls = physics::rack();
        self.groups = [None, None];
        self.foul_message = None;
        self.winner = None;
        self.moving = false;
        self.current_turn = None;
        self.pocketed_this_shot.clear();
        self.pending_disconnect = false;
        self.seats = [None, None];
        self.phase.transition(TablePhase::Waiting);
        let arrival = self.arrival.clone();
        for session in arrival {
            if let SeatDecision::Seat(i) = assign_seat(&self.seats) {
                self.seats[i] = Some(session);
                ctx.broadcast(&ServerToClient::SeatAssigned { session_id: session, seat: i as u8 });
            } else {
                break;
            }
        }
        self.broadcast_table(ctx);
        ctx.broadcast(&ServerToClient::BallsMoved { balls: self.visible_balls() });
        self.try_start(ctx);
    }

    /// Judge the shot once every ball is at rest.
    fn settle_shot(&mut self, ctx: &RoomCtx) {
        if self.pending_disconnect {
            self.pending_disconnect = false;
            self.phase.transition(TablePhase::Disconnected);
            self.broadcast_table(ctx);
            return;
        }
        let Some(shooter) = self.current_turn else {
            self.broadcast_table(ctx);
            return;
        };
        let pocketed = std::mem::take(&mut self.pocketed_this_shot);
        let scratched = pocketed.contains(&CUE_ID);
        let black_potted = pocketed.contains(&BLACK_ID);
        let shooter_seat = self.seat_of(shooter);

        if black_potted {
            // legal only with the shooter's own group already cleared and no
            // scratch on the same shot
            let legal =
                !scratched && shooter_seat.is_some_and(|seat| self.group_cleared(seat));
            self.winner = if legal { Some(shooter) } else { self.opponent_of(shooter) };
            self.phase.transition(TablePhase::Ended);
            ctx.broadcast(&ServerToClient::GameOver { winner: self.winner });
            self.broadcast_table(ctx);
            return;
        }

        // the first potted object ball decides the groups
        if let Some(seat) = shooter_seat {
            if self.groups[seat].is_none() {
                let first = pocketed
                    .iter()
                    .filter_map(|id| self.kind_of(*id))
                    .find(|k| matches!(k, BallKind::Solid | BallKind::Stripe));
                if let Some(kind) = first {
                    self.groups[seat] = Some(kind);
                    self.groups[1 - seat] = Some(other_group(kind));
                }
            }
        }

        if scratched {
            self.foul_message = Some("scratch: opponent has ball in hand".to_string());
            self.current_turn = self.opponent_of(shooter);
            self.phase.transition(TablePhase::Placing);
        } else if !self.potted_own(shooter_seat, &pocketed) {
            self.current_turn = self.opponent_of(shooter);
        }
        self.broadcast_table(ctx);
    }

    fn group_cleared(&self, seat: usize) -> bool {
        match self.groups[seat] {
            Some(kind) => self.balls.iter().filter(|b| b.kind == kind).all(|b| !b.visible),
            // potting the black before the groups exist always loses
            None => false,
        }
    }

    fn potted_own(&self, seat: Option<usize>, pocketed: &[u8]) -> bool {
        let Some(seat) = seat else { return false };
        match self.groups[seat] {
            Some(kind) => pocketed.iter().any(|id| self.kind_of(*id) == Some(kind)),
            None => pocketed.iter().any(|id| *id != CUE_ID && *id != BLACK_ID),
        }
    }
}

impl GameLogic for BilliardsGame {
    fn kind(&self) -> GameKind {
        GameKind::Billiards
    }

    fn max_clients(&self) -> usize {
        MAX_CLIENTS
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn on_join(&mut self, ctx: &RoomCtx, session: SessionId, opts: &JoinOptions) {
        let entry = PlayerEntry::new(session, opts);
        self.players.insert(session, entry.clone());
        self.arrival.push(session);
        ctx.broadcast(&ServerToClient::UserJoined { user: entry });
        if self.phase.current() == TablePhase::Waiting {
            if let SeatDecision::Seat(i) = assign_seat(&self.seats) {
                self.seats[i] = Some(session);
                ctx.broadcast(&ServerToClient::SeatAssigned { session_id: session, seat: i as u8 });
                self.try_start(ctx);
            }
        }
    }

    fn on_leave(&mut self, ctx: &RoomCtx, session: SessionId, _consented: bool) {
        if self.players.remove(&session).is_none() {
            return;
        }
        self.arrival.retain(|s| *s != session);
        ctx.broadcast(&ServerToClient::UserLeft { session_id: session });
        let Some(seat) = self.seat_of(session) else { return };
        match self.phase.current() {
            TablePhase::Waiting => {
                self.seats[seat] = None;
            }
            TablePhase::Playing | TablePhase::Placing => {
                if self.moving {
                    // let the table settle before declaring the disconnect
                    self.pending_disconnect = true;
                } else {
                    self.phase.transition(TablePhase::Disconnected);
                    self.broadcast_table(ctx);
                }
            }
            TablePhase::Ended | TablePhase::Disconnected => {
                self.seats[seat] = None;
            }
        }
    }

    fn on_message(&mut self, ctx: &RoomCtx, session: SessionId, msg: ClientToServer) {
        match msg {
            ClientToServer::Shoot { angle, power } => self.handle_shoot(ctx, session, angle, power),
            ClientToServer::PlaceBall { x, y } => self.handle_place(ctx, session, x, y),
            ClientToServer::Restart => self.handle_restart(ctx, session),
            _ => {}
        }
    }

    fn tick_interval(&self) -> Option<Duration> {
        Some(TICK)
    }

    fn on_tick(&mut self, ctx: &RoomCtx, _dt: f32) {
        if !self.moving {
            return;
        }
        let outcome = physics::step(&mut self.balls);
        for &id in &outcome.pocketed {
            ctx.broadcast(&ServerToClient::BallPocketed { ball_id: id });
        }
        self.pocketed_this_shot.extend_from_slice(&outcome.pocketed);
        ctx.broadcast(&ServerToClient::BallsMoved { balls: self.visible_balls() });
        if outcome.all_stopped {
            self.moving = false;
            self.settle_shot(ctx);
        }
    }
}
