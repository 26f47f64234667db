//! Room actor: the single-owner event loop for one game session.
//!
//! Every command (join, leave, client message) and every simulation tick for
//! a room is processed on that room's task, in arrival order. Nothing else
//! ever touches the game state, which is what makes the billiards step
//! deterministic and the rest of the logic lock-free.

pub mod manager;

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::games::{GameKind, GameLogic};
use crate::protocol::{ClientToServer, JoinOptions, ServerToClient, SessionId};

/// Errors surfaced to the requesting client at join time. After a successful
/// join, all runtime trouble is handled by local recovery (drop/ignore)
/// instead of being propagated.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("room not found")]
    NotFound,
    #[error("room is full")]
    Full,
    #[error("room is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

/// The connected clients of one room and their push channels. This is the
/// broadcast seam handed to game logic; the map itself is mutated only by
/// the owning room loop.
pub struct RoomCtx {
    clients: HashMap<SessionId, mpsc::UnboundedSender<ServerToClient>>,
}

impl RoomCtx {
    pub(crate) fn new() -> Self {
        Self { clients: HashMap::new() }
    }

    pub fn contains(&self, session: SessionId) -> bool {
        self.clients.contains_key(&session)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Push one event to every joined client. A failed send means that
    /// client's socket pump is already gone and its leave command is in
    /// flight, so failures are ignored here.
    pub fn broadcast(&self, msg: &ServerToClient) {
        for tx in self.clients.values() {
            let _ = tx.send(msg.clone());
        }
    }

    /// Push one event to exactly one session, outside the broadcast channel.
    /// A no-op when the session is not connected.
    pub fn send_to(&self, session: SessionId, msg: &ServerToClient) {
        if let Some(tx) = self.clients.get(&session) {
            let _ = tx.send(msg.clone());
        }
    }

    pub(crate) fn insert(&mut self, session: SessionId, tx: mpsc::UnboundedSender<ServerToClient>) {
        self.clients.insert(session, tx);
    }

    pub(crate) fn remove(&mut self, session: SessionId) -> bool {
        self.clients.remove(&session).is_some()
    }
}

pub enum RoomCommand {
    Join {
        session: SessionId,
        opts: JoinOptions,
        tx: mpsc::UnboundedSender<ServerToClient>,
        reply: oneshot::Sender<Result<(), JoinError>>,
    },
    Message {
        session: SessionId,
        msg: ClientToServer,
    },
    Leave {
        session: SessionId,
        consented: bool,
    },
}

/// Cheap handle for pushing commands onto a room's queue.
#[derive(Clone)]
pub struct RoomHandle {
    id: String,
    kind: GameKind,
    visibility: Visibility,
    tx: mpsc::UnboundedSender<RoomCommand>,
    cancel: CancellationToken,
}

impl RoomHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> GameKind {
        self.kind
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Request to join. Capacity is checked by the room task before any
    /// state is mutated; a full room rejects without side effects.
    pub async fn join(
        &self,
        session: SessionId,
        opts: JoinOptions,
        client_tx: mpsc::UnboundedSender<ServerToClient>,
    ) -> Result<(), JoinError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RoomCommand::Join { session, opts, tx: client_tx, reply })
            .map_err(|_| JoinError::Closed)?;
        rx.await.map_err(|_| JoinError::Closed)?
    }

    pub fn message(&self, session: SessionId, msg: ClientToServer) {
        let _ = self.tx.send(RoomCommand::Message { session, msg });
    }

    pub fn leave(&self, session: SessionId, consented: bool) {
        let _ = self.tx.send(RoomCommand::Leave { session, consented });
    }

    /// Administrative shutdown; the room task exits at its next wakeup.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

pub struct Room {
    id: String,
    logic: Box<dyn GameLogic>,
    ctx: RoomCtx,
    rx: mpsc::UnboundedReceiver<RoomCommand>,
    cancel: CancellationToken,
    grace: Duration,
    empty_since: Option<Instant>,
}

enum Wake {
    Cmd(Option<RoomCommand>),
    Tick,
    Idle,
    Cancelled,
}

impl Room {
    /// Spawn a room task and hand back its command handle. The returned
    /// join handle completes when the room reclaims itself.
    pub fn spawn(
        id: String,
        visibility: Visibility,
        logic: Box<dyn GameLogic>,
        grace: Duration,
    ) -> (RoomHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = RoomHandle {
            id: id.clone(),
            kind: logic.kind(),
            visibility,
            tx,
            cancel: cancel.clone(),
        };
        let room = Room {
            id,
            logic,
            ctx: RoomCtx::new(),
            rx,
            cancel,
            grace,
            // a created-but-never-joined room is reclaimed after the grace
            empty_since: Some(Instant::now()),
        };
        let task = tokio::spawn(room.run());
        (handle, task)
    }

    async fn run(mut self) {
        let tick_every = self.logic.tick_interval();
        let mut ticker = tick_every.map(|d| {
            let mut t = interval(d);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t
        });

        loop {
            let idle_deadline = self.empty_since.map(|t| t + self.grace);
            let wake = tokio::select! {
                _ = self.cancel.cancelled() => Wake::Cancelled,
                cmd = self.rx.recv() => Wake::Cmd(cmd),
                _ = maybe_tick(&mut ticker) => Wake::Tick,
                _ = maybe_sleep(idle_deadline) => Wake::Idle,
            };
            match wake {
                Wake::Cmd(Some(cmd)) => self.handle_command(cmd),
                Wake::Cmd(None) => break,
                Wake::Tick => {
                    let dt = tick_every.map(|d| d.as_secs_f32()).unwrap_or(0.0);
                    self.logic.on_tick(&self.ctx, dt);
                }
                Wake::Idle => {
                    tracing::info!(room = %self.id, "empty past grace period, reclaiming");
                    break;
                }
                Wake::Cancelled => {
                    tracing::info!(room = %self.id, "room cancelled");
                    break;
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join { session, opts, tx, reply } => {
                if self.ctx.len() >= self.logic.max_clients() {
                    // rejected before any state mutation
                    let _ = reply.send(Err(JoinError::Full));
                    return;
                }
                self.ctx.insert(session, tx);
                self.empty_since = None;
                self.logic.on_join(&self.ctx, session, &opts);
                let state = self.logic.snapshot();
                self.ctx.send_to(
                    session,
                    &ServerToClient::Welcome { session_id: session, room_id: self.id.clone(), state },
                );
                let _ = reply.send(Ok(()));
                tracing::debug!(room = %self.id, %session, "client joined");
            }
            RoomCommand::Message { session, msg } => {
                // a message from a session that already left is a benign race
                if !self.ctx.contains(session) {
                    return;
                }
                self.logic.on_message(&self.ctx, session, msg);
            }
            RoomCommand::Leave { session, consented } => {
                if !self.ctx.remove(session) {
                    return;
                }
                self.logic.on_leave(&self.ctx, session, consented);
                if self.ctx.is_empty() {
                    self.empty_since = Some(Instant::now());
                }
                tracing::debug!(room = %self.id, %session, consented, "client left");
            }
        }
    }
}

async fn maybe_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn maybe_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(d) => sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}
