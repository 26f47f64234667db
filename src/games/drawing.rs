//! Drawing/guessing party game: drawer rotation, word choice, guess scoring.
//!
//! Mid-match disconnects soft-mark the player offline so a reconnect under
//! the same external user id keeps the score; in the lobby phase entries are
//! removed outright.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::games::phase::{Phase, PhaseMachine};
use crate::games::{GameKind, GameLogic};
use crate::protocol::{
    ClientToServer, JoinOptions, PlayerEntry, ScoreEntry, ServerToClient, SessionId, UserStatus,
};
use crate::room::RoomCtx;

pub const MAX_CLIENTS: usize = 12;
const MIN_PLAYERS: usize = 2;
const MAX_ROUNDS: u8 = 6;
const SELECT_SECONDS: u32 = 15;
const DRAW_SECONDS: u32 = 80;
const RESULT_SECONDS: u32 = 8;
const WORD_CHOICES: usize = 3;
const GUESS_SCORE_BASE: u32 = 100;
const DRAWER_SCORE: u32 = 25;
const MAX_GUESS_LEN: usize = 100;
const MAX_STROKE_POINTS: usize = 512;

const WORDS: &[&str] = &[
    "anchor", "balloon", "bicycle", "bridge", "butterfly", "cactus", "camera",
    "castle", "cloud", "dragon", "elephant", "fireworks", "guitar", "hammer",
    "island", "kangaroo", "lighthouse", "mermaid", "mountain", "mushroom",
    "octopus", "penguin", "pirate", "pyramid", "rainbow", "robot", "rocket",
    "sandcastle", "snowman", "spider", "submarine", "telescope", "tornado",
    "treasure", "umbrella", "unicorn", "volcano", "waterfall", "windmill",
    "wizard",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Lobby,
    Selecting,
    Drawing,
    Result,
    Finished,
}

impl Phase for RoundPhase {
    fn can_transition(self, next: Self) -> bool {
        use RoundPhase::*;
        matches!(
            (self, next),
            (Lobby, Selecting)
                | (Selecting, Drawing)
                | (Selecting, Result)
                | (Selecting, Lobby)
                | (Drawing, Result)
                | (Drawing, Lobby)
                | (Result, Selecting)
                | (Result, Finished)
                | (Result, Lobby)
                | (Finished, Lobby)
        )
    }

    fn is_terminal(self) -> bool {
        self == RoundPhase::Finished
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DrawingPlayer {
    pub session_id: SessionId,
    pub user_id: Option<String>,
    pub name: String,
    pub score: u32,
    pub is_drawer: bool,
    pub online: bool,
}

#[derive(Serialize)]
pub struct DrawingGame {
    players: HashMap<SessionId, DrawingPlayer>,
    phase: PhaseMachine<RoundPhase>,
    round: u8,
    max_rounds: u8,
    time_left: u32,
    current_drawer: Option<SessionId>,
    /// Drawer order, by arrival. Not replicated.
    #[serde(skip)]
    rotation: Vec<SessionId>,
    /// The word is never replicated; guessers only ever see the hint.
    #[serde(skip)]
    word: Option<String>,
    #[serde(skip)]
    word_choices: Vec<String>,
    #[serde(skip)]
    guessed: HashSet<SessionId>,
}

impl Default for DrawingGame {
    fn default() -> Self {
        Self::new()
    }
}

fn mask_word(word: &str) -> String {
    word.chars().map(|c| if c == ' ' { ' ' } else { '_' }).collect()
}

impl DrawingGame {
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
            phase: PhaseMachine::new(RoundPhase::Lobby),
            round: 0,
            max_rounds: MAX_ROUNDS,
            time_left: 0,
            current_drawer: None,
            rotation: Vec::new(),
            word: None,
            word_choices: Vec::new(),
            guessed: HashSet::new(),
        }
    }

    fn online_count(&self) -> usize {
        self.players.values().filter(|p| p.online).count()
    }

    fn scores(&self) -> Vec<ScoreEntry> {
        let mut scores: Vec<ScoreEntry> = self
            .players
            .values()
            .map(|p| ScoreEntry { session_id: p.session_id, name: p.name.clone(), score: p.score })
            .collect();
        scores.sort_by(|a, b| b.score.cmp(&a.score));
        scores
    }

    fn broadcast_round(&self, ctx: &RoomCtx) {
        ctx.broadcast(&ServerToClient::RoundState {
            phase: self.phase.current(),
            round: self.round,
            time_left: self.time_left,
        });
    }

    /// Next online player after the current drawer, in arrival order.
    fn next_drawer(&self) -> Option<SessionId> {
        if self.rotation.is_empty() {
            return None;
        }
        let start = self
            .current_drawer
            .and_then(|d| self.rotation.iter().position(|s| *s == d))
            .map(|i| i + 1)
            .unwrap_or(0);
        (0..self.rotation.len())
            .map(|offset| self.rotation[(start + offset) % self.rotation.len()])
            .find(|s| self.players.get(s).is_some_and(|p| p.online))
    }

    fn start_selecting(&mut self, ctx: &RoomCtx) {
        let Some(drawer) = self.next_drawer() else {
            self.to_lobby(ctx);
            return;
        };
        if !self.phase.transition(RoundPhase::Selecting) {
            return;
        }
        for p in self.players.values_mut() {
            p.is_drawer = p.session_id == drawer;
        }
        self.current_drawer = Some(drawer);
        self.word = None;
        self.guessed.clear();
        let mut rng = rand::thread_rng();
        self.word_choices = WORDS
            .choose_multiple(&mut rng, WORD_CHOICES)
            .map(|w| w.to_string())
            .collect();
        self.time_left = SELECT_SECONDS;
        ctx.broadcast(&ServerToClient::DrawerSelected { session_id: drawer });
        self.broadcast_round(ctx);
        // the choices go to the drawer alone
        ctx.send_to(drawer, &ServerToClient::WordChoices { words: self.word_choices.clone() });
    }

    fn start_drawing(&mut self, ctx: &RoomCtx, word: String) {
        if !self.phase.transition(RoundPhase::Drawing) {
            return;
        }
        let hint = mask_word(&word);
        self.word = Some(word);
        self.time_left = DRAW_SECONDS;
        self.guessed.clear();
        self.broadcast_round(ctx);
        ctx.broadcast(&ServerToClient::WordHint { hint });
    }

    fn show_result(&mut self, ctx: &RoomCtx) {
        if !self.phase.transition(RoundPhase::Result) {
            return;
        }
        self.time_left = RESULT_SECONDS;
        let word = self.word.clone().unwrap_or_default();
        ctx.broadcast(&ServerToClient::RoundResult { word, scores: self.scores() });
        self.broadcast_round(ctx);
    }

    fn finish(&mut self, ctx: &RoomCtx) {
        if !self.phase.transition(RoundPhase::Finished) {
            return;
        }
        for p in self.players.values_mut() {
            p.is_drawer = false;
        }
        self.current_drawer = None;
        self.word = None;
        self.time_left = 0;
        self.broadcast_round(ctx);
        ctx.broadcast(&ServerToClient::Scoreboard { scores: self.scores() });
    }

    fn to_lobby(&mut self, ctx: &RoomCtx) {
        if !self.phase.transition(RoundPhase::Lobby) {
            return;
        }
        self.round = 0;
        self.time_left = 0;
        self.current_drawer = None;
        self.word = None;
        self.word_choices.clear();
        self.guessed.clear();
        for p in self.players.values_mut() {
            p.is_drawer = false;
        }
        // offline entries only linger during a match
        let offline: Vec<SessionId> =
            self.players.values().filter(|p| !p.online).map(|p| p.session_id).collect();
        for session in offline {
            self.players.remove(&session);
            self.rotation.retain(|s| *s != session);
            ctx.broadcast(&ServerToClient::UserLeft { session_id: session });
        }
        self.broadcast_round(ctx);
    }

    fn all_guessed(&self) -> bool {
        self.players
            .values()
            .filter(|p| p.online && Some(p.session_id) != self.current_drawer)
            .all(|p| self.guessed.contains(&p.session_id))
    }

    fn handle_start(&mut self, ctx: &RoomCtx, session: SessionId) {
        if self.phase.current() != RoundPhase::Lobby || !self.players.contains_key(&session) {
            return;
        }
        if self.online_count() < MIN_PLAYERS {
            return;
        }
        self.round = 1;
        self.start_selecting(ctx);
    }

    fn handle_select_word(&mut self, ctx: &RoomCtx, session: SessionId, index: usize) {
        if self.phase.current() != RoundPhase::Selecting {
            return;
        }
        if self.current_drawer != Some(session) {
            return;
        }
        let Some(word) = self.word_choices.get(index).cloned() else { return };
        self.start_drawing(ctx, word);
    }

    fn handle_guess(&mut self, ctx: &RoomCtx, session: SessionId, content: String) {
        if self.phase.current() != RoundPhase::Drawing {
            return;
        }
        let content = content.trim().to_string();
        if content.is_empty() || content.len() > MAX_GUESS_LEN {
            return;
        }
        // the drawer does not guess, and a correct guesser is done
        if self.current_drawer == Some(session) || self.guessed.contains(&session) {
            return;
        }
        let Some(word) = self.word.clone() else { return };
        let Some(player) = self.players.get_mut(&session) else { return };
        if content.eq_ignore_ascii_case(&word) {
            player.score += GUESS_SCORE_BASE + self.time_left;
            let score = player.score;
            self.guessed.insert(session);
            if let Some(drawer) = self.current_drawer {
                if let Some(d) = self.players.get_mut(&drawer) {
                    d.score += DRAWER_SCORE;
                }
            }
            ctx.broadcast(&ServerToClient::CorrectGuess { session_id: session, score });
            ctx.broadcast(&ServerToClient::Scoreboard { scores: self.scores() });
            if self.all_guessed() {
                self.show_result(ctx);
            }
        } else {
            let name = player.name.clone();
            ctx.broadcast(&ServerToClient::GuessShown { session_id: session, name, content });
        }
    }

    fn handle_stroke(&self, ctx: &RoomCtx, session: SessionId, points: Vec<[f32; 2]>) {
        if self.phase.current() != RoundPhase::Drawing {
            return;
        }
        if self.current_drawer != Some(session) {
            return;
        }
        if points.is_empty() || points.len() > MAX_STROKE_POINTS {
            return;
        }
        // relayed, not retained: a late joiner starts from a blank canvas
        ctx.broadcast(&ServerToClient::Stroke { session_id: session, points });
    }

    fn handle_restart(&mut self, ctx: &RoomCtx, session: SessionId) {
        if self.phase.current() != RoundPhase::Finished || !self.players.contains_key(&session) {
            return;
        }
        for p in self.players.values_mut() {
            p.score = 0;
        }
        self.to_lobby(ctx);
        ctx.broadcast(&ServerToClient::Scoreboard { scores: self.scores() });
    }
}

impl GameLogic for DrawingGame {
    fn kind(&self) -> GameKind {
        GameKind::Drawing
    }

    fn max_clients(&self) -> usize {
        MAX_CLIENTS
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn on_join(&mut self, ctx: &RoomCtx, session: SessionId, opts: &JoinOptions) {
        // same external user returning mid-match: rebind the old entry
        if let Some(uid) = opts.user_id.as_deref() {
            let prior = self
                .players
                .values()
                .find(|p| !p.online && p.user_id.as_deref() == Some(uid))
                .map(|p| p.session_id);
            if let Some(old) = prior {
                if let Some(mut player) = self.players.remove(&old) {
                    player.session_id = session;
                    player.online = true;
                    for slot in self.rotation.iter_mut() {
                        if *slot == old {
                            *slot = session;
                        }
                    }
                    if self.current_drawer == Some(old) {
                        self.current_drawer = Some(session);
                    }
                    if self.guessed.remove(&old) {
                        self.guessed.insert(session);
                    }
                    ctx.broadcast(&ServerToClient::UserJoined {
                        user: PlayerEntry {
                            session_id: session,
                            user_id: player.user_id.clone(),
                            name: player.name.clone(),
                            status: UserStatus::Online,
                        },
                    });
                    self.players.insert(session, player);
                    ctx.broadcast(&ServerToClient::Scoreboard { scores: self.scores() });
                    return;
                }
            }
        }

        let entry = PlayerEntry::new(session, opts);
        let player = DrawingPlayer {
            session_id: session,
            user_id: entry.user_id.clone(),
            name: entry.name.clone(),
            score: 0,
            is_drawer: false,
            online: true,
        };
        self.players.insert(session, player);
        self.rotation.push(session);
        ctx.broadcast(&ServerToClient::UserJoined { user: entry });
        ctx.broadcast(&ServerToClient::Scoreboard { scores: self.scores() });
    }

    fn on_leave(&mut self, ctx: &RoomCtx, session: SessionId, _consented: bool) {
        match self.phase.current() {
            RoundPhase::Lobby | RoundPhase::Finished => {
                if self.players.remove(&session).is_some() {
                    self.rotation.retain(|s| *s != session);
                    ctx.broadcast(&ServerToClient::UserLeft { session_id: session });
                }
            }
            _ => {
                // mid-match: soft-offline so a reconnect keeps the score
                let Some(player) = self.players.get_mut(&session) else { return };
                player.online = false;
                ctx.broadcast(&ServerToClient::StatusChanged {
                    session_id: session,
                    status: UserStatus::Offline,
                });
                if self.online_count() < MIN_PLAYERS {
                    self.to_lobby(ctx);
                    return;
                }
                let phase = self.phase.current();
                if self.current_drawer == Some(session)
                    && matches!(phase, RoundPhase::Selecting | RoundPhase::Drawing)
                {
                    // the round cannot continue without its drawer
                    self.show_result(ctx);
                } else if phase == RoundPhase::Drawing && self.all_guessed() {
                    self.show_result(ctx);
                }
            }
        }
    }

    fn on_message(&mut self, ctx: &RoomCtx, session: SessionId, msg: ClientToServer) {
        match msg {
            ClientToServer::StartGame => self.handle_start(ctx, session),
            ClientToServer::SelectWord { index } => self.handle_select_word(ctx, session, index),
            ClientToServer::Guess { content } => self.handle_guess(ctx, session, content),
            ClientToServer::Stroke { points } => self.handle_stroke(ctx, session, points),
            ClientToServer::Restart => self.handle_restart(ctx, session),
            _ => {}
        }
    }

    fn tick_interval(&self) -> Option<Duration> {
        Some(Duration::from_secs(1))
    }

    fn on_tick(&mut self, ctx: &RoomCtx, _dt: f32) {
        match self.phase.current() {
            RoundPhase::Selecting | RoundPhase::Drawing | RoundPhase::Result => {}
            _ => return,
        }
        if self.time_left > 0 {
            self.time_left -= 1;
            ctx.broadcast(&ServerToClient::TimeLeft { seconds: self.time_left });
        }
        if self.time_left > 0 {
            return;
        }
        match self.phase.current() {
            RoundPhase::Selecting => {
                // drawer never picked: the first choice is forced
                match self.word_choices.first().cloned() {
                    Some(word) => self.start_drawing(ctx, word),
                    None => self.show_result(ctx),
                }
            }
            RoundPhase::Drawing => self.show_result(ctx),
            RoundPhase::Result => {
                if self.round >= self.max_rounds {
                    self.finish(ctx);
                } else {
                    self.round += 1;
                    self.start_selecting(ctx);
                }
            }
            _ => {}
        }
    }
}
