//! Portal lobby: presence, a bounded chat log, private messages.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::games::{GameKind, GameLogic};
use crate::protocol::{
    ChatKind, ChatMessage, ClientToServer, JoinOptions, PlayerEntry, ServerToClient, SessionId,
    UserStatus,
};
use crate::room::RoomCtx;

pub const MAX_CLIENTS: usize = 1000;
/// The chat log is a bounded window: at most this many messages are kept,
/// oldest evicted first.
pub const MAX_CHAT_MESSAGES: usize = 50;
const MAX_CHAT_LEN: usize = 500;

#[derive(Default, Serialize)]
pub struct LobbyGame {
    users: HashMap<SessionId, PlayerEntry>,
    messages: VecDeque<ChatMessage>,
}

impl LobbyGame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one message, enforcing the cap atomically with the append:
    /// the log never observably exceeds [`MAX_CHAT_MESSAGES`].
    fn append_chat(&mut self, ctx: &RoomCtx, message: ChatMessage) {
        self.messages.push_back(message.clone());
        while self.messages.len() > MAX_CHAT_MESSAGES {
            self.messages.pop_front();
        }
        ctx.broadcast(&ServerToClient::Chat { message });
    }

    fn handle_chat(&mut self, ctx: &RoomCtx, session: SessionId, content: String, kind: ChatKind) {
        let content = content.trim();
        if content.is_empty() || content.len() > MAX_CHAT_LEN {
            return;
        }
        // the system kind is reserved for server-originated notices
        let kind = if kind == ChatKind::System { ChatKind::Normal } else { kind };
        let Some(sender) = self.users.get(&session) else { return };
        let message = ChatMessage::new(sender, content.to_string(), kind);
        self.append_chat(ctx, message);
    }

    fn handle_private(
        &mut self,
        ctx: &RoomCtx,
        session: SessionId,
        target_user_id: String,
        content: String,
    ) {
        let content = content.trim();
        if content.is_empty() || content.len() > MAX_CHAT_LEN || target_user_id.is_empty() {
            return;
        }
        let Some(sender) = self.users.get(&session) else { return };
        let message = ChatMessage::new(sender, content.to_string(), ChatKind::Normal);
        // every session bound to the target user id gets a copy (multi-tab);
        // nobody connected under that id means no delivery and no error
        for user in self.users.values() {
            if user.session_id != session
                && user.user_id.as_deref() == Some(target_user_id.as_str())
            {
                ctx.send_to(user.session_id, &ServerToClient::Private { message: message.clone() });
            }
        }
        // the sender always gets exactly one echo, delivered or not
        ctx.send_to(session, &ServerToClient::Private { message });
    }

    fn handle_status(&mut self, ctx: &RoomCtx, session: SessionId, status: UserStatus) {
        let Some(user) = self.users.get_mut(&session) else { return };
        user.status = status;
        ctx.broadcast(&ServerToClient::StatusChanged { session_id: session, status });
    }
}

impl GameLogic for LobbyGame {
    fn kind(&self) -> GameKind {
        GameKind::Lobby
    }

    fn max_clients(&self) -> usize {
        MAX_CLIENTS
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn on_join(&mut self, ctx: &RoomCtx, session: SessionId, opts: &JoinOptions) {
        let user = PlayerEntry::new(session, opts);
        self.users.insert(session, user.clone());
        ctx.broadcast(&ServerToClient::UserJoined { user: user.clone() });
        self.append_chat(ctx, ChatMessage::system(format!("{} joined the lobby", user.name)));
    }

    fn on_leave(&mut self, ctx: &RoomCtx, session: SessionId, _consented: bool) {
        let Some(user) = self.users.remove(&session) else { return };
        ctx.broadcast(&ServerToClient::UserLeft { session_id: session });
        self.append_chat(ctx, ChatMessage::system(format!("{} left the lobby", user.name)));
    }

    fn on_message(&mut self, ctx: &RoomCtx, session: SessionId, msg: ClientToServer) {
        match msg {
            ClientToServer::Chat { content, kind } => self.handle_chat(ctx, session, content, kind),
            ClientToServer::PrivateMessage { target_user_id, content } => {
                self.handle_private(ctx, session, target_user_id, content)
            }
            ClientToServer::UpdateStatus { status } => self.handle_status(ctx, session, status),
            // other games' messages mean nothing here
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use uuid::Uuid;

    fn join(
        game: &mut LobbyGame,
        ctx: &mut RoomCtx,
        name: &str,
        user_id: Option<&str>,
    ) -> (SessionId, UnboundedReceiver<ServerToClient>) {
        let session = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        ctx.insert(session, tx);
        let opts = JoinOptions {
            user_id: user_id.map(str::to_string),
            name: Some(name.to_string()),
        };
        game.on_join(ctx, session, &opts);
        (session, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerToClient>) -> Vec<ServerToClient> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn chat_log_keeps_only_the_newest_fifty() {
        let mut game = LobbyGame::new();
        let mut ctx = RoomCtx::new();
        let (alice, _rx) = join(&mut game, &mut ctx, "alice", None);

        // one system join notice is already in the log
        for i in 0..60 {
            game.on_message(
                &ctx,
                alice,
                ClientToServer::Chat { content: format!("c{}", i), kind: ChatKind::Normal },
            );
        }

        assert_eq!(game.messages.len(), MAX_CHAT_MESSAGES);
        assert_eq!(game.messages.front().unwrap().content, "c10");
        assert_eq!(game.messages.back().unwrap().content, "c59");
        // relative order preserved
        let contents: Vec<&str> =
            game.messages.iter().map(|m| m.content.as_str()).collect();
        for (i, c) in contents.iter().enumerate() {
            assert_eq!(*c, format!("c{}", i + 10));
        }
    }

    #[test]
    fn join_and_leave_keep_the_user_map_exact() {
        let mut game = LobbyGame::new();
        let mut ctx = RoomCtx::new();
        let (a, _ra) = join(&mut game, &mut ctx, "a", None);
        let (b, _rb) = join(&mut game, &mut ctx, "b", None);
        let (c, _rc) = join(&mut game, &mut ctx, "c", None);
        assert_eq!(game.users.len(), 3);

        ctx.remove(b);
        game.on_leave(&ctx, b, true);
        assert_eq!(game.users.len(), 2);
        assert!(game.users.contains_key(&a));
        assert!(!game.users.contains_key(&b));
        assert!(game.users.contains_key(&c));

        // leaving twice is a no-op
        game.on_leave(&ctx, b, false);
        assert_eq!(game.users.len(), 2);
    }

    #[test]
    fn status_update_touches_only_the_sender() {
        let mut game = LobbyGame::new();
        let mut ctx = RoomCtx::new();
        let (a, _ra) = join(&mut game, &mut ctx, "a", None);
        let (b, _rb) = join(&mut game, &mut ctx, "b", None);

        game.on_message(&ctx, a, ClientToServer::UpdateStatus { status: UserStatus::Idle });

        assert_eq!(game.users[&a].status, UserStatus::Idle);
        assert_eq!(game.users[&b].status, UserStatus::Online);
    }

    #[test]
    fn private_message_reaches_every_matching_session_plus_one_echo() {
        let mut game = LobbyGame::new();
        let mut ctx = RoomCtx::new();
        let (alice, mut rx_alice) = join(&mut game, &mut ctx, "alice", Some("u-alice"));
        let (_bob, mut rx_bob) = join(&mut game, &mut ctx, "bob", Some("u-bob"));
        let (_bob2, mut rx_bob2) = join(&mut game, &mut ctx, "bob", Some("u-bob"));

        drain(&mut rx_alice);
        drain(&mut rx_bob);
        drain(&mut rx_bob2);

        game.on_message(
            &ctx,
            alice,
            ClientToServer::PrivateMessage {
                target_user_id: "u-bob".into(),
                content: "psst".into(),
            },
        );

        let privates = |msgs: Vec<ServerToClient>| {
            msgs.into_iter()
                .filter(|m| matches!(m, ServerToClient::Private { .. }))
                .count()
        };
        assert_eq!(privates(drain(&mut rx_bob)), 1);
        assert_eq!(privates(drain(&mut rx_bob2)), 1);
        assert_eq!(privates(drain(&mut rx_alice)), 1);
    }

    #[test]
    fn private_message_to_absent_user_still_echoes() {
        let mut game = LobbyGame::new();
        let mut ctx = RoomCtx::new();
        let (alice, mut rx_alice) = join(&mut game, &mut ctx, "alice", Some("u-alice"));
        drain(&mut rx_alice);

        game.on_message(
            &ctx,
            alice,
            ClientToServer::PrivateMessage {
                target_user_id: "u-nobody".into(),
                content: "hello?".into(),
            },
        );

        let msgs = drain(&mut rx_alice);
        let privates = msgs
            .iter()
            .filter(|m| matches!(m, ServerToClient::Private { .. }))
            .count();
        assert_eq!(privates, 1);
    }

    #[test]
    fn empty_and_oversized_chat_is_dropped() {
        let mut game = LobbyGame::new();
        let mut ctx = RoomCtx::new();
        let (alice, _rx) = join(&mut game, &mut ctx, "alice", None);
        let before = game.messages.len();

        game.on_message(
            &ctx,
            alice,
            ClientToServer::Chat { content: "   ".into(), kind: ChatKind::Normal },
        );
        game.on_message(
            &ctx,
            alice,
            ClientToServer::Chat { content: "x".repeat(MAX_CHAT_LEN + 1), kind: ChatKind::Normal },
        );

        assert_eq!(game.messages.len(), before);
    }

    #[test]
    fn messages_from_unknown_sessions_are_ignored() {
        let mut game = LobbyGame::new();
        let ctx = RoomCtx::new();
        let ghost = Uuid::new_v4();
        game.on_message(
            &ctx,
            ghost,
            ClientToServer::Chat { content: "boo".into(), kind: ChatKind::Normal },
        );
        assert!(game.messages.is_empty());
    }
}
