use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

use crate::config::Config;
use crate::matching::{MatchOutcome, MatchQueue};
use crate::merge;
use crate::messages::{ClientMessage, ServerMessage, StoredMessage, User};
use crate::presence::{epoch_ms, PresenceRegistry};
use crate::room::{is_random_room, RoomTable};

type Connections = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Message>>>>;

/// The fan-out dispatcher. One instance serves every connection; all state
/// lives in the composed registries, none in the handler itself.
#[derive(Clone)]
pub struct Relay {
    presence: Arc<RwLock<PresenceRegistry>>,
    rooms: Arc<RwLock<RoomTable>>,
    matcher: Arc<RwLock<MatchQueue>>,
    connections: Connections,
    config: Arc<Config>,
}

impl Relay {
    pub fn new(config: Config) -> Self {
        Relay {
            presence: Arc::new(RwLock::new(PresenceRegistry::new())),
            rooms: Arc::new(RwLock::new(RoomTable::new(config.history_capacity))),
            matcher: Arc::new(RwLock::new(MatchQueue::new())),
            connections: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
        }
    }

    /// Periodically force-disconnects connections idle beyond the configured
    /// timeout, through the same cleanup path as a socket disconnect.
    pub fn spawn_idle_sweep(&self) {
        let relay = self.clone();
        let interval = relay.config.sweep_interval;
        let timeout_ms = relay.config.idle_timeout.as_millis() as i64;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let idle = relay.presence.read().await.idle_connections(timeout_ms);
                for conn in idle {
                    info!("sweeping idle connection {conn}");
                    relay.cleanup_connection(&conn).await;
                }
            }
        });
    }

    pub async fn handle_connection(&self, ws: WebSocket) {
        let conn_id = Uuid::new_v4().to_string();
        let (mut ws_tx, mut ws_rx) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel();

        self.attach(&conn_id, tx).await;
        info!("connection {conn_id} attached");

        let relay = self.clone();
        let reader_conn = conn_id.clone();
        tokio::spawn(async move {
            while let Some(result) = ws_rx.next().await {
                match result {
                    Ok(frame) => {
                        if !relay.is_attached(&reader_conn).await {
                            // The idle sweep detached this connection; stop
                            // consuming so both socket halves drop.
                            break;
                        }
                        let Ok(text) = frame.to_str() else {
                            continue;
                        };
                        match serde_json::from_str::<ClientMessage>(text) {
                            Ok(event) => relay.handle_client_message(&reader_conn, event).await,
                            Err(e) => {
                                warn!("dropping malformed event from {reader_conn}: {e}");
                            }
                        }
                    }
                    Err(e) => {
                        warn!("websocket error on {reader_conn}: {e}");
                        break;
                    }
                }
            }

            relay.cleanup_connection(&reader_conn).await;
            info!("connection {reader_conn} closed");
        });

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = ws_tx.send(message).await {
                    debug!("failed to push frame to {conn_id}: {e}");
                    break;
                }
            }
        });
    }

    /// Registers an outbound channel for a connection id. Split out from
    /// `handle_connection` so tests can drive the dispatcher with plain
    /// channels instead of live sockets.
    async fn attach(&self, conn: &str, tx: mpsc::UnboundedSender<Message>) {
        self.connections.write().await.insert(conn.to_string(), tx);
    }

    async fn is_attached(&self, conn: &str) -> bool {
        self.connections.read().await.contains_key(conn)
    }

    async fn handle_client_message(&self, conn: &str, event: ClientMessage) {
        // A connection the cleanup cascade has detached must not rebuild
        // presence or membership it can never receive broadcasts through.
        if !self.is_attached(conn).await {
            warn!("dropping event from detached connection {conn}");
            return;
        }
        self.presence.write().await.touch(conn);

        match event {
            ClientMessage::Login { user } => self.handle_login(conn, user).await,
            ClientMessage::JoinRoom { room, user } => self.handle_join(conn, &room, user).await,
            ClientMessage::LeaveRoom { room, .. } => self.handle_leave(conn, &room).await,
            ClientMessage::FindRandomMatch { user } => self.handle_find_match(conn, user).await,
            ClientMessage::ChatMessage {
                id,
                content,
                room,
                sender,
                timestamp,
            } => {
                self.handle_chat_message(conn, id, content, room, sender, timestamp, None)
                    .await;
            }
            ClientMessage::VoiceMessage {
                id,
                content,
                room,
                sender,
                timestamp,
                voice_url,
            } => {
                let Some(url) = voice_url.filter(|u| !u.is_empty()) else {
                    warn!("dropping voice message without voice_url from {conn}");
                    return;
                };
                self.handle_chat_message(conn, id, content, room, sender, timestamp, Some(url))
                    .await;
            }
            ClientMessage::Typing { room, is_typing } => {
                self.handle_typing(conn, &room, is_typing).await;
            }
            ClientMessage::AddReaction {
                message_id,
                reaction,
                user,
                room,
            } => self.handle_reaction(&room, &message_id, &reaction, user).await,
            ClientMessage::PollVote {
                poll_id,
                option_id,
                user_id,
                room,
            } => self.handle_poll_vote(&room, &poll_id, &option_id, &user_id).await,
            ClientMessage::WhiteboardData { data, room, sender } => {
                self.broadcast_room_except(
                    &room,
                    &ServerMessage::WhiteboardData { data, sender },
                    Some(conn),
                )
                .await;
            }
        }
    }

    async fn handle_login(&self, conn: &str, user: User) {
        let stamped = self.presence.write().await.login(conn, user);
        info!("user {} ({}) logged in on {conn}", stamped.name, stamped.id);
        self.broadcast_user_list().await;
    }

    async fn handle_join(&self, conn: &str, room: &str, user: User) {
        // A join also refreshes presence; clients may join without a
        // preceding explicit login.
        self.presence.write().await.login(conn, user);
        self.join_room(conn, room).await;
        self.broadcast_user_list().await;
    }

    /// Membership insert plus the join broadcasts: `room_users` to the room
    /// and the history snapshot to the joiner only. Shared with the pairing
    /// path.
    async fn join_room(&self, conn: &str, room: &str) {
        let history = {
            let mut rooms = self.rooms.write().await;
            rooms.join(conn, room);
            rooms.history(room).map(|h| h.snapshot()).unwrap_or_default()
        };

        self.broadcast_room_users(room).await;
        self.send_to(
            conn,
            &ServerMessage::RoomHistory {
                room: room.to_string(),
                messages: history,
            },
        )
        .await;
    }

    async fn handle_leave(&self, conn: &str, room: &str) {
        self.rooms.write().await.leave(conn, room);
        self.broadcast_room_users(room).await;

        if is_random_room(room) {
            // Pairing rooms are 1:1; tell the remaining side the match ended
            // and make sure the leaver is no longer pooled.
            self.matcher.write().await.cancel(conn);
            self.broadcast_room(
                room,
                &ServerMessage::RandomMatchEnded {
                    room: room.to_string(),
                },
            )
            .await;
        }
    }

    async fn handle_find_match(&self, conn: &str, user: User) {
        let stamped = self.presence.write().await.login(conn, user);

        let outcome = {
            let connections = self.connections.read().await;
            self.matcher.write().await.request_match(conn, stamped.clone(), |c| {
                connections.contains_key(c)
            })
        };

        match outcome {
            MatchOutcome::Waiting => {
                debug!("{conn} parked in the pairing pool");
                self.send_to(conn, &ServerMessage::WaitingForMatch).await;
            }
            MatchOutcome::Matched {
                partner_conn,
                partner_user,
                room,
            } => {
                info!("paired {conn} with {partner_conn} in {room}");
                self.join_room(conn, &room).await;
                self.join_room(&partner_conn, &room).await;

                self.send_to(
                    conn,
                    &ServerMessage::RandomMatchFound {
                        matched_user: partner_user,
                        private_room: room.clone(),
                    },
                )
                .await;
                self.send_to(
                    &partner_conn,
                    &ServerMessage::RandomMatchFound {
                        matched_user: stamped,
                        private_room: room,
                    },
                )
                .await;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_chat_message(
        &self,
        conn: &str,
        id: Option<String>,
        content: String,
        room: String,
        sender: User,
        timestamp: Option<i64>,
        voice_url: Option<String>,
    ) {
        let message = {
            let mut rooms = self.rooms.write().await;
            if !rooms.contains(&room, conn) {
                drop(rooms);
                warn!("rejecting message from {conn} to unjoined room {room}");
                self.send_to(
                    conn,
                    &ServerMessage::Error {
                        message: format!("join room {room} before sending messages"),
                    },
                )
                .await;
                return;
            }

            let message = StoredMessage {
                id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                content,
                sender,
                room: room.clone(),
                timestamp: timestamp.unwrap_or_else(epoch_ms),
                reactions: vec![],
                is_voice_message: voice_url.is_some(),
                voice_url,
            };
            if let Some(history) = rooms.history_mut(&room) {
                history.append(message.clone());
            }
            message
        };

        self.broadcast_room(&room, &ServerMessage::ChatMessage { message })
            .await;
    }

    async fn handle_typing(&self, conn: &str, room: &str, is_typing: bool) {
        let Some(user_id) = self.presence.write().await.set_typing(conn, room, is_typing) else {
            return;
        };
        self.broadcast_room_except(
            room,
            &ServerMessage::UserTyping {
                room: room.to_string(),
                user_id,
                is_typing,
            },
            Some(conn),
        )
        .await;
    }

    async fn handle_reaction(&self, room: &str, message_id: &str, emoji: &str, user: User) {
        let merged = {
            let mut rooms = self.rooms.write().await;
            merge::toggle_reaction(&mut rooms, room, message_id, emoji, &user)
        };

        let Some(reactions) = merged else {
            debug!("reaction on unknown or evicted message {message_id}, dropped");
            return;
        };

        self.broadcast_room(
            room,
            &ServerMessage::ReactionAdded {
                message_id: message_id.to_string(),
                reaction: emoji.to_string(),
                user,
                reactions,
            },
        )
        .await;
    }

    async fn handle_poll_vote(&self, room: &str, message_id: &str, option_id: &str, user_id: &str) {
        let result = {
            let mut rooms = self.rooms.write().await;
            merge::vote_poll(&mut rooms, room, message_id, option_id, user_id)
        };

        let (poll, message) = match result {
            Ok(merged) => merged,
            Err(e) => {
                warn!("poll vote on {message_id} aborted: {e}");
                return;
            }
        };

        // Both shapes are broadcast; different consumers expect either the
        // incremental vote event or the full rewritten message.
        self.broadcast_room(
            room,
            &ServerMessage::PollVote {
                message_id: message_id.to_string(),
                option_id: option_id.to_string(),
                user_id: user_id.to_string(),
                poll,
            },
        )
        .await;
        self.broadcast_room(room, &ServerMessage::MessageUpdated { message })
            .await;
    }

    /// Full cleanup cascade, shared by socket disconnect and the idle sweep:
    /// outbound channel, pairing pool, every room membership, presence.
    async fn cleanup_connection(&self, conn: &str) {
        self.connections.write().await.remove(conn);
        self.matcher.write().await.cancel(conn);

        let left_rooms = {
            let mut rooms = self.rooms.write().await;
            let joined = rooms.rooms_of(conn);
            for room in &joined {
                rooms.leave(conn, room);
            }
            joined
        };

        let offline = self.presence.write().await.disconnect(conn);

        for room in &left_rooms {
            self.broadcast_room_users(room).await;
            if is_random_room(room) {
                self.broadcast_room(
                    room,
                    &ServerMessage::RandomMatchEnded { room: room.clone() },
                )
                .await;
            }
        }

        if let Some(user) = offline {
            self.broadcast_global(&ServerMessage::UserOffline {
                user_id: user.id,
                last_seen: user.last_seen,
            })
            .await;
            self.broadcast_user_list().await;
        }
    }

    /// Member list as user records, looked up through presence at call time.
    async fn room_user_snapshot(&self, room: &str) -> Vec<User> {
        let members = self.rooms.read().await.members(room);
        let presence = self.presence.read().await;
        members
            .iter()
            .filter_map(|conn| presence.user_of(conn))
            .collect()
    }

    async fn broadcast_room_users(&self, room: &str) {
        let users = self.room_user_snapshot(room).await;
        self.broadcast_room(
            room,
            &ServerMessage::RoomUsers {
                room: room.to_string(),
                users,
            },
        )
        .await;
    }

    async fn broadcast_user_list(&self) {
        let users = self.presence.read().await.online_users();
        self.broadcast_global(&ServerMessage::UserList { users }).await;
    }

    async fn send_to(&self, conn: &str, message: &ServerMessage) {
        let Ok(text) = serde_json::to_string(message) else {
            return;
        };
        let connections = self.connections.read().await;
        if let Some(tx) = connections.get(conn) {
            // A send error means the peer is mid-disconnect; its cleanup
            // cascade will remove the channel.
            let _ = tx.send(Message::text(text));
        }
    }

    async fn broadcast_room(&self, room: &str, message: &ServerMessage) {
        self.broadcast_room_except(room, message, None).await;
    }

    /// Delivers to the room's membership set as it is at send time. A
    /// failed send to one member never blocks the rest.
    async fn broadcast_room_except(
        &self,
        room: &str,
        message: &ServerMessage,
        except: Option<&str>,
    ) {
        let Ok(text) = serde_json::to_string(message) else {
            return;
        };
        let members = self.rooms.read().await.members(room);
        let connections = self.connections.read().await;
        for conn in &members {
            if Some(conn.as_str()) == except {
                continue;
            }
            if let Some(tx) = connections.get(conn) {
                let _ = tx.send(Message::text(text.clone()));
            }
        }
    }

    async fn broadcast_global(&self, message: &ServerMessage) {
        let Ok(text) = serde_json::to_string(message) else {
            return;
        };
        let connections = self.connections.read().await;
        for tx in connections.values() {
            let _ = tx.send(Message::text(text.clone()));
        }
    }
}
