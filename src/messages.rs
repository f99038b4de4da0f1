use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Sentinel marking a message whose content carries an encoded poll.
pub const POLL_PREFIX: &str = "__poll__:";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub last_seen: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub user_id: String,
    pub user_name: String,
}

/// A message retained in a room's history ring. Immutable after append
/// except for `reactions` and, for poll messages, the re-encoded `content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub content: String,
    pub sender: User,
    pub room: String,
    pub timestamp: i64,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub is_voice_message: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub votes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub question: String,
    pub options: Vec<PollOption>,
    #[serde(default)]
    pub multiple: bool,
}

impl Poll {
    pub fn decode(content: &str) -> Result<Poll, RelayError> {
        let payload = content.strip_prefix(POLL_PREFIX).ok_or(RelayError::NotAPoll)?;
        Ok(serde_json::from_str(payload)?)
    }

    pub fn encode(&self) -> String {
        // Poll contains no non-serializable types, so encoding cannot fail.
        let payload = serde_json::to_string(self).unwrap_or_default();
        format!("{POLL_PREFIX}{payload}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "login")]
    Login { user: User },
    #[serde(rename = "join_room")]
    JoinRoom { room: String, user: User },
    #[serde(rename = "leave_room")]
    LeaveRoom { room: String, user: User },
    #[serde(rename = "find_random_match")]
    FindRandomMatch { user: User },
    #[serde(rename = "message")]
    ChatMessage {
        #[serde(default)]
        id: Option<String>,
        content: String,
        room: String,
        sender: User,
        #[serde(default)]
        timestamp: Option<i64>,
    },
    #[serde(rename = "voice_message")]
    VoiceMessage {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        content: String,
        room: String,
        sender: User,
        #[serde(default)]
        timestamp: Option<i64>,
        #[serde(default)]
        voice_url: Option<String>,
    },
    #[serde(rename = "typing")]
    Typing { room: String, is_typing: bool },
    #[serde(rename = "add_reaction")]
    AddReaction {
        message_id: String,
        reaction: String,
        user: User,
        room: String,
    },
    #[serde(rename = "poll_vote")]
    PollVote {
        poll_id: String,
        option_id: String,
        user_id: String,
        room: String,
    },
    #[serde(rename = "whiteboard_data")]
    WhiteboardData {
        data: serde_json::Value,
        room: String,
        sender: User,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "user_list")]
    UserList { users: Vec<User> },
    #[serde(rename = "user_offline")]
    UserOffline { user_id: String, last_seen: i64 },
    #[serde(rename = "room_users")]
    RoomUsers { room: String, users: Vec<User> },
    #[serde(rename = "room_history")]
    RoomHistory {
        room: String,
        messages: Vec<StoredMessage>,
    },
    #[serde(rename = "chat_message")]
    ChatMessage { message: StoredMessage },
    #[serde(rename = "user_typing")]
    UserTyping {
        room: String,
        user_id: String,
        is_typing: bool,
    },
    #[serde(rename = "reaction_added")]
    ReactionAdded {
        message_id: String,
        reaction: String,
        user: User,
        reactions: Vec<Reaction>,
    },
    #[serde(rename = "poll_vote")]
    PollVote {
        message_id: String,
        option_id: String,
        user_id: String,
        poll: Poll,
    },
    #[serde(rename = "message_updated")]
    MessageUpdated { message: StoredMessage },
    #[serde(rename = "whiteboard_data")]
    WhiteboardData { data: serde_json::Value, sender: User },
    #[serde(rename = "waiting_for_match")]
    WaitingForMatch,
    #[serde(rename = "random_match_found")]
    RandomMatchFound {
        matched_user: User,
        private_room: String,
    },
    #[serde(rename = "random_match_ended")]
    RandomMatchEnded { room: String },
    #[serde(rename = "error")]
    Error { message: String },
}
