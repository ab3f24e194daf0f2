//! Chat and message records.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const MESSAGE_TYPE_TEXT: &str = "text";
pub const MESSAGE_TYPE_FILE: &str = "file";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub created_at: String,
}

impl Chat {
    /// A message may only be appended by a participant.
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }
}

/// Messages are immutable once appended; ids grow in commit order per chat.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub message_type: String,
    pub created_at: String,
}

/// Participant display subset used when listing chats and messages.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatParticipant {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// A chat with its participants resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatWithParticipants {
    #[serde(flatten)]
    pub chat: Chat,
    pub participants: Vec<ChatParticipant>,
}

/// A message with its sender resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageWithSender {
    #[serde(flatten)]
    pub message: ChatMessage,
    pub sender: ChatParticipant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_check() {
        let chat = Chat {
            id: "c1".into(),
            buyer_id: "u1".into(),
            seller_id: "u2".into(),
            created_at: String::new(),
        };
        assert!(chat.is_participant("u1"));
        assert!(chat.is_participant("u2"));
        assert!(!chat.is_participant("u3"));
    }
}
