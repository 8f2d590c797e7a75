//! Database row types. These map directly to SQLite rows (joined where a row
//! is always read together with its user profile) and stay distinct from the
//! campus-types API models.

use campus_types::models::{ItemRef, Role};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub struct UserRow {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub password: String,
    pub image: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

pub struct ConversationRow {
    pub id: Uuid,
    pub item: ItemRef,
    pub message_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A participant joined with the public fields of its user.
pub struct ParticipantRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub last_read_at: DateTime<Utc>,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
    pub role: Role,
}

/// A message joined with sender and receiver profile fields.
pub struct MessageRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: Option<String>,
    pub sender_image: Option<String>,
    pub receiver_id: Uuid,
    pub receiver_name: Option<String>,
    pub receiver_image: Option<String>,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// A conversation with its participants and (some of) its messages.
pub struct ConversationDetail {
    pub conversation: ConversationRow,
    pub participants: Vec<ParticipantRow>,
    pub messages: Vec<MessageRow>,
}

/// Which messages to load alongside a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSelection {
    /// Full history, oldest first.
    All,
    /// Full history, newest first.
    AllNewestFirst,
    /// Only the most recent message.
    Latest,
}

pub struct NotificationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// One row of a user's inbox.
pub struct InboxEntry {
    pub detail: ConversationDetail,
    pub unread_count: u64,
}
