use std::str::FromStr;

use anyhow::{Result, anyhow};
use campus_types::models::{ItemRef, ItemType, Role};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::debug;
use uuid::Uuid;

use crate::Database;
use crate::models::{
    ConversationDetail, ConversationRow, InboxEntry, MessageRow, MessageSelection,
    NotificationRow, ParticipantRow, UserRow,
};

const CONVERSATION_COLUMNS: &str =
    "c.id, c.item_type, c.item_id, c.message_count, c.created_at, c.updated_at";

const PARTICIPANT_SELECT: &str =
    "SELECT p.id, p.conversation_id, p.user_id, p.last_read_at, u.name, u.email, u.image, u.role
     FROM conversation_participants p
     JOIN users u ON u.id = p.user_id";

const MESSAGE_SELECT: &str =
    "SELECT m.id, m.conversation_id, m.sender_id, s.name, s.image,
            m.receiver_id, r.name, r.image, m.content, m.read, m.created_at
     FROM messages m
     JOIN users s ON s.id = m.sender_id
     JOIN users r ON r.id = m.receiver_id";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: Uuid,
        name: Option<&str>,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id.to_string(), name, email, password_hash, ts(&now)],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    pub fn user_exists(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [id.to_string()], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Returns false when no user has that email.
    pub fn set_user_role(&self, email: &str, role: Role) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?1 WHERE email = ?2",
                params![role.as_str(), email],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Conversations --

    /// Look up the conversation for (item, {a, b}) or create it with both
    /// participants. The pair key makes the lookup order-independent and the
    /// unique index turns a lost creation race into a reread.
    /// Returns the conversation with its full history and whether it was created.
    pub fn find_or_create_conversation(
        &self,
        item: &ItemRef,
        requester_id: Uuid,
        receiver_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(ConversationDetail, bool)> {
        let key = pair_key(requester_id, receiver_id);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let new_id = Uuid::new_v4();
            let inserted = tx.execute(
                "INSERT INTO conversations (id, item_type, item_id, pair_key, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(item_type, item_id, pair_key) DO NOTHING",
                params![new_id.to_string(), item.kind().as_str(), item.id(), key, ts(&now)],
            )?;
            let created = inserted == 1;

            let conversation_id = if created {
                for user_id in [requester_id, receiver_id] {
                    tx.execute(
                        "INSERT INTO conversation_participants (id, conversation_id, user_id, last_read_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            Uuid::new_v4().to_string(),
                            new_id.to_string(),
                            user_id.to_string(),
                            ts(&now)
                        ],
                    )?;
                }
                new_id
            } else {
                tx.query_row(
                    "SELECT id FROM conversations WHERE item_type = ?1 AND item_id = ?2 AND pair_key = ?3",
                    params![item.kind().as_str(), item.id(), key],
                    |row| parse_col(row, 0),
                )?
            };

            let detail = load_detail(&tx, conversation_id, MessageSelection::All)?
                .ok_or_else(|| anyhow!("Conversation {} missing after upsert", conversation_id))?;
            tx.commit()?;
            Ok((detail, created))
        })
    }

    pub fn get_participant(&self, conversation_id: Uuid, user_id: Uuid) -> Result<Option<ParticipantRow>> {
        self.with_conn(|conn| {
            let sql = format!("{PARTICIPANT_SELECT} WHERE p.conversation_id = ?1 AND p.user_id = ?2");
            let row = conn
                .query_row(
                    &sql,
                    params![conversation_id.to_string(), user_id.to_string()],
                    participant_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// The participant of `conversation_id` who is not `user_id`.
    pub fn other_participant_id(&self, conversation_id: Uuid, user_id: Uuid) -> Result<Option<Uuid>> {
        self.with_conn(|conn| {
            let id = conn
                .query_row(
                    "SELECT user_id FROM conversation_participants
                     WHERE conversation_id = ?1 AND user_id != ?2
                     ORDER BY rowid LIMIT 1",
                    params![conversation_id.to_string(), user_id.to_string()],
                    |row| parse_col(row, 0),
                )
                .optional()?;
            Ok(id)
        })
    }

    /// Every conversation `user_id` takes part in, most recently active first,
    /// each with its latest message and the user's unread count.
    pub fn list_conversations_for_user(&self, user_id: Uuid) -> Result<Vec<InboxEntry>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CONVERSATION_COLUMNS},
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.conversation_id = c.id AND m.receiver_id = ?1 AND m.read = 0)
                 FROM conversations c
                 JOIN conversation_participants p ON p.conversation_id = c.id
                 WHERE p.user_id = ?1
                 ORDER BY c.updated_at DESC, c.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok((conversation_from_row(row)?, row.get::<_, i64>(6)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut entries = Vec::with_capacity(rows.len());
            for (conversation, unread) in rows {
                let participants = query_participants(conn, conversation.id)?;
                let messages = query_messages(conn, conversation.id, MessageSelection::Latest)?;
                entries.push(InboxEntry {
                    detail: ConversationDetail { conversation, participants, messages },
                    unread_count: unread.max(0) as u64,
                });
            }
            Ok(entries)
        })
    }

    /// Fetch a conversation on behalf of `user_id`, marking every message
    /// addressed to them as read and advancing their `last_read_at`, all in
    /// one transaction. Returns `None` (and changes nothing) when the user is
    /// not a participant.
    pub fn open_conversation(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ConversationDetail>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let touched = tx.execute(
                "UPDATE conversation_participants SET last_read_at = ?3
                 WHERE conversation_id = ?1 AND user_id = ?2",
                params![conversation_id.to_string(), user_id.to_string(), ts(&now)],
            )?;
            if touched == 0 {
                return Ok(None);
            }

            let marked = tx.execute(
                "UPDATE messages SET read = 1
                 WHERE conversation_id = ?1 AND receiver_id = ?2 AND read = 0",
                params![conversation_id.to_string(), user_id.to_string()],
            )?;
            debug!("Marked {} messages read in {} for {}", marked, conversation_id, user_id);

            let detail = load_detail(&tx, conversation_id, MessageSelection::All)?;
            tx.commit()?;
            Ok(detail)
        })
    }

    pub fn get_conversation(
        &self,
        conversation_id: Uuid,
        selection: MessageSelection,
    ) -> Result<Option<ConversationDetail>> {
        self.with_conn(|conn| load_detail(conn, conversation_id, selection))
    }

    /// Delete a conversation with its messages and participants.
    /// Returns false if it did not exist.
    pub fn delete_conversation(&self, conversation_id: Uuid) -> Result<bool> {
        let id = conversation_id.to_string();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute("DELETE FROM messages WHERE conversation_id = ?1", [&id])?;
            tx.execute("DELETE FROM conversation_participants WHERE conversation_id = ?1", [&id])?;
            let removed = tx.execute("DELETE FROM conversations WHERE id = ?1", [&id])?;
            tx.commit()?;
            Ok(removed > 0)
        })
    }

    pub fn count_conversations(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
    }

    /// A page of all conversations, most recently active first, with full
    /// history newest first.
    pub fn list_all_conversations(&self, offset: u64, limit: u32) -> Result<Vec<ConversationDetail>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations c
                 ORDER BY c.updated_at DESC, c.rowid DESC
                 LIMIT ?1 OFFSET ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let conversations = stmt
                .query_map(params![limit as i64, offset as i64], conversation_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut details = Vec::with_capacity(conversations.len());
            for conversation in conversations {
                let participants = query_participants(conn, conversation.id)?;
                let messages = query_messages(conn, conversation.id, MessageSelection::AllNewestFirst)?;
                details.push(ConversationDetail { conversation, participants, messages });
            }
            Ok(details)
        })
    }

    // -- Messages --

    /// Persist a message and bump the conversation's `updated_at` and
    /// message count. Returns the stored row with both profiles attached.
    pub fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<MessageRow> {
        let message_id = Uuid::new_v4();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, receiver_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message_id.to_string(),
                    conversation_id.to_string(),
                    sender_id.to_string(),
                    receiver_id.to_string(),
                    content,
                    ts(&now)
                ],
            )?;
            tx.execute(
                "UPDATE conversations SET updated_at = ?2, message_count = message_count + 1 WHERE id = ?1",
                params![conversation_id.to_string(), ts(&now)],
            )?;

            let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
            let row = tx.query_row(&sql, [message_id.to_string()], message_from_row)?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Delete every message created strictly before `cutoff`, keeping the
    /// per-conversation message counts in step. Returns how many were deleted.
    pub fn delete_messages_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let cutoff = ts(&cutoff);
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let per_conversation: Vec<(String, i64)> = {
                let mut stmt = tx.prepare(
                    "SELECT conversation_id, COUNT(*) FROM messages
                     WHERE created_at < ?1 GROUP BY conversation_id",
                )?;
                let rows = stmt
                    .query_map([&cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            for (conversation_id, expired) in &per_conversation {
                tx.execute(
                    "UPDATE conversations SET message_count = MAX(message_count - ?2, 0) WHERE id = ?1",
                    params![conversation_id, expired],
                )?;
            }

            let deleted = tx.execute("DELETE FROM messages WHERE created_at < ?1", [&cutoff])?;
            tx.commit()?;
            Ok(deleted as u64)
        })
    }

    /// Remove every conversation that has no messages left, participants first.
    pub fn delete_empty_conversations(&self) -> Result<u64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let ids: Vec<String> = {
                let mut stmt = tx.prepare("SELECT id FROM conversations WHERE message_count = 0")?;
                let rows = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            for id in &ids {
                tx.execute("DELETE FROM conversation_participants WHERE conversation_id = ?1", [id])?;
                tx.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
            }

            tx.commit()?;
            Ok(ids.len() as u64)
        })
    }

    // -- Notifications --

    pub fn create_notification(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        kind: &str,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, title, message, type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id.to_string(), user_id.to_string(), title, message, kind, ts(&now)],
            )?;
            Ok(id)
        })
    }

    pub fn list_notifications(&self, user_id: Uuid, limit: u32) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, message, type, read, created_at
                 FROM notifications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![user_id.to_string(), limit as i64], |row| {
                    Ok(NotificationRow {
                        id: parse_col(row, 0)?,
                        user_id: parse_col(row, 1)?,
                        title: row.get(2)?,
                        message: row.get(3)?,
                        kind: row.get(4)?,
                        read: row.get(5)?,
                        created_at: parse_col(row, 6)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

/// Order-independent key for a participant pair.
pub fn pair_key(a: Uuid, b: Uuid) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{}:{}", low, high)
}

/// Timestamps are stored as fixed-width RFC 3339 UTC text so that string
/// comparison in SQL matches chronological order.
pub(crate) fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Read a TEXT column and parse it, reporting failures as a column conversion error.
pub(crate) fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, name, email, password, image, role, created_at FROM users WHERE {column} = ?1"
    );
    let row = conn
        .query_row(&sql, [value], |row| {
            Ok(UserRow {
                id: parse_col(row, 0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                image: row.get(4)?,
                role: parse_col(row, 5)?,
                created_at: parse_col(row, 6)?,
            })
        })
        .optional()?;
    Ok(row)
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    let kind: ItemType = parse_col(row, 1)?;
    Ok(ConversationRow {
        id: parse_col(row, 0)?,
        item: ItemRef::new(kind, row.get::<_, String>(2)?),
        message_count: row.get::<_, i64>(3)?.max(0) as u64,
        created_at: parse_col(row, 4)?,
        updated_at: parse_col(row, 5)?,
    })
}

fn participant_from_row(row: &Row<'_>) -> rusqlite::Result<ParticipantRow> {
    Ok(ParticipantRow {
        id: parse_col(row, 0)?,
        conversation_id: parse_col(row, 1)?,
        user_id: parse_col(row, 2)?,
        last_read_at: parse_col(row, 3)?,
        name: row.get(4)?,
        email: row.get(5)?,
        image: row.get(6)?,
        role: parse_col(row, 7)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: parse_col(row, 0)?,
        conversation_id: parse_col(row, 1)?,
        sender_id: parse_col(row, 2)?,
        sender_name: row.get(3)?,
        sender_image: row.get(4)?,
        receiver_id: parse_col(row, 5)?,
        receiver_name: row.get(6)?,
        receiver_image: row.get(7)?,
        content: row.get(8)?,
        read: row.get(9)?,
        created_at: parse_col(row, 10)?,
    })
}

fn query_participants(conn: &Connection, conversation_id: Uuid) -> Result<Vec<ParticipantRow>> {
    let sql = format!("{PARTICIPANT_SELECT} WHERE p.conversation_id = ?1 ORDER BY p.rowid");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([conversation_id.to_string()], participant_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn query_messages(
    conn: &Connection,
    conversation_id: Uuid,
    selection: MessageSelection,
) -> Result<Vec<MessageRow>> {
    // rowid breaks ties between messages stored with the same timestamp
    let tail = match selection {
        MessageSelection::All => "ORDER BY m.created_at ASC, m.rowid ASC",
        MessageSelection::AllNewestFirst => "ORDER BY m.created_at DESC, m.rowid DESC",
        MessageSelection::Latest => "ORDER BY m.created_at DESC, m.rowid DESC LIMIT 1",
    };
    let sql = format!("{MESSAGE_SELECT} WHERE m.conversation_id = ?1 {tail}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([conversation_id.to_string()], message_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn load_detail(
    conn: &Connection,
    conversation_id: Uuid,
    selection: MessageSelection,
) -> Result<Option<ConversationDetail>> {
    let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations c WHERE c.id = ?1");
    let Some(conversation) = conn
        .query_row(&sql, [conversation_id.to_string()], conversation_from_row)
        .optional()?
    else {
        return Ok(None);
    };

    let participants = query_participants(conn, conversation_id)?;
    let messages = query_messages(conn, conversation_id, selection)?;
    Ok(Some(ConversationDetail { conversation, participants, messages }))
}
