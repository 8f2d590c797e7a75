use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, listings, messaging)");
        let tx = conn.transaction()?;
        tx.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                name            TEXT,
                email           TEXT NOT NULL UNIQUE,
                password        TEXT NOT NULL,
                image           TEXT,
                phone_number    TEXT,
                role            TEXT NOT NULL DEFAULT 'STUDENT',
                created_at      TEXT NOT NULL
            );

            -- Listings. Owned by the marketplace CRUD; the messaging core only reads them.
            CREATE TABLE lost_items (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                category    TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'OPEN',
                user_id     TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL
            );

            CREATE TABLE found_items (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                category    TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'OPEN',
                user_id     TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL
            );

            CREATE TABLE books (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                author      TEXT NOT NULL,
                type        TEXT NOT NULL,
                available   INTEGER NOT NULL DEFAULT 1,
                owner_id    TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL
            );

            CREATE TABLE events (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                date        TEXT NOT NULL,
                venue       TEXT NOT NULL,
                posted_by   TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL
            );

            -- pair_key is the two participant ids sorted and joined with ':'
            CREATE TABLE conversations (
                id              TEXT PRIMARY KEY,
                item_type       TEXT NOT NULL,
                item_id         TEXT NOT NULL,
                pair_key        TEXT NOT NULL,
                message_count   INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                UNIQUE(item_type, item_id, pair_key)
            );

            CREATE INDEX idx_conversations_updated
                ON conversations(updated_at);

            CREATE INDEX idx_conversations_message_count
                ON conversations(message_count);

            CREATE TABLE conversation_participants (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                user_id         TEXT NOT NULL REFERENCES users(id),
                last_read_at    TEXT NOT NULL,
                UNIQUE(conversation_id, user_id)
            );

            CREATE INDEX idx_participants_user
                ON conversation_participants(user_id);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                sender_id       TEXT NOT NULL REFERENCES users(id),
                receiver_id     TEXT NOT NULL REFERENCES users(id),
                content         TEXT NOT NULL,
                read            INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, created_at);

            CREATE INDEX idx_messages_unread
                ON messages(receiver_id, read);

            CREATE INDEX idx_messages_created
                ON messages(created_at);

            CREATE TABLE notifications (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                title       TEXT NOT NULL,
                message     TEXT NOT NULL,
                type        TEXT NOT NULL,
                read        INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_user
                ON notifications(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
        tx.commit()?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
