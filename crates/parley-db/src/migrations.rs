use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password        TEXT NOT NULL,
            profile_picture TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS friend_requests (
            id          TEXT PRIMARY KEY,
            sender_id   TEXT NOT NULL REFERENCES users(id),
            receiver_id TEXT NOT NULL REFERENCES users(id),
            status      TEXT NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'accepted', 'rejected', 'canceled')),
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            CHECK (sender_id <> receiver_id)
        );

        -- At most one pending request per unordered pair, in either direction.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_friend_requests_pending_pair
            ON friend_requests (MIN(sender_id, receiver_id), MAX(sender_id, receiver_id))
            WHERE status = 'pending';

        CREATE INDEX IF NOT EXISTS idx_friend_requests_receiver
            ON friend_requests (receiver_id, status);

        CREATE INDEX IF NOT EXISTS idx_friend_requests_sender
            ON friend_requests (sender_id, status);

        -- Canonical pair ordering makes uniqueness hold over the unordered pair.
        CREATE TABLE IF NOT EXISTS friendships (
            user_id1    TEXT NOT NULL REFERENCES users(id),
            user_id2    TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (user_id1, user_id2),
            CHECK (user_id1 < user_id2)
        );

        CREATE TABLE IF NOT EXISTS direct_messages (
            id          TEXT PRIMARY KEY,
            sender_id   TEXT NOT NULL REFERENCES users(id),
            receiver_id TEXT NOT NULL REFERENCES users(id),
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_direct_messages_pair
            ON direct_messages (sender_id, receiver_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
