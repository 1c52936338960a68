//! Versioned schema migrations, keyed on `PRAGMA user_version`.
//!
//! Step 3 is the documented non-reversible ownership backfill: threads
//! predating mandatory ownership are adopted by the earliest-created account
//! (or deleted when no accounts exist) before `user_id` becomes mandatory.
//! There is no downgrade path for that step; irreversibility is an
//! operational constraint of the deployment, not a defect.

use rusqlite::{Connection, OptionalExtension, params};

use crate::core::errors::{ServiceError, ServiceResult};

/// Schema version the code expects.
pub const CURRENT_VERSION: i64 = 3;

/// Bring the database up to [`CURRENT_VERSION`], one transactional step at a
/// time. Fresh databases run every step in order.
///
/// # Errors
/// Returns an error if a migration step fails; the failing step is rolled
/// back and `user_version` keeps its pre-step value.
pub fn migrate(conn: &mut Connection) -> ServiceResult<()> {
    loop {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version >= CURRENT_VERSION {
            return Ok(());
        }
        let tx = conn.transaction()?;
        match version {
            0 => initial_conversation_schema(&tx)?,
            1 => account_schema(&tx)?,
            2 => ownership_backfill(&tx)?,
            other => {
                return Err(ServiceError::InvalidConfig(format!(
                    "database schema version {other} is not supported by this build"
                )));
            }
        }
        tx.pragma_update(None, "user_version", version + 1)?;
        tx.commit()?;
        tracing::info!(from = version, to = version + 1, "applied schema migration");
    }
}

/// v0 → v1: conversation tables, before accounts existed.
fn initial_conversation_schema(tx: &rusqlite::Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE threads (
            id TEXT PRIMARY KEY,
            title TEXT,
            status TEXT NOT NULL DEFAULT 'open',
            summary TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX idx_threads_created ON threads (created_at);

        CREATE TABLE participants (
            id TEXT PRIMARY KEY,
            thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
            role TEXT NOT NULL DEFAULT 'user',
            display_name TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL
        );
        CREATE INDEX idx_participants_thread ON participants (thread_id);

        CREATE TABLE messages (
            id TEXT PRIMARY KEY,
            thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
            participant_id TEXT REFERENCES participants(id) ON DELETE SET NULL,
            kind TEXT NOT NULL DEFAULT 'text',
            content TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL
        );
        CREATE INDEX idx_messages_thread_created ON messages (thread_id, created_at);

        CREATE TABLE message_attachments (
            id TEXT PRIMARY KEY,
            message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            kind TEXT NOT NULL DEFAULT 'file',
            uri TEXT NOT NULL,
            content_type TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL
        );
        CREATE INDEX idx_attachments_message ON message_attachments (message_id);",
    )
}

/// v1 → v2: account tables plus a nullable owner column on threads.
fn account_schema(tx: &rusqlite::Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT,
            name TEXT,
            avatar_url TEXT,
            email_verified INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX idx_users_email ON users (email);

        CREATE TABLE oauth_accounts (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            provider TEXT NOT NULL,
            provider_user_id TEXT NOT NULL,
            access_token TEXT,
            refresh_token TEXT,
            expires_at INTEGER,
            created_at INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX idx_oauth_provider_user
            ON oauth_accounts (provider, provider_user_id);
        CREATE INDEX idx_oauth_user ON oauth_accounts (user_id);

        CREATE TABLE email_verification_tokens (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            token TEXT NOT NULL UNIQUE,
            expires_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX idx_email_tokens_user ON email_verification_tokens (user_id);

        CREATE TABLE password_reset_tokens (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            token TEXT NOT NULL UNIQUE,
            expires_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX idx_reset_tokens_user ON password_reset_tokens (user_id);

        ALTER TABLE threads ADD COLUMN user_id TEXT REFERENCES users(id);",
    )
}

/// v2 → v3: adopt or drop ownerless threads, then make ownership mandatory.
///
/// One-way step: the set of previously ownerless threads is not recorded
/// anywhere, so the NULL values cannot be restored.
fn ownership_backfill(tx: &rusqlite::Transaction<'_>) -> rusqlite::Result<()> {
    let orphaned: i64 =
        tx.query_row("SELECT COUNT(*) FROM threads WHERE user_id IS NULL", [], |row| {
            row.get(0)
        })?;

    if orphaned > 0 {
        let adopter: Option<String> = tx
            .query_row(
                "SELECT id FROM users ORDER BY created_at ASC, rowid ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match adopter {
            Some(user_id) => {
                tx.execute(
                    "UPDATE threads SET user_id = ?1 WHERE user_id IS NULL",
                    params![user_id],
                )?;
                tracing::warn!(
                    count = orphaned,
                    owner = %user_id,
                    "assigned ownerless threads to the earliest account (one-way backfill)"
                );
            }
            None => {
                // Foreign keys are off during migration, so cascade manually.
                tx.execute_batch(
                    "DELETE FROM message_attachments WHERE message_id IN (
                         SELECT m.id FROM messages m
                         JOIN threads t ON t.id = m.thread_id
                         WHERE t.user_id IS NULL);
                     DELETE FROM messages WHERE thread_id IN (
                         SELECT id FROM threads WHERE user_id IS NULL);
                     DELETE FROM participants WHERE thread_id IN (
                         SELECT id FROM threads WHERE user_id IS NULL);
                     DELETE FROM threads WHERE user_id IS NULL;",
                )?;
                tracing::warn!(
                    count = orphaned,
                    "deleted ownerless threads; no accounts exist to adopt them"
                );
            }
        }
    }

    tx.execute_batch(
        "CREATE TABLE threads_owned (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title TEXT,
            status TEXT NOT NULL DEFAULT 'open',
            summary TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        INSERT INTO threads_owned (id, user_id, title, status, summary, metadata, created_at, updated_at)
            SELECT id, user_id, title, status, summary, metadata, created_at, updated_at
            FROM threads;
        DROP TABLE threads;
        ALTER TABLE threads_owned RENAME TO threads;
        CREATE INDEX idx_threads_owner_created ON threads (user_id, created_at);",
    )
}
