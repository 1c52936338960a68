//! Thread, message, and attachment operations.
//!
//! All operations here are owner-scoped: the open question of whether
//! message appends should trust an adapter-level ownership check is resolved
//! by scoping every thread-touching call uniformly at this boundary.

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params, params_from_iter};

use crate::core::entities::{
    Attachment, Message, NewMessage, NewThread, Participant, Thread, ThreadFilter, ThreadPage,
};
use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::ids::{AttachmentId, MessageId, ParticipantId, ThreadId, UserId};
use crate::core::kinds::{AttachmentKind, MessageKind, ParticipantRole, ThreadStatus};
use crate::core::metadata::{Metadata, encode_metadata, merge_metadata};

use super::{Store, corrupt, is_constraint_violation, meta_from_sql, other_err, ts_from_millis};

impl Store {
    /// Persist a new thread along with its initial participants.
    ///
    /// The thread row and every participant row commit together or not at
    /// all. The returned thread has its participants populated and no
    /// messages.
    ///
    /// # Errors
    /// `NotFound` if the owner account no longer exists.
    pub async fn create_thread(&self, owner: UserId, payload: NewThread) -> ServiceResult<Thread> {
        let now = Utc::now();
        let thread_id = ThreadId::new();
        let metadata_json = encode_metadata(&payload.metadata)?;

        let mut participants = Vec::with_capacity(payload.participants.len());
        let mut participant_rows = Vec::with_capacity(payload.participants.len());
        for entry in &payload.participants {
            let id = ParticipantId::new();
            participant_rows.push((
                id,
                entry.role.as_str(),
                entry.display_name.clone(),
                encode_metadata(&entry.metadata)?,
            ));
            participants.push(Participant {
                id,
                thread_id,
                role: entry.role,
                display_name: entry.display_name.clone(),
                metadata: entry.metadata.clone(),
                created_at: now,
            });
        }

        let thread = Thread {
            id: thread_id,
            user_id: owner,
            title: payload.title.clone(),
            status: payload.status,
            summary: payload.summary.clone(),
            metadata: payload.metadata,
            created_at: now,
            updated_at: now,
            participants,
            messages: Vec::new(),
        };

        let title = payload.title;
        let summary = payload.summary;
        let status = payload.status.as_str();
        let now_ms = now.timestamp_millis();
        let result = self
            .conn()
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO threads
                         (id, user_id, title, status, summary, metadata, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![thread_id, owner, title, status, summary, metadata_json, now_ms, now_ms],
                )?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO participants
                             (id, thread_id, role, display_name, metadata, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )?;
                    for (id, role, display_name, metadata) in &participant_rows {
                        stmt.execute(params![id, thread_id, role, display_name, metadata, now_ms])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await;
        match result {
            Ok(()) => Ok(thread),
            // The only constraint on this write is the owner foreign key.
            Err(err) if is_constraint_violation(&err) => Err(ServiceError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    /// Return one page of an owner's threads plus the total matching count.
    ///
    /// Filters AND-compose; ordering is newest-created first. The count runs
    /// as a separate query under the same filters, so page and total are
    /// exact between writes but may drift slightly under concurrent ones.
    /// `limit`/`offset` are applied verbatim — clamping belongs to the
    /// calling adapter.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn list_threads(
        &self,
        owner: UserId,
        filter: ThreadFilter,
    ) -> ServiceResult<ThreadPage> {
        let mut clauses = vec!["user_id = ?"];
        let mut values: Vec<Value> = vec![Value::Text(owner.to_string())];
        if let Some(participant_id) = filter.participant_id {
            clauses.push(
                "EXISTS (SELECT 1 FROM participants p
                         WHERE p.thread_id = threads.id AND p.id = ?)",
            );
            values.push(Value::Text(participant_id.to_string()));
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(after) = filter.created_after {
            clauses.push("created_at >= ?");
            values.push(Value::Integer(after.timestamp_millis()));
        }
        if let Some(before) = filter.created_before {
            clauses.push("created_at <= ?");
            values.push(Value::Integer(before.timestamp_millis()));
        }
        let where_clause = clauses.join(" AND ");
        let limit = filter.limit;
        let offset = filter.offset;

        let page = self
            .conn()
            .call(move |conn| {
                let mut page_values = values.clone();
                page_values.push(Value::Integer(limit));
                page_values.push(Value::Integer(offset));
                let ids: Vec<ThreadId> = {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT id FROM threads WHERE {where_clause}
                         ORDER BY created_at DESC, rowid DESC
                         LIMIT ? OFFSET ?"
                    ))?;
                    stmt.query_map(params_from_iter(page_values.iter()), |row| row.get(0))?
                        .collect::<Result<_, rusqlite::Error>>()?
                };
                let mut threads = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(thread) = load_thread(conn, id, None)? {
                        threads.push(thread);
                    }
                }
                let total: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM threads WHERE {where_clause}"),
                    params_from_iter(values.iter()),
                    |row| row.get(0),
                )?;
                let total =
                    u64::try_from(total).map_err(|_| corrupt(format!("negative count {total}")))?;
                Ok(ThreadPage { threads, total })
            })
            .await?;
        Ok(page)
    }

    /// Fetch a thread with all participants and messages (each message with
    /// its attachments), messages ordered by creation time ascending.
    ///
    /// # Errors
    /// `NotFound` if absent or not owned by `owner`.
    pub async fn get_thread(&self, owner: UserId, thread_id: ThreadId) -> ServiceResult<Thread> {
        let found = self
            .conn()
            .call(move |conn| load_thread(conn, thread_id, Some(owner)))
            .await?;
        found.ok_or(ServiceError::NotFound)
    }

    /// Shallow-merge `patch` into the thread's attribute map and refresh its
    /// update timestamp: supplied keys are added or overwritten, untouched
    /// keys are preserved.
    ///
    /// # Errors
    /// `NotFound` under the same rule as [`Store::get_thread`].
    pub async fn update_thread_metadata(
        &self,
        owner: UserId,
        thread_id: ThreadId,
        patch: Metadata,
    ) -> ServiceResult<Thread> {
        let now_ms = Utc::now().timestamp_millis();
        let updated = self
            .conn()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let existing: Option<Option<String>> = tx
                    .query_row(
                        "SELECT metadata FROM threads WHERE id = ?1 AND user_id = ?2",
                        params![thread_id, owner],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(raw) = existing else {
                    return Ok(false);
                };
                let mut merged = meta_from_sql(raw)?;
                merge_metadata(&mut merged, patch);
                let encoded = encode_metadata(&merged).map_err(other_err)?;
                tx.execute(
                    "UPDATE threads SET metadata = ?3, updated_at = ?4
                     WHERE id = ?1 AND user_id = ?2",
                    params![thread_id, owner, encoded, now_ms],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await?;
        if !updated {
            return Err(ServiceError::NotFound);
        }
        self.get_thread(owner, thread_id).await
    }

    /// Append a message to a thread, with nested attachments.
    ///
    /// The message row and every attachment row commit together or not at
    /// all; a failure on any nested row leaves zero rows from this call
    /// visible.
    ///
    /// # Errors
    /// `NotFound` if the thread is absent or not owned by `owner`;
    /// `InvalidArgument` for empty content or an unknown participant.
    pub async fn append_message(
        &self,
        owner: UserId,
        thread_id: ThreadId,
        payload: NewMessage,
    ) -> ServiceResult<Message> {
        if payload.content.trim().is_empty() {
            return Err(ServiceError::InvalidArgument(
                "message content must not be empty".to_string(),
            ));
        }
        let now = Utc::now();
        let message_id = MessageId::new();
        let metadata_json = encode_metadata(&payload.metadata)?;

        let mut attachments = Vec::with_capacity(payload.attachments.len());
        let mut attachment_rows = Vec::with_capacity(payload.attachments.len());
        for entry in &payload.attachments {
            let id = AttachmentId::new();
            attachment_rows.push((
                id,
                entry.kind.as_str(),
                entry.uri.clone(),
                entry.content_type.clone(),
                encode_metadata(&entry.metadata)?,
            ));
            attachments.push(Attachment {
                id,
                message_id,
                kind: entry.kind,
                uri: entry.uri.clone(),
                content_type: entry.content_type.clone(),
                metadata: entry.metadata.clone(),
                created_at: now,
            });
        }

        let message = Message {
            id: message_id,
            thread_id,
            participant_id: payload.participant_id,
            kind: payload.kind,
            content: payload.content.clone(),
            metadata: payload.metadata,
            created_at: now,
            attachments,
        };

        let participant_id = payload.participant_id;
        let kind = payload.kind.as_str();
        let content = payload.content;
        let now_ms = now.timestamp_millis();
        let result = self
            .conn()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let exists: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM threads WHERE id = ?1 AND user_id = ?2",
                        params![thread_id, owner],
                        |row| row.get(0),
                    )
                    .optional()?;
                if exists.is_none() {
                    return Ok(false);
                }
                tx.execute(
                    "INSERT INTO messages
                         (id, thread_id, participant_id, kind, content, metadata, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![message_id, thread_id, participant_id, kind, content, metadata_json, now_ms],
                )?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO message_attachments
                             (id, message_id, kind, uri, content_type, metadata, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    )?;
                    for (id, kind, uri, content_type, metadata) in &attachment_rows {
                        stmt.execute(params![id, message_id, kind, uri, content_type, metadata, now_ms])?;
                    }
                }
                tx.commit()?;
                Ok(true)
            })
            .await;
        match result {
            Ok(true) => Ok(message),
            Ok(false) => Err(ServiceError::NotFound),
            Err(err) if is_constraint_violation(&err) => Err(ServiceError::InvalidArgument(
                "message references an unknown participant".to_string(),
            )),
            Err(err) => Err(err.into()),
        }
    }
}

// ===== Graph loading ========================================================

type RawThread = (
    ThreadId,
    UserId,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    i64,
    i64,
);

/// Load one thread with its full graph. `owner` of `None` skips the
/// ownership filter; listing queries have already applied it.
fn load_thread(
    conn: &rusqlite::Connection,
    thread_id: ThreadId,
    owner: Option<UserId>,
) -> Result<Option<Thread>, tokio_rusqlite::Error> {
    let raw: Option<RawThread> = match owner {
        Some(owner) => conn
            .query_row(
                "SELECT id, user_id, title, status, summary, metadata, created_at, updated_at
                 FROM threads WHERE id = ?1 AND user_id = ?2",
                params![thread_id, owner],
                thread_from_row,
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT id, user_id, title, status, summary, metadata, created_at, updated_at
                 FROM threads WHERE id = ?1",
                params![thread_id],
                thread_from_row,
            )
            .optional()?,
    };
    let Some((id, user_id, title, status, summary, metadata, created, updated)) = raw else {
        return Ok(None);
    };
    Ok(Some(Thread {
        id,
        user_id,
        title,
        status: ThreadStatus::parse_stored(&status).map_err(other_err)?,
        summary,
        metadata: meta_from_sql(metadata)?,
        created_at: ts_from_millis(created)?,
        updated_at: ts_from_millis(updated)?,
        participants: load_participants(conn, id)?,
        messages: load_messages(conn, id)?,
    }))
}

fn thread_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawThread> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn load_participants(
    conn: &rusqlite::Connection,
    thread_id: ThreadId,
) -> Result<Vec<Participant>, tokio_rusqlite::Error> {
    let rows = {
        let mut stmt = conn.prepare(
            "SELECT id, role, display_name, metadata, created_at
             FROM participants WHERE thread_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        stmt.query_map(params![thread_id], |row| {
            Ok((
                row.get::<_, ParticipantId>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, rusqlite::Error>>()?
    };
    let mut participants = Vec::with_capacity(rows.len());
    for (id, role, display_name, metadata, created) in rows {
        participants.push(Participant {
            id,
            thread_id,
            role: ParticipantRole::parse_stored(&role).map_err(other_err)?,
            display_name,
            metadata: meta_from_sql(metadata)?,
            created_at: ts_from_millis(created)?,
        });
    }
    Ok(participants)
}

fn load_messages(
    conn: &rusqlite::Connection,
    thread_id: ThreadId,
) -> Result<Vec<Message>, tokio_rusqlite::Error> {
    let rows = {
        let mut stmt = conn.prepare(
            "SELECT id, participant_id, kind, content, metadata, created_at
             FROM messages WHERE thread_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        stmt.query_map(params![thread_id], |row| {
            Ok((
                row.get::<_, MessageId>(0)?,
                row.get::<_, Option<ParticipantId>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, rusqlite::Error>>()?
    };
    let mut messages = Vec::with_capacity(rows.len());
    for (id, participant_id, kind, content, metadata, created) in rows {
        messages.push(Message {
            id,
            thread_id,
            participant_id,
            kind: MessageKind::parse_stored(&kind).map_err(other_err)?,
            content,
            metadata: meta_from_sql(metadata)?,
            created_at: ts_from_millis(created)?,
            attachments: load_attachments(conn, id)?,
        });
    }
    Ok(messages)
}

fn load_attachments(
    conn: &rusqlite::Connection,
    message_id: MessageId,
) -> Result<Vec<Attachment>, tokio_rusqlite::Error> {
    let rows = {
        let mut stmt = conn.prepare(
            "SELECT id, kind, uri, content_type, metadata, created_at
             FROM message_attachments WHERE message_id = ?1
             ORDER BY rowid ASC",
        )?;
        stmt.query_map(params![message_id], |row| {
            Ok((
                row.get::<_, AttachmentId>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, rusqlite::Error>>()?
    };
    let mut attachments = Vec::with_capacity(rows.len());
    for (id, kind, uri, content_type, metadata, created) in rows {
        attachments.push(Attachment {
            id,
            message_id,
            kind: AttachmentKind::parse_stored(&kind).map_err(other_err)?,
            uri,
            content_type,
            metadata: meta_from_sql(metadata)?,
            created_at: ts_from_millis(created)?,
        });
    }
    Ok(attachments)
}
