//! Repository layer: the only component permitted to touch storage.
//!
//! A [`Store`] wraps one `SQLite` connection serviced by a dedicated
//! background thread (`tokio_rusqlite`); each operation runs its closure
//! start-to-finish on that connection and releases it on every exit path.
//! Multi-row writes (thread + participants, message + attachments) commit
//! inside a single transaction.
//!
//! Every thread-touching operation takes the owner id as an explicit
//! parameter and filters by it; an ownership mismatch surfaces as
//! `NotFound`, indistinguishable from a genuinely absent id.

pub mod schema;
mod threads;
mod users;

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use tokio_rusqlite::Connection;

use crate::core::config::StorageConfig;
use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::metadata::{Metadata, decode_metadata};

/// Handle to the relational store. Cheap to clone; clones share the same
/// underlying connection.
#[derive(Clone)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at the configured path and bring the
    /// schema up to the current version.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(config: &StorageConfig) -> ServiceResult<Self> {
        let conn = Connection::open(config.sqlite_path.clone()).await?;
        Self::init(conn).await
    }

    /// Open a store at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open_at(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let conn = Connection::open(path.as_ref().to_path_buf()).await?;
        Self::init(conn).await
    }

    /// Open an in-memory store, mainly for tests.
    ///
    /// # Errors
    /// Returns an error if migration fails.
    pub async fn open_in_memory() -> ServiceResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> ServiceResult<Self> {
        conn.call(|conn| {
            // Foreign keys stay off while migrations rebuild tables, and are
            // enabled for the lifetime of the connection afterwards.
            conn.execute_batch("PRAGMA foreign_keys=OFF;")?;
            schema::migrate(conn).map_err(other_err)?;
            conn.execute_batch("PRAGMA foreign_keys=ON;")?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ===== Row-mapping helpers shared by the store modules ======================

/// Wrap a conversion failure so it can cross the connection-thread boundary.
pub(crate) fn other_err<E>(err: E) -> tokio_rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    tokio_rusqlite::Error::Other(Box::new(err))
}

pub(crate) fn corrupt(msg: String) -> tokio_rusqlite::Error {
    other_err(ServiceError::CorruptRow(msg))
}

/// Decode an epoch-milliseconds column.
pub(crate) fn ts_from_millis(ms: i64) -> Result<DateTime<Utc>, tokio_rusqlite::Error> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| corrupt(format!("invalid timestamp {ms}")))
}

/// Decode a metadata column; invoked exactly once per entity read.
pub(crate) fn meta_from_sql(raw: Option<String>) -> Result<Metadata, tokio_rusqlite::Error> {
    decode_metadata(raw.as_deref()).map_err(other_err)
}

/// True if the error is a storage-level constraint violation (unique or
/// foreign key), the mechanism "first write wins" races rely on.
pub(crate) fn is_constraint_violation(err: &tokio_rusqlite::Error) -> bool {
    matches!(
        err,
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
