//! Error taxonomy shared by the repository layer and both frontends.

use thiserror::Error;

/// Service error type.
///
/// The first five variants are the expected categories repository and
/// identity code return deliberately; everything below them is an unexpected
/// failure that the adapters translate to an internal error, logging the
/// cause server-side while the caller receives a generic message.
///
/// An ownership mismatch is reported as [`ServiceError::NotFound`], exactly
/// like a genuinely absent id, so existence of other owners' data never
/// leaks through an externally observable response.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Entity absent, or owned by a different account.
    #[error("not found")]
    NotFound,
    /// Uniqueness violation (duplicate email, duplicate token string).
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// Missing, malformed, expired, or otherwise unusable credential.
    #[error("unauthenticated: {0}")]
    Unauthenticated(&'static str),
    /// A credential that verified but carries no usable subject claim.
    #[error("credential carries no subject")]
    InvalidCredential,
    /// Malformed input caught before reaching storage.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Unexpected failure described in-process; logged server-side, reported
    /// generically to callers.
    #[error("internal error: {0}")]
    Internal(String),
    /// `SQLite` error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A stored row violated an invariant the schema cannot express.
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

impl ServiceError {
    /// True if the adapters should report this as an internal failure.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        !matches!(
            self,
            Self::NotFound
                | Self::AlreadyExists(_)
                | Self::Unauthenticated(_)
                | Self::InvalidCredential
                | Self::InvalidArgument(_)
        )
    }
}

/// Convenience result alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
