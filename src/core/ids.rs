//! Identifier types for the persistence service.
//!
//! This module is intentionally **type-heavy** and **logic-light**: strongly
//! typed ID newtypes give compile-time separation between the identifier
//! spaces (a `ThreadId` can never be passed where a `UserId` is expected),
//! plus helpers for generation, parsing, and formatting.
//!
//! All identifiers are random UUIDs (v4) so that nothing about creation
//! order leaks when an id is exposed on the wire.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declare a UUID newtype with a consistent API.
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl Default for $name {
            #[inline]
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            /// Create a new random identifier.
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[inline]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Borrow the underlying UUID.
            #[inline]
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            #[inline]
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

define_uuid_id!(
    /// Account that owns threads and controls their visibility.
    UserId
);

define_uuid_id!(
    /// Identity-provider account link.
    OauthAccountId
);

define_uuid_id!(
    /// Short-lived email-verification or password-reset token record.
    TokenId
);

define_uuid_id!(
    /// Conversation container.
    ThreadId
);

define_uuid_id!(
    /// Named party attributed to messages within a thread.
    ParticipantId
);

define_uuid_id!(
    /// One ordered utterance within a thread.
    MessageId
);

define_uuid_id!(
    /// Typed external reference bound to one message.
    AttachmentId
);

// ===== Rusqlite integration ================================================

mod rusqlite_impl {
    use super::{
        AttachmentId, MessageId, OauthAccountId, ParticipantId, ThreadId, TokenId, UserId,
    };

    use rusqlite::types::{
        FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef,
    };

    fn uuid_from_text(t: &[u8]) -> FromSqlResult<uuid::Uuid> {
        let s = std::str::from_utf8(t).map_err(|e| FromSqlError::Other(Box::new(e)))?;
        uuid::Uuid::parse_str(s).map_err(|e| FromSqlError::Other(Box::new(e)))
    }

    macro_rules! impl_rusqlite_uuid_newtype {
        ($t:ty) => {
            impl ToSql for $t {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    // Stored as canonical lowercase hex text for portability
                    Ok(ToSqlOutput::Owned(Value::Text(self.0.to_string())))
                }
            }

            impl FromSql for $t {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    match value {
                        ValueRef::Text(t) => uuid_from_text(t).map(Self),
                        _ => Err(FromSqlError::InvalidType),
                    }
                }
            }
        };
    }

    impl_rusqlite_uuid_newtype!(UserId);
    impl_rusqlite_uuid_newtype!(OauthAccountId);
    impl_rusqlite_uuid_newtype!(TokenId);
    impl_rusqlite_uuid_newtype!(ThreadId);
    impl_rusqlite_uuid_newtype!(ParticipantId);
    impl_rusqlite_uuid_newtype!(MessageId);
    impl_rusqlite_uuid_newtype!(AttachmentId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roundtrip() {
        let id = ThreadId::new();
        let parsed: ThreadId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_ids_are_distinct() {
        assert_ne!(UserId::new(), UserId::new());
    }
}
