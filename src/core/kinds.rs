//! Closed enumerated types shared by both protocol frontends.
//!
//! Each enum uses stable `snake_case` identifiers for storage and
//! interoperability. Parsing stored values is case-insensitive and happens
//! exactly once, at the storage boundary (`parse_stored`); domain logic only
//! ever sees the closed variants. The wire adapters keep their own mapping
//! tables on top of these types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Parse error shared by all kind enums.
#[derive(Debug, Clone)]
pub struct KindParseError {
    kind: &'static str,
    value: String,
}

impl KindParseError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }

    /// The raw value that failed parsing.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for KindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for KindParseError {}

macro_rules! define_kind {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal, default = $default:ident,
        { $($variant:ident => $str:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $(
                #[allow(missing_docs)]
                $variant,
            )+
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl $name {
            /// All variants, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Stable storage identifier.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $str),+
                }
            }

            /// Recover a stored value, tolerating legacy casing.
            ///
            /// This is the single place case normalization happens; callers
            /// outside the storage layer should use [`FromStr`] instead.
            ///
            /// # Errors
            /// Returns [`KindParseError`] if the value names no variant.
            pub fn parse_stored(raw: &str) -> Result<Self, KindParseError> {
                let trimmed = raw.trim();
                $(
                    if trimmed.eq_ignore_ascii_case($str) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(KindParseError::new($label, raw))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = KindParseError;

            /// Strict parse of the canonical identifier.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(KindParseError::new($label, s)),
                }
            }
        }
    };
}

define_kind!(
    /// Lifecycle state of a thread.
    ThreadStatus, "thread status", default = Open,
    {
        Open => "open",
        Paused => "paused",
        Closed => "closed",
    }
);

define_kind!(
    /// A participant's role within a conversation.
    ParticipantRole, "participant role", default = User,
    {
        User => "user",
        Agent => "agent",
        Tool => "tool",
    }
);

define_kind!(
    /// Message semantics for filtering and analytics.
    MessageKind, "message kind", default = Text,
    {
        Text => "text",
        Rich => "rich",
        ToolCall => "tool_call",
    }
);

define_kind!(
    /// Attachment payload type.
    AttachmentKind, "attachment kind", default = File,
    {
        File => "file",
        Image => "image",
        Link => "link",
    }
);
