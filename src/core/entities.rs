//! Persisted entities and the payload shapes used to create them.
//!
//! The structs here are the domain pivot both protocol frontends translate
//! to and from; the repository layer is the only component that materializes
//! them from storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::ids::{
    AttachmentId, MessageId, OauthAccountId, ParticipantId, ThreadId, TokenId, UserId,
};
use crate::core::kinds::{AttachmentKind, MessageKind, ParticipantRole, ThreadStatus};
use crate::core::metadata::Metadata;

/// User account information.
///
/// `password_hash` is absent for accounts created through an identity
/// provider; such accounts always carry at least one [`OauthAccount`] link.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    /// Account identifier.
    pub id: UserId,
    /// Globally unique email address.
    pub email: String,
    /// Opaque password digest, absent for provider-linked accounts.
    pub password_hash: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// Whether the email address has been verified.
    pub email_verified: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Identity-provider account link.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OauthAccount {
    /// Link identifier.
    pub id: OauthAccountId,
    /// Owning account.
    pub user_id: UserId,
    /// Provider name, e.g. `google` or `github`.
    pub provider: String,
    /// Provider-scoped subject identifier.
    pub provider_user_id: String,
    /// Stored provider access token, if any.
    pub access_token: Option<String>,
    /// Stored provider refresh token, if any.
    pub refresh_token: Option<String>,
    /// Provider token expiry, if known.
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Short-lived single-purpose token record.
///
/// The same row shape backs email-verification (24 h) and password-reset
/// (1 h, single use) tokens; they live in separate tables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShortLivedToken {
    /// Record identifier.
    pub id: TokenId,
    /// Owning account.
    pub user_id: UserId,
    /// Globally unique opaque token string.
    pub token: String,
    /// Expiry; the record is never returned by lookup past this instant.
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl ShortLivedToken {
    /// True while the token may still be consumed.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Top-level conversation container.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Thread {
    /// Thread identifier.
    pub id: ThreadId,
    /// Owning account.
    pub user_id: UserId,
    /// Optional title.
    pub title: Option<String>,
    /// Lifecycle state.
    pub status: ThreadStatus,
    /// Optional rolling summary.
    pub summary: Option<String>,
    /// Free-form attribute map.
    pub metadata: Metadata,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp; refreshed on any mutation of the thread row.
    pub updated_at: DateTime<Utc>,
    /// Participants, oldest first.
    pub participants: Vec<Participant>,
    /// Messages ordered by creation time ascending.
    pub messages: Vec<Message>,
}

/// Individual or agent taking part in a thread.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Participant {
    /// Participant identifier.
    pub id: ParticipantId,
    /// Owning thread.
    pub thread_id: ThreadId,
    /// Role within the conversation.
    pub role: ParticipantRole,
    /// Optional display name.
    pub display_name: Option<String>,
    /// Free-form attribute map.
    pub metadata: Metadata,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One conversational message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier.
    pub id: MessageId,
    /// Owning thread.
    pub thread_id: ThreadId,
    /// Attributed participant; nulled when the participant is deleted.
    pub participant_id: Option<ParticipantId>,
    /// Message semantics.
    pub kind: MessageKind,
    /// Message body; never empty.
    pub content: String,
    /// Free-form attribute map.
    pub metadata: Metadata,
    /// Creation timestamp; total order within a thread.
    pub created_at: DateTime<Utc>,
    /// Attachments in the order they were supplied.
    pub attachments: Vec<Attachment>,
}

/// Attachment metadata for a message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment identifier.
    pub id: AttachmentId,
    /// Owning message.
    pub message_id: MessageId,
    /// Payload type.
    pub kind: AttachmentKind,
    /// External reference; required.
    pub uri: String,
    /// Optional MIME content type.
    pub content_type: Option<String>,
    /// Free-form attribute map.
    pub metadata: Metadata,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

// ===== Creation payloads ====================================================

/// Payload to create a thread together with its initial participants.
#[derive(Clone, Debug, Default)]
pub struct NewThread {
    /// Optional title.
    pub title: Option<String>,
    /// Optional summary.
    pub summary: Option<String>,
    /// Lifecycle state; defaults to open.
    pub status: ThreadStatus,
    /// Free-form attribute map.
    pub metadata: Metadata,
    /// Initial participants; committed atomically with the thread row.
    pub participants: Vec<NewParticipant>,
}

/// Payload for one initial participant.
#[derive(Clone, Debug, Default)]
pub struct NewParticipant {
    /// Role within the conversation.
    pub role: ParticipantRole,
    /// Optional display name.
    pub display_name: Option<String>,
    /// Free-form attribute map.
    pub metadata: Metadata,
}

/// Payload to append a message, with nested attachments.
#[derive(Clone, Debug, Default)]
pub struct NewMessage {
    /// Attributed participant, if any.
    pub participant_id: Option<ParticipantId>,
    /// Message semantics; defaults to text.
    pub kind: MessageKind,
    /// Message body; must be non-empty.
    pub content: String,
    /// Free-form attribute map.
    pub metadata: Metadata,
    /// Attachments; committed atomically with the message row.
    pub attachments: Vec<NewAttachment>,
}

/// Payload for one attachment.
#[derive(Clone, Debug, Default)]
pub struct NewAttachment {
    /// Payload type; defaults to file.
    pub kind: AttachmentKind,
    /// External reference; required.
    pub uri: String,
    /// Optional MIME content type.
    pub content_type: Option<String>,
    /// Free-form attribute map.
    pub metadata: Metadata,
}

/// Filters and pagination for thread listings. Filters AND-compose.
///
/// The repository applies `limit` and `offset` verbatim; clamping to a sane
/// maximum is the calling adapter's responsibility.
#[derive(Clone, Debug)]
pub struct ThreadFilter {
    /// Page size.
    pub limit: i64,
    /// Rows to skip.
    pub offset: i64,
    /// Only threads having this participant.
    pub participant_id: Option<ParticipantId>,
    /// Only threads in this lifecycle state.
    pub status: Option<ThreadStatus>,
    /// Only threads created at or after this instant.
    pub created_after: Option<DateTime<Utc>>,
    /// Only threads created at or before this instant.
    pub created_before: Option<DateTime<Utc>>,
}

impl Default for ThreadFilter {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
            participant_id: None,
            status: None,
            created_after: None,
            created_before: None,
        }
    }
}

/// One page of threads plus the total count across all pages.
///
/// `total` is computed by an independent count query under the same filters;
/// it is exact between writes but may drift slightly under concurrent ones.
#[derive(Clone, Debug)]
pub struct ThreadPage {
    /// Threads on this page, newest-created first.
    pub threads: Vec<Thread>,
    /// Total matching threads independent of pagination.
    pub total: u64,
}
