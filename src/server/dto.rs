//! JSON wire shapes for the HTTP frontend.
//!
//! Read shapes are plain projections of the domain entities; the owner id is
//! deliberately not part of any thread payload. Create shapes default the
//! same way the repository does, so an empty body field and an omitted one
//! behave identically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::TokenGrant;
use crate::core::entities::{
    Attachment, Message, NewAttachment, NewMessage, NewParticipant, NewThread, Participant,
    Thread, User,
};
use crate::core::ids::{AttachmentId, MessageId, ParticipantId, ThreadId, UserId};
use crate::core::kinds::{AttachmentKind, MessageKind, ParticipantRole, ThreadStatus};
use crate::core::metadata::Metadata;

// ===== Account payloads =====================================================

/// Signup request.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    /// Email address; globally unique.
    pub email: String,
    /// Plain-text password.
    pub password: String,
    /// Optional display name.
    pub name: Option<String>,
}

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email address.
    pub email: String,
    /// Plain-text password.
    pub password: String,
}

/// Profile update; absent fields stay untouched.
#[derive(Debug, Deserialize)]
pub struct UserUpdateRequest {
    /// New display name.
    pub name: Option<String>,
    /// New avatar URL.
    pub avatar_url: Option<String>,
}

/// Email verification request.
#[derive(Debug, Deserialize)]
pub struct EmailVerificationRequest {
    /// Opaque verification token from the email link.
    pub token: String,
}

/// Password reset initiation.
#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    /// Email address; the response never reveals whether it exists.
    pub email: String,
}

/// Password reset confirmation.
#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirm {
    /// Opaque single-use reset token.
    pub token: String,
    /// Replacement password.
    pub new_password: String,
}

/// Identity-provider sync payload: the provider's verified user record.
#[derive(Debug, Deserialize)]
pub struct OauthSyncRequest {
    /// Provider name, e.g. `google`.
    pub provider: String,
    /// Provider-scoped subject identifier.
    pub provider_user_id: String,
    /// Email from the provider.
    pub email: String,
    /// Display name from the provider.
    pub name: Option<String>,
    /// Avatar URL from the provider.
    pub avatar_url: Option<String>,
}

/// Account projection; never carries credential material.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserRead {
    /// Account identifier.
    pub id: UserId,
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: Option<String>,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// Whether the email address is verified.
    pub email_verified: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserRead {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            avatar_url: user.avatar_url,
            email_verified: user.email_verified,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Bearer token plus the account it names.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Signed bearer token.
    pub access_token: String,
    /// The authenticated account.
    pub user: UserRead,
}

impl From<TokenGrant> for TokenResponse {
    fn from(grant: TokenGrant) -> Self {
        Self {
            access_token: grant.access_token,
            user: grant.user.into(),
        }
    }
}

/// Generic acknowledgement body.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable outcome.
    pub message: String,
}

impl MessageResponse {
    pub(crate) fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

// ===== Thread payloads ======================================================

/// Payload for one initial participant.
#[derive(Debug, Default, Deserialize)]
pub struct ParticipantCreate {
    /// Role within the conversation; defaults to `user`.
    #[serde(default)]
    pub role: ParticipantRole,
    /// Optional display name.
    pub display_name: Option<String>,
    /// Free-form attribute map.
    #[serde(default)]
    pub metadata: Metadata,
}

impl From<ParticipantCreate> for NewParticipant {
    fn from(payload: ParticipantCreate) -> Self {
        Self {
            role: payload.role,
            display_name: payload.display_name,
            metadata: payload.metadata,
        }
    }
}

/// Thread creation payload.
#[derive(Debug, Default, Deserialize)]
pub struct ThreadCreateRequest {
    /// Optional title.
    pub title: Option<String>,
    /// Optional summary.
    pub summary: Option<String>,
    /// Lifecycle state; defaults to `open`.
    #[serde(default)]
    pub status: ThreadStatus,
    /// Free-form attribute map.
    #[serde(default)]
    pub metadata: Metadata,
    /// Initial participants.
    #[serde(default)]
    pub participants: Vec<ParticipantCreate>,
}

impl From<ThreadCreateRequest> for NewThread {
    fn from(payload: ThreadCreateRequest) -> Self {
        Self {
            title: payload.title,
            summary: payload.summary,
            status: payload.status,
            metadata: payload.metadata,
            participants: payload.participants.into_iter().map(Into::into).collect(),
        }
    }
}

/// Payload for one attachment.
#[derive(Debug, Default, Deserialize)]
pub struct AttachmentCreate {
    /// Payload type; defaults to `file`.
    #[serde(default)]
    pub kind: AttachmentKind,
    /// External reference; required.
    pub uri: String,
    /// Optional MIME content type.
    pub content_type: Option<String>,
    /// Free-form attribute map.
    #[serde(default)]
    pub metadata: Metadata,
}

impl From<AttachmentCreate> for NewAttachment {
    fn from(payload: AttachmentCreate) -> Self {
        Self {
            kind: payload.kind,
            uri: payload.uri,
            content_type: payload.content_type,
            metadata: payload.metadata,
        }
    }
}

/// Message append payload.
#[derive(Debug, Default, Deserialize)]
pub struct MessageCreateRequest {
    /// Attributed participant, if any.
    pub participant_id: Option<ParticipantId>,
    /// Message semantics; defaults to `text`.
    #[serde(default)]
    pub kind: MessageKind,
    /// Message body; must be non-empty.
    pub content: String,
    /// Free-form attribute map.
    #[serde(default)]
    pub metadata: Metadata,
    /// Attachments, committed atomically with the message.
    #[serde(default)]
    pub attachments: Vec<AttachmentCreate>,
}

impl From<MessageCreateRequest> for NewMessage {
    fn from(payload: MessageCreateRequest) -> Self {
        Self {
            participant_id: payload.participant_id,
            kind: payload.kind,
            content: payload.content,
            metadata: payload.metadata,
            attachments: payload.attachments.into_iter().map(Into::into).collect(),
        }
    }
}

/// Participant projection.
#[derive(Debug, Serialize, Deserialize)]
pub struct ParticipantRead {
    /// Participant identifier.
    pub id: ParticipantId,
    /// Owning thread.
    pub thread_id: ThreadId,
    /// Role within the conversation.
    pub role: ParticipantRole,
    /// Display name.
    pub display_name: Option<String>,
    /// Free-form attribute map.
    pub metadata: Metadata,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<Participant> for ParticipantRead {
    fn from(participant: Participant) -> Self {
        Self {
            id: participant.id,
            thread_id: participant.thread_id,
            role: participant.role,
            display_name: participant.display_name,
            metadata: participant.metadata,
            created_at: participant.created_at,
        }
    }
}

/// Attachment projection.
#[derive(Debug, Serialize, Deserialize)]
pub struct AttachmentRead {
    /// Attachment identifier.
    pub id: AttachmentId,
    /// Owning message.
    pub message_id: MessageId,
    /// Payload type.
    pub kind: AttachmentKind,
    /// External reference.
    pub uri: String,
    /// MIME content type.
    pub content_type: Option<String>,
    /// Free-form attribute map.
    pub metadata: Metadata,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<Attachment> for AttachmentRead {
    fn from(attachment: Attachment) -> Self {
        Self {
            id: attachment.id,
            message_id: attachment.message_id,
            kind: attachment.kind,
            uri: attachment.uri,
            content_type: attachment.content_type,
            metadata: attachment.metadata,
            created_at: attachment.created_at,
        }
    }
}

/// Message projection with attachments in supplied order.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageRead {
    /// Message identifier.
    pub id: MessageId,
    /// Owning thread.
    pub thread_id: ThreadId,
    /// Attributed participant, if any.
    pub participant_id: Option<ParticipantId>,
    /// Message semantics.
    pub kind: MessageKind,
    /// Message body.
    pub content: String,
    /// Free-form attribute map.
    pub metadata: Metadata,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Attachments.
    pub attachments: Vec<AttachmentRead>,
}

impl From<Message> for MessageRead {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            thread_id: message.thread_id,
            participant_id: message.participant_id,
            kind: message.kind,
            content: message.content,
            metadata: message.metadata,
            created_at: message.created_at,
            attachments: message.attachments.into_iter().map(Into::into).collect(),
        }
    }
}

/// Thread projection with full graph; messages ascend by creation time.
#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadRead {
    /// Thread identifier.
    pub id: ThreadId,
    /// Title.
    pub title: Option<String>,
    /// Lifecycle state.
    pub status: ThreadStatus,
    /// Summary.
    pub summary: Option<String>,
    /// Free-form attribute map.
    pub metadata: Metadata,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Participants.
    pub participants: Vec<ParticipantRead>,
    /// Messages, oldest first.
    pub messages: Vec<MessageRead>,
}

impl From<Thread> for ThreadRead {
    fn from(thread: Thread) -> Self {
        Self {
            id: thread.id,
            title: thread.title,
            status: thread.status,
            summary: thread.summary,
            metadata: thread.metadata,
            created_at: thread.created_at,
            updated_at: thread.updated_at,
            participants: thread.participants.into_iter().map(Into::into).collect(),
            messages: thread.messages.into_iter().map(Into::into).collect(),
        }
    }
}

/// One page of threads plus the total matching count.
#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadListResponse {
    /// Threads on this page, newest-created first.
    pub threads: Vec<ThreadRead>,
    /// Total matching threads independent of pagination.
    pub total: u64,
}
