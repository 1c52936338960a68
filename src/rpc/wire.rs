//! Binary wire shapes and the fixed enum code tables.
//!
//! Everything that crosses the RPC boundary is bincode-friendly: ids travel
//! as canonical UUID text, timestamps as UTC epoch milliseconds, attribute
//! maps as JSON object text. Enumerated values travel as `u8` codes with one
//! exhaustive table per type; code `0` is the explicit *unspecified*
//! sentinel ("unset, apply the documented default" on requests), and a code
//! outside the table is rejected as an invalid argument — never silently
//! mapped to a normal value.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entities::{Attachment, Message, Participant, Thread, User};
use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::kinds::{AttachmentKind, MessageKind, ParticipantRole, ThreadStatus};
use crate::core::metadata::{Metadata, encode_metadata};

/// Wire protocol version carried in every request envelope.
pub const PROTOCOL_VERSION: u8 = 1;

/// Error codes carried by [`Response::Error`] frames.
pub mod error_code {
    /// Entity absent or not owned by the caller.
    pub const NOT_FOUND: u8 = 1;
    /// Uniqueness violation.
    pub const ALREADY_EXISTS: u8 = 2;
    /// Missing, malformed, expired, or unusable credential.
    pub const UNAUTHENTICATED: u8 = 3;
    /// Malformed input.
    pub const INVALID_ARGUMENT: u8 = 4;
    /// Unexpected failure; details stay server-side.
    pub const INTERNAL: u8 = 5;
}

// ===== Enum code tables =====================================================

/// Encode a thread status; never produces the unspecified sentinel.
#[must_use]
pub const fn thread_status_code(status: ThreadStatus) -> u8 {
    match status {
        ThreadStatus::Open => 1,
        ThreadStatus::Paused => 2,
        ThreadStatus::Closed => 3,
    }
}

/// Decode a thread status code; `Ok(None)` is the unspecified sentinel.
///
/// # Errors
/// `InvalidArgument` for a code outside the table.
pub fn thread_status_from_code(code: u8) -> ServiceResult<Option<ThreadStatus>> {
    match code {
        0 => Ok(None),
        1 => Ok(Some(ThreadStatus::Open)),
        2 => Ok(Some(ThreadStatus::Paused)),
        3 => Ok(Some(ThreadStatus::Closed)),
        other => Err(ServiceError::InvalidArgument(format!(
            "unknown thread status code {other}"
        ))),
    }
}

/// Encode a participant role; never produces the unspecified sentinel.
#[must_use]
pub const fn participant_role_code(role: ParticipantRole) -> u8 {
    match role {
        ParticipantRole::User => 1,
        ParticipantRole::Agent => 2,
        ParticipantRole::Tool => 3,
    }
}

/// Decode a participant role code; `Ok(None)` is the unspecified sentinel.
///
/// # Errors
/// `InvalidArgument` for a code outside the table.
pub fn participant_role_from_code(code: u8) -> ServiceResult<Option<ParticipantRole>> {
    match code {
        0 => Ok(None),
        1 => Ok(Some(ParticipantRole::User)),
        2 => Ok(Some(ParticipantRole::Agent)),
        3 => Ok(Some(ParticipantRole::Tool)),
        other => Err(ServiceError::InvalidArgument(format!(
            "unknown participant role code {other}"
        ))),
    }
}

/// Encode a message kind; never produces the unspecified sentinel.
#[must_use]
pub const fn message_kind_code(kind: MessageKind) -> u8 {
    match kind {
        MessageKind::Text => 1,
        MessageKind::Rich => 2,
        MessageKind::ToolCall => 3,
    }
}

/// Decode a message kind code; `Ok(None)` is the unspecified sentinel.
///
/// # Errors
/// `InvalidArgument` for a code outside the table.
pub fn message_kind_from_code(code: u8) -> ServiceResult<Option<MessageKind>> {
    match code {
        0 => Ok(None),
        1 => Ok(Some(MessageKind::Text)),
        2 => Ok(Some(MessageKind::Rich)),
        3 => Ok(Some(MessageKind::ToolCall)),
        other => Err(ServiceError::InvalidArgument(format!(
            "unknown message kind code {other}"
        ))),
    }
}

/// Encode an attachment kind; never produces the unspecified sentinel.
#[must_use]
pub const fn attachment_kind_code(kind: AttachmentKind) -> u8 {
    match kind {
        AttachmentKind::File => 1,
        AttachmentKind::Image => 2,
        AttachmentKind::Link => 3,
    }
}

/// Decode an attachment kind code; `Ok(None)` is the unspecified sentinel.
///
/// # Errors
/// `InvalidArgument` for a code outside the table.
pub fn attachment_kind_from_code(code: u8) -> ServiceResult<Option<AttachmentKind>> {
    match code {
        0 => Ok(None),
        1 => Ok(Some(AttachmentKind::File)),
        2 => Ok(Some(AttachmentKind::Image)),
        3 => Ok(Some(AttachmentKind::Link)),
        other => Err(ServiceError::InvalidArgument(format!(
            "unknown attachment kind code {other}"
        ))),
    }
}

// ===== Scalar helpers =======================================================

/// Decode a metadata JSON string from the wire; empty means empty map.
///
/// # Errors
/// `InvalidArgument` if the text is not a JSON object.
pub fn metadata_from_wire(raw: &str) -> ServiceResult<Metadata> {
    if raw.is_empty() {
        return Ok(Metadata::new());
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(ServiceError::InvalidArgument(
            "metadata must be a JSON object".to_string(),
        )),
        Err(err) => Err(ServiceError::InvalidArgument(format!(
            "metadata is not valid JSON: {err}"
        ))),
    }
}

/// Encode a metadata map for the wire.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn metadata_to_wire(metadata: &Metadata) -> ServiceResult<String> {
    encode_metadata(metadata)
}

/// Decode an epoch-milliseconds wire timestamp.
///
/// # Errors
/// `InvalidArgument` for values outside the representable range.
pub fn ts_from_wire(ms: i64) -> ServiceResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| ServiceError::InvalidArgument(format!("invalid timestamp {ms}")))
}

// ===== Envelope and requests ================================================

/// One request frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Wire protocol version; must equal [`PROTOCOL_VERSION`].
    pub version: u8,
    /// Per-call bearer credential; required for protected operations.
    pub token: Option<String>,
    /// The operation to perform.
    pub request: Request,
}

/// The RPC operation set; one-to-one with the HTTP routes, plus the
/// server-streaming message read.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Request {
    /// Readiness probe; no auth.
    Health,
    /// Register with email and password; no auth.
    Signup {
        /// Email address.
        email: String,
        /// Plain-text password.
        password: String,
        /// Optional display name.
        name: Option<String>,
    },
    /// Authenticate with email and password; no auth.
    Login {
        /// Email address.
        email: String,
        /// Plain-text password.
        password: String,
    },
    /// Fetch the calling account's profile.
    GetProfile,
    /// Update the calling account's profile; absent fields stay untouched.
    UpdateProfile {
        /// New display name.
        name: Option<String>,
        /// New avatar URL.
        avatar_url: Option<String>,
    },
    /// Consume an email-verification token; no auth.
    VerifyEmail {
        /// Opaque verification token.
        token: String,
    },
    /// Mint and deliver a fresh verification token.
    ResendVerification,
    /// Start a password reset; no auth, constant response.
    ForgotPassword {
        /// Email address.
        email: String,
    },
    /// Consume a reset token exactly once; no auth.
    ResetPassword {
        /// Opaque single-use reset token.
        token: String,
        /// Replacement password.
        new_password: String,
    },
    /// Link-or-create from a provider identity; no auth.
    OauthSync {
        /// Provider name.
        provider: String,
        /// Provider-scoped subject identifier.
        provider_user_id: String,
        /// Email from the provider.
        email: String,
        /// Display name from the provider.
        name: Option<String>,
        /// Avatar URL from the provider.
        avatar_url: Option<String>,
    },
    /// Create a thread with optional initial participants.
    CreateThread(ThreadSpec),
    /// List the caller's threads.
    ListThreads(ThreadQuery),
    /// Fetch one thread with its full graph.
    GetThread {
        /// Thread identifier.
        thread_id: String,
    },
    /// Shallow-merge attributes into a thread.
    UpdateThreadMetadata {
        /// Thread identifier.
        thread_id: String,
        /// Patch as JSON object text.
        patch_json: String,
    },
    /// Append a message with nested attachments.
    AppendMessage {
        /// Thread identifier.
        thread_id: String,
        /// The message to append.
        message: MessageSpec,
    },
    /// Stream every message of a thread, materialized as of query time.
    StreamThreadMessages {
        /// Thread identifier.
        thread_id: String,
    },
}

/// Thread creation shape.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ThreadSpec {
    /// Optional title.
    pub title: Option<String>,
    /// Optional summary.
    pub summary: Option<String>,
    /// Status code; `0` means "default" (open).
    pub status: u8,
    /// Attribute map as JSON object text; empty means `{}`.
    pub metadata_json: String,
    /// Initial participants.
    pub participants: Vec<ParticipantSpec>,
}

/// Participant creation shape.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ParticipantSpec {
    /// Role code; `0` means "default" (user).
    pub role: u8,
    /// Optional display name.
    pub display_name: Option<String>,
    /// Attribute map as JSON object text; empty means `{}`.
    pub metadata_json: String,
}

/// Message creation shape.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MessageSpec {
    /// Attributed participant id, if any.
    pub participant_id: Option<String>,
    /// Kind code; `0` means "default" (text).
    pub kind: u8,
    /// Message body; must be non-empty.
    pub content: String,
    /// Attribute map as JSON object text; empty means `{}`.
    pub metadata_json: String,
    /// Attachments, committed atomically with the message.
    pub attachments: Vec<AttachmentSpec>,
}

/// Attachment creation shape.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AttachmentSpec {
    /// Kind code; `0` means "default" (file).
    pub kind: u8,
    /// External reference; required.
    pub uri: String,
    /// Optional MIME content type.
    pub content_type: Option<String>,
    /// Attribute map as JSON object text; empty means `{}`.
    pub metadata_json: String,
}

/// Listing filters; zero values mean "no filter" where noted.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ThreadQuery {
    /// Page size; `None` means the default of 20, clamped to `1..=100`.
    pub limit: Option<i64>,
    /// Rows to skip; `None` means 0.
    pub offset: Option<i64>,
    /// Only threads having this participant.
    pub participant_id: Option<String>,
    /// Status filter code; `0` means "no filter".
    pub status: u8,
    /// Lower creation-time bound, epoch milliseconds.
    pub created_after_ms: Option<i64>,
    /// Upper creation-time bound, epoch milliseconds.
    pub created_before_ms: Option<i64>,
}

// ===== Responses ============================================================

/// One response frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Response {
    /// Successful unary reply.
    Ok(Reply),
    /// Failure; `code` is one of [`error_code`].
    Error {
        /// Taxonomy code.
        code: u8,
        /// Human-readable message; generic for internal failures.
        message: String,
    },
    /// One element of a server stream.
    StreamItem(WireMessage),
    /// Terminates a server stream.
    StreamEnd,
}

/// Successful reply payloads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Reply {
    /// Readiness probe reply.
    Health {
        /// Constant `"ok"`.
        status: String,
        /// Build version.
        version: String,
    },
    /// Bearer token plus the account it names.
    Token(WireTokenGrant),
    /// Account profile.
    User(WireUser),
    /// One thread with its full graph.
    Thread(WireThread),
    /// One page of threads plus the total matching count.
    ThreadPage {
        /// Threads on this page, newest-created first.
        threads: Vec<WireThread>,
        /// Total matching threads independent of pagination.
        total: u64,
    },
    /// One message with its attachments.
    Message(WireMessage),
    /// Acknowledgement with a human-readable outcome.
    Ack {
        /// Outcome text.
        message: String,
    },
}

/// Account projection; never carries credential material.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireUser {
    /// Account identifier.
    pub id: String,
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: Option<String>,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// Whether the email address is verified.
    pub email_verified: bool,
    /// Creation timestamp, epoch milliseconds.
    pub created_at_ms: i64,
    /// Last update timestamp, epoch milliseconds.
    pub updated_at_ms: i64,
}

impl From<&User> for WireUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            name: user.name.clone(),
            avatar_url: user.avatar_url.clone(),
            email_verified: user.email_verified,
            created_at_ms: user.created_at.timestamp_millis(),
            updated_at_ms: user.updated_at.timestamp_millis(),
        }
    }
}

/// Bearer token plus the account it names.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireTokenGrant {
    /// Signed bearer token.
    pub access_token: String,
    /// The authenticated account.
    pub user: WireUser,
}

/// Participant projection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireParticipant {
    /// Participant identifier.
    pub id: String,
    /// Owning thread.
    pub thread_id: String,
    /// Role code.
    pub role: u8,
    /// Display name.
    pub display_name: Option<String>,
    /// Attribute map as JSON object text.
    pub metadata_json: String,
    /// Creation timestamp, epoch milliseconds.
    pub created_at_ms: i64,
}

impl WireParticipant {
    /// Project a domain participant onto the wire.
    ///
    /// # Errors
    /// Returns an error if metadata serialization fails.
    pub fn from_domain(participant: &Participant) -> ServiceResult<Self> {
        Ok(Self {
            id: participant.id.to_string(),
            thread_id: participant.thread_id.to_string(),
            role: participant_role_code(participant.role),
            display_name: participant.display_name.clone(),
            metadata_json: metadata_to_wire(&participant.metadata)?,
            created_at_ms: participant.created_at.timestamp_millis(),
        })
    }
}

/// Attachment projection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireAttachment {
    /// Attachment identifier.
    pub id: String,
    /// Owning message.
    pub message_id: String,
    /// Kind code.
    pub kind: u8,
    /// External reference.
    pub uri: String,
    /// MIME content type.
    pub content_type: Option<String>,
    /// Attribute map as JSON object text.
    pub metadata_json: String,
    /// Creation timestamp, epoch milliseconds.
    pub created_at_ms: i64,
}

impl WireAttachment {
    /// Project a domain attachment onto the wire.
    ///
    /// # Errors
    /// Returns an error if metadata serialization fails.
    pub fn from_domain(attachment: &Attachment) -> ServiceResult<Self> {
        Ok(Self {
            id: attachment.id.to_string(),
            message_id: attachment.message_id.to_string(),
            kind: attachment_kind_code(attachment.kind),
            uri: attachment.uri.clone(),
            content_type: attachment.content_type.clone(),
            metadata_json: metadata_to_wire(&attachment.metadata)?,
            created_at_ms: attachment.created_at.timestamp_millis(),
        })
    }
}

/// Message projection with attachments in supplied order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireMessage {
    /// Message identifier.
    pub id: String,
    /// Owning thread.
    pub thread_id: String,
    /// Attributed participant, if any.
    pub participant_id: Option<String>,
    /// Kind code.
    pub kind: u8,
    /// Message body.
    pub content: String,
    /// Attribute map as JSON object text.
    pub metadata_json: String,
    /// Creation timestamp, epoch milliseconds.
    pub created_at_ms: i64,
    /// Attachments.
    pub attachments: Vec<WireAttachment>,
}

impl WireMessage {
    /// Project a domain message onto the wire.
    ///
    /// # Errors
    /// Returns an error if metadata serialization fails.
    pub fn from_domain(message: &Message) -> ServiceResult<Self> {
        Ok(Self {
            id: message.id.to_string(),
            thread_id: message.thread_id.to_string(),
            participant_id: message.participant_id.map(|id| id.to_string()),
            kind: message_kind_code(message.kind),
            content: message.content.clone(),
            metadata_json: metadata_to_wire(&message.metadata)?,
            created_at_ms: message.created_at.timestamp_millis(),
            attachments: message
                .attachments
                .iter()
                .map(WireAttachment::from_domain)
                .collect::<ServiceResult<_>>()?,
        })
    }
}

/// Thread projection with full graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireThread {
    /// Thread identifier.
    pub id: String,
    /// Title.
    pub title: Option<String>,
    /// Status code.
    pub status: u8,
    /// Summary.
    pub summary: Option<String>,
    /// Attribute map as JSON object text.
    pub metadata_json: String,
    /// Creation timestamp, epoch milliseconds.
    pub created_at_ms: i64,
    /// Last update timestamp, epoch milliseconds.
    pub updated_at_ms: i64,
    /// Participants.
    pub participants: Vec<WireParticipant>,
    /// Messages, oldest first.
    pub messages: Vec<WireMessage>,
}

impl WireThread {
    /// Project a domain thread onto the wire.
    ///
    /// # Errors
    /// Returns an error if metadata serialization fails.
    pub fn from_domain(thread: &Thread) -> ServiceResult<Self> {
        Ok(Self {
            id: thread.id.to_string(),
            title: thread.title.clone(),
            status: thread_status_code(thread.status),
            summary: thread.summary.clone(),
            metadata_json: metadata_to_wire(&thread.metadata)?,
            created_at_ms: thread.created_at.timestamp_millis(),
            updated_at_ms: thread.updated_at.timestamp_millis(),
            participants: thread
                .participants
                .iter()
                .map(WireParticipant::from_domain)
                .collect::<ServiceResult<_>>()?,
            messages: thread
                .messages
                .iter()
                .map(WireMessage::from_domain)
                .collect::<ServiceResult<_>>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_domain_value_has_a_nonzero_code() {
        for status in ThreadStatus::ALL {
            assert_ne!(thread_status_code(*status), 0);
        }
        for role in ParticipantRole::ALL {
            assert_ne!(participant_role_code(*role), 0);
        }
        for kind in MessageKind::ALL {
            assert_ne!(message_kind_code(*kind), 0);
        }
        for kind in AttachmentKind::ALL {
            assert_ne!(attachment_kind_code(*kind), 0);
        }
    }

    #[test]
    fn test_code_tables_roundtrip() {
        for status in ThreadStatus::ALL {
            let code = thread_status_code(*status);
            assert_eq!(thread_status_from_code(code).unwrap(), Some(*status));
        }
        for role in ParticipantRole::ALL {
            let code = participant_role_code(*role);
            assert_eq!(participant_role_from_code(code).unwrap(), Some(*role));
        }
        for kind in MessageKind::ALL {
            let code = message_kind_code(*kind);
            assert_eq!(message_kind_from_code(code).unwrap(), Some(*kind));
        }
        for kind in AttachmentKind::ALL {
            let code = attachment_kind_code(*kind);
            assert_eq!(attachment_kind_from_code(code).unwrap(), Some(*kind));
        }
    }

    #[test]
    fn test_zero_is_the_unspecified_sentinel() {
        assert_eq!(thread_status_from_code(0).unwrap(), None);
        assert_eq!(participant_role_from_code(0).unwrap(), None);
        assert_eq!(message_kind_from_code(0).unwrap(), None);
        assert_eq!(attachment_kind_from_code(0).unwrap(), None);
    }

    #[test]
    fn test_out_of_table_codes_are_rejected() {
        assert!(thread_status_from_code(9).is_err());
        assert!(participant_role_from_code(200).is_err());
        assert!(message_kind_from_code(4).is_err());
        assert!(attachment_kind_from_code(255).is_err());
    }

    #[test]
    fn test_metadata_wire_roundtrip() {
        assert!(metadata_from_wire("").unwrap().is_empty());
        let map = metadata_from_wire(r#"{"a": 1}"#).unwrap();
        let encoded = metadata_to_wire(&map).unwrap();
        assert_eq!(metadata_from_wire(&encoded).unwrap(), map);
    }

    #[test]
    fn test_metadata_wire_rejects_non_objects() {
        assert!(metadata_from_wire("[1]").is_err());
        assert!(metadata_from_wire("3").is_err());
        assert!(metadata_from_wire("nope").is_err());
    }

    #[test]
    fn test_envelope_bincode_roundtrip() {
        let envelope = Envelope {
            version: PROTOCOL_VERSION,
            token: Some("bearer".to_string()),
            request: Request::CreateThread(ThreadSpec {
                title: Some("T1".to_string()),
                status: thread_status_code(ThreadStatus::Open),
                metadata_json: r#"{"k":"v"}"#.to_string(),
                participants: vec![ParticipantSpec {
                    role: participant_role_code(ParticipantRole::Agent),
                    display_name: Some("helper".to_string()),
                    ..ParticipantSpec::default()
                }],
                ..ThreadSpec::default()
            }),
        };
        let bytes = bincode::serialize(&envelope).unwrap();
        let decoded: Envelope = bincode::deserialize(&bytes).unwrap();
        match decoded.request {
            Request::CreateThread(spec) => {
                assert_eq!(spec.title.as_deref(), Some("T1"));
                assert_eq!(spec.participants.len(), 1);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }
}
