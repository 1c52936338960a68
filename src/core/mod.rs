//! Domain model: identifiers, closed enums, entities, metadata handling,
//! configuration, and the shared error taxonomy.

pub mod config;
pub mod entities;
pub mod errors;
pub mod ids;
pub mod kinds;
pub mod metadata;

pub use config::Config;
pub use entities::{
    Attachment, Message, NewAttachment, NewMessage, NewParticipant, NewThread, OauthAccount,
    Participant, ShortLivedToken, Thread, ThreadFilter, ThreadPage, User,
};
pub use errors::{ServiceError, ServiceResult};
pub use ids::{
    AttachmentId, MessageId, OauthAccountId, ParticipantId, ThreadId, TokenId, UserId,
};
pub use kinds::{AttachmentKind, MessageKind, ParticipantRole, ThreadStatus};
pub use metadata::Metadata;
