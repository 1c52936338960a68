//! Request dispatch for the binary RPC frontend.
//!
//! Pure shape translation: every envelope resolves identity where the
//! operation requires it, delegates to the same `store`/`auth::flows` calls
//! the HTTP frontend uses, and projects the domain result back onto the
//! wire. A unary call yields one frame; the streaming call yields one frame
//! per message plus a terminator.

use std::str::FromStr;

use crate::auth::{flows, resolver};
use crate::core::entities::{
    NewAttachment, NewMessage, NewParticipant, NewThread, ThreadFilter, User,
};
use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::ids::{ParticipantId, ThreadId};
use crate::rpc::wire::{
    AttachmentSpec, Envelope, MessageSpec, PROTOCOL_VERSION, Reply, Request, Response,
    ThreadQuery, ThreadSpec, WireMessage, WireThread, WireTokenGrant, WireUser,
    attachment_kind_from_code, error_code, message_kind_from_code, metadata_from_wire,
    participant_role_from_code, thread_status_from_code, ts_from_wire,
};
use crate::server::state::AppState;

/// Page-size cap mirroring the HTTP frontend.
const MAX_PAGE_SIZE: i64 = 100;

/// Handle one request envelope, producing the frames to write back.
pub async fn dispatch(state: &AppState, envelope: Envelope) -> Vec<Response> {
    if envelope.version != PROTOCOL_VERSION {
        return vec![Response::Error {
            code: error_code::INVALID_ARGUMENT,
            message: format!(
                "unsupported protocol version {} (expected {PROTOCOL_VERSION})",
                envelope.version
            ),
        }];
    }
    match handle(state, envelope).await {
        Ok(frames) => frames,
        Err(err) => vec![error_frame(&err)],
    }
}

/// Map a service error onto a wire error frame, keeping internal causes
/// server-side.
fn error_frame(err: &ServiceError) -> Response {
    let (code, message) = match err {
        ServiceError::NotFound => (error_code::NOT_FOUND, err.to_string()),
        ServiceError::AlreadyExists(_) => (error_code::ALREADY_EXISTS, err.to_string()),
        ServiceError::Unauthenticated(_) | ServiceError::InvalidCredential => {
            (error_code::UNAUTHENTICATED, err.to_string())
        }
        ServiceError::InvalidArgument(_) => (error_code::INVALID_ARGUMENT, err.to_string()),
        other => {
            tracing::error!(error = %other, "internal error while handling rpc request");
            (error_code::INTERNAL, "internal error".to_string())
        }
    };
    Response::Error { code, message }
}

async fn authed(state: &AppState, token: Option<&str>) -> ServiceResult<User> {
    let token = token.ok_or(ServiceError::Unauthenticated("missing bearer token"))?;
    resolver::resolve_bearer(&state.store, &state.config.auth.token_secret, token).await
}

fn parse_id<T: FromStr>(raw: &str, what: &str) -> ServiceResult<T> {
    T::from_str(raw).map_err(|_| ServiceError::InvalidArgument(format!("invalid {what}")))
}

async fn handle(state: &AppState, envelope: Envelope) -> ServiceResult<Vec<Response>> {
    let token = envelope.token.as_deref();
    let reply = match envelope.request {
        Request::Health => Reply::Health {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        Request::Signup {
            email,
            password,
            name,
        } => {
            let grant =
                flows::signup(&state.store, &state.config, &state.mailer, &email, &password, name)
                    .await?;
            Reply::Token(WireTokenGrant {
                access_token: grant.access_token,
                user: WireUser::from(&grant.user),
            })
        }
        Request::Login { email, password } => {
            let grant = flows::login(&state.store, &state.config, &email, &password).await?;
            Reply::Token(WireTokenGrant {
                access_token: grant.access_token,
                user: WireUser::from(&grant.user),
            })
        }
        Request::GetProfile => {
            let user = authed(state, token).await?;
            Reply::User(WireUser::from(&user))
        }
        Request::UpdateProfile { name, avatar_url } => {
            let user = authed(state, token).await?;
            let updated = state
                .store
                .update_user_profile(user.id, name, avatar_url)
                .await?;
            Reply::User(WireUser::from(&updated))
        }
        Request::VerifyEmail { token } => {
            flows::verify_email(&state.store, &token).await?;
            Reply::Ack {
                message: "Email verified successfully".to_string(),
            }
        }
        Request::ResendVerification => {
            let user = authed(state, token).await?;
            flows::resend_verification(&state.store, &state.config, &state.mailer, &user).await?;
            Reply::Ack {
                message: "Verification email sent".to_string(),
            }
        }
        Request::ForgotPassword { email } => {
            flows::forgot_password(&state.store, &state.config, &state.mailer, &email).await?;
            Reply::Ack {
                message: "If the email exists, a password reset link has been sent".to_string(),
            }
        }
        Request::ResetPassword {
            token,
            new_password,
        } => {
            flows::reset_password(&state.store, &token, &new_password).await?;
            Reply::Ack {
                message: "Password reset successfully".to_string(),
            }
        }
        Request::OauthSync {
            provider,
            provider_user_id,
            email,
            name,
            avatar_url,
        } => {
            let grant = flows::oauth_sync(
                &state.store,
                &state.config,
                &provider,
                &provider_user_id,
                &email,
                name,
                avatar_url,
            )
            .await?;
            Reply::Token(WireTokenGrant {
                access_token: grant.access_token,
                user: WireUser::from(&grant.user),
            })
        }
        Request::CreateThread(spec) => {
            let user = authed(state, token).await?;
            let thread = state
                .store
                .create_thread(user.id, new_thread_from_spec(spec)?)
                .await?;
            Reply::Thread(WireThread::from_domain(&thread)?)
        }
        Request::ListThreads(query) => {
            let user = authed(state, token).await?;
            let page = state
                .store
                .list_threads(user.id, filter_from_query(query)?)
                .await?;
            Reply::ThreadPage {
                threads: page
                    .threads
                    .iter()
                    .map(WireThread::from_domain)
                    .collect::<ServiceResult<_>>()?,
                total: page.total,
            }
        }
        Request::GetThread { thread_id } => {
            let user = authed(state, token).await?;
            let thread_id: ThreadId = parse_id(&thread_id, "thread id")?;
            let thread = state.store.get_thread(user.id, thread_id).await?;
            Reply::Thread(WireThread::from_domain(&thread)?)
        }
        Request::UpdateThreadMetadata {
            thread_id,
            patch_json,
        } => {
            let user = authed(state, token).await?;
            let thread_id: ThreadId = parse_id(&thread_id, "thread id")?;
            let patch = metadata_from_wire(&patch_json)?;
            let thread = state
                .store
                .update_thread_metadata(user.id, thread_id, patch)
                .await?;
            Reply::Thread(WireThread::from_domain(&thread)?)
        }
        Request::AppendMessage { thread_id, message } => {
            let user = authed(state, token).await?;
            let thread_id: ThreadId = parse_id(&thread_id, "thread id")?;
            let appended = state
                .store
                .append_message(user.id, thread_id, new_message_from_spec(message)?)
                .await?;
            Reply::Message(WireMessage::from_domain(&appended)?)
        }
        Request::StreamThreadMessages { thread_id } => {
            let user = authed(state, token).await?;
            let thread_id: ThreadId = parse_id(&thread_id, "thread id")?;
            // Materialized as of query time; never a live subscription.
            let thread = state.store.get_thread(user.id, thread_id).await?;
            let mut frames = Vec::with_capacity(thread.messages.len() + 1);
            for message in &thread.messages {
                frames.push(Response::StreamItem(WireMessage::from_domain(message)?));
            }
            frames.push(Response::StreamEnd);
            return Ok(frames);
        }
    };
    Ok(vec![Response::Ok(reply)])
}

fn new_thread_from_spec(spec: ThreadSpec) -> ServiceResult<NewThread> {
    let mut participants = Vec::with_capacity(spec.participants.len());
    for participant in spec.participants {
        participants.push(NewParticipant {
            role: participant_role_from_code(participant.role)?.unwrap_or_default(),
            display_name: participant.display_name,
            metadata: metadata_from_wire(&participant.metadata_json)?,
        });
    }
    Ok(NewThread {
        title: spec.title,
        summary: spec.summary,
        status: thread_status_from_code(spec.status)?.unwrap_or_default(),
        metadata: metadata_from_wire(&spec.metadata_json)?,
        participants,
    })
}

fn new_message_from_spec(spec: MessageSpec) -> ServiceResult<NewMessage> {
    let mut attachments = Vec::with_capacity(spec.attachments.len());
    for attachment in spec.attachments {
        attachments.push(new_attachment_from_spec(attachment)?);
    }
    Ok(NewMessage {
        participant_id: spec
            .participant_id
            .as_deref()
            .map(|raw| parse_id::<ParticipantId>(raw, "participant id"))
            .transpose()?,
        kind: message_kind_from_code(spec.kind)?.unwrap_or_default(),
        content: spec.content,
        metadata: metadata_from_wire(&spec.metadata_json)?,
        attachments,
    })
}

fn new_attachment_from_spec(spec: AttachmentSpec) -> ServiceResult<NewAttachment> {
    Ok(NewAttachment {
        kind: attachment_kind_from_code(spec.kind)?.unwrap_or_default(),
        uri: spec.uri,
        content_type: spec.content_type,
        metadata: metadata_from_wire(&spec.metadata_json)?,
    })
}

fn filter_from_query(query: ThreadQuery) -> ServiceResult<ThreadFilter> {
    Ok(ThreadFilter {
        limit: query.limit.unwrap_or(20).clamp(1, MAX_PAGE_SIZE),
        offset: query.offset.unwrap_or(0).max(0),
        participant_id: query
            .participant_id
            .as_deref()
            .map(|raw| parse_id::<ParticipantId>(raw, "participant id"))
            .transpose()?,
        status: thread_status_from_code(query.status)?,
        created_after: query.created_after_ms.map(ts_from_wire).transpose()?,
        created_before: query.created_before_ms.map(ts_from_wire).transpose()?,
    })
}
