//! Thread endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::entities::ThreadFilter;
use crate::core::ids::{ParticipantId, ThreadId};
use crate::core::kinds::ThreadStatus;
use crate::core::metadata::Metadata;
use crate::server::dto::{
    MessageCreateRequest, MessageRead, ThreadCreateRequest, ThreadListResponse, ThreadRead,
};
use crate::server::error::ApiResult;
use crate::server::routes::require_user;
use crate::server::state::AppState;

/// Hard cap on page size; larger requests are clamped, not rejected.
const MAX_PAGE_SIZE: i64 = 100;

/// `POST /threads` — create a thread with optional initial participants.
pub async fn create_thread(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ThreadCreateRequest>,
) -> ApiResult<(StatusCode, Json<ThreadRead>)> {
    let user = require_user(&state, &headers).await?;
    let thread = state.store.create_thread(user.id, payload.into()).await?;
    Ok((StatusCode::CREATED, Json(thread.into())))
}

/// Query parameters for thread listings.
#[derive(Debug, Deserialize)]
pub struct ListThreadsQuery {
    /// Page size; clamped to `1..=100`, default 20.
    pub limit: Option<i64>,
    /// Rows to skip; negative values read as zero.
    pub offset: Option<i64>,
    /// Only threads having this participant.
    pub participant_id: Option<ParticipantId>,
    /// Only threads in this lifecycle state.
    pub status: Option<ThreadStatus>,
    /// Only threads created at or after this instant (RFC 3339).
    pub created_after: Option<DateTime<Utc>>,
    /// Only threads created at or before this instant (RFC 3339).
    pub created_before: Option<DateTime<Utc>>,
}

/// `GET /threads` — list the caller's threads, newest first.
pub async fn list_threads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListThreadsQuery>,
) -> ApiResult<Json<ThreadListResponse>> {
    let user = require_user(&state, &headers).await?;
    let filter = ThreadFilter {
        limit: query.limit.unwrap_or(20).clamp(1, MAX_PAGE_SIZE),
        offset: query.offset.unwrap_or(0).max(0),
        participant_id: query.participant_id,
        status: query.status,
        created_after: query.created_after,
        created_before: query.created_before,
    };
    let page = state.store.list_threads(user.id, filter).await?;
    Ok(Json(ThreadListResponse {
        threads: page.threads.into_iter().map(Into::into).collect(),
        total: page.total,
    }))
}

/// `GET /threads/{thread_id}` — fetch one thread with its full graph.
pub async fn get_thread(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(thread_id): Path<ThreadId>,
) -> ApiResult<Json<ThreadRead>> {
    let user = require_user(&state, &headers).await?;
    let thread = state.store.get_thread(user.id, thread_id).await?;
    Ok(Json(thread.into()))
}

/// `PATCH /threads/{thread_id}/metadata` — shallow-merge attributes.
pub async fn update_thread_metadata(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(thread_id): Path<ThreadId>,
    Json(patch): Json<Metadata>,
) -> ApiResult<Json<ThreadRead>> {
    let user = require_user(&state, &headers).await?;
    let thread = state
        .store
        .update_thread_metadata(user.id, thread_id, patch)
        .await?;
    Ok(Json(thread.into()))
}

/// `POST /threads/{thread_id}/messages` — append a message with nested
/// attachments.
pub async fn append_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(thread_id): Path<ThreadId>,
    Json(payload): Json<MessageCreateRequest>,
) -> ApiResult<(StatusCode, Json<MessageRead>)> {
    let user = require_user(&state, &headers).await?;
    let message = state
        .store
        .append_message(user.id, thread_id, payload.into())
        .await?;
    Ok((StatusCode::CREATED, Json(message.into())))
}
