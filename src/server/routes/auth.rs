//! Account and credential endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::auth::flows;
use crate::server::dto::{
    EmailVerificationRequest, LoginRequest, MessageResponse, OauthSyncRequest,
    PasswordResetConfirm, PasswordResetRequest, SignupRequest, TokenResponse, UserRead,
    UserUpdateRequest,
};
use crate::server::error::ApiResult;
use crate::server::routes::require_user;
use crate::server::state::AppState;

/// `POST /auth/signup` — register with email and password.
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    let grant = flows::signup(
        &state.store,
        &state.config,
        &state.mailer,
        &payload.email,
        &payload.password,
        payload.name,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(grant.into())))
}

/// `POST /auth/login` — authenticate with email and password.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let grant = flows::login(&state.store, &state.config, &payload.email, &payload.password)
        .await?;
    Ok(Json(grant.into()))
}

/// `GET /auth/me` — fetch the calling account's profile.
pub async fn me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<UserRead>> {
    let user = require_user(&state, &headers).await?;
    Ok(Json(user.into()))
}

/// `PUT /auth/me` — update the calling account's profile.
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<UserUpdateRequest>,
) -> ApiResult<Json<UserRead>> {
    let user = require_user(&state, &headers).await?;
    let updated = state
        .store
        .update_user_profile(user.id, payload.name, payload.avatar_url)
        .await?;
    Ok(Json(updated.into()))
}

/// `POST /auth/verify-email` — consume a verification token.
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EmailVerificationRequest>,
) -> ApiResult<Json<MessageResponse>> {
    flows::verify_email(&state.store, &payload.token).await?;
    Ok(Json(MessageResponse::new("Email verified successfully")))
}

/// `POST /auth/resend-verification` — mint and deliver a fresh token.
pub async fn resend_verification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<MessageResponse>> {
    let user = require_user(&state, &headers).await?;
    flows::resend_verification(&state.store, &state.config, &state.mailer, &user).await?;
    Ok(Json(MessageResponse::new("Verification email sent")))
}

/// `POST /auth/forgot-password` — start a reset.
///
/// The response is identical whether or not the email exists.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PasswordResetRequest>,
) -> ApiResult<Json<MessageResponse>> {
    flows::forgot_password(&state.store, &state.config, &state.mailer, &payload.email).await?;
    Ok(Json(MessageResponse::new(
        "If the email exists, a password reset link has been sent",
    )))
}

/// `POST /auth/reset-password` — consume a reset token exactly once.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PasswordResetConfirm>,
) -> ApiResult<Json<MessageResponse>> {
    flows::reset_password(&state.store, &payload.token, &payload.new_password).await?;
    Ok(Json(MessageResponse::new("Password reset successfully")))
}

/// `POST /auth/oauth/sync` — link-or-create from a provider identity.
pub async fn oauth_sync(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OauthSyncRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let grant = flows::oauth_sync(
        &state.store,
        &state.config,
        &payload.provider,
        &payload.provider_user_id,
        &payload.email,
        payload.name,
        payload.avatar_url,
    )
    .await?;
    Ok(Json(grant.into()))
}
