//! Account flows shared by both protocol frontends.
//!
//! The frontends translate wire shapes and delegate here, so the same
//! inputs produce the same domain-level result regardless of protocol.

use chrono::{DateTime, Utc};

use crate::auth::password::{hash_password, verify_password};
use crate::auth::tokens::{generate_opaque_token, sign_access_token};
use crate::core::config::Config;
use crate::core::entities::User;
use crate::core::errors::{ServiceError, ServiceResult};
use crate::email::Mailer;
use crate::store::Store;

/// A freshly minted bearer credential plus the account it names.
#[derive(Clone, Debug)]
pub struct TokenGrant {
    /// Signed bearer token.
    pub access_token: String,
    /// The authenticated account.
    pub user: User,
}

fn grant(config: &Config, user: User) -> ServiceResult<TokenGrant> {
    let access_token = sign_access_token(
        &config.auth.token_secret,
        &user.id.to_string(),
        &user.email,
        config.auth.access_token_ttl,
    )?;
    Ok(TokenGrant { access_token, user })
}

fn expiry_after(ttl: std::time::Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

fn check_email(email: &str) -> ServiceResult<()> {
    let trimmed = email.trim();
    if trimmed.is_empty() || !trimmed.contains('@') {
        return Err(ServiceError::InvalidArgument(
            "invalid email address".to_string(),
        ));
    }
    Ok(())
}

/// Register a new account with email and password, mint its verification
/// token, and fire off the verification email in the background.
///
/// # Errors
/// `AlreadyExists` if the email is taken; `InvalidArgument` for an unusable
/// email or empty password.
pub async fn signup(
    store: &Store,
    config: &Config,
    mailer: &Mailer,
    email: &str,
    password: &str,
    name: Option<String>,
) -> ServiceResult<TokenGrant> {
    check_email(email)?;
    if password.is_empty() {
        return Err(ServiceError::InvalidArgument(
            "password must not be empty".to_string(),
        ));
    }
    let user = store
        .create_user(email, Some(hash_password(password)), name, None)
        .await?;

    let token = generate_opaque_token();
    let expires_at = expiry_after(config.auth.verification_token_ttl);
    store
        .create_email_verification_token(user.id, &token, expires_at)
        .await?;

    // Delivery failure must not fail the signup.
    let mailer = mailer.clone();
    let to = user.email.clone();
    let display = user.name.clone().unwrap_or_else(|| "User".to_string());
    tokio::spawn(async move {
        if let Err(err) = mailer.send_verification(&to, &display, &token).await {
            tracing::warn!(%to, error = %err, "failed to send verification email");
        }
    });

    grant(config, user)
}

/// Authenticate with email and password.
///
/// # Errors
/// `Unauthenticated` with one indistinct message for unknown email, missing
/// credential material, or a wrong password.
pub async fn login(
    store: &Store,
    config: &Config,
    email: &str,
    password: &str,
) -> ServiceResult<TokenGrant> {
    const BAD_LOGIN: ServiceError = ServiceError::Unauthenticated("invalid email or password");
    let user = store.user_by_email(email).await?.ok_or(BAD_LOGIN)?;
    let stored = user.password_hash.as_deref().ok_or(BAD_LOGIN)?;
    if !verify_password(password, stored) {
        return Err(BAD_LOGIN);
    }
    grant(config, user)
}

/// Consume an email-verification token and mark the account verified.
///
/// # Errors
/// `InvalidArgument` for an invalid or expired token (indistinguishable).
pub async fn verify_email(store: &Store, token: &str) -> ServiceResult<User> {
    let record = store
        .email_verification_token(token)
        .await?
        .ok_or_else(|| {
            ServiceError::InvalidArgument("invalid or expired verification token".to_string())
        })?;
    store.verify_user_email(record.user_id).await
}

/// Mint and deliver a fresh verification token for an authenticated account.
///
/// Unlike signup, the caller asked for this email specifically, so a
/// delivery failure is surfaced.
///
/// # Errors
/// `InvalidArgument` if the email is already verified; `Internal` if
/// delivery fails.
pub async fn resend_verification(
    store: &Store,
    config: &Config,
    mailer: &Mailer,
    user: &User,
) -> ServiceResult<()> {
    if user.email_verified {
        return Err(ServiceError::InvalidArgument(
            "email already verified".to_string(),
        ));
    }
    let token = generate_opaque_token();
    let expires_at = expiry_after(config.auth.verification_token_ttl);
    store
        .create_email_verification_token(user.id, &token, expires_at)
        .await?;
    let display = user.name.as_deref().unwrap_or("User");
    mailer
        .send_verification(&user.email, display, &token)
        .await
        .map_err(|err| {
            ServiceError::Internal(format!("failed to send verification email: {err}"))
        })?;
    Ok(())
}

/// Start a password reset. Succeeds whether or not the email exists, so the
/// response can never be used to enumerate accounts.
///
/// # Errors
/// Returns an error only on storage failure.
pub async fn forgot_password(
    store: &Store,
    config: &Config,
    mailer: &Mailer,
    email: &str,
) -> ServiceResult<()> {
    let Some(user) = store.user_by_email(email).await? else {
        return Ok(());
    };
    let token = generate_opaque_token();
    let expires_at = expiry_after(config.auth.reset_token_ttl);
    store
        .create_password_reset_token(user.id, &token, expires_at)
        .await?;

    let mailer = mailer.clone();
    let to = user.email.clone();
    let display = user.name.clone().unwrap_or_else(|| "User".to_string());
    tokio::spawn(async move {
        if let Err(err) = mailer.send_password_reset(&to, &display, &token).await {
            tracing::warn!(%to, error = %err, "failed to send password reset email");
        }
    });
    Ok(())
}

/// Consume a password-reset token exactly once and set the new password.
///
/// After the reset the token is deleted, so a second attempt with the same
/// token fails exactly like an unknown token.
///
/// # Errors
/// `InvalidArgument` for an invalid, expired, or already-used token.
pub async fn reset_password(
    store: &Store,
    token: &str,
    new_password: &str,
) -> ServiceResult<()> {
    if new_password.is_empty() {
        return Err(ServiceError::InvalidArgument(
            "password must not be empty".to_string(),
        ));
    }
    let record = store.password_reset_token(token).await?.ok_or_else(|| {
        ServiceError::InvalidArgument("invalid or expired reset token".to_string())
    })?;
    store
        .update_user_password(record.user_id, hash_password(new_password))
        .await?;
    store.delete_password_reset_token(token).await?;
    Ok(())
}

/// Link-or-create an account from a verified identity-provider record and
/// mint a bearer credential. Idempotent across repeated calls with the same
/// provider identity.
///
/// # Errors
/// `InvalidArgument` for an unusable email; `Internal` if the identity link
/// names an account that no longer exists.
pub async fn oauth_sync(
    store: &Store,
    config: &Config,
    provider: &str,
    provider_user_id: &str,
    email: &str,
    name: Option<String>,
    avatar_url: Option<String>,
) -> ServiceResult<TokenGrant> {
    check_email(email)?;
    if provider.trim().is_empty() || provider_user_id.trim().is_empty() {
        return Err(ServiceError::InvalidArgument(
            "provider and provider subject are required".to_string(),
        ));
    }

    let user = match store.oauth_account(provider, provider_user_id).await? {
        Some(link) => store.user_by_id(link.user_id).await?.ok_or_else(|| {
            ServiceError::Internal("identity link names a missing account".to_string())
        })?,
        None => {
            let user = match store.user_by_email(email).await? {
                Some(existing) => existing,
                None => {
                    // Provider accounts carry no password; the identity link
                    // created below is their credential.
                    let created = store.create_user(email, None, name, avatar_url).await?;
                    store.verify_user_email(created.id).await?
                }
            };
            store
                .upsert_oauth_account(user.id, provider, provider_user_id, None, None, None)
                .await?;
            user
        }
    };

    grant(config, user)
}
