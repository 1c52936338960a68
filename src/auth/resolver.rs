//! Identity resolution: opaque bearer credential → verified owner.

use std::str::FromStr;

use crate::auth::tokens::{self, TokenError};
use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::ids::UserId;
use crate::core::entities::User;
use crate::store::Store;

/// Resolve a bearer credential to its verified owner.
///
/// Performs no storage writes. Malformed credentials, bad signatures,
/// expired tokens, and tokens naming an owner that no longer exists all
/// surface as [`ServiceError::Unauthenticated`] — a well-formed credential
/// must not let a caller distinguish "never existed" from "deleted". The one
/// exception is a credential that verifies but omits its subject claim,
/// which surfaces as the distinct [`ServiceError::InvalidCredential`] to aid
/// diagnostics.
///
/// # Errors
/// Returns `Unauthenticated`/`InvalidCredential` per above, or a storage
/// error if the owner lookup itself fails.
pub async fn resolve_bearer(store: &Store, secret: &str, token: &str) -> ServiceResult<User> {
    let claims = tokens::decode_access_token(secret, token).map_err(|err| match err {
        TokenError::MissingSubject => ServiceError::InvalidCredential,
        TokenError::Expired => ServiceError::Unauthenticated("token expired"),
        TokenError::Malformed | TokenError::BadSignature => {
            ServiceError::Unauthenticated("invalid authentication credentials")
        }
    })?;
    let subject = claims.sub.as_deref().unwrap_or_default();
    let user_id = UserId::from_str(subject)
        .map_err(|_| ServiceError::Unauthenticated("invalid subject identifier"))?;
    match store.user_by_id(user_id).await? {
        Some(user) => Ok(user),
        None => Err(ServiceError::Unauthenticated("unknown subject")),
    }
}

/// Optional variant for endpoints that behave differently for anonymous
/// callers: absent or unusable credentials yield `None` instead of an error.
/// Storage failures still propagate.
///
/// # Errors
/// Returns an error only if the owner lookup itself fails.
pub async fn resolve_bearer_optional(
    store: &Store,
    secret: &str,
    token: Option<&str>,
) -> ServiceResult<Option<User>> {
    let Some(token) = token else {
        return Ok(None);
    };
    match resolve_bearer(store, secret, token).await {
        Ok(user) => Ok(Some(user)),
        Err(
            ServiceError::Unauthenticated(_)
            | ServiceError::InvalidCredential
            | ServiceError::NotFound,
        ) => Ok(None),
        Err(err) => Err(err),
    }
}
