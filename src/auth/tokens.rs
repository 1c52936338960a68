//! Bearer-token codec and opaque token generation.
//!
//! Access tokens use a compact two-part form,
//! `base64url(claims JSON) . base64url(HMAC-SHA256 tag)`, signed with the
//! configured service secret. The format is deliberately boring: the rest of
//! the crate only consumes the sign/verify contract and never inspects the
//! encoding.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Failure modes when decoding an access token.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Not a well-formed compact token.
    #[error("malformed token")]
    Malformed,
    /// Signature does not match the payload.
    #[error("invalid token signature")]
    BadSignature,
    /// The token's expiry instant has passed.
    #[error("token expired")]
    Expired,
    /// The token verified but carries no subject claim.
    #[error("token carries no subject claim")]
    MissingSubject,
}

/// Claims carried by an access token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the owner identifier as canonical UUID text.
    #[serde(default)]
    pub sub: Option<String>,
    /// Email at issuance time; informational only.
    #[serde(default)]
    pub email: Option<String>,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Sign an access token for `subject` valid for `ttl`.
///
/// # Errors
/// Returns an error only if claim serialization fails.
pub fn sign_access_token(
    secret: &str,
    subject: &str,
    email: &str,
    ttl: std::time::Duration,
) -> Result<String, serde_json::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: Some(subject.to_string()),
        email: Some(email.to_string()),
        iat: now,
        exp: now + i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
    };
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
    let tag = URL_SAFE_NO_PAD.encode(hmac_sha256(secret.as_bytes(), payload.as_bytes()));
    Ok(format!("{payload}.{tag}"))
}

/// Decode and verify an access token.
///
/// # Errors
/// Returns the specific [`TokenError`] for malformed input, a bad signature,
/// an expired token, or a verified token with no subject claim.
pub fn decode_access_token(secret: &str, token: &str) -> Result<Claims, TokenError> {
    let (payload, tag) = token.split_once('.').ok_or(TokenError::Malformed)?;
    if payload.is_empty() || tag.contains('.') {
        return Err(TokenError::Malformed);
    }
    let presented = URL_SAFE_NO_PAD
        .decode(tag)
        .map_err(|_| TokenError::Malformed)?;
    let expected = hmac_sha256(secret.as_bytes(), payload.as_bytes());
    if !constant_time_eq(&presented, &expected) {
        return Err(TokenError::BadSignature);
    }
    let raw = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenError::Malformed)?;
    let claims: Claims = serde_json::from_slice(&raw).map_err(|_| TokenError::Malformed)?;
    if claims.exp <= Utc::now().timestamp() {
        return Err(TokenError::Expired);
    }
    match &claims.sub {
        Some(sub) if !sub.is_empty() => Ok(claims),
        _ => Err(TokenError::MissingSubject),
    }
}

/// Generate a random opaque token for email-verification or password-reset
/// links: 32 random bytes, base64url without padding.
#[must_use]
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// HMAC-SHA256 per RFC 2104 over the crate's SHA-256 implementation.
fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    const BLOCK: usize = 64;
    let mut padded = [0u8; BLOCK];
    if key.len() > BLOCK {
        let digest = Sha256::digest(key);
        padded[..digest.len()].copy_from_slice(&digest);
    } else {
        padded[..key.len()].copy_from_slice(key);
    }
    let mut ipad = [0x36u8; BLOCK];
    let mut opad = [0x5cu8; BLOCK];
    for i in 0..BLOCK {
        ipad[i] ^= padded[i];
        opad[i] ^= padded[i];
    }
    let inner = Sha256::new()
        .chain_update(ipad)
        .chain_update(message)
        .finalize();
    let outer = Sha256::new()
        .chain_update(opad)
        .chain_update(inner)
        .finalize();
    outer.into()
}

/// Length-checked comparison that does not short-circuit on the first
/// mismatching byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_sign_and_decode_roundtrip() {
        let token =
            sign_access_token(SECRET, "user-1", "a@example.com", Duration::from_secs(60)).unwrap();
        let claims = decode_access_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("user-1"));
        assert_eq!(claims.email.as_deref(), Some("a@example.com"));
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_fails_signature() {
        let token =
            sign_access_token(SECRET, "user-1", "a@example.com", Duration::from_secs(60)).unwrap();
        assert_eq!(
            decode_access_token("other-secret", &token),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_tampered_payload_fails_signature() {
        let token =
            sign_access_token(SECRET, "user-1", "a@example.com", Duration::from_secs(60)).unwrap();
        let (payload, tag) = token.split_once('.').unwrap();
        let mut altered = payload.to_string();
        altered.push('A');
        assert_eq!(
            decode_access_token(SECRET, &format!("{altered}.{tag}")),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_expired_token() {
        let token =
            sign_access_token(SECRET, "user-1", "a@example.com", Duration::from_secs(0)).unwrap();
        assert_eq!(decode_access_token(SECRET, &token), Err(TokenError::Expired));
    }

    #[test]
    fn test_malformed_tokens() {
        assert_eq!(decode_access_token(SECRET, ""), Err(TokenError::Malformed));
        assert_eq!(
            decode_access_token(SECRET, "no-separator"),
            Err(TokenError::Malformed)
        );
        assert_eq!(
            decode_access_token(SECRET, "!!!.!!!"),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_missing_subject_is_distinct() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: None,
            email: None,
            iat: now,
            exp: now + 60,
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let tag = URL_SAFE_NO_PAD.encode(hmac_sha256(SECRET.as_bytes(), payload.as_bytes()));
        let token = format!("{payload}.{tag}");
        assert_eq!(
            decode_access_token(SECRET, &token),
            Err(TokenError::MissingSubject)
        );
    }

    #[test]
    fn test_opaque_tokens_are_unique() {
        assert_ne!(generate_opaque_token(), generate_opaque_token());
        assert!(generate_opaque_token().len() >= 40);
    }
}
