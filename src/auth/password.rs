//! Opaque password-digest primitive.
//!
//! Callers only see `hash_password` / `verify_password`; the digest format
//! (`v1$<iterations>$<salt>$<digest>`, salted iterated SHA-256) is an
//! internal detail and may change behind a new version prefix. Secrets are
//! pre-truncated to [`MAX_SECRET_BYTES`] before hashing, matching the
//! upstream primitive's length cap.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Upstream length cap; bytes beyond this never influence the digest.
pub const MAX_SECRET_BYTES: usize = 72;

const VERSION: &str = "v1";
const ITERATIONS: u32 = 10_000;
const SALT_BYTES: usize = 16;

/// Hash a secret into a self-describing digest string.
#[must_use]
pub fn hash_password(secret: &str) -> String {
    let mut salt = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = derive(secret.as_bytes(), &salt, ITERATIONS);
    format!(
        "{VERSION}${ITERATIONS}${}${}",
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(digest)
    )
}

/// Verify a secret against a stored digest.
///
/// Unknown formats verify as `false` rather than erroring, so a corrupted
/// stored digest behaves like a wrong password.
#[must_use]
pub fn verify_password(secret: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(version), Some(iterations), Some(salt), Some(digest), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if version != VERSION {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (
        URL_SAFE_NO_PAD.decode(salt),
        URL_SAFE_NO_PAD.decode(digest),
    ) else {
        return false;
    };
    let computed = derive(secret.as_bytes(), &salt, iterations);
    constant_time_eq(&computed, &expected)
}

fn derive(secret: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let capped = &secret[..secret.len().min(MAX_SECRET_BYTES)];
    let mut digest: [u8; 32] = Sha256::new()
        .chain_update(salt)
        .chain_update(capped)
        .finalize()
        .into();
    for _ in 1..iterations {
        digest = Sha256::new()
            .chain_update(salt)
            .chain_update(digest)
            .finalize()
            .into();
    }
    digest
}

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

    #[test]
    fn test_hash_and_verify() {
        let digest = hash_password("correct horse");
        assert!(verify_password("correct horse", &digest));
        assert!(!verify_password("wrong horse", &digest));
    }

    #[test]
    fn test_same_password_different_hashes() {
        let a = hash_password("secret");
        let b = hash_password("secret");
        assert_ne!(a, b);
        assert!(verify_password("secret", &a));
        assert!(verify_password("secret", &b));
    }

    #[test]
    fn test_long_passwords_truncate() {
        let long = "x".repeat(200);
        let digest = hash_password(&long);
        // Bytes past the cap do not influence the digest.
        let truncated = "x".repeat(MAX_SECRET_BYTES);
        assert!(verify_password(&truncated, &digest));
    }

    #[test]
    fn test_unicode_passwords() {
        let digest = hash_password("pässwörd ✓");
        assert!(verify_password("pässwörd ✓", &digest));
        assert!(!verify_password("passwort", &digest));
    }

    #[test]
    fn test_garbage_stored_digest_rejects() {
        assert!(!verify_password("secret", ""));
        assert!(!verify_password("secret", "bcrypt$whatever"));
        assert!(!verify_password("secret", "v1$abc$notb64$%%%"));
    }
}
