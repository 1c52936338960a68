//! Account, identity-link, and short-lived-token operations.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use crate::core::entities::{OauthAccount, ShortLivedToken, User};
use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::ids::{OauthAccountId, TokenId, UserId};

use super::{Store, is_constraint_violation, ts_from_millis};

const USER_COLUMNS: &str =
    "id, email, password_hash, name, avatar_url, email_verified, created_at, updated_at";

type RawUser = (
    UserId,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
    i64,
    i64,
);

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawUser> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn finish_user(raw: RawUser) -> Result<User, tokio_rusqlite::Error> {
    let (id, email, password_hash, name, avatar_url, email_verified, created, updated) = raw;
    Ok(User {
        id,
        email,
        password_hash,
        name,
        avatar_url,
        email_verified,
        created_at: ts_from_millis(created)?,
        updated_at: ts_from_millis(updated)?,
    })
}

impl Store {
    /// Create a new account.
    ///
    /// `password_hash` is `None` for identity-provider accounts; such
    /// callers are expected to link an identity in the same flow.
    ///
    /// # Errors
    /// `AlreadyExists` if the email is taken; the uniqueness constraint is
    /// what decides concurrent races, not a prior read.
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: Option<String>,
        name: Option<String>,
        avatar_url: Option<String>,
    ) -> ServiceResult<User> {
        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            email: email.to_string(),
            password_hash,
            name,
            avatar_url,
            email_verified: false,
            created_at: now,
            updated_at: now,
        };
        let row = user.clone();
        let result = self
            .conn()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (id, email, password_hash, name, avatar_url,
                                        email_verified, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        row.id,
                        row.email,
                        row.password_hash,
                        row.name,
                        row.avatar_url,
                        row.email_verified,
                        row.created_at.timestamp_millis(),
                        row.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await;
        match result {
            Ok(()) => Ok(user),
            Err(err) if is_constraint_violation(&err) => Err(ServiceError::AlreadyExists(
                "email already registered".to_string(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    /// Look up an account by email.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn user_by_email(&self, email: &str) -> ServiceResult<Option<User>> {
        let email = email.to_string();
        let found = self
            .conn()
            .call(move |conn| {
                let row = conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                        params![email],
                        user_from_row,
                    )
                    .optional()?;
                row.map(finish_user).transpose()
            })
            .await?;
        Ok(found)
    }

    /// Look up an account by id.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn user_by_id(&self, user_id: UserId) -> ServiceResult<Option<User>> {
        let found = self
            .conn()
            .call(move |conn| {
                let row = conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                        params![user_id],
                        user_from_row,
                    )
                    .optional()?;
                row.map(finish_user).transpose()
            })
            .await?;
        Ok(found)
    }

    /// Mark an account's email as verified. Idempotent on success.
    ///
    /// # Errors
    /// `NotFound` if the account no longer exists.
    pub async fn verify_user_email(&self, user_id: UserId) -> ServiceResult<User> {
        let now = Utc::now().timestamp_millis();
        let changed = self
            .conn()
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE users SET email_verified = 1, updated_at = ?2 WHERE id = ?1",
                    params![user_id, now],
                )?;
                Ok(changed)
            })
            .await?;
        if changed == 0 {
            return Err(ServiceError::NotFound);
        }
        self.user_by_id(user_id).await?.ok_or(ServiceError::NotFound)
    }

    /// Replace an account's password digest. Idempotent on success.
    ///
    /// # Errors
    /// `NotFound` if the account no longer exists.
    pub async fn update_user_password(
        &self,
        user_id: UserId,
        password_hash: String,
    ) -> ServiceResult<User> {
        let now = Utc::now().timestamp_millis();
        let changed = self
            .conn()
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
                    params![user_id, password_hash, now],
                )?;
                Ok(changed)
            })
            .await?;
        if changed == 0 {
            return Err(ServiceError::NotFound);
        }
        self.user_by_id(user_id).await?.ok_or(ServiceError::NotFound)
    }

    /// Update profile fields; `None` leaves a field untouched.
    ///
    /// # Errors
    /// `NotFound` if the account no longer exists.
    pub async fn update_user_profile(
        &self,
        user_id: UserId,
        name: Option<String>,
        avatar_url: Option<String>,
    ) -> ServiceResult<User> {
        let now = Utc::now().timestamp_millis();
        let changed = self
            .conn()
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE users
                     SET name = COALESCE(?2, name),
                         avatar_url = COALESCE(?3, avatar_url),
                         updated_at = ?4
                     WHERE id = ?1",
                    params![user_id, name, avatar_url, now],
                )?;
                Ok(changed)
            })
            .await?;
        if changed == 0 {
            return Err(ServiceError::NotFound);
        }
        self.user_by_id(user_id).await?.ok_or(ServiceError::NotFound)
    }

    /// Create or refresh an identity-provider link.
    ///
    /// Upserts on the globally unique (provider, provider subject) pair:
    /// re-linking the same pair updates the stored provider tokens in place
    /// and keeps the original account binding.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn upsert_oauth_account(
        &self,
        user_id: UserId,
        provider: &str,
        provider_user_id: &str,
        access_token: Option<String>,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> ServiceResult<OauthAccount> {
        let provider = provider.to_string();
        let provider_user = provider_user_id.to_string();
        let now = Utc::now();
        let fresh_id = OauthAccountId::new();
        let account = self
            .conn()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let existing: Option<(OauthAccountId, UserId, i64)> = tx
                    .query_row(
                        "SELECT id, user_id, created_at FROM oauth_accounts
                         WHERE provider = ?1 AND provider_user_id = ?2",
                        params![provider, provider_user],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?;
                let expires_ms = expires_at.map(|dt| dt.timestamp_millis());
                let account = match existing {
                    Some((id, linked_user, created_ms)) => {
                        tx.execute(
                            "UPDATE oauth_accounts
                             SET access_token = ?2, refresh_token = ?3, expires_at = ?4
                             WHERE id = ?1",
                            params![id, access_token, refresh_token, expires_ms],
                        )?;
                        OauthAccount {
                            id,
                            user_id: linked_user,
                            provider,
                            provider_user_id: provider_user,
                            access_token,
                            refresh_token,
                            expires_at,
                            created_at: ts_from_millis(created_ms)?,
                        }
                    }
                    None => {
                        tx.execute(
                            "INSERT INTO oauth_accounts
                                 (id, user_id, provider, provider_user_id,
                                  access_token, refresh_token, expires_at, created_at)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                            params![
                                fresh_id,
                                user_id,
                                provider,
                                provider_user,
                                access_token,
                                refresh_token,
                                expires_ms,
                                now.timestamp_millis(),
                            ],
                        )?;
                        OauthAccount {
                            id: fresh_id,
                            user_id,
                            provider,
                            provider_user_id: provider_user,
                            access_token,
                            refresh_token,
                            expires_at,
                            created_at: now,
                        }
                    }
                };
                tx.commit()?;
                Ok(account)
            })
            .await?;
        Ok(account)
    }

    /// Exact-match lookup of an identity link by its composite key.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn oauth_account(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> ServiceResult<Option<OauthAccount>> {
        let provider = provider.to_string();
        let provider_user = provider_user_id.to_string();
        let found = self
            .conn()
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, user_id, provider, provider_user_id,
                                access_token, refresh_token, expires_at, created_at
                         FROM oauth_accounts
                         WHERE provider = ?1 AND provider_user_id = ?2",
                        params![provider, provider_user],
                        |row| {
                            Ok((
                                row.get::<_, OauthAccountId>(0)?,
                                row.get::<_, UserId>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, String>(3)?,
                                row.get::<_, Option<String>>(4)?,
                                row.get::<_, Option<String>>(5)?,
                                row.get::<_, Option<i64>>(6)?,
                                row.get::<_, i64>(7)?,
                            ))
                        },
                    )
                    .optional()?;
                match row {
                    None => Ok(None),
                    Some((id, user_id, provider, provider_user_id, access, refresh, exp, created)) => {
                        Ok(Some(OauthAccount {
                            id,
                            user_id,
                            provider,
                            provider_user_id,
                            access_token: access,
                            refresh_token: refresh,
                            expires_at: exp.map(ts_from_millis).transpose()?,
                            created_at: ts_from_millis(created)?,
                        }))
                    }
                }
            })
            .await?;
        Ok(found)
    }

    /// Persist an email-verification token.
    ///
    /// # Errors
    /// `AlreadyExists` if the token string collides.
    pub async fn create_email_verification_token(
        &self,
        user_id: UserId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> ServiceResult<ShortLivedToken> {
        self.create_token("email_verification_tokens", user_id, token, expires_at)
            .await
    }

    /// Look up an unexpired email-verification token.
    ///
    /// Expired and nonexistent tokens are indistinguishable to the caller.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn email_verification_token(
        &self,
        token: &str,
    ) -> ServiceResult<Option<ShortLivedToken>> {
        self.valid_token("email_verification_tokens", token).await
    }

    /// Persist a password-reset token.
    ///
    /// # Errors
    /// `AlreadyExists` if the token string collides.
    pub async fn create_password_reset_token(
        &self,
        user_id: UserId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> ServiceResult<ShortLivedToken> {
        self.create_token("password_reset_tokens", user_id, token, expires_at)
            .await
    }

    /// Look up an unexpired password-reset token.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn password_reset_token(
        &self,
        token: &str,
    ) -> ServiceResult<Option<ShortLivedToken>> {
        self.valid_token("password_reset_tokens", token).await
    }

    /// Delete a password-reset token after use. Unconditional and
    /// idempotent: deleting an unknown token succeeds.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn delete_password_reset_token(&self, token: &str) -> ServiceResult<()> {
        let token = token.to_string();
        self.conn()
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM password_reset_tokens WHERE token = ?1",
                    params![token],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn create_token(
        &self,
        table: &'static str,
        user_id: UserId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> ServiceResult<ShortLivedToken> {
        let record = ShortLivedToken {
            id: TokenId::new(),
            user_id,
            token: token.to_string(),
            expires_at,
            created_at: Utc::now(),
        };
        let row = record.clone();
        let result = self
            .conn()
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO {table} (id, user_id, token, expires_at, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)"
                    ),
                    params![
                        row.id,
                        row.user_id,
                        row.token,
                        row.expires_at.timestamp_millis(),
                        row.created_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await;
        match result {
            Ok(()) => Ok(record),
            Err(err) if is_constraint_violation(&err) => Err(ServiceError::AlreadyExists(
                "token already exists".to_string(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn valid_token(
        &self,
        table: &'static str,
        token: &str,
    ) -> ServiceResult<Option<ShortLivedToken>> {
        let token = token.to_string();
        let now = Utc::now().timestamp_millis();
        let found = self
            .conn()
            .call(move |conn| {
                let row = conn
                    .query_row(
                        &format!(
                            "SELECT id, user_id, token, expires_at, created_at
                             FROM {table}
                             WHERE token = ?1 AND expires_at > ?2"
                        ),
                        params![token, now],
                        |row| {
                            Ok((
                                row.get::<_, TokenId>(0)?,
                                row.get::<_, UserId>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, i64>(3)?,
                                row.get::<_, i64>(4)?,
                            ))
                        },
                    )
                    .optional()?;
                match row {
                    None => Ok(None),
                    Some((id, user_id, token, expires, created)) => Ok(Some(ShortLivedToken {
                        id,
                        user_id,
                        token,
                        expires_at: ts_from_millis(expires)?,
                        created_at: ts_from_millis(created)?,
                    })),
                }
            })
            .await?;
        Ok(found)
    }
}
