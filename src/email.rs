//! Outbound email delivery.
//!
//! Delivery is fire-and-forget: callers spawn [`Mailer::send_verification`]
//! / [`Mailer::send_password_reset`] into a background task and a failure is
//! logged, never fatal to the request that triggered it. When no relay
//! endpoint is configured (local development), the message is logged instead
//! of sent.

use serde::Serialize;
use thiserror::Error;

use crate::core::config::EmailConfig;

/// Errors that can occur during email delivery.
#[derive(Debug, Error)]
pub enum MailerError {
    /// HTTP request to the relay failed.
    #[error("email relay request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Relay answered with a non-success status.
    #[error("email relay returned {0}")]
    Relay(reqwest::StatusCode),
}

/// Outbound mail sender backed by an HTTP relay endpoint.
#[derive(Clone)]
pub struct Mailer {
    config: EmailConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OutboundEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl Mailer {
    /// Build a mailer from configuration.
    #[must_use]
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Send the email-verification message for `token`.
    ///
    /// # Errors
    /// Returns an error if the relay rejects the message.
    pub async fn send_verification(
        &self,
        to: &str,
        name: &str,
        token: &str,
    ) -> Result<(), MailerError> {
        let link = format!("{}/verify-email?token={token}", self.config.frontend_url);
        let body = format!(
            "Hi {name},\n\n\
             Thank you for signing up! Please verify your email address by visiting:\n\n\
             {link}\n\n\
             This link will expire in 24 hours. If you didn't create an account,\n\
             you can safely ignore this email.\n"
        );
        self.deliver(to, "Verify your email address", &body).await
    }

    /// Send the password-reset message for `token`.
    ///
    /// # Errors
    /// Returns an error if the relay rejects the message.
    pub async fn send_password_reset(
        &self,
        to: &str,
        name: &str,
        token: &str,
    ) -> Result<(), MailerError> {
        let link = format!("{}/reset-password?token={token}", self.config.frontend_url);
        let body = format!(
            "Hi {name},\n\n\
             You requested to reset your password. Visit this link to reset it:\n\n\
             {link}\n\n\
             This link will expire in 1 hour. If you didn't request a password\n\
             reset, you can safely ignore this email.\n"
        );
        self.deliver(to, "Reset your password", &body).await
    }

    async fn deliver(&self, to: &str, subject: &str, text: &str) -> Result<(), MailerError> {
        let Some(relay_url) = &self.config.relay_url else {
            tracing::info!(%to, %subject, "email relay not configured; logging instead of sending");
            tracing::debug!(%text, "email body");
            return Ok(());
        };
        let payload = OutboundEmail {
            from: &self.config.from_address,
            to,
            subject,
            text,
        };
        let response = self.client.post(relay_url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(MailerError::Relay(response.status()));
        }
        Ok(())
    }
}
