//! Service configuration.
//!
//! Configuration is an explicitly constructed, immutable value passed into
//! component constructors; there is no ambient cached global. `from_env`
//! reads `LOOMLINE_*` variables on top of the defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::errors::{ServiceError, ServiceResult};

/// Top-level configuration for the service.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP frontend settings.
    pub http: HttpConfig,
    /// Binary RPC frontend settings.
    pub rpc: RpcConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Credential settings.
    pub auth: AuthConfig,
    /// Outbound email settings.
    pub email: EmailConfig,
}

impl Config {
    /// Build a configuration from environment variables over the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("LOOMLINE_HTTP_HOST") {
            config.http.host = host;
        }
        if let Some(port) = env_parse("LOOMLINE_HTTP_PORT") {
            config.http.port = port;
        }
        if let Ok(host) = std::env::var("LOOMLINE_RPC_HOST") {
            config.rpc.host = host;
        }
        if let Some(port) = env_parse("LOOMLINE_RPC_PORT") {
            config.rpc.port = port;
        }
        if let Ok(path) = std::env::var("LOOMLINE_SQLITE_PATH") {
            config.storage.sqlite_path = PathBuf::from(path);
        }
        if let Ok(secret) = std::env::var("LOOMLINE_TOKEN_SECRET") {
            config.auth.token_secret = secret;
        }
        if let Ok(url) = std::env::var("LOOMLINE_EMAIL_RELAY_URL") {
            config.email.relay_url = Some(url);
        }
        if let Ok(from) = std::env::var("LOOMLINE_EMAIL_FROM") {
            config.email.from_address = from;
        }
        if let Ok(url) = std::env::var("LOOMLINE_FRONTEND_URL") {
            config.email.frontend_url = url;
        }
        config
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.auth.token_secret.is_empty() {
            return Err(ServiceError::InvalidConfig(
                "auth.token_secret must not be empty".to_string(),
            ));
        }
        if self.auth.access_token_ttl.is_zero() {
            return Err(ServiceError::InvalidConfig(
                "auth.access_token_ttl must be > 0".to_string(),
            ));
        }
        if self.auth.verification_token_ttl.is_zero() {
            return Err(ServiceError::InvalidConfig(
                "auth.verification_token_ttl must be > 0".to_string(),
            ));
        }
        if self.auth.reset_token_ttl.is_zero() {
            return Err(ServiceError::InvalidConfig(
                "auth.reset_token_ttl must be > 0".to_string(),
            ));
        }
        Url::parse(&self.email.frontend_url)?;
        if let Some(relay) = &self.email.relay_url {
            Url::parse(relay)?;
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// HTTP frontend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Binary RPC frontend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50051,
        }
    }
}

/// Storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("loomline.sqlite"),
        }
    }
}

/// Credential settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret keying the access-token signature.
    pub token_secret: String,
    /// Bearer token lifetime.
    pub access_token_ttl: Duration,
    /// Email-verification token lifetime.
    pub verification_token_ttl: Duration,
    /// Password-reset token lifetime.
    pub reset_token_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: "loomline-dev-secret".to_string(),
            access_token_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            verification_token_ttl: Duration::from_secs(24 * 60 * 60),
            reset_token_ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// Outbound email settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmailConfig {
    /// HTTP relay endpoint; when absent, messages are logged instead.
    pub relay_url: Option<String>,
    /// Sender address.
    pub from_address: String,
    /// Base URL used to build verification/reset links.
    pub frontend_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            from_address: "no-reply@loomline.local".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let mut config = Config::default();
        config.auth.token_secret.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_frontend_url_is_rejected() {
        let mut config = Config::default();
        config.email.frontend_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
