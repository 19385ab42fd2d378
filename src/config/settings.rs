//! # Configuration Settings
//!
//! Defines the configuration structure for the secret inventory and how it is
//! layered: built-in defaults, then an optional TOML file, then
//! `VAULT_INVENTORY__<SECTION>__<KEY>` environment variables. In line with the
//! Vault CLI, `VAULT_ADDR` and `VAULT_TOKEN` fill in an address or token that
//! is still unset afterwards.

use crate::errors::{InventoryError, Result};
use crate::secrets::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Prefix for environment overrides (`VAULT_INVENTORY__VAULT__ADDRESS`, ...)
pub const ENV_PREFIX: &str = "VAULT_INVENTORY";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Secret store connection and authentication
    #[validate(nested)]
    pub vault: VaultSettings,

    /// Crawler tuning
    #[validate(nested)]
    pub crawl: CrawlSettings,

    /// Logging configuration
    #[validate(nested)]
    pub observability: ObservabilitySettings,
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        config.vault.apply_env_fallbacks();

        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(InventoryError::from)?;

        self.validate_custom()?;

        Ok(())
    }

    /// Cross-field rules the validator crate cannot express
    fn validate_custom(&self) -> Result<()> {
        if self.vault.address.trim().is_empty() {
            return Err(InventoryError::config(
                "Vault address must be set either in VAULT_ADDR environment variable or in the configuration file",
            ));
        }

        let has_token = self.vault.token.as_ref().is_some_and(|t| !t.is_empty());

        // a token is used as is whatever the auth type
        match self.vault.auth_type {
            _ if has_token => {}
            AuthType::Token => {
                return Err(InventoryError::config(
                    "Token auth requires a token, set VAULT_TOKEN or vault.token",
                ));
            }
            AuthType::Aws => {
                let provider = self.vault.aws_provider.as_deref().unwrap_or_default();
                let role = self.vault.aws_role.as_deref().unwrap_or_default();
                if provider.is_empty() || role.is_empty() {
                    return Err(InventoryError::config(
                        "Both aws auth provider and aws auth role are required",
                    ));
                }
            }
        }

        if self.vault.renewal_window_seconds <= self.vault.expiration_window_seconds {
            return Err(InventoryError::config(
                "Renewal window must be longer than the expiration window",
            ));
        }

        Ok(())
    }
}

/// Supported authentication methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// Static token supplied through configuration or `VAULT_TOKEN`
    #[default]
    Token,
    /// AWS IAM identity assertion against an `aws` auth mount
    Aws,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::Token => "token",
            AuthType::Aws => "aws",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secret store connection settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct VaultSettings {
    /// Vault server address (e.g. "https://vault.example.com:8200")
    pub address: String,

    /// Static token; when set it is used instead of any login
    pub token: Option<SecretString>,

    /// Vault namespace (Enterprise)
    pub namespace: Option<String>,

    /// Authentication method
    pub auth_type: AuthType,

    /// Mount path of the aws auth method (e.g. "aws")
    pub aws_provider: Option<String>,

    /// Role to log in as on the aws auth method
    pub aws_role: Option<String>,

    /// Value for the X-Vault-AWS-IAM-Server-ID header, if the auth mount requires one
    pub aws_server_id: Option<String>,

    /// Regional STS endpoint to sign against (global endpoint when unset)
    pub sts_region: Option<String>,

    /// Per-request timeout in seconds
    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub timeout_seconds: u64,

    /// Margin before expiry within which a token is treated as unusable
    #[validate(range(min = 1, message = "Expiration window must be at least 1 second"))]
    pub expiration_window_seconds: u64,

    /// Margin before expiry within which a token is proactively renewed
    #[validate(range(min = 1, message = "Renewal window must be at least 1 second"))]
    pub renewal_window_seconds: u64,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            address: String::new(),
            token: None,
            namespace: None,
            auth_type: AuthType::Token,
            aws_provider: None,
            aws_role: None,
            aws_server_id: None,
            sts_region: None,
            timeout_seconds: 10,
            expiration_window_seconds: 10,
            renewal_window_seconds: 300,
        }
    }
}

impl VaultSettings {
    /// Fill unset address/token from `VAULT_ADDR` / `VAULT_TOKEN`
    pub fn apply_env_fallbacks(&mut self) {
        if self.address.is_empty() {
            if let Ok(addr) = std::env::var("VAULT_ADDR") {
                self.address = addr;
            }
        }

        if self.token.is_none() {
            self.token = std::env::var("VAULT_TOKEN")
                .ok()
                .filter(|t| !t.is_empty())
                .map(SecretString::new);
        }
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn expiration_window(&self) -> Duration {
        Duration::from_secs(self.expiration_window_seconds)
    }

    pub fn renewal_window(&self) -> Duration {
        Duration::from_secs(self.renewal_window_seconds)
    }
}

/// Crawler settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CrawlSettings {
    /// Number of concurrent crawl workers
    #[validate(range(min = 1, max = 256, message = "Concurrency must be between 1 and 256"))]
    pub concurrency: usize,

    /// Mount type to enumerate
    #[validate(length(min = 1, message = "Engine type cannot be empty"))]
    pub engine_type: String,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self { concurrency: 4, engine_type: "kv".to_string() }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logging: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.vault.address = "http://127.0.0.1:8200".to_string();
        config.vault.token = Some(SecretString::new("s.static"));
        config
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.vault.auth_type, AuthType::Token);
        assert_eq!(config.vault.timeout(), Duration::from_secs(10));
        assert_eq!(config.vault.expiration_window(), Duration::from_secs(10));
        assert_eq!(config.vault.renewal_window(), Duration::from_secs(300));
        assert_eq!(config.crawl.concurrency, 4);
        assert_eq!(config.crawl.engine_type, "kv");
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_token_config_is_valid() {
        assert!(token_config().validate().is_ok());
    }

    #[test]
    fn test_missing_address_rejected() {
        let mut config = token_config();
        config.vault.address = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Vault address must be set"));
    }

    #[test]
    fn test_token_auth_requires_token() {
        let mut config = token_config();
        config.vault.token = None;
        assert!(matches!(config.validate(), Err(InventoryError::Config { .. })));

        config.vault.token = Some(SecretString::new(""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_aws_auth_requires_provider_and_role() {
        let mut config = token_config();
        config.vault.token = None;
        config.vault.auth_type = AuthType::Aws;
        config.vault.aws_provider = Some("aws".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("aws auth role"));

        config.vault.aws_role = Some("inventory-reader".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_token_satisfies_aws_auth() {
        let mut config = token_config();
        config.vault.auth_type = AuthType::Aws;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_window_ordering() {
        let mut config = token_config();
        config.vault.renewal_window_seconds = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_concurrency_range() {
        let mut config = token_config();
        config.crawl.concurrency = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Concurrency must be between 1 and 256"));
    }

    #[test]
    fn test_auth_type_parsing() {
        let parsed: AuthType = serde_json::from_str("\"aws\"").unwrap();
        assert_eq!(parsed, AuthType::Aws);
        assert_eq!(AuthType::Token.to_string(), "token");
        assert!(serde_json::from_str::<AuthType>("\"kerberos\"").is_err());
    }
}
