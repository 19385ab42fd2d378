//! Login strategies for the secret store.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::iam::{AwsStsAsserter, IdentityAsserter};
use crate::config::{AuthType, VaultSettings};
use crate::errors::{InventoryError, Result};
use crate::secrets::{AuthSecret, SecretString, StoreClient};

/// Performs a full login and returns the issued token
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self) -> Result<AuthSecret>;

    /// Short name for logs
    fn method(&self) -> &'static str;
}

/// Uses a preconfigured token. No network call; the token never expires and
/// is not renewed.
#[derive(Debug, Clone)]
pub struct StaticTokenAuthenticator {
    token: SecretString,
}

impl StaticTokenAuthenticator {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self) -> Result<AuthSecret> {
        Ok(AuthSecret { token: self.token.clone(), renewable: false, ttl: Duration::ZERO })
    }

    fn method(&self) -> &'static str {
        "token"
    }
}

/// Logs in through the aws auth method with a signed STS request
pub struct AwsIamAuthenticator {
    store: Arc<dyn StoreClient>,
    asserter: Arc<dyn IdentityAsserter>,
    provider: String,
    role: String,
}

impl AwsIamAuthenticator {
    /// `provider` is the auth mount (`auth/<provider>/login`)
    pub fn new(
        store: Arc<dyn StoreClient>,
        asserter: Arc<dyn IdentityAsserter>,
        provider: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self { store, asserter, provider: provider.into(), role: role.into() }
    }
}

#[async_trait]
impl Authenticator for AwsIamAuthenticator {
    async fn authenticate(&self) -> Result<AuthSecret> {
        let assertion = self.asserter.assert_identity().await.map_err(|e| {
            InventoryError::auth(format!("Failed to build AWS identity assertion: {}", e))
        })?;
        let payload = assertion.to_login_payload(&self.role)?;

        let secret = self.store.login(&self.provider, &payload).await.map_err(|e| {
            InventoryError::auth(format!(
                "Login as role '{}' via auth/{}/login failed: {}",
                self.role, self.provider, e
            ))
        })?;

        if secret.token.is_empty() {
            return Err(InventoryError::auth(format!(
                "Got no token from the {} authentication provider",
                self.provider
            )));
        }

        Ok(secret)
    }

    fn method(&self) -> &'static str {
        "aws"
    }
}

/// Build the authenticator for `settings`.
///
/// A non-empty token wins over `auth_type`, the way the Vault CLI treats
/// `VAULT_TOKEN`; otherwise `auth_type` selects the method. `store` is an
/// unauthenticated client used for logins.
pub fn authenticator_from_settings(
    settings: &VaultSettings,
    store: Arc<dyn StoreClient>,
) -> Result<Arc<dyn Authenticator>> {
    if let Some(token) = settings.token.clone().filter(|t| !t.is_empty()) {
        if settings.auth_type == AuthType::Aws {
            info!("A Vault token is configured, skipping aws login");
        }
        return Ok(Arc::new(StaticTokenAuthenticator::new(token)));
    }

    match settings.auth_type {
        AuthType::Token => Err(InventoryError::config("Token auth requires a token")),
        AuthType::Aws => {
            let provider = settings.aws_provider.clone().unwrap_or_default();
            let role = settings.aws_role.clone().unwrap_or_default();
            if provider.is_empty() || role.is_empty() {
                return Err(InventoryError::config(
                    "Both aws auth provider and aws auth role are required",
                ));
            }

            let asserter =
                AwsStsAsserter::new(settings.sts_region.clone(), settings.aws_server_id.clone());
            Ok(Arc::new(AwsIamAuthenticator::new(store, Arc::new(asserter), provider, role)))
        }
    }
}
