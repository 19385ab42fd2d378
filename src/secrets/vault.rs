//! HashiCorp Vault implementation of [`StoreClient`].
//!
//! Uses `vaultrs` for the KV v2 metadata endpoints, the mount table, the aws
//! auth method and token renewal. Every request carries the configured
//! timeout; there is no retry loop.
//!
//! ```rust,ignore
//! use vault_inventory::secrets::{StoreClient, VaultStoreClient};
//!
//! let client = VaultStoreClient::new(&settings, Some(&token))?;
//! let children = client.list("secret/", "app/").await?;
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use super::client::{AuthSecret, IamLoginPayload, MountInfo, StoreClient, StoreConnector};
use super::metadata::{RawMetadata, RawVersion};
use super::types::SecretString;
use crate::config::VaultSettings;
use crate::errors::{InventoryError, Result};

/// Vault client bound to an optional token.
pub struct VaultStoreClient {
    client: VaultClient,
    settings: VaultSettings,
}

impl VaultStoreClient {
    /// Create a client for `settings.address`.
    ///
    /// Without a token the client can only log in; that is how the aws
    /// authenticator uses it.
    pub fn new(settings: &VaultSettings, token: Option<&SecretString>) -> Result<Self> {
        let client = build_client(settings, token)?;
        Ok(Self { client, settings: settings.clone() })
    }
}

fn build_client(settings: &VaultSettings, token: Option<&SecretString>) -> Result<VaultClient> {
    if settings.address.is_empty() {
        return Err(InventoryError::config("Vault address cannot be empty"));
    }

    let mut builder = VaultClientSettingsBuilder::default();
    builder.address(&settings.address);
    builder.timeout(Some(settings.timeout()));

    if let Some(token) = token {
        builder.token(token.expose_secret());
    }

    if let Some(namespace) = settings.namespace.clone() {
        builder.namespace(Some(namespace));
    }

    let client_settings = builder.build().map_err(|e| {
        InventoryError::config(format!("Invalid Vault configuration: {}", e))
    })?;

    VaultClient::new(client_settings).map_err(|e| {
        InventoryError::config(format!("Failed to create Vault client: {}", e))
    })
}

/// Request path segment for a mount (`secret/` -> `secret`)
fn mount_segment(mount: &str) -> &str {
    mount.trim_end_matches('/')
}

fn backend_error(context: String, error: ClientError) -> InventoryError {
    match error {
        ClientError::APIError { code, errors } => {
            InventoryError::backend_status(format!("{}: {}", context, errors.join(", ")), code)
        }
        other => InventoryError::backend(format!("{}: {}", context, other)),
    }
}

fn auth_secret(info: vaultrs::api::AuthInfo) -> AuthSecret {
    AuthSecret {
        token: SecretString::new(info.client_token),
        renewable: info.renewable,
        ttl: Duration::from_secs(info.lease_duration),
    }
}

#[async_trait]
impl StoreClient for VaultStoreClient {
    async fn list_mounts(&self) -> Result<HashMap<String, MountInfo>> {
        let mounts = vaultrs::sys::mount::list(&self.client)
            .instrument(crate::vault_span!("list_mounts", "sys/mounts"))
            .await
            .map_err(|e| backend_error("Failed to list mounts".to_string(), e))?;

        Ok(mounts
            .into_iter()
            .map(|(path, mount)| {
                let info = MountInfo {
                    mount_type: mount.mount_type,
                    description: mount.description,
                    options: mount.options.unwrap_or_default(),
                };
                (path, info)
            })
            .collect())
    }

    async fn list(&self, mount: &str, folder: &str) -> Result<Vec<String>> {
        let result = kv2::list(&self.client, mount_segment(mount), folder)
            .instrument(crate::vault_span!("list", folder, mount = %mount))
            .await;

        match result {
            Ok(keys) => Ok(keys),
            Err(e) => {
                let error = backend_error(format!("Failed to list '{}{}'", mount, folder), e);
                if error.is_not_found() {
                    Ok(Vec::new())
                } else {
                    Err(error)
                }
            }
        }
    }

    async fn read_metadata(&self, mount: &str, key: &str) -> Result<Option<RawMetadata>> {
        let result = kv2::read_metadata(&self.client, mount_segment(mount), key)
            .instrument(crate::vault_span!("read_metadata", key, mount = %mount))
            .await;

        let metadata = match result {
            Ok(metadata) => metadata,
            Err(e) => {
                let error =
                    backend_error(format!("Failed to read metadata of '{}{}'", mount, key), e);
                return if error.is_not_found() { Ok(None) } else { Err(error) };
            }
        };

        let versions = metadata
            .versions
            .into_iter()
            .map(|(version, v)| {
                (version, RawVersion { deletion_time: v.deletion_time, destroyed: v.destroyed })
            })
            .collect();

        Ok(Some(RawMetadata {
            created_time: metadata.created_time,
            current_version: metadata.current_version,
            versions,
        }))
    }

    async fn login(&self, provider: &str, payload: &IamLoginPayload) -> Result<AuthSecret> {
        let info = vaultrs::auth::aws::iam_login(
            &self.client,
            provider,
            &payload.iam_http_request_method,
            &payload.iam_request_url,
            &payload.iam_request_headers,
            &payload.iam_request_body,
            Some(payload.role.as_str()),
        )
        .instrument(crate::vault_span!("login", provider, role = %payload.role))
        .await
        .map_err(|e| backend_error(format!("Login against auth/{}/login failed", provider), e))?;

        Ok(auth_secret(info))
    }

    async fn renew_self(&self, token: &SecretString, increment: Duration) -> Result<AuthSecret> {
        // renew-self acts on the client's own token
        let client = build_client(&self.settings, Some(token))?;
        let increment = format!("{}s", increment.as_secs());

        let info = vaultrs::token::renew_self(&client, Some(increment.as_str()))
            .instrument(crate::vault_span!("renew_self", "auth/token/renew-self"))
            .await
            .map_err(|e| backend_error("Token renewal failed".to_string(), e))?;

        Ok(auth_secret(info))
    }
}

/// Connects [`VaultStoreClient`]s for a configured Vault server
#[derive(Debug, Clone)]
pub struct VaultConnector {
    settings: VaultSettings,
}

impl VaultConnector {
    pub fn new(settings: VaultSettings) -> Self {
        Self { settings }
    }
}

impl StoreConnector for VaultConnector {
    fn connect(&self, token: &SecretString) -> Result<Arc<dyn StoreClient>> {
        Ok(Arc::new(VaultStoreClient::new(&self.settings, Some(token))?))
    }
}
