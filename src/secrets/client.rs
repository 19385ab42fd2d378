//! Store client abstraction.
//!
//! The crawler and the credential manager only talk to the secret store
//! through [`StoreClient`]. The production implementation lives in
//! [`super::vault`]; tests use an in-memory tree.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::metadata::RawMetadata;
use super::types::SecretString;
use crate::errors::Result;

/// One entry of the store's mount table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountInfo {
    /// Engine type, e.g. `kv`
    pub mount_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl MountInfo {
    pub fn new(mount_type: impl Into<String>) -> Self {
        Self { mount_type: mount_type.into(), ..Default::default() }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// KV engine version from the mount options, if reported
    pub fn kv_version(&self) -> Option<u32> {
        self.options.get("version").and_then(|v| v.parse().ok())
    }
}

/// Token issued by a login or a renewal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSecret {
    pub token: SecretString,
    pub renewable: bool,
    /// Lease duration; zero for tokens that never expire
    pub ttl: Duration,
}

/// Body of an `auth/<provider>/login` request for the aws IAM method.
///
/// URL, headers and body are base64 encoded, as the auth method expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamLoginPayload {
    pub iam_http_request_method: String,
    pub iam_request_url: String,
    pub iam_request_headers: String,
    pub iam_request_body: String,
    pub role: String,
}

/// Read-only operations against a tree-structured secret store.
///
/// Implementations must be cheap to share across crawl workers.
///
/// # Contract
///
/// - `list` of a folder that does not exist returns an empty list
/// - `read_metadata` of a key that does not exist returns `None`
/// - child names ending in `/` are folders, all others are leaves
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Mount table, keyed by mount path with its trailing `/`
    async fn list_mounts(&self) -> Result<HashMap<String, MountInfo>>;

    /// Names of the direct children of `folder` (empty for the mount root)
    async fn list(&self, mount: &str, folder: &str) -> Result<Vec<String>>;

    /// Metadata document of the leaf at `key`
    async fn read_metadata(&self, mount: &str, key: &str) -> Result<Option<RawMetadata>>;

    /// Exchange a signed identity assertion for a token
    async fn login(&self, provider: &str, payload: &IamLoginPayload) -> Result<AuthSecret>;

    /// Renew `token`, asking for `increment` more lifetime
    async fn renew_self(&self, token: &SecretString, increment: Duration) -> Result<AuthSecret>;
}

/// Builds store clients bound to a token.
pub trait StoreConnector: Send + Sync {
    fn connect(&self, token: &SecretString) -> Result<Arc<dyn StoreClient>>;
}
