//! # Secret Enumeration
//!
//! Per-query orchestration: make sure the credential is fresh, connect a
//! store client with it, pick the mounts to crawl, turn key filters into
//! crawl roots and hand back the crawler's stream.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::{authenticator_from_settings, CredentialManager, CredentialWindows, SystemClock};
use crate::config::{AppConfig, CrawlSettings};
use crate::errors::{InventoryError, Result};
use crate::secrets::{
    normalize_mount, CrawlStream, MountInfo, SecretMetadata, SecretPath, StoreClient,
    StoreConnector, TreeCrawler, VaultConnector, VaultStoreClient,
};

/// Restriction on secret keys within a mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match", content = "key", rename_all = "lowercase")]
pub enum KeyFilter {
    /// One secret, e.g. `app/db/password`
    Exact(String),
    /// Every secret whose key starts with the value
    Prefix(String),
}

/// What to enumerate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretQuery {
    /// Only this mount (trailing `/` optional)
    pub mount: Option<String>,
    pub key: Option<KeyFilter>,
    /// Overrides the configured worker count
    pub concurrency: Option<usize>,
}

impl SecretQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = Some(mount.into());
        self
    }

    pub fn exact(mut self, key: impl Into<String>) -> Self {
        self.key = Some(KeyFilter::Exact(key.into()));
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key = Some(KeyFilter::Prefix(prefix.into()));
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }
}

/// Runs secret queries against the store.
pub struct Enumerator {
    credentials: Arc<CredentialManager>,
    connector: Arc<dyn StoreConnector>,
    settings: CrawlSettings,
}

impl Enumerator {
    pub fn new(
        credentials: Arc<CredentialManager>,
        connector: Arc<dyn StoreConnector>,
        settings: CrawlSettings,
    ) -> Self {
        Self { credentials, connector, settings }
    }

    /// Wire up Vault clients and the configured auth method.
    ///
    /// No request is made until the first query.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let login_store: Arc<dyn StoreClient> = Arc::new(VaultStoreClient::new(&config.vault, None)?);
        let authenticator = authenticator_from_settings(&config.vault, Arc::clone(&login_store))?;

        let credentials = Arc::new(CredentialManager::new(
            authenticator,
            login_store,
            CredentialWindows::from(&config.vault),
            Arc::new(SystemClock),
        ));
        let connector = Arc::new(VaultConnector::new(config.vault.clone()));

        Ok(Self::new(credentials, connector, config.crawl.clone()))
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    /// Stream metadata for every secret matching `query`.
    ///
    /// Authentication and mount listing failures are returned here; crawl
    /// root failures arrive as an error item on the stream.
    pub async fn list_secrets(&self, query: &SecretQuery) -> Result<CrawlStream> {
        let store = self.connect().await?;

        let mounts = store.list_mounts().await.map_err(|e| {
            InventoryError::crawl_root("sys/mounts", format!("Failed to list mounts: {}", e))
        })?;

        let selected = self.select_mounts(mounts, query.mount.as_deref());
        let roots: Vec<SecretPath> = selected
            .iter()
            // a folder-shaped exact key matches no leaf in any mount
            .filter_map(|mount| match &query.key {
                None => Some(SecretPath::root(mount.as_str())),
                Some(KeyFilter::Exact(key)) => SecretPath::leaf(mount.as_str(), key),
                Some(KeyFilter::Prefix(prefix)) => {
                    Some(SecretPath::folder_for_prefix(mount.as_str(), prefix))
                }
            })
            .collect();

        let concurrency = query.concurrency.unwrap_or(self.settings.concurrency);
        info!(mounts = ?selected, roots = roots.len(), concurrency, "Enumerating secrets");

        let stream = TreeCrawler::new(store, concurrency).crawl(roots);
        Ok(match &query.key {
            Some(KeyFilter::Prefix(prefix)) => {
                stream.with_key_prefix(prefix.trim_start_matches('/'))
            }
            _ => stream,
        })
    }

    /// Metadata of a single secret, `None` if it does not exist or `key`
    /// names a folder.
    pub async fn get_secret(&self, mount: &str, key: &str) -> Result<Option<SecretMetadata>> {
        let Some(path) = SecretPath::leaf(normalize_mount(mount), key) else {
            return Ok(None);
        };
        let store = self.connect().await?;

        let raw = store.read_metadata(&path.mount, &path.key()).await?;
        Ok(raw.map(|raw| SecretMetadata::from_raw(path, raw)))
    }

    async fn connect(&self) -> Result<Arc<dyn StoreClient>> {
        let credential = self.credentials.ensure_fresh().await?;
        self.connector.connect(&credential.token)
    }

    /// Mounts of the configured engine type, narrowed to `filter` if given
    fn select_mounts(
        &self,
        mounts: HashMap<String, MountInfo>,
        filter: Option<&str>,
    ) -> Vec<String> {
        let filter = filter.map(normalize_mount);

        let mut selected: Vec<String> = mounts
            .into_iter()
            .filter(|(_, info)| info.mount_type == self.settings.engine_type)
            .filter(|(path, info)| {
                // KV v1 has no metadata endpoint
                if info.kv_version() == Some(1) {
                    debug!(mount = %path, "Skipping KV version 1 mount");
                    return false;
                }
                true
            })
            .map(|(path, _)| normalize_mount(&path))
            .filter(|path| filter.as_ref().map_or(true, |f| f == path))
            .collect();

        selected.sort();
        selected
    }
}
