//! In-memory secret store used by the integration tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vault_inventory::auth::{Authenticator, Clock};
use vault_inventory::secrets::{
    AuthSecret, IamLoginPayload, MountInfo, RawMetadata, RawVersion, SecretString, StoreClient,
    StoreConnector,
};
use vault_inventory::{InventoryError, Result};

/// Metadata document for a leaf at `version`
pub fn leaf_metadata(version: u64, destroyed: bool, deletion_time: Option<&str>) -> RawMetadata {
    let mut versions = HashMap::new();
    versions.insert(
        version.to_string(),
        RawVersion {
            deletion_time: deletion_time.unwrap_or_default().to_string(),
            destroyed,
        },
    );

    RawMetadata {
        created_time: "2024-03-01T10:00:00.000000Z".to_string(),
        current_version: version,
        versions,
    }
}

type NodeKey = (String, String);

/// Tree-shaped store. Folders are created implicitly when a secret is added.
#[derive(Default)]
pub struct MockStore {
    mounts: HashMap<String, MountInfo>,
    folders: HashMap<NodeKey, Vec<String>>,
    leaves: HashMap<NodeKey, RawMetadata>,
    failing_lists: HashSet<NodeKey>,
    failing_reads: HashSet<NodeKey>,
    panicking_reads: HashSet<NodeKey>,
    fail_mounts: bool,
    latency: Option<Duration>,

    pub list_calls: AtomicUsize,
    pub read_calls: AtomicUsize,
    pub renew_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub renew_fails: AtomicBool,
    pub renew_ttl: AtomicU64,
}

impl MockStore {
    pub fn new() -> Self {
        Self { renew_ttl: AtomicU64::new(3600), ..Default::default() }
    }

    /// Add a KV v2 mount
    pub fn kv2_mount(self, mount: &str) -> Self {
        self.mount(mount, MountInfo::new("kv").with_option("version", "2"))
    }

    pub fn mount(mut self, mount: &str, info: MountInfo) -> Self {
        self.mounts.insert(mount.to_string(), info);
        self
    }

    /// Add a leaf at `key`, creating every folder on the way
    pub fn secret(mut self, mount: &str, key: &str, metadata: RawMetadata) -> Self {
        let mut folder = String::new();
        let mut segments = key.split('/').peekable();

        while let Some(segment) = segments.next() {
            let child =
                if segments.peek().is_some() { format!("{}/", segment) } else { segment.to_string() };

            let children = self.folders.entry((mount.to_string(), folder.clone())).or_default();
            if !children.contains(&child) {
                children.push(child.clone());
            }

            if child.ends_with('/') {
                folder.push_str(&child);
                self.folders.entry((mount.to_string(), folder.clone())).or_default();
            }
        }

        self.leaves.insert((mount.to_string(), key.to_string()), metadata);
        self
    }

    /// List a folder as returning children whose metadata no longer exists
    pub fn dangling(mut self, mount: &str, folder: &str, name: &str) -> Self {
        self.folders.entry((mount.to_string(), folder.to_string())).or_default().push(name.to_string());
        self
    }

    pub fn failing_list(mut self, mount: &str, folder: &str) -> Self {
        self.failing_lists.insert((mount.to_string(), folder.to_string()));
        self
    }

    pub fn failing_read(mut self, mount: &str, key: &str) -> Self {
        self.failing_reads.insert((mount.to_string(), key.to_string()));
        self
    }

    /// Reading `key` panics inside the store call
    pub fn panicking_read(mut self, mount: &str, key: &str) -> Self {
        self.panicking_reads.insert((mount.to_string(), key.to_string()));
        self
    }

    pub fn failing_mounts(mut self) -> Self {
        self.fail_mounts = true;
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl StoreClient for MockStore {
    async fn list_mounts(&self) -> Result<HashMap<String, MountInfo>> {
        if self.fail_mounts {
            return Err(InventoryError::backend_status("permission denied", 403));
        }
        Ok(self.mounts.clone())
    }

    async fn list(&self, mount: &str, folder: &str) -> Result<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        let key = (mount.to_string(), folder.to_string());
        if self.failing_lists.contains(&key) {
            return Err(InventoryError::backend_status("permission denied", 403));
        }
        Ok(self.folders.get(&key).cloned().unwrap_or_default())
    }

    async fn read_metadata(&self, mount: &str, key: &str) -> Result<Option<RawMetadata>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        let key = (mount.to_string(), key.to_string());
        if self.failing_reads.contains(&key) {
            return Err(InventoryError::backend("connection reset by peer"));
        }
        if self.panicking_reads.contains(&key) {
            panic!("metadata decoder crashed on {}{}", key.0, key.1);
        }
        Ok(self.leaves.get(&key).cloned())
    }

    async fn login(&self, _provider: &str, payload: &IamLoginPayload) -> Result<AuthSecret> {
        let n = self.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AuthSecret {
            token: SecretString::new(format!("s.{}-{}", payload.role, n)),
            renewable: true,
            ttl: Duration::from_secs(3600),
        })
    }

    async fn renew_self(&self, token: &SecretString, _increment: Duration) -> Result<AuthSecret> {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        if self.renew_fails.load(Ordering::SeqCst) {
            return Err(InventoryError::backend_status("token not renewable", 400));
        }
        Ok(AuthSecret {
            token: token.clone(),
            renewable: true,
            ttl: Duration::from_secs(self.renew_ttl.load(Ordering::SeqCst)),
        })
    }
}

/// Hands out the shared store and remembers which tokens connected
pub struct MockConnector {
    store: Arc<MockStore>,
    pub tokens: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(store: Arc<MockStore>) -> Self {
        Self { store, tokens: Mutex::new(Vec::new()) }
    }
}

impl StoreConnector for MockConnector {
    fn connect(&self, token: &SecretString) -> Result<Arc<dyn StoreClient>> {
        self.tokens.lock().unwrap().push(token.expose_secret().to_string());
        Ok(self.store.clone())
    }
}

/// Issues numbered tokens with a fixed TTL
pub struct MockAuthenticator {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    ttl: Duration,
    renewable: bool,
    latency: Option<Duration>,
}

impl MockAuthenticator {
    pub fn new(ttl: Duration, renewable: bool) -> Self {
        Self { calls: AtomicUsize::new(0), fail: AtomicBool::new(false), ttl, renewable, latency: None }
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for MockAuthenticator {
    async fn authenticate(&self) -> Result<AuthSecret> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(InventoryError::auth("login rejected"));
        }
        Ok(AuthSecret {
            token: SecretString::new(format!("s.login-{}", n)),
            renewable: self.renewable,
            ttl: self.ttl,
        })
    }

    fn method(&self) -> &'static str {
        "mock"
    }
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
