//! # Credential Lifecycle
//!
//! [`CredentialManager`] owns the token used against the secret store and
//! keeps it usable: before handing it out, a token close to expiry is renewed
//! (when renewable) or replaced by a fresh login.
//!
//! Freshness rules, with `now` from the injected [`Clock`]:
//!
//! - no token yet, or `now + expiration_window >= expires_at`: authenticate.
//!   An expired token is never renewed, even if renewable.
//! - `now + renewal_window >= expires_at`: renew if renewable, otherwise
//!   authenticate. A failed renewal falls back to authenticating.
//! - otherwise the current token is returned as is.
//!
//! Reads take a shared lock only. Refreshes are serialized by a single async
//! mutex, and an attempt counter lets callers that queued behind a refresh
//! reuse its outcome instead of issuing another request: the new credential
//! if it succeeded, its error if it failed.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::authenticator::Authenticator;
use crate::config::VaultSettings;
use crate::errors::{InventoryError, Result};
use crate::secrets::{AuthSecret, SecretString, StoreClient};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// An issued store token.
///
/// Never mutated: a renewal or login produces a new `Credential`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: SecretString,
    pub renewable: bool,
    pub ttl: Duration,
    /// `None` for tokens without a TTL
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Credential for a token issued at `now`. A zero TTL never expires.
    pub fn issued(secret: AuthSecret, now: DateTime<Utc>) -> Self {
        let expires_at =
            if secret.ttl.is_zero() { None } else { now.checked_add_signed(to_chrono(secret.ttl)) };

        Self { token: secret.token, renewable: secret.renewable, ttl: secret.ttl, expires_at }
    }

    /// Whether the token expires within `window` of `now`
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.expires_at.is_some_and(|expires_at| {
            now.checked_add_signed(to_chrono(window)).map_or(true, |limit| limit >= expires_at)
        })
    }

    /// Time left before expiry; `None` for non-expiring tokens
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at.map(|expires_at| (expires_at - now).to_std().unwrap_or(Duration::ZERO))
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Observable state of the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// No token acquired yet
    Unauthenticated,
    Active,
    /// Inside the renewal window
    Expiring,
    /// The last refresh attempt failed
    Failed,
}

impl CredentialState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialState::Unauthenticated => "unauthenticated",
            CredentialState::Active => "active",
            CredentialState::Expiring => "expiring",
            CredentialState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CredentialState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expiration and renewal margins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialWindows {
    pub expiration: Duration,
    pub renewal: Duration,
}

impl Default for CredentialWindows {
    fn default() -> Self {
        Self { expiration: Duration::from_secs(10), renewal: Duration::from_secs(300) }
    }
}

impl From<&VaultSettings> for CredentialWindows {
    fn from(settings: &VaultSettings) -> Self {
        Self { expiration: settings.expiration_window(), renewal: settings.renewal_window() }
    }
}

/// Message handed to callers that shared a failed attempt
fn failure_message(error: &InventoryError) -> String {
    match error {
        InventoryError::Auth { message } => message.clone(),
        other => other.to_string(),
    }
}

enum Refresh {
    Authenticate,
    Renew(Arc<Credential>),
}

/// Acquires, renews and hands out the store token.
pub struct CredentialManager {
    authenticator: Arc<dyn Authenticator>,
    store: Arc<dyn StoreClient>,
    windows: CredentialWindows,
    clock: Arc<dyn Clock>,
    current: RwLock<Option<Arc<Credential>>>,
    refresh_lock: Mutex<()>,
    /// Completed refresh attempts, successful or not
    attempts: AtomicU64,
    /// Error of the last attempt; cleared by a success
    last_failure: RwLock<Option<String>>,
}

impl CredentialManager {
    /// `store` is used for renewals; logins go through `authenticator`.
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        store: Arc<dyn StoreClient>,
        windows: CredentialWindows,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            authenticator,
            store,
            windows,
            clock,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            attempts: AtomicU64::new(0),
            last_failure: RwLock::new(None),
        }
    }

    /// Return a credential that is valid for longer than the expiration
    /// window, refreshing it first if needed.
    pub async fn ensure_fresh(&self) -> Result<Arc<Credential>> {
        let observed = self.attempts.load(Ordering::Acquire);

        if let Some(credential) = self.current.read().await.clone() {
            if !credential.expires_within(self.clock.now(), self.windows.renewal) {
                return Ok(credential);
            }
        }

        let _refresh = self.refresh_lock.lock().await;

        let current = self.current.read().await.clone();
        let now = self.clock.now();

        // an attempt finished while we waited for the lock: share its outcome
        if self.attempts.load(Ordering::Acquire) != observed {
            if let Some(message) = self.last_failure.read().await.clone() {
                return Err(InventoryError::auth(message));
            }
            if let Some(credential) = &current {
                if !credential.expires_within(now, self.windows.expiration) {
                    return Ok(Arc::clone(credential));
                }
            }
        }

        let refresh = match current {
            Some(credential) if !credential.expires_within(now, self.windows.expiration) => {
                if !credential.expires_within(now, self.windows.renewal) {
                    return Ok(credential);
                }

                if credential.renewable {
                    Refresh::Renew(credential)
                } else {
                    Refresh::Authenticate
                }
            }
            _ => Refresh::Authenticate,
        };

        let result = match refresh {
            Refresh::Renew(credential) => match self.renew(&credential).await {
                Ok(renewed) => Ok(renewed),
                Err(e) => {
                    warn!(error = %e, "Token renewal failed, authenticating again");
                    self.authenticate().await
                }
            },
            Refresh::Authenticate => self.authenticate().await,
        };

        // outcome is published before the attempt counts as finished
        let outcome = match result {
            Ok(credential) => {
                let credential = Arc::new(credential);
                *self.current.write().await = Some(Arc::clone(&credential));
                *self.last_failure.write().await = None;
                Ok(credential)
            }
            Err(e) => {
                *self.last_failure.write().await = Some(failure_message(&e));
                Err(e)
            }
        };
        self.attempts.fetch_add(1, Ordering::AcqRel);

        outcome
    }

    /// Current state, without triggering a refresh
    pub async fn state(&self) -> CredentialState {
        if self.last_failure.read().await.is_some() {
            return CredentialState::Failed;
        }

        match self.current.read().await.as_ref() {
            None => CredentialState::Unauthenticated,
            Some(credential) if credential.expires_within(self.clock.now(), self.windows.renewal) => {
                CredentialState::Expiring
            }
            Some(_) => CredentialState::Active,
        }
    }

    /// Login method in use, e.g. `token` or `aws`
    pub fn method(&self) -> &'static str {
        self.authenticator.method()
    }

    /// The credential currently held, if any
    pub async fn current(&self) -> Option<Arc<Credential>> {
        self.current.read().await.clone()
    }

    async fn authenticate(&self) -> Result<Credential> {
        let method = self.authenticator.method();
        debug!(method, "Authenticating against secret store");

        let result = self.authenticator.authenticate().await.and_then(|secret| {
            if secret.token.is_empty() {
                return Err(InventoryError::auth(format!(
                    "The {} auth method returned an empty token",
                    method
                )));
            }
            if !secret.ttl.is_zero() && secret.ttl <= self.windows.expiration {
                return Err(InventoryError::auth(format!(
                    "Issued token TTL of {}s does not exceed the {}s expiration window",
                    secret.ttl.as_secs(),
                    self.windows.expiration.as_secs()
                )));
            }
            Ok(Credential::issued(secret, self.clock.now()))
        });

        match &result {
            Ok(credential) => {
                metrics::counter!("vault_inventory_auth_attempts_total", "outcome" => "success")
                    .increment(1);
                info!(
                    method,
                    renewable = credential.renewable,
                    ttl_secs = credential.ttl.as_secs(),
                    "Authenticated against secret store"
                );
            }
            Err(e) => {
                metrics::counter!("vault_inventory_auth_attempts_total", "outcome" => "failure")
                    .increment(1);
                warn!(method, error = %e, "Authentication failed");
            }
        }

        result
    }

    async fn renew(&self, credential: &Credential) -> Result<Credential> {
        let result = self
            .store
            .renew_self(&credential.token, credential.ttl)
            .await
            .and_then(|mut secret| {
                if secret.token.is_empty() {
                    secret.token = credential.token.clone();
                }
                if !secret.ttl.is_zero() && secret.ttl <= self.windows.expiration {
                    return Err(InventoryError::auth("Renewed token expires too soon"));
                }
                Ok(Credential::issued(secret, self.clock.now()))
            });

        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!("vault_inventory_renewals_total", "outcome" => outcome).increment(1);

        if let Ok(renewed) = &result {
            info!(ttl_secs = renewed.ttl.as_secs(), "Renewed store token");
        }

        result
    }
}
