//! # Vault Inventory
//!
//! Read-only enumeration of secrets stored in a tree-structured secret store
//! (HashiCorp Vault, KV v2 engine).
//!
//! ## Architecture
//!
//! ```text
//! CLI → Enumerator → CredentialManager → Authenticator (token | AWS IAM)
//!            ↓
//!       TreeCrawler → StoreClient (vaultrs)
//! ```
//!
//! ## Core Components
//!
//! - **TreeCrawler**: discovers every leaf below a set of roots with a pool
//!   of workers and streams their metadata as it is found
//! - **CredentialManager**: keeps the store token fresh, renewing it or
//!   logging in again before it expires
//! - **Enumerator**: selects mounts, turns key filters into crawl roots and
//!   drives the crawler per query
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use vault_inventory::{AppConfig, Enumerator, Result, SecretQuery};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(None)?;
//!     config.validate()?;
//!
//!     let enumerator = Enumerator::from_config(&config)?;
//!     let mut secrets = enumerator.list_secrets(&SecretQuery::all().mount("secret/")).await?;
//!     while let Some(secret) = secrets.next().await {
//!         println!("{}", secret?.key());
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod config;
pub mod enumerator;
pub mod errors;
pub mod observability;
pub mod secrets;

// Re-export commonly used types and traits
pub use auth::{CredentialManager, CredentialState};
pub use config::AppConfig;
pub use enumerator::{Enumerator, KeyFilter, SecretQuery};
pub use errors::{InventoryError, Result};
pub use secrets::{CrawlStream, SecretMetadata, SecretPath, StoreClient, TreeCrawler};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
