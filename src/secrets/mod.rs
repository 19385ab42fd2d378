//! # Secret Store Access
//!
//! Read-only access to a tree-structured secret store and the concurrent
//! crawler that enumerates it.
//!
//! - [`StoreClient`]: list mounts, list folder children, read leaf metadata,
//!   log in and renew tokens
//! - [`VaultStoreClient`]: the HashiCorp Vault (KV v2) implementation
//! - [`TreeCrawler`]: discovers every leaf below a set of roots and streams
//!   [`SecretMetadata`] through a [`CrawlStream`]
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use vault_inventory::secrets::{SecretPath, TreeCrawler};
//!
//! let crawler = TreeCrawler::new(store, 4);
//! let mut stream = crawler.crawl(vec![SecretPath::root("secret/")]);
//! while let Some(record) = stream.next().await {
//!     println!("{}", record?.key());
//! }
//! ```
//!
//! Secret values are never read, only their metadata.

pub mod client;
pub mod crawler;
pub mod metadata;
pub mod path;
pub mod types;
pub mod vault;

pub use client::{AuthSecret, IamLoginPayload, MountInfo, StoreClient, StoreConnector};
pub use crawler::{CrawlStats, CrawlStream, TreeCrawler};
pub use metadata::{RawMetadata, RawVersion, SecretMetadata};
pub use path::{normalize_mount, NodeKind, SecretPath};
pub use types::SecretString;
pub use vault::{VaultConnector, VaultStoreClient};
