//! # Configuration Management
//!
//! Connection, authentication, crawl and logging settings for the inventory.

pub mod settings;

pub use settings::{
    AppConfig, AuthType, CrawlSettings, ObservabilitySettings, VaultSettings, ENV_PREFIX,
};
