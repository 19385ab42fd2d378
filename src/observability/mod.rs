//! # Observability
//!
//! Structured logging for the inventory. Crawl and credential counters are
//! emitted through the `metrics` facade; installing an exporter is left to the
//! embedding process.

pub mod logging;

pub use logging::{init_logging, log_config_info};
