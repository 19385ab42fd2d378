//! # Structured Logging
//!
//! Subscriber setup and span macros for the inventory, built on the tracing
//! ecosystem. Token values never reach a log line: credentials are carried as
//! [`SecretString`](crate::secrets::SecretString), which redacts itself.

use crate::config::ObservabilitySettings;
use tracing_subscriber::EnvFilter;

/// Create a tracing span for one crawl.
///
/// ```rust,ignore
/// let span = crawl_span!(roots.len(), concurrency = 4);
/// ```
#[macro_export]
macro_rules! crawl_span {
    ($roots:expr) => {
        tracing::info_span!(
            "crawl",
            roots = $roots,
            crawl_id = %uuid::Uuid::new_v4()
        )
    };
    ($roots:expr, $($field:tt)*) => {
        tracing::info_span!(
            "crawl",
            roots = $roots,
            crawl_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for a call against the secret store
#[macro_export]
macro_rules! vault_span {
    ($operation:expr, $path:expr) => {
        tracing::debug_span!(
            "vault_operation",
            operation = %$operation,
            path = %$path
        )
    };
    ($operation:expr, $path:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "vault_operation",
            operation = %$operation,
            path = %$path,
            $($field)*
        )
    };
}

/// Install the global fmt subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice
/// (e.g. from integration tests) keeps the first subscriber.
pub fn init_logging(config: &ObservabilitySettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let result = if config.json_logging {
        tracing::subscriber::set_global_default(
            tracing_subscriber::fmt().json().with_env_filter(filter).finish(),
        )
    } else {
        tracing::subscriber::set_global_default(
            tracing_subscriber::fmt().with_env_filter(filter).with_target(false).finish(),
        )
    };

    // already set elsewhere
    let _ = result;
}

/// Log the effective configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        address = %config.vault.address,
        auth_type = %config.vault.auth_type,
        namespace = ?config.vault.namespace,
        timeout_secs = config.vault.timeout_seconds,
        concurrency = config.crawl.concurrency,
        engine_type = %config.crawl.engine_type,
        "Vault inventory configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = crawl_span!(3);
        let _span = crawl_span!(1, concurrency = 4);
        let _span = vault_span!("list", "secret/app/");
        let _span = vault_span!("read_metadata", "secret/app/db", mount = "secret/");
    }

    #[test]
    fn test_init_logging_twice() {
        let config = ObservabilitySettings::default();
        init_logging(&config);
        init_logging(&config);
    }

    #[test]
    fn test_log_config_info() {
        let config = crate::config::AppConfig::default();

        // This should not panic
        log_config_info(&config);
    }
}
