//! # Error Types
//!
//! Error taxonomy for secret inventory operations using `thiserror`.
//!
//! Fatal errors (configuration, authentication, crawl roots) abort the whole
//! operation and are returned to the caller. Node-level errors are produced
//! inside the crawler, logged, and swallowed with the node omitted.

/// Custom result type for inventory operations
pub type Result<T> = std::result::Result<T, InventoryError>;

/// Main error type for the secret inventory
#[derive(thiserror::Error, Debug)]
pub enum InventoryError {
    /// Missing or invalid configuration (address, credentials, auth type)
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Authentication with the secret store failed
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Listing mounts or expanding a requested root failed
    #[error("Crawl of '{mount}' failed: {message}")]
    CrawlRoot { mount: String, message: String },

    /// Listing or reading a node discovered mid-crawl failed
    #[error("Failed to resolve '{path}': {message}")]
    CrawlNode { path: String, message: String },

    /// Transport or API error returned by the secret store
    #[error("Backend error: {message}")]
    Backend { message: String, status: Option<u16> },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl InventoryError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create an authentication error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth { message: message.into() }
    }

    /// Create a crawl root error
    pub fn crawl_root<M: Into<String>, S: Into<String>>(mount: M, message: S) -> Self {
        Self::CrawlRoot { mount: mount.into(), message: message.into() }
    }

    /// Create a crawl node error
    pub fn crawl_node<P: Into<String>, S: Into<String>>(path: P, message: S) -> Self {
        Self::CrawlNode { path: path.into(), message: message.into() }
    }

    /// Create a backend error
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend { message: message.into(), status: None }
    }

    /// Create a backend error carrying the HTTP status returned by the store
    pub fn backend_status<S: Into<String>>(message: S, status: u16) -> Self {
        Self::Backend { message: message.into(), status: Some(status) }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether the store reported the requested path as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, InventoryError::Backend { status: Some(404), .. })
    }
}

impl From<config::ConfigError> for InventoryError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for InventoryError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages = Vec::new();
        collect_validation_messages(&errors, "", &mut messages);
        messages.sort();

        Self::config(format!("Validation failed: {}", messages.join("; ")))
    }
}

/// Flatten nested validation errors into `section.field: message` entries
fn collect_validation_messages(
    errors: &validator::ValidationErrors,
    prefix: &str,
    out: &mut Vec<String>,
) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() { field.to_string() } else { format!("{}.{}", prefix, field) };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                out.push(format!("{}: {}", path, messages.join(", ")));
            }
            ValidationErrorsKind::Struct(nested) => collect_validation_messages(nested, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_validation_messages(nested, &format!("{}[{}]", path, index), out);
                }
            }
        }
    }
}
