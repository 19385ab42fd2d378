//! # Error Handling
//!
//! Error types for the secret inventory, defined with `thiserror`.

pub mod types;

pub use types::{InventoryError, Result};
