//! Common test utilities for all integration tests.
//!
//! Provides an in-memory secret store, a connector and authenticator around
//! it, and a manually driven clock.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

pub mod store;

pub use store::{leaf_metadata, ManualClock, MockAuthenticator, MockConnector, MockStore};
