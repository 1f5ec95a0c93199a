//! Catalog module
//!
//! This module contains the connection catalog and connection definitions.

pub mod catalog;
pub mod config;

pub use catalog::ConnectionCatalog;
pub use config::{BackendKind, ConnectionConfig, Locator, NetworkLocator};
