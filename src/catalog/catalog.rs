//! Connection Catalog for MultiDB
//!
//! This module holds the named connection definitions loaded from a
//! connection file. Lookups are pure; nothing here touches the network.

use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

use super::config::{BackendKind, ConnectionConfig};
use crate::error::{Error, Result};

/// Named connection definitions, in file order
#[derive(Debug, Clone, Default)]
pub struct ConnectionCatalog {
    connections: IndexMap<String, ConnectionConfig>,
}

impl ConnectionCatalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a connection file's JSON text
    ///
    /// Either every entry is valid and the whole catalog is returned, or
    /// nothing is.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: ConnectionFile = serde_json::from_str(json)?;

        let mut catalog = Self::new();
        for (index, entry) in file.databases.into_iter().enumerate() {
            let name = entry.name.ok_or(Error::MissingField {
                index,
                field: "name",
            })?;
            let kind = entry.kind.ok_or(Error::MissingField {
                index,
                field: "type",
            })?;
            let connection_string = entry.connection_string.ok_or(Error::MissingField {
                index,
                field: "connection_string",
            })?;

            let config =
                ConnectionConfig::new(name, BackendKind::from_tag(&kind), &connection_string)?;
            catalog.insert(config)?;
        }

        Ok(catalog)
    }

    /// Load a catalog from a connection file on disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let catalog = Self::from_json_str(&json)?;
        debug!(path = %path.display(), count = catalog.len(), "loaded connection catalog");
        Ok(catalog)
    }

    /// Load a catalog, falling back to an empty one on any error
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "error loading connections");
                Self::new()
            }
        }
    }

    /// Add a definition; names must be unique
    pub fn insert(&mut self, config: ConnectionConfig) -> Result<()> {
        if self.connections.contains_key(&config.name) {
            return Err(Error::DuplicateConnection(config.name));
        }
        self.connections.insert(config.name.clone(), config);
        Ok(())
    }

    /// Get a definition by name
    pub fn get(&self, name: &str) -> Option<&ConnectionConfig> {
        self.connections.get(name)
    }

    /// Check if a name is defined
    pub fn contains(&self, name: &str) -> bool {
        self.connections.contains_key(name)
    }

    /// All connection names in file order
    pub fn names(&self) -> Vec<String> {
        self.connections.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// On-disk shape of a connection file
#[derive(Deserialize)]
struct ConnectionFile {
    databases: Vec<ConnectionEntry>,
}

#[derive(Deserialize)]
struct ConnectionEntry {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    connection_string: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Locator;

    const SAMPLE: &str = r#"{
        "databases": [
            {"name": "local", "type": "sqlite", "connection_string": "local.db"},
            {"name": "staging", "type": "mysql", "connection_string": "app,pw,10.0.0.5,3306,shop"},
            {"name": "legacy", "type": "mssql", "connection_string": "whatever"}
        ]
    }"#;

    #[test]
    fn test_load_keeps_file_order() {
        let catalog = ConnectionCatalog::from_json_str(SAMPLE).unwrap();
        assert_eq!(catalog.names(), vec!["local", "staging", "legacy"]);

        let local = catalog.get("local").unwrap();
        assert_eq!(local.kind, BackendKind::Embedded);

        let staging = catalog.get("staging").unwrap();
        assert!(matches!(&staging.locator, Locator::Network(n) if n.port == 3306));

        let legacy = catalog.get("legacy").unwrap();
        assert_eq!(legacy.kind, BackendKind::Other("mssql".to_string()));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let json = r#"{"databases": [
            {"name": "a", "type": "sqlite", "connection_string": "a.db"},
            {"name": "a", "type": "sqlite", "connection_string": "b.db"}
        ]}"#;
        let result = ConnectionCatalog::from_json_str(json);
        assert!(matches!(result, Err(Error::DuplicateConnection(name)) if name == "a"));
    }

    #[test]
    fn test_missing_field_rejected() {
        let json = r#"{"databases": [
            {"name": "a", "type": "sqlite", "connection_string": "a.db"},
            {"name": "b", "connection_string": "b.db"}
        ]}"#;
        let result = ConnectionCatalog::from_json_str(json);
        assert!(matches!(
            result,
            Err(Error::MissingField { index: 1, field: "type" })
        ));
    }

    #[test]
    fn test_malformed_structure_rejected() {
        assert!(matches!(
            ConnectionCatalog::from_json_str(r#"{"connections": []}"#),
            Err(Error::MalformedCatalog(_))
        ));
        assert!(matches!(
            ConnectionCatalog::from_json_str("not json"),
            Err(Error::MalformedCatalog(_))
        ));
    }

    #[test]
    fn test_bad_network_locator_fails_load() {
        let json = r#"{"databases": [
            {"name": "m", "type": "mysql", "connection_string": "user,pw,host,3306"}
        ]}"#;
        assert!(matches!(
            ConnectionCatalog::from_json_str(json),
            Err(Error::InvalidLocator { .. })
        ));
    }

    #[test]
    fn test_load_or_empty_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ConnectionCatalog::load_or_empty(dir.path().join("nope.json"));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connections.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let catalog = ConnectionCatalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 3);
        assert!(catalog.contains("staging"));
    }
}
