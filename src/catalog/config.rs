//! Connection definitions
//!
//! A connection definition maps a human-chosen name to a backend kind and a
//! locator whose shape depends on that kind.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Backend kind of a named connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum BackendKind {
    /// Embedded file engine (SQLite)
    Embedded,
    /// Network client/server engine (MySQL)
    NetworkSql,
    /// A kind tag this build has no driver for
    Other(String),
}

impl BackendKind {
    /// Parse a kind tag from a connection file (case-insensitive)
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "sqlite" => BackendKind::Embedded,
            "mysql" => BackendKind::NetworkSql,
            _ => BackendKind::Other(tag.trim().to_string()),
        }
    }

    /// The tag used for this kind in connection files
    pub fn tag(&self) -> &str {
        match self {
            BackendKind::Embedded => "sqlite",
            BackendKind::NetworkSql => "mysql",
            BackendKind::Other(tag) => tag,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Network connection parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkLocator {
    pub user: String,
    #[serde(skip)]
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl NetworkLocator {
    /// Parse a `user,password,host,port,database` connection string
    pub fn parse(name: &str, raw: &str) -> Result<Self> {
        let fields: Vec<&str> = raw.split(',').collect();
        if fields.len() != 5 {
            return Err(Error::InvalidLocator {
                name: name.to_string(),
                reason: format!(
                    "expected 5 comma-separated fields (user,password,host,port,database), found {}",
                    fields.len()
                ),
            });
        }

        let port = fields[3].trim().parse::<u16>().map_err(|_| Error::InvalidLocator {
            name: name.to_string(),
            reason: format!("invalid port '{}'", fields[3].trim()),
        })?;

        let host = fields[2].trim();
        if host.is_empty() {
            return Err(Error::InvalidLocator {
                name: name.to_string(),
                reason: "host is empty".to_string(),
            });
        }

        Ok(Self {
            user: fields[0].trim().to_string(),
            password: fields[1].to_string(),
            host: host.to_string(),
            port,
            database: fields[4].trim().to_string(),
        })
    }
}

impl fmt::Display for NetworkLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

/// Where a connection's database lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Locator {
    /// Database file path
    File(PathBuf),
    /// Network server parameters
    Network(NetworkLocator),
    /// Unvalidated connection string for an unsupported kind
    Raw(String),
}

/// A validated connection definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub kind: BackendKind,
    pub locator: Locator,
}

impl ConnectionConfig {
    /// Build a definition, validating the locator against the kind
    pub fn new(name: impl Into<String>, kind: BackendKind, connection_string: &str) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::MalformedCatalog(
                "connection name must not be empty".to_string(),
            ));
        }

        let locator = match &kind {
            BackendKind::Embedded => {
                if connection_string.trim().is_empty() {
                    return Err(Error::InvalidLocator {
                        name,
                        reason: "database file path is empty".to_string(),
                    });
                }
                Locator::File(PathBuf::from(connection_string.trim()))
            }
            BackendKind::NetworkSql => {
                Locator::Network(NetworkLocator::parse(&name, connection_string)?)
            }
            BackendKind::Other(_) => Locator::Raw(connection_string.to_string()),
        };

        Ok(Self { name, kind, locator })
    }

    /// Shorthand for an embedded-file connection
    pub fn sqlite(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind: BackendKind::Embedded,
            locator: Locator::File(path.into()),
        }
    }
}
