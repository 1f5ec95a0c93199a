//! Backend drivers
//!
//! One variant per supported backend kind. Every variant offers the same
//! capability set: open, fetch, execute, begin, commit, rollback, close.

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Column, ColumnIndex, ConnectOptions, Connection, Decode, Executor, TypeInfo, ValueRef};
use tracing::debug;

use super::value::{Row, Value};
use crate::catalog::{BackendKind, ConnectionConfig, Locator};
use crate::error::{Error, Result};

/// A live driver connection
#[derive(Debug)]
pub enum Driver {
    /// Embedded file engine
    Sqlite(SqliteConnection),
    /// Network client/server engine
    MySql(MySqlConnection),
}

impl Driver {
    /// Open a connection for a catalog entry, selected by its kind
    pub async fn open(config: &ConnectionConfig) -> Result<Self> {
        let driver_error = |source: sqlx::Error| Error::DriverError {
            name: config.name.clone(),
            source,
        };

        match (&config.kind, &config.locator) {
            (BackendKind::Embedded, Locator::File(path)) => {
                debug!(name = %config.name, path = %path.display(), "opening sqlite database");
                let conn = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .connect()
                    .await
                    .map_err(driver_error)?;
                Ok(Driver::Sqlite(conn))
            }
            (BackendKind::NetworkSql, Locator::Network(net)) => {
                debug!(name = %config.name, server = %net, "opening mysql connection");
                let conn = MySqlConnectOptions::new()
                    .host(&net.host)
                    .port(net.port)
                    .username(&net.user)
                    .password(&net.password)
                    .database(&net.database)
                    .connect()
                    .await
                    .map_err(driver_error)?;
                Ok(Driver::MySql(conn))
            }
            (BackendKind::Other(kind), _) => Err(Error::UnsupportedKind {
                name: config.name.clone(),
                kind: kind.clone(),
            }),
            (kind, _) => Err(Error::Internal(format!(
                "connection '{}' has a locator that does not match kind '{}'",
                config.name, kind
            ))),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Driver::Sqlite(_) => BackendKind::Embedded,
            Driver::MySql(_) => BackendKind::NetworkSql,
        }
    }

    /// Run a statement and fetch every row it produces
    pub async fn fetch(&mut self, sql: &str) -> Result<Vec<Row>> {
        let rows: Vec<Row> = match self {
            Driver::Sqlite(conn) => conn.fetch_all(sql).await?.iter().map(decode_row).collect(),
            Driver::MySql(conn) => conn.fetch_all(sql).await?.iter().map(decode_row).collect(),
        };
        Ok(rows)
    }

    /// Run a statement without fetching; returns the affected row count
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        let affected = match self {
            Driver::Sqlite(conn) => conn.execute(sql).await?.rows_affected(),
            Driver::MySql(conn) => conn.execute(sql).await?.rows_affected(),
        };
        Ok(affected)
    }

    /// Commit whatever the last statement left open
    ///
    /// SQLite rejects `COMMIT` in autocommit mode; the statement has already
    /// been applied then, so that rejection is not an error.
    pub async fn commit(&mut self) -> Result<()> {
        self.end_transaction("COMMIT").await
    }

    pub async fn rollback(&mut self) -> Result<()> {
        self.end_transaction("ROLLBACK").await
    }

    async fn end_transaction(&mut self, sql: &str) -> Result<()> {
        match self.execute(sql).await {
            Ok(_) => Ok(()),
            Err(Error::Driver(sqlx::Error::Database(e))) if is_no_transaction(e.message()) => {
                debug!(statement = sql, "no transaction active");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Gracefully close the underlying connection
    pub async fn close(self) -> Result<()> {
        match self {
            Driver::Sqlite(conn) => conn.close().await?,
            Driver::MySql(conn) => conn.close().await?,
        }
        Ok(())
    }

    /// List user table names
    pub async fn table_names(&mut self) -> Result<Vec<String>> {
        let sql = match self {
            Driver::Sqlite(_) => {
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
            }
            Driver::MySql(_) => "SHOW TABLES",
        };

        let names = self
            .fetch(sql)
            .await?
            .into_iter()
            .filter_map(|row| match row.get_index(0)? {
                Value::Blob(bytes) => String::from_utf8(bytes.clone()).ok(),
                value => value.as_str().map(str::to_string),
            })
            .collect();
        Ok(names)
    }
}

/// Decode a driver row into a backend-neutral row
fn decode_row<R>(row: &R) -> Row
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    for<'r> i64: Decode<'r, R::Database>,
    for<'r> f64: Decode<'r, R::Database>,
    for<'r> String: Decode<'r, R::Database>,
    for<'r> Vec<u8>: Decode<'r, R::Database>,
{
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..columns.len()).map(|i| decode_value(row, i)).collect();
    Row::new(columns, values)
}

fn decode_value<R>(row: &R, index: usize) -> Value
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    for<'r> i64: Decode<'r, R::Database>,
    for<'r> f64: Decode<'r, R::Database>,
    for<'r> String: Decode<'r, R::Database>,
    for<'r> Vec<u8>: Decode<'r, R::Database>,
{
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_ascii_uppercase(),
        Err(_) => return Value::Null,
    };

    match value_class(&type_name) {
        ValueClass::Integer => {
            if let Ok(v) = row.try_get_unchecked::<i64, _>(index) {
                return Value::Integer(v);
            }
        }
        ValueClass::Real => {
            if let Ok(v) = row.try_get_unchecked::<f64, _>(index) {
                return Value::Real(v);
            }
        }
        ValueClass::Blob => {
            if let Ok(v) = row.try_get_unchecked::<Vec<u8>, _>(index) {
                return Value::Blob(v);
            }
        }
        ValueClass::Text => {}
    }

    // Anything else (dates, decimals, out-of-range unsigned) renders as text
    match row.try_get_unchecked::<String, _>(index) {
        Ok(s) => Value::Text(s),
        Err(_) => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(Value::Blob)
            .unwrap_or(Value::Null),
    }
}

fn is_no_transaction(message: &str) -> bool {
    message.contains("no transaction is active")
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ValueClass {
    Integer,
    Real,
    Text,
    Blob,
}

/// Classify a driver type name
fn value_class(type_name: &str) -> ValueClass {
    if type_name.contains("BLOB") || type_name.contains("BINARY") || type_name == "BIT" {
        ValueClass::Blob
    } else if type_name.contains("INT") && !type_name.contains("POINT") {
        ValueClass::Integer
    } else if type_name.starts_with("BOOL") {
        ValueClass::Integer
    } else if type_name.contains("REAL") || type_name.contains("FLOAT") || type_name.contains("DOUBLE")
    {
        ValueClass::Real
    } else {
        ValueClass::Text
    }
}
