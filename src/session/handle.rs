//! Database handles
//!
//! A handle is one live connection created from a named connection. The
//! driver sits behind an async mutex so at most one statement is in flight
//! per handle, and closing waits for that statement to finish.

use serde::Serialize;
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::driver::Driver;
use crate::broadcast::{OutcomeKind, Statement, StatementKind};
use crate::catalog::{BackendKind, ConnectionConfig};
use crate::error::{Error, Result};

/// Transaction state of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionState {
    /// No open transaction
    Idle,
    /// A write has been sent but not yet committed
    Uncommitted,
}

struct HandleInner {
    /// `None` once the handle has been closed
    driver: Option<Driver>,
    state: TransactionState,
}

/// One live, resource-holding connection
pub struct DatabaseHandle {
    id: u64,
    name: String,
    kind: BackendKind,
    inner: Mutex<HandleInner>,
}

impl DatabaseHandle {
    /// Open a new handle for a catalog entry
    pub async fn open(id: u64, config: &ConnectionConfig) -> Result<Self> {
        let driver = Driver::open(config).await?;
        Ok(Self {
            id,
            name: config.name.clone(),
            kind: config.kind.clone(),
            inner: Mutex::new(HandleInner {
                driver: Some(driver),
                state: TransactionState::Idle,
            }),
        })
    }

    /// Process-unique id, distinguishes handles that share a name
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &BackendKind {
        &self.kind
    }

    pub async fn transaction_state(&self) -> TransactionState {
        self.inner.lock().await.state
    }

    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.driver.is_some()
    }

    /// Execute one statement with read or write semantics
    ///
    /// Reads fetch every row. Writes are executed as typed and then
    /// committed; a failure is rolled back. Errors never escape: they become
    /// `OutcomeKind::Failed`.
    pub async fn run(&self, statement: &Statement) -> OutcomeKind {
        let mut inner = self.inner.lock().await;

        let result = match statement.kind() {
            StatementKind::Read => self.run_read(&mut inner, statement.as_str()).await,
            StatementKind::Write => self
                .run_write(&mut inner, statement.as_str())
                .await
                .map(|_| OutcomeKind::Committed),
        };

        result.unwrap_or_else(|e| {
            debug!(handle = %self, error = %e, "statement failed");
            OutcomeKind::Failed(e.to_string())
        })
    }

    async fn run_read(&self, inner: &mut HandleInner, sql: &str) -> Result<OutcomeKind> {
        let driver = self.driver(inner)?;
        let rows = driver.fetch(sql).await?;
        if rows.is_empty() {
            Ok(OutcomeKind::NoRowsReturned)
        } else {
            Ok(OutcomeKind::RowsReturned(rows))
        }
    }

    async fn run_write(&self, inner: &mut HandleInner, sql: &str) -> Result<()> {
        let driver = inner
            .driver
            .as_mut()
            .ok_or_else(|| Error::ConnectionClosed(self.name.clone()))?;

        // The statement is sent as typed; any transaction it opens is
        // committed below
        inner.state = TransactionState::Uncommitted;

        let result = match driver.execute(sql).await {
            Ok(_) => driver.commit().await,
            Err(e) => Err(e),
        };

        if result.is_err() {
            // Leave the handle usable for the next statement
            if let Err(e) = driver.rollback().await {
                debug!(handle = %self, error = %e, "rollback after failure did not apply");
            }
        }
        inner.state = TransactionState::Idle;

        result
    }

    fn driver<'a>(&self, inner: &'a mut HandleInner) -> Result<&'a mut Driver> {
        inner
            .driver
            .as_mut()
            .ok_or_else(|| Error::ConnectionClosed(self.name.clone()))
    }

    /// List the user tables visible through this handle
    pub async fn table_names(&self) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().await;
        self.driver(&mut inner)?.table_names().await
    }

    /// Release the driver resource
    ///
    /// Waits for any statement in flight on this handle. Closing an
    /// already closed handle is a no-op.
    pub async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Some(driver) = inner.driver.take() else {
            return Ok(());
        };

        if inner.state == TransactionState::Uncommitted {
            warn!(handle = %self, "closing with an uncommitted transaction");
        }
        inner.state = TransactionState::Idle;

        driver.close().await
    }
}

impl fmt::Display for DatabaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

impl fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Value;

    async fn open_temp(dir: &tempfile::TempDir) -> DatabaseHandle {
        let config = ConnectionConfig::sqlite("local", dir.path().join("local.db"));
        DatabaseHandle::open(1, &config).await.unwrap()
    }

    #[tokio::test]
    async fn test_write_commits_and_returns_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let handle = open_temp(&dir).await;

        let outcome = handle.run(&Statement::new("CREATE TABLE t(x INT)")).await;
        assert_eq!(outcome, OutcomeKind::Committed);
        assert_eq!(handle.transaction_state().await, TransactionState::Idle);

        let outcome = handle.run(&Statement::new("SELECT * FROM t")).await;
        assert_eq!(outcome, OutcomeKind::NoRowsReturned);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_handle_usable() {
        let dir = tempfile::tempdir().unwrap();
        let handle = open_temp(&dir).await;

        let outcome = handle.run(&Statement::new("INSERT INTO missing VALUES (1)")).await;
        match outcome {
            OutcomeKind::Failed(msg) => assert!(msg.contains("no such table")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(handle.transaction_state().await, TransactionState::Idle);

        let outcome = handle.run(&Statement::new("CREATE TABLE missing(x INT)")).await;
        assert_eq!(outcome, OutcomeKind::Committed);
    }

    #[tokio::test]
    async fn test_statements_that_refuse_a_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let handle = open_temp(&dir).await;

        assert_eq!(handle.run(&Statement::new("CREATE TABLE t(x INT)")).await, OutcomeKind::Committed);
        assert_eq!(handle.run(&Statement::new("VACUUM")).await, OutcomeKind::Committed);
        assert_eq!(
            handle.run(&Statement::new("PRAGMA journal_mode = WAL")).await,
            OutcomeKind::Committed
        );
        assert_eq!(
            handle.run(&Statement::new("PRAGMA foreign_keys = OFF")).await,
            OutcomeKind::Committed
        );

        let outcome = handle
            .run(&Statement::new("SELECT foreign_keys FROM pragma_foreign_keys"))
            .await;
        assert_eq!(outcome.rows()[0].get_index(0), Some(&Value::Integer(0)));
        assert_eq!(handle.transaction_state().await, TransactionState::Idle);
    }

    #[tokio::test]
    async fn test_explicit_transaction_is_committed() {
        let dir = tempfile::tempdir().unwrap();
        let handle = open_temp(&dir).await;

        handle.run(&Statement::new("CREATE TABLE t(x INT)")).await;
        assert_eq!(handle.run(&Statement::new("BEGIN")).await, OutcomeKind::Committed);
        assert_eq!(
            handle.run(&Statement::new("INSERT INTO t VALUES (1)")).await,
            OutcomeKind::Committed
        );

        let outcome = handle.run(&Statement::new("SELECT x FROM t")).await;
        assert_eq!(outcome.rows()[0].get("x"), Some(&Value::Integer(1)));
    }

    #[tokio::test]
    async fn test_deferred_constraint_failure_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let handle = open_temp(&dir).await;

        handle.run(&Statement::new("CREATE TABLE p(id INTEGER PRIMARY KEY)")).await;
        handle
            .run(&Statement::new(
                "CREATE TABLE c(pid INT REFERENCES p(id) DEFERRABLE INITIALLY DEFERRED)",
            ))
            .await;

        let outcome = handle.run(&Statement::new("INSERT INTO c VALUES (99)")).await;
        assert!(
            matches!(&outcome, OutcomeKind::Failed(msg) if msg.contains("FOREIGN KEY constraint failed")),
            "unexpected outcome {:?}",
            outcome
        );
        assert_eq!(handle.transaction_state().await, TransactionState::Idle);

        let outcome = handle.run(&Statement::new("SELECT count(*) FROM c")).await;
        assert_eq!(outcome.rows()[0].get_index(0).and_then(Value::as_i64), Some(0));

        let outcome = handle.run(&Statement::new("INSERT INTO p VALUES (99)")).await;
        assert_eq!(outcome, OutcomeKind::Committed);
    }

    #[tokio::test]
    async fn test_close_waits_for_running_statement() {
        let dir = tempfile::tempdir().unwrap();
        let handle = std::sync::Arc::new(open_temp(&dir).await);

        let running = {
            let handle = handle.clone();
            tokio::spawn(async move {
                handle
                    .run(&Statement::new(
                        "SELECT count(*) FROM (WITH RECURSIVE n(x) AS \
                         (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 1000000) SELECT x FROM n)",
                    ))
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        handle.close().await.unwrap();
        assert!(running.is_finished());
        assert!(!handle.is_open().await);

        let outcome = running.await.unwrap();
        assert_eq!(outcome.rows()[0].get_index(0).and_then(Value::as_i64), Some(1_000_000));
    }

    #[tokio::test]
    async fn test_closed_handle_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let handle = open_temp(&dir).await;

        handle.close().await.unwrap();
        assert!(!handle.is_open().await);
        handle.close().await.unwrap();

        let outcome = handle.run(&Statement::new("SELECT 1")).await;
        assert!(matches!(outcome, OutcomeKind::Failed(msg) if msg.contains("closed")));
    }

    #[test]
    fn test_display() {
        let handle = DatabaseHandle {
            id: 4,
            name: "prod".to_string(),
            kind: BackendKind::NetworkSql,
            inner: Mutex::new(HandleInner {
                driver: None,
                state: TransactionState::Idle,
            }),
        };
        assert_eq!(handle.to_string(), "prod#4");
    }
}
