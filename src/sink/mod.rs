//! Result sinks
//!
//! Consumers of result batches: console echo and append-to-file logging.
//! The text rendering is stable; log files written by earlier runs and by
//! this one line up.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::broadcast::{OutcomeKind, ResultBatch, StatementOutcome};
use crate::error::{Error, Result};

/// Default file for logged batches
pub const DEFAULT_OUTPUT_FILE: &str = "query_output.txt";

const HEADER_RULE: &str = "-------------------------------------------------------";

/// Output format for rendered batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Consumer of result batches
pub trait ResultSink {
    fn deliver(&mut self, batch: &ResultBatch) -> Result<()>;
}

/// Render the header and detail lines of one outcome
pub fn render_outcome(batch: &ResultBatch, outcome: &StatementOutcome) -> String {
    let index = outcome.statement_index;
    let statement = batch.statement(index).map(|s| s.as_str()).unwrap_or("");

    let mut output = format!(
        "Connection: {}, query {}: {} {}\n",
        outcome.connection, index, statement, HEADER_RULE
    );

    match &outcome.kind {
        OutcomeKind::RowsReturned(rows) => {
            for row in rows {
                output.push_str(&format!("{}\n", row));
            }
        }
        OutcomeKind::NoRowsReturned => {
            output.push_str(&format!(
                "Query {} executed successfully, no rows returned.\n",
                index
            ));
        }
        OutcomeKind::Committed => {
            output.push_str(&format!("Query {} executed successfully.\n", index));
        }
        OutcomeKind::Failed(message) => {
            output.push_str(&format!(
                "Error executing query {} on {}: {}\n",
                index, outcome.connection, message
            ));
        }
    }

    output
}

/// Render a whole batch as text
pub fn render_batch(batch: &ResultBatch) -> String {
    batch
        .outcomes()
        .iter()
        .map(|outcome| render_outcome(batch, outcome))
        .collect()
}

/// Render a whole batch as JSON
pub fn render_json(batch: &ResultBatch) -> Result<String> {
    let json = serde_json::to_string_pretty(batch).map_err(|e| Error::Internal(e.to_string()))?;
    Ok(json + "\n")
}

/// Render in the chosen format
pub fn render(batch: &ResultBatch, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_batch(batch)),
        OutputFormat::Json => render_json(batch),
    }
}

/// Echoes batches to a writer (stdout by default)
pub struct ConsoleSink<W: Write> {
    writer: W,
    format: OutputFormat,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self { writer, format }
    }

    pub fn set_format(&mut self, format: OutputFormat) {
        self.format = format;
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ResultSink for ConsoleSink<W> {
    fn deliver(&mut self, batch: &ResultBatch) -> Result<()> {
        let output = render(batch, self.format)?;
        self.writer.write_all(output.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Appends the text rendering of batches to a file
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for FileSink {
    fn deliver(&mut self, batch: &ResultBatch) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(render_batch(batch).as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{BatchStatus, Statement};
    use crate::session::{Row, Value};

    fn sample_batch() -> ResultBatch {
        let outcome = |index, connection: &str, kind| StatementOutcome {
            connection: connection.to_string(),
            handle_id: 1,
            statement_index: index,
            kind,
        };
        ResultBatch::new(
            vec![
                Statement::new("INSERT INTO t VALUES (1)"),
                Statement::new("SELECT x FROM t"),
            ],
            vec![
                outcome(1, "a", OutcomeKind::Committed),
                outcome(1, "b", OutcomeKind::Failed("no such table: t".to_string())),
                outcome(
                    2,
                    "a",
                    OutcomeKind::RowsReturned(vec![Row::new(
                        vec!["x".to_string()],
                        vec![Value::Integer(1)],
                    )]),
                ),
                outcome(2, "b", OutcomeKind::NoRowsReturned),
            ],
            BatchStatus::Completed,
        )
    }

    #[test]
    fn test_render_batch_text() {
        let expected = "\
Connection: a, query 1: INSERT INTO t VALUES (1) -------------------------------------------------------
Query 1 executed successfully.
Connection: b, query 1: INSERT INTO t VALUES (1) -------------------------------------------------------
Error executing query 1 on b: no such table: t
Connection: a, query 2: SELECT x FROM t -------------------------------------------------------
(1)
Connection: b, query 2: SELECT x FROM t -------------------------------------------------------
Query 2 executed successfully, no rows returned.
";
        assert_eq!(render_batch(&sample_batch()), expected);
    }

    #[test]
    fn test_console_sink_json() {
        let mut sink = ConsoleSink::new(Vec::new(), OutputFormat::Json);
        sink.deliver(&sample_batch()).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["outcomes"].as_array().unwrap().len(), 4);
        assert_eq!(json["statements"][1], "SELECT x FROM t");
    }

    #[test]
    fn test_file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let mut sink = FileSink::new(&path);

        sink.deliver(&sample_batch()).unwrap();
        sink.deliver(&sample_batch()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, render_batch(&sample_batch()).repeat(2));
    }
}
