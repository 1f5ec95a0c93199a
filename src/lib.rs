//! MultiDB - broadcast SQL to several databases at once
//!
//! This library provides the core components of a multi-session query tool:
//! - Connection catalog (named connection definitions)
//! - Sessions (live database handles over SQLite and MySQL)
//! - Query broadcasting (statement splitting, fan-out, per-pair outcomes)
//! - Result sinks (console echo, append-to-file logging)

pub mod broadcast;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod session;
pub mod sink;

pub use broadcast::{BatchStatus, OutcomeKind, ResultBatch, StatementOutcome};
pub use engine::MultiDb;
pub use error::{Error, Result};
