//! Session module
//!
//! This module contains live database handles, their backend drivers and
//! the session manager that owns them.

pub mod driver;
pub mod handle;
pub mod manager;
pub mod value;

pub use driver::Driver;
pub use handle::{DatabaseHandle, TransactionState};
pub use manager::SessionManager;
pub use value::{Row, Value};
