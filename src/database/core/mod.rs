//! Core database infrastructure
//!
//! This module provides the foundational database components:
//! - `DatabaseManager`: lazily-opened SQLite connection with query helpers
//! - `Row`: owned result rows keyed by column name
//! - `StoreError`: error taxonomy shared by the whole storage layer

mod connection;
mod error;
mod row;

pub use connection::{ConnectionOptions, DatabaseLocation, DatabaseManager, ExecOutcome};
pub use error::{StoreError, StoreResult};
pub use row::Row;
