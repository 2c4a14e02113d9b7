//! Forward-only, file-based schema migrations
//!
//! - `file`: discovery and parsing of `<YYYYMMDDHHMMSS>_<name>.sql` files
//! - `ledger`: the `migrations` table recording what has been applied
//! - `runner`: applies pending files in order, one transaction each

mod file;
mod ledger;
mod runner;

pub use file::{discover, MigrationFile, MIGRATION_FILE_PATTERN};
pub use ledger::{LedgerDefinitions, MigrationLedger, MigrationRecord};
pub use runner::{MigrationRunner, MigrationState, MigrationStatus};
