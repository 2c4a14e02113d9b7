//! Database module
//!
//! This module provides all persistence for Whisper, organized into:
//!
//! - **core**: connection management, result rows, error types
//! - **migration**: migration file discovery, the ledger, and the runner
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/            # Foundation
//! │   ├── connection   # DatabaseManager (lazy SQLite handle)
//! │   ├── row          # Row: column name -> tagged value
//! │   └── error        # StoreError taxonomy
//! │
//! └── migration/       # Schema evolution
//!     ├── file         # <YYYYMMDDHHMMSS>_<name>.sql discovery
//!     ├── ledger       # `migrations` table
//!     └── runner       # ordered, per-migration transactions
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use whisper_store::database::DatabaseManager;
//!
//! let mut db = DatabaseManager::new("/home/me/.local/share/whisper/whisper.sqlite3");
//!
//! // Once at startup, before any other query
//! let applied = db.apply_migrations("/usr/share/whisper/migrations")?;
//!
//! // Ad hoc reads and writes afterwards
//! db.execute("INSERT INTO recordings (title) VALUES (?1)", ["Take 1"])?;
//! let recent = db.query("SELECT * FROM recordings ORDER BY id DESC LIMIT ?1", [10])?;
//! ```

pub mod core;
pub mod migration;

pub use core::{
    ConnectionOptions, DatabaseLocation, DatabaseManager, ExecOutcome, Row, StoreError,
    StoreResult,
};
pub use migration::{
    discover, LedgerDefinitions, MigrationFile, MigrationLedger, MigrationRecord,
    MigrationRunner, MigrationState, MigrationStatus, MIGRATION_FILE_PATTERN,
};

use crate::config::WhisperConfig;
use tracing::info;

/// Open the configured database and bring its schema up to date
///
/// This is the startup sequence the UI runs once before any other query:
/// build the manager from `config`, apply pending migrations from the
/// configured directory, and hand the open manager back.
pub fn open(config: &WhisperConfig) -> StoreResult<DatabaseManager> {
    let mut db = DatabaseManager::with_options(
        DatabaseLocation::File(config.sqlite_path()),
        config.connection_options(),
    );

    let applied = db.apply_migrations(config.migrations_path())?;
    info!(
        "Database ready at {} ({} migration(s) applied)",
        config.sqlite_path().display(),
        applied
    );
    Ok(db)
}
