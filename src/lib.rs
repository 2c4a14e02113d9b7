#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! whisper-store - embedded persistence for the Whisper voice recorder
//!
//! The Whisper desktop application keeps its recordings metadata in a local
//! SQLite database. This crate is that storage layer: a lazily-opened
//! connection manager and a forward-only, file-based schema migration runner.
//! The UI, the audio pipeline and dialogs live elsewhere and only call into
//! the handful of methods exposed here.
//!
//! # Architecture
//!
//! - **[`database`]**: all database functionality
//!   - `core`: [`DatabaseManager`], [`Row`], [`StoreError`]
//!   - `migration`: [`MigrationRunner`], [`MigrationFile`], [`MigrationLedger`]
//!
//! - **[`config`]**: where the database and the migrations live
//!
//! # Migration files
//!
//! A migrations directory holds files named `<YYYYMMDDHHMMSS>_<name>.sql`,
//! where `<name>` is lowercase snake case. Files are applied in file name
//! order, each one inside its own transaction together with its ledger row
//! in the `migrations` table. Anything else in the directory is ignored.
//!
//! ```text
//! migrations/
//! ├── 20240101000000_init.sql
//! ├── 20240312093000_add_recordings.sql
//! └── README.md                 # ignored
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use whisper_store::{WhisperConfig, DatabaseManager};
//!
//! // Startup: load configuration, open the database, apply migrations
//! let config = WhisperConfig::new(&None)?;
//! let mut db = whisper_store::open(&config)?;
//!
//! // Ad hoc access from the UI
//! db.execute(
//!     "INSERT INTO recordings (title, path) VALUES (?1, ?2)",
//!     ["Morning notes", "/home/me/Recordings/morning.ogg"],
//! )?;
//!
//! if let Some(row) = db.query_one("SELECT title FROM recordings WHERE id = ?1", [1])? {
//!     let title: String = row.get_as("title")?;
//!     println!("{title}");
//! }
//!
//! db.close()?;
//! ```
//!
//! # Logging
//!
//! The crate emits [`tracing`] events and never installs a subscriber; the
//! embedding application decides where they go.

pub mod config;
pub mod database;

// =============================================================================
// Configuration
// =============================================================================

pub use config::WhisperConfig;

// =============================================================================
// Database Module - Re-export commonly used types
// =============================================================================

// Startup helper
pub use database::open;

// Core database types
pub use database::{
    ConnectionOptions, DatabaseLocation, DatabaseManager, ExecOutcome, Row, StoreError,
    StoreResult,
};

// Migrations
pub use database::{
    MigrationFile, MigrationLedger, MigrationRecord, MigrationRunner, MigrationState,
    MigrationStatus, MIGRATION_FILE_PATTERN,
};
