//! Migration file discovery
//!
//! Migration files are named `<YYYYMMDDHHMMSS>_<snake_case_name>.sql`. The
//! 14-digit prefix orders them; the name identifies them in the ledger.

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::database::core::{StoreError, StoreResult};

/// Filename pattern for migration files
pub const MIGRATION_FILE_PATTERN: &str = r"^([0-9]{14})_([a-z0-9_]+)\.sql$";

static MIGRATION_FILE_RE: OnceLock<Regex> = OnceLock::new();

#[allow(clippy::expect_used)]
fn migration_file_regex() -> &'static Regex {
    MIGRATION_FILE_RE
        .get_or_init(|| Regex::new(MIGRATION_FILE_PATTERN).expect("valid migration file regex"))
}

/// A migration script found on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationFile {
    /// Full file name, e.g. `20240101000000_init.sql`
    pub file_name: String,
    /// The 14-digit ordering prefix
    pub version: String,
    /// Identity recorded in the ledger, e.g. `init`
    pub name: String,
    pub path: PathBuf,
}

impl MigrationFile {
    /// Parse a path as a migration file
    ///
    /// Returns `None` when the file name does not follow the migration
    /// naming pattern; such files are simply not migrations.
    pub fn parse(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let file_name = path.file_name()?.to_str()?;
        let caps = migration_file_regex().captures(file_name)?;

        Some(MigrationFile {
            file_name: file_name.to_string(),
            version: caps[1].to_string(),
            name: caps[2].to_string(),
            path: path.to_path_buf(),
        })
    }

    /// The prefix read as a `YYYYMMDDHHMMSS` timestamp
    ///
    /// `None` when the digits are not a real date and time. Such files still
    /// sort and apply by their prefix.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.version, "%Y%m%d%H%M%S").ok()
    }

    /// Read the script body
    pub fn read_sql(&self) -> std::io::Result<String> {
        std::fs::read_to_string(&self.path)
    }
}

/// List the migration files in `dir`, sorted by file name
///
/// Entries that are not regular files or whose names do not match the
/// migration pattern are skipped.
pub fn discover(dir: impl AsRef<Path>) -> StoreResult<Vec<MigrationFile>> {
    let dir = dir.as_ref();
    let dir_error = |source| StoreError::MigrationDirectory {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(dir_error)? {
        let path = entry.map_err(dir_error)?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(file) = MigrationFile::parse(&path) {
            files.push(file);
        }
    }

    files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(files)
}
