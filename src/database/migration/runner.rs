//! Migration runner
//!
//! Brings a database schema up to date by applying, in file-name order,
//! every migration file whose name is not yet in the ledger.

use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use super::file::{discover, MigrationFile};
use super::ledger::{MigrationLedger, MigrationRecord};
use crate::database::core::{StoreError, StoreResult};

/// Whether a migration file has been applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    Pending,
    Applied,
}

impl std::fmt::Display for MigrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationState::Pending => write!(f, "pending"),
            MigrationState::Applied => write!(f, "applied"),
        }
    }
}

/// A migration file paired with its state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub file: MigrationFile,
    pub state: MigrationState,
}

/// Applies migration files to a borrowed connection
///
/// Each migration runs in its own IMMEDIATE transaction together with its
/// ledger row, so a failing script leaves neither schema changes nor a
/// ledger entry behind. Scripts must not issue their own `BEGIN`, `COMMIT`
/// or `ROLLBACK`.
pub struct MigrationRunner<'a> {
    conn: &'a Connection,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn ledger(&self) -> MigrationLedger<'a> {
        MigrationLedger::new(self.conn)
    }

    /// Apply every pending migration in `dir`
    ///
    /// Returns the number of migrations applied by this call; 0 when the
    /// schema is already up to date.
    pub fn apply(&self, dir: impl AsRef<Path>) -> StoreResult<usize> {
        let ledger = self.ledger();
        ledger.ensure_table()?;
        let mut applied = ledger.applied_names()?;

        let files = discover(dir)?;
        warn_on_shared_versions(&files);

        let mut count = 0;
        for file in &files {
            if applied.contains(&file.name) {
                debug!("Skipping migration `{}`", file.file_name);
                continue;
            }

            if self.apply_one(file)? {
                info!("Successfully applied migration `{}`", file.file_name);
                count += 1;
            }
            applied.insert(file.name.clone());
        }

        if count > 0 {
            info!("Applied {} migration(s)", count);
        } else {
            debug!("Database schema is up to date");
        }
        Ok(count)
    }

    /// Run one migration and its ledger insert atomically
    ///
    /// Returns `false` when another runner recorded the migration between
    /// our ledger read and taking the write lock.
    fn apply_one(&self, file: &MigrationFile) -> StoreResult<bool> {
        let fail = |e: StoreError| StoreError::migration_failure(&file.file_name, e);

        let sql = file
            .read_sql()
            .map_err(|e| StoreError::migration_failure(&file.file_name, e))?;

        debug!("Applying migration `{}`", file.file_name);
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(|e| fail(e.into()))?;

        let ledger = MigrationLedger::new(&tx);
        if ledger.contains(&file.name).map_err(fail)? {
            debug!(
                "Migration `{}` was recorded concurrently, skipping",
                file.file_name
            );
            return Ok(false);
        }

        tx.execute_batch(&sql).map_err(|e| fail(e.into()))?;
        if tx.is_autocommit() {
            // the script ended our transaction; recording now would persist
            // the ledger row on its own
            return Err(StoreError::MigrationFailure {
                file: file.file_name.clone(),
                source: "script ended the migration transaction".into(),
            });
        }
        ledger.record(&file.name).map_err(fail)?;
        tx.commit().map_err(|e| fail(e.into()))?;
        Ok(true)
    }

    /// Migration files in `dir` that have not been applied, in apply order
    pub fn pending(&self, dir: impl AsRef<Path>) -> StoreResult<Vec<MigrationFile>> {
        Ok(self
            .status(dir)?
            .into_iter()
            .filter(|s| s.state == MigrationState::Pending)
            .map(|s| s.file)
            .collect())
    }

    /// Every migration file in `dir` with its state, in apply order
    ///
    /// A file whose name repeats an earlier file's name is reported as
    /// applied, matching how [`apply`](Self::apply) would skip it.
    pub fn status(&self, dir: impl AsRef<Path>) -> StoreResult<Vec<MigrationStatus>> {
        let ledger = self.ledger();
        ledger.ensure_table()?;
        let applied = ledger.applied_names()?;

        let mut seen = HashSet::new();
        let statuses = discover(dir)?
            .into_iter()
            .map(|file| {
                let first_of_name = seen.insert(file.name.clone());
                let state = if applied.contains(&file.name) || !first_of_name {
                    MigrationState::Applied
                } else {
                    MigrationState::Pending
                };
                MigrationStatus { file, state }
            })
            .collect();
        Ok(statuses)
    }

    /// Ledger rows, oldest first
    pub fn applied(&self) -> StoreResult<Vec<MigrationRecord>> {
        let ledger = self.ledger();
        ledger.ensure_table()?;
        ledger.records()
    }
}

fn warn_on_shared_versions(files: &[MigrationFile]) {
    for pair in files.windows(2) {
        if pair[0].version == pair[1].version {
            warn!(
                "Migrations `{}` and `{}` share version {}; applying in file name order",
                pair[0].file_name, pair[1].file_name, pair[0].version
            );
        }
    }

    let mut names = HashSet::new();
    for file in files {
        if !names.insert(file.name.as_str()) {
            warn!(
                "Migration `{}` reuses the name `{}` and will never be applied",
                file.file_name, file.name
            );
        }
    }
}
