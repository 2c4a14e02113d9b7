//! Migration ledger
//!
//! The `migrations` table is the durable record of every migration applied
//! to a database. Rows are only ever inserted, by the runner.

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashSet;

use crate::database::core::StoreResult;

/// SQL definitions for the ledger
pub struct LedgerDefinitions;

impl LedgerDefinitions {
    /// SQL for creating the ledger table
    pub const MIGRATIONS_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
    "#;

    pub const TABLE_NAME: &'static str = "migrations";
}

/// One applied migration, as stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub id: i64,
    pub name: String,
    pub applied_at: NaiveDateTime,
}

/// Read/append access to the ledger on a borrowed connection
pub struct MigrationLedger<'a> {
    conn: &'a Connection,
}

impl<'a> MigrationLedger<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create the ledger table if it is missing, in its own transaction
    pub fn ensure_table(&self) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(LedgerDefinitions::MIGRATIONS_TABLE, [])?;
        tx.commit()?;
        Ok(())
    }

    /// Names of every recorded migration
    pub fn applied_names(&self) -> StoreResult<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM migrations")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(names)
    }

    /// Check whether `name` has been recorded
    pub fn contains(&self, name: &str) -> StoreResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM migrations WHERE name = ?1 LIMIT 1",
                [name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Record `name` as applied
    ///
    /// Callers run this inside the same transaction as the migration itself.
    pub fn record(&self, name: &str) -> StoreResult<()> {
        self.conn
            .execute("INSERT INTO migrations (name) VALUES (?1)", [name])?;
        Ok(())
    }

    /// Every ledger row, oldest first
    pub fn records(&self) -> StoreResult<Vec<MigrationRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, applied_at FROM migrations ORDER BY id")?;
        let records = stmt
            .query_map([], |row| {
                Ok(MigrationRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    applied_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
