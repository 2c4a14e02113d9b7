//! Database connection management
//!
//! This module provides the lazily-opened connection manager used by the
//! Whisper UI and by the migration runner.

use rusqlite::{Connection, Params};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::error::{StoreError, StoreResult};
use super::row::Row;
use crate::database::migration::{MigrationRecord, MigrationRunner, MigrationStatus};

/// Where a manager's database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// A database file; parent directories are created on first open
    File(PathBuf),
    /// A private in-memory database, discarded when the handle closes
    Memory,
}

/// Per-connection settings applied on every open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// How long SQLite waits on a locked database before failing
    pub busy_timeout: Duration,
    /// Use write-ahead logging instead of the rollback journal
    pub wal: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            wal: false,
        }
    }
}

/// Outcome of a single [`DatabaseManager::execute`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Rows changed by the statement; 0 for DDL and SELECT
    pub rows_affected: usize,
    /// Rowid of the most recent successful insert on this connection
    pub last_insert_rowid: i64,
}

/// Lazily-initialized gateway to a single SQLite database
///
/// The manager owns at most one live handle. The handle is opened by the
/// first call that needs it and stays open until [`close`](Self::close) (or
/// until the manager is dropped); the next call after a close opens a new,
/// distinct handle.
///
/// The handle is not meant to be shared between threads. Funnel all database
/// work through the owner of the manager.
pub struct DatabaseManager {
    location: DatabaseLocation,
    options: ConnectionOptions,
    conn: Option<Connection>,
}

impl DatabaseManager {
    /// Create a manager for the database file at `path`
    ///
    /// Nothing is touched on disk until the connection is first used.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_options(DatabaseLocation::File(path.into()), ConnectionOptions::default())
    }

    /// Create a manager backed by a private in-memory database
    pub fn in_memory() -> Self {
        Self::with_options(DatabaseLocation::Memory, ConnectionOptions::default())
    }

    pub fn with_options(location: DatabaseLocation, options: ConnectionOptions) -> Self {
        Self {
            location,
            options,
            conn: None,
        }
    }

    pub fn location(&self) -> &DatabaseLocation {
        &self.location
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            DatabaseLocation::File(p) => Some(p.as_path()),
            DatabaseLocation::Memory => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Get the live connection, opening it if necessary
    pub fn connection(&mut self) -> StoreResult<&Connection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.open()?,
        };
        Ok(self.conn.insert(conn))
    }

    /// Close the connection if it is open
    ///
    /// The handle is released even when SQLite reports an error on close.
    pub fn close(&mut self) -> StoreResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| StoreError::Query(e))?;
            debug!("Database connection closed");
        }
        Ok(())
    }

    fn open(&self) -> StoreResult<Connection> {
        let conn = match &self.location {
            DatabaseLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StoreError::storage_unavailable(parent, e))?;
                }
                Connection::open(path).map_err(|e| StoreError::storage_unavailable(path, e))?
            }
            DatabaseLocation::Memory => Connection::open_in_memory()
                .map_err(|e| StoreError::storage_unavailable(":memory:", e))?,
        };

        self.configure(&conn)?;

        match &self.location {
            DatabaseLocation::File(path) => {
                debug!("Connected to database at {}", path.display())
            }
            DatabaseLocation::Memory => debug!("Connected to in-memory database"),
        }
        Ok(conn)
    }

    /// Apply per-connection settings
    fn configure(&self, conn: &Connection) -> StoreResult<()> {
        // Enable foreign keys
        conn.execute_batch("PRAGMA foreign_keys = ON")?;

        conn.busy_timeout(self.options.busy_timeout)?;

        if self.options.wal && self.location != DatabaseLocation::Memory {
            let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        }

        Ok(())
    }

    /// Execute a single SQL statement with positional parameters
    ///
    /// Pass `[]` when the statement takes no parameters. Rows the statement
    /// yields are discarded; use [`query`](Self::query) to read them.
    pub fn execute<P: Params>(&mut self, sql: &str, params: P) -> StoreResult<ExecOutcome> {
        let conn = self.connection()?;
        let before = conn.total_changes();
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        while rows.next()?.is_some() {}
        drop(rows);

        // changes() keeps the last DML count across DDL and SELECT
        let rows_affected = if conn.total_changes() == before {
            0
        } else {
            usize::try_from(conn.changes()).unwrap_or(usize::MAX)
        };
        Ok(ExecOutcome {
            rows_affected,
            last_insert_rowid: conn.last_insert_rowid(),
        })
    }

    /// Execute the same statement once per parameter set, in order
    ///
    /// Returns the total number of rows affected. No transaction is opened;
    /// wrap the call in one when the batch must be atomic.
    pub fn execute_many<P, I>(&mut self, sql: &str, param_sets: I) -> StoreResult<usize>
    where
        P: Params,
        I: IntoIterator<Item = P>,
    {
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let mut total = 0;
        for params in param_sets {
            total += stmt.execute(params)?;
        }
        Ok(total)
    }

    /// Execute a multi-statement SQL script in one engine call
    ///
    /// Statements that already ran stay applied when a later one fails,
    /// unless the script runs inside a transaction.
    pub fn execute_script(&mut self, sql: &str) -> StoreResult<()> {
        self.connection()?.execute_batch(sql)?;
        Ok(())
    }

    /// Run a query and return every row
    pub fn query<P: Params>(&mut self, sql: &str, params: P) -> StoreResult<Vec<Row>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, Row::from_engine)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Run a query and return its first row, if any
    pub fn query_one<P: Params>(&mut self, sql: &str, params: P) -> StoreResult<Option<Row>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        match rows.next()? {
            Some(row) => Ok(Some(Row::from_engine(row)?)),
            None => Ok(None),
        }
    }

    /// Begin an explicit transaction on the live handle
    pub fn begin(&mut self) -> StoreResult<()> {
        self.connection()?.execute_batch("BEGIN")?;
        Ok(())
    }

    /// Commit the open transaction; a no-op in autocommit mode
    pub fn commit(&mut self) -> StoreResult<()> {
        let conn = self.connection()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// Roll back the open transaction; a no-op in autocommit mode
    pub fn rollback(&mut self) -> StoreResult<()> {
        let conn = self.connection()?;
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    /// Run `f` inside a transaction
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back when it
    /// returns an error.
    pub fn with_transaction<T, F>(&mut self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.connection()?;
        let tx = conn.unchecked_transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Check if a table exists in the database
    pub fn table_exists(&mut self, table_name: &str) -> StoreResult<bool> {
        let row = self.query_one(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table_name],
        )?;
        Ok(row.is_some())
    }

    /// Apply every pending migration found in `dir`
    ///
    /// Returns the number of migrations applied by this call.
    pub fn apply_migrations(&mut self, dir: impl AsRef<Path>) -> StoreResult<usize> {
        MigrationRunner::new(self.connection()?).apply(dir)
    }

    /// Every migration file in `dir` with its applied/pending state
    pub fn migration_status(&mut self, dir: impl AsRef<Path>) -> StoreResult<Vec<MigrationStatus>> {
        MigrationRunner::new(self.connection()?).status(dir)
    }

    /// Ledger rows for the migrations applied so far
    pub fn applied_migrations(&mut self) -> StoreResult<Vec<MigrationRecord>> {
        MigrationRunner::new(self.connection()?).applied()
    }
}

impl std::fmt::Debug for DatabaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseManager")
            .field("location", &self.location)
            .field("options", &self.options)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::types::Value;
    use tempfile::TempDir;

    fn file_db() -> (TempDir, DatabaseManager) {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabaseManager::new(dir.path().join("test.db"));
        (dir, db)
    }

    #[test]
    fn test_lazy_open_creates_file() {
        let (dir, mut db) = file_db();
        let path = dir.path().join("test.db");

        assert!(!db.is_open());
        assert!(!path.exists());

        db.connection().unwrap();
        assert!(db.is_open());
        assert!(path.exists());
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("whisper.db");
        let mut db = DatabaseManager::new(&path);

        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", [])
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_unusable_path_is_storage_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut db = DatabaseManager::new(blocker.join("whisper.db"));
        let err = db.connection().unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable { .. }));
        assert!(!db.is_open());
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let mut db = DatabaseManager::in_memory();
        let row = db.query_one("PRAGMA foreign_keys", []).unwrap().unwrap();
        assert_eq!(row.get_as::<i64>("foreign_keys").unwrap(), 1);

        db.execute_script(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (id INTEGER PRIMARY KEY,
                                 parent_id INTEGER NOT NULL REFERENCES parent(id));",
        )
        .unwrap();
        let err = db
            .execute("INSERT INTO child (parent_id) VALUES (?1)", [42])
            .unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
    }

    #[test]
    fn test_wal_option() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = DatabaseManager::with_options(
            DatabaseLocation::File(dir.path().join("wal.db")),
            ConnectionOptions {
                wal: true,
                ..Default::default()
            },
        );
        let row = db.query_one("PRAGMA journal_mode", []).unwrap().unwrap();
        assert_eq!(row.get_as::<String>("journal_mode").unwrap(), "wal");
    }

    #[test]
    fn test_reopen_after_close_is_a_new_handle() {
        let (_dir, mut db) = file_db();

        db.execute("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT NOT NULL)", [])
            .unwrap();
        db.execute("INSERT INTO test (name) VALUES (?1)", ["test_name"])
            .unwrap();
        db.commit().unwrap();
        // temp tables belong to a single handle
        db.execute("CREATE TEMP TABLE scratch (x INTEGER)", [])
            .unwrap();
        let scratch_sql = "SELECT name FROM sqlite_temp_master WHERE name = 'scratch'";
        assert!(db.query_one(scratch_sql, []).unwrap().is_some());

        db.close().unwrap();
        assert!(!db.is_open());
        // closing twice is fine
        db.close().unwrap();

        assert!(db.query_one(scratch_sql, []).unwrap().is_none());

        let row = db
            .query_one("SELECT * FROM test WHERE name = ?1", ["test_name"])
            .unwrap()
            .unwrap();
        assert_eq!(row.get_as::<String>("name").unwrap(), "test_name");
    }

    #[test]
    fn test_execute_outcome() {
        let mut db = DatabaseManager::in_memory();
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v INTEGER)", [])
            .unwrap();

        let first = db.execute("INSERT INTO t (v) VALUES (?1)", [10]).unwrap();
        assert_eq!(first.rows_affected, 1);
        assert_eq!(first.last_insert_rowid, 1);

        db.execute("INSERT INTO t (v) VALUES (?1)", [20]).unwrap();
        let updated = db.execute("UPDATE t SET v = v + 1", []).unwrap();
        assert_eq!(updated.rows_affected, 2);
    }

    #[test]
    fn test_execute_outcome_ignores_stale_counts() {
        let mut db = DatabaseManager::in_memory();
        db.execute("CREATE TABLE t (v INTEGER)", []).unwrap();
        let inserted = db
            .execute("INSERT INTO t (v) VALUES (1), (2)", [])
            .unwrap();
        assert_eq!(inserted.rows_affected, 2);

        let created = db.execute("CREATE TABLE u (id INTEGER)", []).unwrap();
        assert_eq!(created.rows_affected, 0);

        let selected = db.execute("SELECT v FROM t", []).unwrap();
        assert_eq!(selected.rows_affected, 0);

        let missed = db.execute("DELETE FROM t WHERE v > 10", []).unwrap();
        assert_eq!(missed.rows_affected, 0);
    }

    #[test]
    fn test_params_are_bound_not_interpolated() {
        let mut db = DatabaseManager::in_memory();
        db.execute("CREATE TABLE t (name TEXT)", []).unwrap();

        let hostile = "x'); DROP TABLE t; --";
        db.execute("INSERT INTO t (name) VALUES (?1)", [hostile])
            .unwrap();

        assert!(db.table_exists("t").unwrap());
        let row = db.query_one("SELECT name FROM t", []).unwrap().unwrap();
        assert_eq!(row.get_as::<String>("name").unwrap(), hostile);
    }

    #[test]
    fn test_execute_many() {
        let (_dir, mut db) = file_db();
        db.execute(
            "CREATE TABLE test_many (id INTEGER PRIMARY KEY, name TEXT NOT NULL, value INTEGER NOT NULL)",
            [],
        )
        .unwrap();

        let data = [("item1", 10), ("item2", 20), ("item3", 30)];
        let inserted = db
            .execute_many(
                "INSERT INTO test_many (name, value) VALUES (?1, ?2)",
                data,
            )
            .unwrap();
        assert_eq!(inserted, 3);
        db.commit().unwrap();

        let results = db.query("SELECT * FROM test_many ORDER BY id", []).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].get_as::<String>("name").unwrap(), "item1");
        assert_eq!(results[0].get_as::<i64>("value").unwrap(), 10);
        assert_eq!(results[1].get_as::<String>("name").unwrap(), "item2");
        assert_eq!(results[2].get_as::<String>("name").unwrap(), "item3");
    }

    #[test]
    fn test_execute_script() {
        let (_dir, mut db) = file_db();
        db.execute_script(
            "CREATE TABLE table1 (id INTEGER PRIMARY KEY, name TEXT);
             CREATE TABLE table2 (id INTEGER PRIMARY KEY, value INTEGER);
             INSERT INTO table1 (name) VALUES ('test1'), ('test2');
             INSERT INTO table2 (value) VALUES (100), (200);",
        )
        .unwrap();

        let table1 = db.query("SELECT * FROM table1", []).unwrap();
        let table2 = db.query("SELECT * FROM table2", []).unwrap();
        assert_eq!(table1.len(), 2);
        assert_eq!(table2.len(), 2);
        assert_eq!(table1[0].get_as::<String>("name").unwrap(), "test1");
        assert_eq!(table2[1].get_as::<i64>("value").unwrap(), 200);
    }

    #[test]
    fn test_query() {
        let mut db = DatabaseManager::in_memory();
        db.execute("CREATE TABLE test_query (id INTEGER PRIMARY KEY, name TEXT)", [])
            .unwrap();
        db.execute_many(
            "INSERT INTO test_query (name) VALUES (?1)",
            [["row1"], ["row2"], ["row3"]],
        )
        .unwrap();

        assert_eq!(db.query("SELECT * FROM test_query", []).unwrap().len(), 3);

        let filtered = db
            .query("SELECT * FROM test_query WHERE id > ?1", [1])
            .unwrap();
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].get_as::<String>("name").unwrap(), "row2");
        assert_eq!(filtered[1].get_as::<String>("name").unwrap(), "row3");

        let empty = db
            .query("SELECT * FROM test_query WHERE name = ?1", ["nonexistent"])
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_query_one_none_on_no_rows() {
        let mut db = DatabaseManager::in_memory();
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", [])
            .unwrap();
        assert!(db
            .query_one("SELECT * FROM t WHERE id = ?1", [1])
            .unwrap()
            .is_none());

        db.execute("INSERT INTO t (id) VALUES (5), (6)", []).unwrap();
        let row = db
            .query_one("SELECT id FROM t ORDER BY id", [])
            .unwrap()
            .unwrap();
        assert_eq!(row.get("id"), Some(&Value::Integer(5)));
    }

    #[test]
    fn test_malformed_sql_is_query_error() {
        let mut db = DatabaseManager::in_memory();
        let err = db.query("SELEKT nothing", []).unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
        assert!(err.engine_error().is_some());
    }

    #[test]
    fn test_explicit_transaction_rollback() {
        let mut db = DatabaseManager::in_memory();
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", [])
            .unwrap();

        db.begin().unwrap();
        db.execute("INSERT INTO t (id) VALUES (1)", []).unwrap();
        db.rollback().unwrap();
        assert!(db.query("SELECT * FROM t", []).unwrap().is_empty());

        db.begin().unwrap();
        db.execute("INSERT INTO t (id) VALUES (2)", []).unwrap();
        db.commit().unwrap();
        assert_eq!(db.query("SELECT * FROM t", []).unwrap().len(), 1);

        // nothing open: both are no-ops
        db.commit().unwrap();
        db.rollback().unwrap();
    }

    #[test]
    fn test_with_transaction() {
        let mut db = DatabaseManager::in_memory();
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", [])
            .unwrap();

        let inserted = db
            .with_transaction(|conn| Ok(conn.execute("INSERT INTO t (id) VALUES (1)", [])?))
            .unwrap();
        assert_eq!(inserted, 1);

        let result: StoreResult<()> = db.with_transaction(|conn| {
            conn.execute("INSERT INTO t (id) VALUES (2)", [])?;
            conn.execute("INSERT INTO t (id) VALUES (1)", [])?;
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::Query(_))));

        let rows = db.query("SELECT id FROM t", []).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(db.connection().unwrap().is_autocommit());
    }

    #[test]
    fn test_table_exists() {
        let (_dir, mut db) = file_db();
        assert!(!db.table_exists("nonexistent_table").unwrap());

        db.execute("CREATE TABLE test_table (id INTEGER PRIMARY KEY)", [])
            .unwrap();
        assert!(db.table_exists("test_table").unwrap());

        // views are not tables
        db.execute("CREATE VIEW test_view AS SELECT * FROM test_table", [])
            .unwrap();
        assert!(!db.table_exists("test_view").unwrap());
    }
}
