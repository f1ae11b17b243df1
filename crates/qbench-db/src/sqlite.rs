//! `SQLite` store (via rusqlite).
//!
//! The provider only opens databases that already exist. Loading data and
//! applying index DDL happen before a benchmark run, outside this crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use qbench_core::{StoreConfig, StoreIdentity};
use rusqlite::OpenFlags;

use crate::error::{StoreError, StoreResult};
use crate::store::{Connection, ConnectionProvider};

const STATEMENT_CACHE_CAPACITY: usize = 64;

/// Opens one `SQLite` connection per acquisition.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteProvider {
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            path: config.database_path.clone(),
            busy_timeout: config.busy_timeout(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConnectionProvider for SqliteProvider {
    type Conn = SqliteConnection;

    fn acquire(&self) -> StoreResult<SqliteConnection> {
        // No SQLITE_OPEN_CREATE: a missing file is a connect error.
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = rusqlite::Connection::open_with_flags(&self.path, flags).map_err(|e| {
            StoreError::connect(format!("SQLite open {}: {e}", self.path.display()))
        })?;
        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| StoreError::connect(format!("SQLite busy_timeout: {e}")))?;
        conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
        tracing::debug!(path = %self.path.display(), "opened SQLite connection");
        Ok(SqliteConnection { conn })
    }

    fn identity(&self) -> StoreIdentity {
        StoreIdentity {
            engine: "sqlite".to_string(),
            database: self.path.display().to_string(),
        }
    }
}

/// One open `SQLite` connection with a prepared-statement cache.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl Connection for SqliteConnection {
    fn execute(&mut self, text: &str) -> StoreResult<u64> {
        let mut stmt = self.conn.prepare_cached(text)?;
        let columns = stmt.column_count();
        if columns == 0 {
            let changed = stmt.execute([])?;
            return Ok(u64::try_from(changed).unwrap_or(u64::MAX));
        }

        let mut rows = stmt.query([])?;
        let mut produced: u64 = 0;
        while let Some(row) = rows.next()? {
            for i in 0..columns {
                std::hint::black_box(row.get_ref(i)?);
            }
            produced += 1;
        }
        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_db(dir: &Path) -> PathBuf {
        let path = dir.join("bench.sqlite3");
        let conn = rusqlite::Connection::open(&path).expect("create db");
        conn.execute_batch(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER, total REAL, note TEXT);
             INSERT INTO orders (customer_id, total, note) VALUES
               (1, 10.5, 'a'), (1, 20.0, NULL), (2, 7.25, 'c');",
        )
        .expect("seed");
        path
    }

    fn provider(path: PathBuf) -> SqliteProvider {
        SqliteProvider::new(&StoreConfig {
            database_path: path,
            busy_timeout_ms: 1_000,
        })
    }

    #[test]
    fn select_steps_every_row() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = provider(seeded_db(dir.path()));
        let mut conn = provider.acquire().expect("connect");
        assert_eq!(conn.execute("SELECT * FROM orders").expect("select"), 3);
        assert_eq!(
            conn.execute("SELECT * FROM orders WHERE customer_id = 1")
                .expect("select"),
            2
        );
        // cached statement is reusable
        assert_eq!(conn.execute("SELECT * FROM orders").expect("again"), 3);
    }

    #[test]
    fn statements_without_columns_report_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = provider(seeded_db(dir.path()));
        let mut conn = provider.acquire().expect("connect");
        assert_eq!(
            conn.execute("UPDATE orders SET total = total + 1 WHERE customer_id = 1")
                .expect("update"),
            2
        );
    }

    #[test]
    fn bad_sql_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = provider(seeded_db(dir.path()));
        let mut conn = provider.acquire().expect("connect");
        assert!(conn.execute("SELECT * FROM missing_table").is_err());
    }

    #[test]
    fn missing_database_is_a_connect_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.sqlite3");
        let provider = provider(path.clone());
        let err = provider.acquire().err().expect("missing file");
        assert!(matches!(err, StoreError::Connect(_)));
        assert!(!path.exists(), "provider must not create the database");
    }

    #[test]
    fn identity_names_engine_and_path() {
        let provider = provider(PathBuf::from("/data/bench.sqlite3"));
        let id = provider.identity();
        assert_eq!(id.engine, "sqlite");
        assert_eq!(id.database, "/data/bench.sqlite3");
    }
}
