use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, Transaction};
use tracing::{info, warn};

use crate::db::init_db;
use crate::error::{is_decode_failure, Result};

/// Shared handle to the automation database.
///
/// Every repository holds a clone. The single connection sits behind a
/// `Mutex`, so each call is serialised and SQLite's transaction semantics
/// are the only concurrency control the core relies on.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Wrap an open connection, applying pragmas and the schema.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                // A failure here resurfaces as a clearer rusqlite open error.
                let _ = std::fs::create_dir_all(parent);
            }
        }
        info!(path = %path.display(), "opening automation database");
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Run `f` against the connection. A single statement inside `f` is its
    /// own autocommit transaction.
    pub fn with<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock();
        f(&conn)
    }

    /// Run `f` inside one transaction: committed if `f` returns `Ok`, rolled
    /// back otherwise.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // an interrupted transaction is rolled back on drop
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Gather mapped rows, skipping rows that fail to decode so one bad record
/// cannot hide the rest of `table`.
pub(crate) fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
    table: &'static str,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        match row {
            Ok(value) => out.push(value),
            Err(e) if is_decode_failure(&e) => warn!(table, "skipping undecodable row: {e}"),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(out)
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}
