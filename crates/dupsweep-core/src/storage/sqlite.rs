use rusqlite::{Connection, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const SCHEMA_VERSION: i64 = 1;

/// Persistent hash cache backed by a single SQLite file.
///
/// One writer per store: the session that opened it. The connection is
/// closed when the value is dropped.
pub struct HashStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl HashStore {
    /// Opens (creating if needed) the store file and its parent directory.
    pub fn open(path: &Path) -> crate::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = HashStore {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.configure_pragmas()?;
        store.migrate_schema()?;
        debug!("Opened hash store at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = HashStore { conn, path: None };
        store.configure_pragmas()?;
        store.migrate_schema()?;
        Ok(store)
    }

    fn configure_pragmas(&self) -> Result<()> {
        // journal_mode returns a row, so it cannot go through execute_batch.
        let _mode: String = self
            .conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        self.conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -51200;
             PRAGMA temp_store = MEMORY;
             PRAGMA mmap_size = 67108864;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode, 50MB cache, 64MB mmap)");
        Ok(())
    }

    /// The cache is derived data: an older schema is dropped and recreated.
    fn migrate_schema(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version != 0 && version < SCHEMA_VERSION {
            debug!(
                "Schema version {} < {}, dropping file_cache and recreating",
                version, SCHEMA_VERSION
            );
            self.conn.execute_batch("DROP TABLE IF EXISTS file_cache;")?;
        }

        self.conn.execute_batch(include_str!("schema.sql"))?;
        debug!("SQLite schema initialized (version {})", SCHEMA_VERSION);
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Location of the backing file; `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Explicit shutdown, surfacing close errors that a plain drop would swallow.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)
    }
}
