use super::models::*;
use super::sqlite::HashStore;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, OptionalExtension, Result, Row};
use std::collections::HashMap;
use std::fs;
use tracing::debug;

/// Paths per `IN (...)` query. Stays under SQLite's historical 999-parameter
/// limit with room for the label parameter.
const LOOKUP_CHUNK: usize = 900;

const RECORD_COLUMNS: &str =
    "path, folder_label, size, mtime, hash, hash_kind, sampled_bytes, last_checked";

const UPSERT_SQL: &str = "INSERT INTO file_cache \
     (path, folder_label, size, mtime, hash, hash_kind, sampled_bytes, last_checked) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
     ON CONFLICT(path, folder_label) DO UPDATE SET \
         size = excluded.size, \
         mtime = excluded.mtime, \
         hash = excluded.hash, \
         hash_kind = excluded.hash_kind, \
         sampled_bytes = excluded.sampled_bytes, \
         last_checked = excluded.last_checked";

fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

fn row_to_record(row: &Row) -> Result<CachedFileRecord> {
    let hash_kind = match row.get::<_, Option<String>>(5)? {
        Some(text) => Some(text.parse::<HashKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into())
        })?),
        None => None,
    };
    Ok(CachedFileRecord {
        path: row.get(0)?,
        folder_label: row.get(1)?,
        size: row.get::<_, i64>(2)? as u64,
        mtime: row.get(3)?,
        hash: row.get(4)?,
        hash_kind,
        sampled_bytes: row.get::<_, Option<i64>>(6)?.map(|n| n as u64),
        last_checked: row.get(7)?,
    })
}

impl HashStore {
    // ── Point and batched lookups ────────────────────────────────

    pub fn get(&self, path: &str, folder_label: &str) -> Result<Option<CachedFileRecord>> {
        let sql = format!(
            "SELECT {} FROM file_cache WHERE path = ?1 AND folder_label = ?2",
            RECORD_COLUMNS
        );
        self.connection()
            .query_row(&sql, params![path, folder_label], row_to_record)
            .optional()
    }

    /// Batched lookup. Paths not in the store are simply absent from the map.
    pub fn get_many<S: AsRef<str>>(
        &self,
        paths: &[S],
        folder_label: &str,
    ) -> Result<HashMap<String, CachedFileRecord>> {
        let mut found = HashMap::with_capacity(paths.len());
        for chunk in paths.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT {} FROM file_cache WHERE folder_label = ? AND path IN ({})",
                RECORD_COLUMNS, placeholders
            );
            let mut stmt = self.connection().prepare(&sql)?;
            let args = std::iter::once(folder_label).chain(chunk.iter().map(|p| p.as_ref()));
            let rows = stmt.query_map(params_from_iter(args), row_to_record)?;
            for record in rows {
                let record = record?;
                found.insert(record.path.clone(), record);
            }
        }
        Ok(found)
    }

    /// Every row for a label, ordered by path. Loads the whole label into
    /// memory; hot paths use [`HashStore::get_many`] instead.
    pub fn all_for_label(&self, folder_label: &str) -> Result<Vec<CachedFileRecord>> {
        let sql = format!(
            "SELECT {} FROM file_cache WHERE folder_label = ?1 ORDER BY path",
            RECORD_COLUMNS
        );
        let mut stmt = self.connection().prepare(&sql)?;
        let records = stmt
            .query_map(params![folder_label], row_to_record)?
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Rows with the same content identity, for moved-file detection.
    pub fn find_by_identity(&self, size: u64, mtime: f64, hash: &str) -> Result<Vec<(String, String)>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT path, folder_label FROM file_cache \
             WHERE size = ?1 AND hash = ?3 AND ABS(mtime - ?2) <= ?4 \
             ORDER BY path, folder_label",
        )?;
        let matches = stmt
            .query_map(params![size as i64, mtime, hash, MTIME_TOLERANCE], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(matches)
    }

    /// Every row carrying `hash`, optionally restricted to one label.
    /// Ordered by label, then path.
    pub fn files_by_hash(&self, hash: &str, folder_label: Option<&str>) -> Result<Vec<CachedFileRecord>> {
        let sql = format!(
            "SELECT {} FROM file_cache WHERE hash = ?1 AND (?2 IS NULL OR folder_label = ?2) \
             ORDER BY folder_label, path",
            RECORD_COLUMNS
        );
        let mut stmt = self.connection().prepare_cached(&sql)?;
        let records = stmt
            .query_map(params![hash, folder_label], row_to_record)?
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Sizes held by two or more rows of a label, ascending.
    pub fn size_collisions(&self, folder_label: &str) -> Result<Vec<u64>> {
        let mut stmt = self.connection().prepare(
            "SELECT size FROM file_cache WHERE folder_label = ?1 \
             GROUP BY size HAVING COUNT(*) >= 2 ORDER BY size",
        )?;
        let sizes = stmt
            .query_map(params![folder_label], |row| row.get::<_, i64>(0))?
            .map(|size| size.map(|s| s as u64))
            .collect::<Result<Vec<_>>>()?;
        Ok(sizes)
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Upsert keyed by (path, folder_label). `last_checked` is stamped here.
    pub fn put(&self, record: &CachedFileRecord) -> Result<()> {
        let mut stmt = self.connection().prepare_cached(UPSERT_SQL)?;
        execute_upsert(&mut stmt, record, now_timestamp())?;
        Ok(())
    }

    /// Same as [`HashStore::put`] for many records, in one transaction.
    pub fn put_many(&self, records: &[CachedFileRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let now = now_timestamp();
        let tx = self.connection().unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
            for record in records {
                count += execute_upsert(&mut stmt, record, now)?;
            }
        }
        tx.commit()?;
        debug!("Upserted {} cache records", count);
        Ok(count)
    }

    pub fn remove(&self, path: &str, folder_label: &str) -> Result<bool> {
        let removed = self.connection().execute(
            "DELETE FROM file_cache WHERE path = ?1 AND folder_label = ?2",
            params![path, folder_label],
        )?;
        Ok(removed > 0)
    }

    pub fn remove_many(&self, keys: &[(String, String)]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let tx = self.connection().unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt =
                tx.prepare_cached("DELETE FROM file_cache WHERE path = ?1 AND folder_label = ?2")?;
            for (path, label) in keys {
                count += stmt.execute(params![path, label])?;
            }
        }
        tx.commit()?;
        debug!("Removed {} cache records", count);
        Ok(count)
    }

    /// Point a row at a new path, e.g. after the file was moved.
    /// Any row already stored under the new path is replaced.
    pub fn relocate(&self, old_path: &str, folder_label: &str, new_path: &str) -> Result<bool> {
        let tx = self.connection().unchecked_transaction()?;
        tx.execute(
            "DELETE FROM file_cache WHERE path = ?1 AND folder_label = ?2",
            params![new_path, folder_label],
        )?;
        let moved = tx.execute(
            "UPDATE file_cache SET path = ?1, last_checked = ?2 \
             WHERE path = ?3 AND folder_label = ?4",
            params![new_path, now_timestamp(), old_path, folder_label],
        )?;
        tx.commit()?;
        Ok(moved > 0)
    }

    /// Drops every row. The only bulk deletion the store performs.
    pub fn clear(&self) -> Result<usize> {
        let removed = self.connection().execute("DELETE FROM file_cache", [])?;
        debug!("Hash store cleared ({} rows)", removed);
        Ok(removed)
    }

    // ── Statistics ───────────────────────────────────────────────

    pub fn stats(&self) -> Result<StoreStats> {
        let (total, hashed, unique_sizes): (i64, i64, i64) = self.connection().query_row(
            "SELECT COUNT(*), COUNT(hash), COUNT(DISTINCT size) FROM file_cache",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let collision_groups: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM (SELECT size FROM file_cache GROUP BY size HAVING COUNT(*) >= 2)",
            [],
            |row| row.get(0),
        )?;
        let store_size_bytes = self
            .path()
            .and_then(|p| fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StoreStats {
            total: total as u64,
            hashed: hashed as u64,
            unhashed: (total - hashed) as u64,
            unique_sizes: unique_sizes as u64,
            collision_groups: collision_groups as u64,
            store_size_bytes,
        })
    }
}

fn execute_upsert(
    stmt: &mut rusqlite::CachedStatement<'_>,
    record: &CachedFileRecord,
    now: f64,
) -> Result<usize> {
    // A record without a hash never carries hash metadata.
    let (kind, sampled) = match record.hash {
        Some(_) => (
            record.hash_kind.map(|k| k.as_str()),
            record.sampled_bytes.map(|n| n as i64),
        ),
        None => (None, None),
    };
    stmt.execute(params![
        record.path,
        record.folder_label,
        record.size as i64,
        record.mtime,
        record.hash,
        kind,
        sampled,
        now,
    ])
}
