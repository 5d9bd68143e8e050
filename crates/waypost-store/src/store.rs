//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use waypost_types::{Fix, now_millis};

use crate::error::{Error, Result};
use crate::models::LocationRecord;
use crate::schema;

/// Operational default for the unsent delivery window.
///
/// Bounds both the outbound request payload and the memory held by a cycle.
pub const DEFAULT_BATCH_LIMIT: usize = 50;

/// Delivered records older than this are eligible for purge.
pub const RETENTION_WINDOW_MS: i64 = 7 * 24 * 60 * 60 * 1000;

const INSERT_SQL: &str = "INSERT INTO locations \
     (latitude, longitude, accuracy, altitude, speed, bearing, timestamp, provider, sent) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)";

const SELECT_COLUMNS: &str =
    "id, latitude, longitude, accuracy, altitude, speed, bearing, timestamp, provider, sent";

/// SQLite-backed durable queue of location records.
///
/// A `Store` owns a single connection; mutating operations must be
/// serialized by the caller (the service wraps the store in a
/// `tokio::sync::Mutex`), which also gives readers a consistent snapshot.
pub struct Store {
    conn: Connection,
    unsent_tx: watch::Sender<u64>,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        // WAL keeps the producer's inserts cheap while a cycle reads
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        Self::with_connection(conn)
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        schema::initialize(&conn)?;
        let count = count_unsent(&conn)?;
        let (unsent_tx, _) = watch::channel(count);
        Ok(Self { conn, unsent_tx })
    }

    // === Location queue operations ===

    /// Insert a single fix, returning the store-assigned id.
    ///
    /// A fix without a timestamp is stamped with the current time.
    pub fn insert(&self, fix: &Fix) -> Result<i64> {
        let timestamp = fix.timestamp.unwrap_or_else(now_millis);

        self.conn.execute(
            INSERT_SQL,
            rusqlite::params![
                fix.latitude,
                fix.longitude,
                fix.accuracy,
                fix.altitude,
                fix.speed,
                fix.bearing,
                timestamp,
                fix.provider,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted location {} at t={}", id, timestamp);
        self.refresh_unsent();
        Ok(id)
    }

    /// Insert a batch of fixes as a single unit.
    ///
    /// Either every fix is durably recorded or none are; a crash mid-insert
    /// never leaves a partial backlog.
    pub fn insert_batch(&self, fixes: &[Fix]) -> Result<Vec<i64>> {
        let tx = self.conn.unchecked_transaction()?;
        let mut ids = Vec::with_capacity(fixes.len());
        {
            let mut stmt = tx.prepare(INSERT_SQL)?;
            for fix in fixes {
                let timestamp = fix.timestamp.unwrap_or_else(now_millis);
                stmt.execute(rusqlite::params![
                    fix.latitude,
                    fix.longitude,
                    fix.accuracy,
                    fix.altitude,
                    fix.speed,
                    fix.bearing,
                    timestamp,
                    fix.provider,
                ])?;
                ids.push(tx.last_insert_rowid());
            }
        }
        tx.commit()?;

        debug!("Inserted batch of {} locations", ids.len());
        self.refresh_unsent();
        Ok(ids)
    }

    /// The oldest unsent records, ascending by timestamp, at most `limit`.
    ///
    /// Oldest-first delivery means a crash mid-backlog never starves old
    /// data.
    pub fn unsent_batch(&self, limit: usize) -> Result<Vec<LocationRecord>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM locations \
             WHERE sent = 0 ORDER BY timestamp ASC LIMIT ?"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([limit as i64], map_location)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Number of records not yet delivered.
    pub fn unsent_count(&self) -> Result<u64> {
        count_unsent(&self.conn)
    }

    /// Subscribe to live updates of the unsent count.
    ///
    /// The value is pushed after every mutating operation; presentation
    /// collaborators poll nothing.
    pub fn subscribe_unsent(&self) -> watch::Receiver<u64> {
        self.unsent_tx.subscribe()
    }

    /// Mark exactly the given ids as sent.
    ///
    /// Idempotent: unknown ids and already-sent ids are silently ignored,
    /// and no other record is affected. Returns the number of rows changed.
    pub fn mark_sent(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("UPDATE locations SET sent = 1 WHERE id IN ({placeholders})");
        let changed = self
            .conn
            .execute(&sql, rusqlite::params_from_iter(ids.iter()))?;

        debug!("Marked {} of {} locations as sent", changed, ids.len());
        self.refresh_unsent();
        Ok(changed)
    }

    /// Delete delivered records older than the cutoff.
    ///
    /// Unsent records are never deleted here, regardless of age; undelivered
    /// samples must not be lost silently.
    pub fn purge_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        let purged = self.conn.execute(
            "DELETE FROM locations WHERE sent = 1 AND timestamp < ?",
            [cutoff_ms],
        )?;

        if purged > 0 {
            info!("Purged {} delivered locations older than {}", purged, cutoff_ms);
        }
        self.refresh_unsent();
        Ok(purged)
    }

    /// Administrative full reset of the location queue.
    pub fn delete_all(&self) -> Result<usize> {
        let deleted = self.conn.execute("DELETE FROM locations", [])?;
        info!("Deleted all {} locations", deleted);
        self.refresh_unsent();
        Ok(deleted)
    }

    /// The most recent record by timestamp, sent or not.
    ///
    /// This is the previous fix the significance filter compares against.
    pub fn last_record(&self) -> Result<Option<LocationRecord>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM locations ORDER BY timestamp DESC LIMIT 1"
        );
        let record = self
            .conn
            .prepare(&sql)?
            .query_row([], map_location)
            .optional()?;
        Ok(record)
    }

    /// The newest records, descending by timestamp, for presentation.
    pub fn recent(&self, limit: usize) -> Result<Vec<LocationRecord>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM locations ORDER BY timestamp DESC LIMIT ?"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([limit as i64], map_location)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // === Settings operations ===

    /// Read a setting value.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM settings WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Write a setting value, replacing any previous one.
    pub fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    /// Remove a setting.
    pub fn delete_setting(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?", [key])?;
        Ok(())
    }

    /// Push the current unsent count to subscribers.
    ///
    /// Counter refresh is best-effort: a failure here must not turn an
    /// already-committed mutation into an error.
    fn refresh_unsent(&self) {
        match count_unsent(&self.conn) {
            Ok(count) => {
                self.unsent_tx.send_replace(count);
            }
            Err(e) => warn!("Failed to refresh unsent counter: {}", e),
        }
    }
}

fn count_unsent(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM locations WHERE sent = 0",
        [],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

fn map_location(row: &rusqlite::Row<'_>) -> rusqlite::Result<LocationRecord> {
    Ok(LocationRecord {
        id: row.get(0)?,
        latitude: row.get(1)?,
        longitude: row.get(2)?,
        accuracy: row.get(3)?,
        altitude: row.get(4)?,
        speed: row.get(5)?,
        bearing: row.get(6)?,
        timestamp: row.get(7)?,
        provider: row.get(8)?,
        sent: row.get::<_, i64>(9)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix_at(lat: f64, lon: f64, timestamp: i64) -> Fix {
        Fix::new(lat, lon, 5.0).timestamp(timestamp)
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.unsent_count().unwrap(), 0);
        assert!(store.last_record().unwrap().is_none());
    }

    #[test]
    fn test_insert_assigns_ids_and_stamps_time() {
        let store = Store::open_in_memory().unwrap();

        let id1 = store.insert(&Fix::new(1.0, 2.0, 3.0)).unwrap();
        let id2 = store.insert(&Fix::new(1.0, 2.0, 3.0)).unwrap();
        assert!(id2 > id1);

        let record = store.last_record().unwrap().unwrap();
        // No timestamp supplied, so the store stamped it
        assert!(record.timestamp > 1_577_836_800_000);
        assert!(!record.sent);
    }

    #[test]
    fn test_insert_keeps_supplied_timestamp() {
        let store = Store::open_in_memory().unwrap();
        let id = store.insert(&fix_at(1.0, 2.0, 12_345)).unwrap();

        let batch = store.unsent_batch(10).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, id);
        assert_eq!(batch[0].timestamp, 12_345);
    }

    #[test]
    fn test_unsent_batch_ascending_and_limited() {
        let store = Store::open_in_memory().unwrap();

        // Insert out of timestamp order
        for t in [300_i64, 100, 500, 200, 400] {
            store.insert(&fix_at(0.0, 0.0, t)).unwrap();
        }

        let all = store.unsent_batch(10).unwrap();
        let times: Vec<i64> = all.iter().map(|r| r.timestamp).collect();
        assert_eq!(times, vec![100, 200, 300, 400, 500]);

        let limited = store.unsent_batch(3).unwrap();
        let times: Vec<i64> = limited.iter().map(|r| r.timestamp).collect();
        assert_eq!(times, vec![100, 200, 300]);
    }

    #[test]
    fn test_mark_sent_affects_exactly_the_given_ids() {
        let store = Store::open_in_memory().unwrap();
        let mut ids = Vec::new();
        for t in 0..5 {
            ids.push(store.insert(&fix_at(0.0, 0.0, t)).unwrap());
        }
        assert_eq!(store.unsent_count().unwrap(), 5);

        let changed = store.mark_sent(&[ids[0], ids[1]]).unwrap();
        assert_eq!(changed, 2);
        assert_eq!(store.unsent_count().unwrap(), 3);

        let remaining = store.unsent_batch(10).unwrap();
        assert!(remaining.iter().all(|r| r.id != ids[0] && r.id != ids[1]));
    }

    #[test]
    fn test_mark_sent_is_idempotent_and_ignores_unknown_ids() {
        let store = Store::open_in_memory().unwrap();
        let id = store.insert(&fix_at(0.0, 0.0, 1)).unwrap();

        assert_eq!(store.mark_sent(&[id, 9999]).unwrap(), 1);
        assert_eq!(store.unsent_count().unwrap(), 0);

        // Second call changes nothing further
        store.mark_sent(&[id, 9999]).unwrap();
        assert_eq!(store.unsent_count().unwrap(), 0);

        assert_eq!(store.mark_sent(&[]).unwrap(), 0);
    }

    #[test]
    fn test_purge_never_removes_unsent_records() {
        let store = Store::open_in_memory().unwrap();
        let old_unsent = store.insert(&fix_at(0.0, 0.0, 10)).unwrap();
        let old_sent = store.insert(&fix_at(0.0, 0.0, 20)).unwrap();
        let fresh_sent = store.insert(&fix_at(0.0, 0.0, 5_000)).unwrap();
        store.mark_sent(&[old_sent, fresh_sent]).unwrap();

        let purged = store.purge_older_than(1_000).unwrap();
        assert_eq!(purged, 1);

        // The ancient unsent record survived
        let batch = store.unsent_batch(10).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, old_unsent);

        // The fresh sent record survived too
        let recent = store.recent(10).unwrap();
        assert!(recent.iter().any(|r| r.id == fresh_sent));
        assert!(recent.iter().all(|r| r.id != old_sent));
    }

    #[test]
    fn test_insert_batch_is_atomic_unit() {
        let store = Store::open_in_memory().unwrap();
        let fixes: Vec<Fix> = (0..10).map(|t| fix_at(0.0, 0.0, t)).collect();

        let ids = store.insert_batch(&fixes).unwrap();
        assert_eq!(ids.len(), 10);
        assert_eq!(store.unsent_count().unwrap(), 10);

        // Ids are distinct and monotonically increasing
        for pair in ids.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_delete_all() {
        let store = Store::open_in_memory().unwrap();
        for t in 0..3 {
            store.insert(&fix_at(0.0, 0.0, t)).unwrap();
        }
        assert_eq!(store.delete_all().unwrap(), 3);
        assert_eq!(store.unsent_count().unwrap(), 0);
        assert!(store.last_record().unwrap().is_none());
    }

    #[test]
    fn test_last_record_includes_sent_records() {
        let store = Store::open_in_memory().unwrap();
        store.insert(&fix_at(1.0, 1.0, 100)).unwrap();
        let newest = store.insert(&fix_at(2.0, 2.0, 200)).unwrap();
        store.mark_sent(&[newest]).unwrap();

        // The filter compares against the newest stored fix even when it
        // has already been delivered
        let last = store.last_record().unwrap().unwrap();
        assert_eq!(last.id, newest);
        assert!(last.sent);
    }

    #[test]
    fn test_unsent_watch_pushes_updates() {
        let store = Store::open_in_memory().unwrap();
        let rx = store.subscribe_unsent();
        assert_eq!(*rx.borrow(), 0);

        let id = store.insert(&fix_at(0.0, 0.0, 1)).unwrap();
        assert_eq!(*rx.borrow(), 1);

        store.insert(&fix_at(0.0, 0.0, 2)).unwrap();
        assert_eq!(*rx.borrow(), 2);

        store.mark_sent(&[id]).unwrap();
        assert_eq!(*rx.borrow(), 1);

        store.delete_all().unwrap();
        assert_eq!(*rx.borrow(), 0);
    }

    #[test]
    fn test_settings_round_trip() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_setting("device_id").unwrap().is_none());

        store.put_setting("device_id", "abc-123").unwrap();
        assert_eq!(store.get_setting("device_id").unwrap().as_deref(), Some("abc-123"));

        store.put_setting("device_id", "def-456").unwrap();
        assert_eq!(store.get_setting("device_id").unwrap().as_deref(), Some("def-456"));

        store.delete_setting("device_id").unwrap();
        assert!(store.get_setting("device_id").unwrap().is_none());
    }

    #[test]
    fn test_reopen_preserves_queue_and_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.db");

        {
            let store = Store::open(&path).unwrap();
            store.insert(&fix_at(1.0, 2.0, 100)).unwrap();
            store.put_setting("device_id", "persisted").unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.unsent_count().unwrap(), 1);
        assert_eq!(
            store.get_setting("device_id").unwrap().as_deref(),
            Some("persisted")
        );
        // Reopened counter starts at the persisted backlog size
        assert_eq!(*store.subscribe_unsent().borrow(), 1);
    }

    #[test]
    fn test_window_scenario_120_unsent() {
        let store = Store::open_in_memory().unwrap();
        let fixes: Vec<Fix> = (0..120).map(|t| fix_at(0.0, 0.0, t)).collect();
        store.insert_batch(&fixes).unwrap();

        let window = store.unsent_batch(DEFAULT_BATCH_LIMIT).unwrap();
        assert_eq!(window.len(), 50);
        // Oldest 50 by timestamp
        assert_eq!(window.first().unwrap().timestamp, 0);
        assert_eq!(window.last().unwrap().timestamp, 49);

        let ids: Vec<i64> = window.iter().map(|r| r.id).collect();
        store.mark_sent(&ids).unwrap();
        assert_eq!(store.unsent_count().unwrap(), 70);

        // Next window starts where the last one ended
        let next = store.unsent_batch(DEFAULT_BATCH_LIMIT).unwrap();
        assert_eq!(next.first().unwrap().timestamp, 50);
    }
}
