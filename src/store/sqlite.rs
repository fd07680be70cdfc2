//! SQLite adapter for the event store.
//!
//! Uses a single `rusqlite` connection. SQLite serializes concurrent writers
//! through its own locking, which is all the single-writer design needs; no
//! additional locking is layered on top.
//!
//! All values travel through parameterized statements. Identifiers (table
//! name) cannot be bound as parameters, so they are validated against a
//! strict character set before interpolation.

use std::path::Path;

use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Column, ColumnKey, ColumnType, DeliveryFlag, EventRecord, EventStore};
use crate::error::StoreError;

/// Embedded single-file event store.
pub struct SqliteStore {
    conn: Connection,
    table: String,
}

impl SqliteStore {
    /// Open (or create) the store at `path`. Connection failures here are
    /// fatal and propagate to the caller.
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(backend)?;
        Self::with_connection(conn, table)
    }

    /// In-memory store for tests and dry runs.
    pub fn in_memory(table: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::with_connection(conn, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self, StoreError> {
        validate_identifier(table)?;
        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }

    /// The table this store was opened against.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
        Ok(EventRecord {
            timestamp: row.get(0)?,
            state: row.get(1)?,
            conversation_id: row.get(2)?,
            captured: row.get::<_, i64>(3)? != 0,
            notified: row.get::<_, i64>(4)? != 0,
        })
    }

    fn insert_row(conn: &Connection, table: &str, record: &EventRecord) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {table} (timestamp, state, conversation_id, captured, notified) \
             VALUES (?1, ?2, ?3, ?4, ?5)"
        );
        conn.execute(
            &sql,
            params![
                record.timestamp,
                record.state,
                record.conversation_id,
                i64::from(record.captured),
                i64::from(record.notified),
            ],
        )
        .map_err(backend)?;
        Ok(())
    }
}

impl EventStore for SqliteStore {
    fn ensure_table(&mut self, name: &str, columns: &[Column]) -> Result<(), StoreError> {
        validate_identifier(name)?;
        for col in columns {
            validate_identifier(col.name)?;
        }

        let exists: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;

        if exists.is_some() {
            return check_shape(&self.conn, name, columns);
        }

        let body: Vec<String> = columns
            .iter()
            .map(|c| {
                let ty = sql_type(c.ty);
                match &c.key {
                    ColumnKey::PrimaryKey => format!("{} {} PRIMARY KEY", c.name, ty),
                    ColumnKey::Plain => format!("{} {} NOT NULL", c.name, ty),
                    ColumnKey::ForeignKey(other) => {
                        format!("{} {} NOT NULL REFERENCES {}", c.name, ty, other)
                    }
                }
            })
            .collect();
        let sql = format!("CREATE TABLE {} ({})", name, body.join(", "));
        self.conn.execute(&sql, []).map_err(backend)?;
        debug!("created table '{}'", name);
        Ok(())
    }

    fn insert(&mut self, record: &EventRecord) -> Result<(), StoreError> {
        Self::insert_row(&self.conn, &self.table, record)
    }

    fn insert_many(&mut self, records: &[EventRecord]) -> Result<(), StoreError> {
        let tx = self.conn.transaction().map_err(backend)?;
        for record in records {
            Self::insert_row(&tx, &self.table, record)?;
        }
        tx.commit().map_err(backend)?;
        Ok(())
    }

    fn get_latest(&self) -> Result<Option<EventRecord>, StoreError> {
        let sql = format!(
            "SELECT timestamp, state, conversation_id, captured, notified \
             FROM {} ORDER BY timestamp DESC LIMIT 1",
            self.table
        );
        self.conn
            .query_row(&sql, [], Self::map_row)
            .optional()
            .map_err(backend)
    }

    fn get_last_n(&self, n: usize) -> Result<Vec<EventRecord>, StoreError> {
        let sql = format!(
            "SELECT timestamp, state, conversation_id, captured, notified \
             FROM {} ORDER BY timestamp DESC LIMIT ?1",
            self.table
        );
        let mut stmt = self.conn.prepare(&sql).map_err(backend)?;
        let rows = stmt
            .query_map(params![n as i64], Self::map_row)
            .map_err(backend)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(backend)
    }

    fn get_by_key(&self, key: i64) -> Result<Option<EventRecord>, StoreError> {
        let sql = format!(
            "SELECT timestamp, state, conversation_id, captured, notified \
             FROM {} WHERE timestamp = ?1",
            self.table
        );
        self.conn
            .query_row(&sql, params![key], Self::map_row)
            .optional()
            .map_err(backend)
    }

    fn update_field(
        &mut self,
        key: i64,
        flag: DeliveryFlag,
        value: bool,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE timestamp = ?2",
            self.table,
            flag.column()
        );
        let changed = self
            .conn
            .execute(&sql, params![i64::from(value), key])
            .map_err(backend)?;
        if changed == 0 {
            return Err(StoreError::NotFound(key));
        }
        Ok(())
    }

    fn delete_all_except_last_n(&mut self, n: usize) -> Result<usize, StoreError> {
        let sql = format!(
            "DELETE FROM {table} WHERE timestamp NOT IN \
             (SELECT timestamp FROM {table} ORDER BY timestamp DESC LIMIT ?1)",
            table = self.table
        );
        let deleted = self
            .conn
            .execute(&sql, params![n as i64])
            .map_err(backend)?;
        if deleted > 0 {
            debug!("retention: pruned {} row(s) from '{}'", deleted, self.table);
        }
        Ok(deleted)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn sql_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Integer => "INTEGER",
        ColumnType::Float => "REAL",
        ColumnType::Text => "TEXT",
    }
}

/// Identifiers are interpolated into SQL text, so restrict them to a safe
/// character set up front.
fn validate_identifier(name: &str) -> Result<(), StoreError> {
    let ok = !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::Schema(format!("invalid identifier {name:?}")))
    }
}

/// Compare an existing table's shape (column names + declared types, in
/// order) against the requested columns.
fn check_shape(conn: &Connection, name: &str, columns: &[Column]) -> Result<(), StoreError> {
    let sql = format!("PRAGMA table_info({name})");
    let mut stmt = conn.prepare(&sql).map_err(backend)?;
    let existing: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))
        .map_err(backend)?
        .collect::<rusqlite::Result<_>>()
        .map_err(backend)?;

    if existing.len() != columns.len() {
        return Err(StoreError::Schema(format!(
            "table '{}' has {} column(s), expected {}",
            name,
            existing.len(),
            columns.len()
        )));
    }
    for (have, want) in existing.iter().zip(columns) {
        let want_ty = sql_type(want.ty);
        if have.0 != want.name || !have.1.eq_ignore_ascii_case(want_ty) {
            return Err(StoreError::Schema(format!(
                "table '{}': found column {} {}, expected {} {}",
                name, have.0, have.1, want.name, want_ty
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::event_columns;

    fn fresh() -> SqliteStore {
        let mut s = SqliteStore::in_memory("door_events").unwrap();
        s.ensure_table("door_events", &event_columns()).unwrap();
        s
    }

    #[test]
    fn ensure_table_is_idempotent() {
        let mut s = fresh();
        s.ensure_table("door_events", &event_columns()).unwrap();
    }

    #[test]
    fn ensure_table_rejects_incompatible_shape() {
        let mut s = SqliteStore::in_memory("door_events").unwrap();
        s.conn
            .execute("CREATE TABLE door_events (timestamp INTEGER PRIMARY KEY)", [])
            .unwrap();
        let err = s.ensure_table("door_events", &event_columns()).unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));
    }

    #[test]
    fn ensure_table_rejects_bad_identifier() {
        let mut s = SqliteStore::in_memory("door_events").unwrap();
        let err = s
            .ensure_table("door_events; DROP TABLE x", &event_columns())
            .unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));
    }

    #[test]
    fn insert_get_by_key_roundtrip() {
        let mut s = fresh();
        let rec = EventRecord::new(1_700_000_000, "Open", "3182910544");
        s.insert(&rec).unwrap();
        let got = s.get_by_key(1_700_000_000).unwrap().unwrap();
        assert_eq!(got, rec);
    }

    #[test]
    fn get_latest_on_empty_table_is_none() {
        let s = fresh();
        assert_eq!(s.get_latest().unwrap(), None);
    }

    #[test]
    fn get_by_key_miss_is_none() {
        let s = fresh();
        assert_eq!(s.get_by_key(12345).unwrap(), None);
    }

    #[test]
    fn get_latest_returns_max_key() {
        let mut s = fresh();
        s.insert(&EventRecord::new(100, "Open", "a")).unwrap();
        s.insert(&EventRecord::new(200, "Closed", "b")).unwrap();
        s.insert(&EventRecord::new(150, "Open", "c")).unwrap();
        assert_eq!(s.get_latest().unwrap().unwrap().timestamp, 200);
    }

    #[test]
    fn get_last_n_orders_most_recent_first() {
        let mut s = fresh();
        for ts in [100, 200, 300] {
            s.insert(&EventRecord::new(ts, "Open", "x")).unwrap();
        }
        let rows = s.get_last_n(2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, 300);
        assert_eq!(rows[1].timestamp, 200);
    }

    #[test]
    fn get_last_n_with_fewer_rows_returns_all() {
        let mut s = fresh();
        s.insert(&EventRecord::new(100, "Open", "x")).unwrap();
        assert_eq!(s.get_last_n(10).unwrap().len(), 1);
    }

    #[test]
    fn insert_many_is_atomic_per_batch() {
        let mut s = fresh();
        let batch = vec![
            EventRecord::new(100, "Open", "a"),
            EventRecord::new(200, "Closed", "b"),
        ];
        s.insert_many(&batch).unwrap();
        assert_eq!(s.get_last_n(10).unwrap().len(), 2);

        // Duplicate key inside the batch rolls the whole batch back.
        let bad = vec![
            EventRecord::new(300, "Open", "c"),
            EventRecord::new(300, "Closed", "d"),
        ];
        assert!(s.insert_many(&bad).is_err());
        assert_eq!(s.get_last_n(10).unwrap().len(), 2);
    }

    #[test]
    fn duplicate_primary_key_is_backend_error() {
        let mut s = fresh();
        s.insert(&EventRecord::new(100, "Open", "a")).unwrap();
        let err = s.insert(&EventRecord::new(100, "Closed", "b")).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn update_field_flips_flags() {
        let mut s = fresh();
        s.insert(&EventRecord::new(100, "Open", "a")).unwrap();
        s.update_field(100, DeliveryFlag::Captured, true).unwrap();
        s.update_field(100, DeliveryFlag::Notified, true).unwrap();
        let rec = s.get_by_key(100).unwrap().unwrap();
        assert!(rec.captured);
        assert!(rec.notified);
    }

    #[test]
    fn update_field_missing_key_is_not_found() {
        let mut s = fresh();
        let err = s.update_field(999, DeliveryFlag::Notified, true).unwrap_err();
        assert_eq!(err, StoreError::NotFound(999));
    }

    #[test]
    fn retention_keeps_last_n() {
        let mut s = fresh();
        for ts in [100, 200, 300, 400, 500] {
            s.insert(&EventRecord::new(ts, "Open", "x")).unwrap();
        }
        let deleted = s.delete_all_except_last_n(2).unwrap();
        assert_eq!(deleted, 3);
        let rows = s.get_last_n(10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, 500);
        assert_eq!(rows[1].timestamp, 400);
    }

    #[test]
    fn retention_noop_when_at_or_under_n() {
        let mut s = fresh();
        s.insert(&EventRecord::new(100, "Open", "x")).unwrap();
        s.insert(&EventRecord::new(200, "Closed", "y")).unwrap();
        assert_eq!(s.delete_all_except_last_n(2).unwrap(), 0);
        assert_eq!(s.delete_all_except_last_n(5).unwrap(), 0);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");
        {
            let mut s = SqliteStore::open(&path, "door_events").unwrap();
            s.ensure_table("door_events", &event_columns()).unwrap();
            s.insert(&EventRecord::new(100, "Open", "a")).unwrap();
        }
        let s = SqliteStore::open(&path, "door_events").unwrap();
        assert_eq!(s.get_latest().unwrap().unwrap().conversation_id, "a");
    }
}
