//! Event store — durable, queryable log of state transitions with bounded
//! size.
//!
//! The [`EventStore`] trait is the seam between the state monitor and the
//! backing SQL engine. One adapter ships ([`sqlite::SqliteStore`]); the
//! monitor never names an engine directly, so a networked engine can slot in
//! behind the same trait.
//!
//! Write discipline: the state monitor is the only writer. Records are
//! appended, optionally have their delivery flags flipped false→true once a
//! side effect completes, and are pruned by keep-last-N retention. Nothing
//! else mutates the table.

pub mod sqlite;

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Column model
// ---------------------------------------------------------------------------

/// Logical type tag for a stored field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
}

/// Key class of a column. Exactly one column per table is the primary key;
/// it is monotonically increasing and used for ordering and retention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKey {
    Plain,
    PrimaryKey,
    /// References the primary key of another table.
    ForeignKey(String),
}

/// Descriptor for one field of a stored event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub key: ColumnKey,
}

impl Column {
    pub const fn plain(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            key: ColumnKey::Plain,
        }
    }

    pub const fn primary(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            key: ColumnKey::PrimaryKey,
        }
    }
}

/// The canonical event-table schema.
///
/// ```text
/// timestamp       INTEGER PRIMARY KEY   seconds since epoch
/// state           TEXT    NOT NULL
/// conversation_id TEXT    NOT NULL
/// captured        INTEGER NOT NULL      0/1
/// notified        INTEGER NOT NULL      0/1
/// ```
pub fn event_columns() -> Vec<Column> {
    vec![
        Column::primary("timestamp", ColumnType::Integer),
        Column::plain("state", ColumnType::Text),
        Column::plain("conversation_id", ColumnType::Text),
        Column::plain("captured", ColumnType::Integer),
        Column::plain("notified", ColumnType::Integer),
    ]
}

// ---------------------------------------------------------------------------
// Event record
// ---------------------------------------------------------------------------

/// One row of the event table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Seconds since epoch; primary key; strictly increasing.
    pub timestamp: i64,
    /// Two-valued state domain, stored as text ("Open" / "Closed").
    pub state: String,
    /// Opaque token correlating this transition with downstream artifacts.
    pub conversation_id: String,
    /// Whether a capture artifact was produced for this transition.
    pub captured: bool,
    /// Whether a notification was delivered for this transition.
    pub notified: bool,
}

impl EventRecord {
    pub fn new(timestamp: i64, state: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            timestamp,
            state: state.into(),
            conversation_id: conversation_id.into(),
            captured: false,
            notified: false,
        }
    }
}

/// The only columns [`EventStore::update_field`] may touch. Arbitrary column
/// writes are unrepresentable by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFlag {
    Captured,
    Notified,
}

impl DeliveryFlag {
    pub const fn column(self) -> &'static str {
        match self {
            Self::Captured => "captured",
            Self::Notified => "notified",
        }
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Append-only table abstraction with bounded retention.
///
/// Individual operation failures are surfaced as typed errors and are not
/// retried here — retry policy belongs to the caller.
pub trait EventStore {
    /// Create the table if absent; no-op if it already exists with a
    /// matching shape. An incompatible existing table is a
    /// [`StoreError::Schema`].
    fn ensure_table(&mut self, name: &str, columns: &[Column]) -> Result<(), StoreError>;

    /// Append one row atomically.
    fn insert(&mut self, record: &EventRecord) -> Result<(), StoreError>;

    /// Append a batch atomically (all or nothing).
    fn insert_many(&mut self, records: &[EventRecord]) -> Result<(), StoreError>;

    /// The record with the maximum primary key, or `None` on an empty table.
    fn get_latest(&self) -> Result<Option<EventRecord>, StoreError>;

    /// The `n` most recent records, most-recent-first. Fewer than `n` rows
    /// returns all of them.
    fn get_last_n(&self, n: usize) -> Result<Vec<EventRecord>, StoreError>;

    /// Exact-match lookup by primary key; a miss is `None`, not an error.
    fn get_by_key(&self, key: i64) -> Result<Option<EventRecord>, StoreError>;

    /// Flip a delivery flag on an existing record. A missing key is
    /// [`StoreError::NotFound`].
    fn update_field(&mut self, key: i64, flag: DeliveryFlag, value: bool)
        -> Result<(), StoreError>;

    /// Retention pruning: delete every record whose key is not among the `n`
    /// largest. No-op when the table holds `n` rows or fewer. Returns the
    /// number of rows deleted.
    fn delete_all_except_last_n(&mut self, n: usize) -> Result<usize, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_schema_has_one_primary_key() {
        let cols = event_columns();
        let primaries = cols
            .iter()
            .filter(|c| c.key == ColumnKey::PrimaryKey)
            .count();
        assert_eq!(primaries, 1);
        assert_eq!(cols[0].name, "timestamp");
    }

    #[test]
    fn new_record_starts_undelivered() {
        let r = EventRecord::new(1000, "Open", "42");
        assert!(!r.captured);
        assert!(!r.notified);
    }

    #[test]
    fn delivery_flags_name_real_columns() {
        let names: Vec<_> = event_columns().iter().map(|c| c.name).collect();
        assert!(names.contains(&DeliveryFlag::Captured.column()));
        assert!(names.contains(&DeliveryFlag::Notified.column()));
    }
}
