// Relational Store - SQLite via rusqlite
//
// One table per entity type keyed by id, plus the place_amenity join table
// with a composite primary key on (place_id, amenity_id).
//
// Writes open a transaction lazily; flush() commits it. close() rolls back
// anything not yet flushed and drops the connection.

use super::StorageBackend;
use crate::codec::Mapping;
use crate::entities::{EntityKind, Record, BASE_FIELDS};
use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;

pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Entity tables
    // ==========================================================================
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS states (
            id TEXT PRIMARY KEY NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            name TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS cities (
            id TEXT PRIMARY KEY NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            state_id TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            email TEXT NOT NULL DEFAULT '',
            password TEXT NOT NULL DEFAULT '',
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS places (
            id TEXT PRIMARY KEY NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            city_id TEXT NOT NULL DEFAULT '',
            user_id TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            number_rooms INTEGER NOT NULL DEFAULT 0,
            number_bathrooms INTEGER NOT NULL DEFAULT 0,
            max_guest INTEGER NOT NULL DEFAULT 0,
            price_by_night INTEGER NOT NULL DEFAULT 0,
            latitude REAL NOT NULL DEFAULT 0.0,
            longitude REAL NOT NULL DEFAULT 0.0
        );

        CREATE TABLE IF NOT EXISTS reviews (
            id TEXT PRIMARY KEY NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            place_id TEXT NOT NULL DEFAULT '',
            user_id TEXT NOT NULL DEFAULT '',
            text TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS amenities (
            id TEXT PRIMARY KEY NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            name TEXT NOT NULL DEFAULT ''
        );

        -- Many-to-many: a pair is stored at most once
        CREATE TABLE IF NOT EXISTS place_amenity (
            place_id TEXT NOT NULL,
            amenity_id TEXT NOT NULL,
            PRIMARY KEY (place_id, amenity_id)
        );",
    )?;

    // ==========================================================================
    // Indexes (reverse lookups for the relationship resolver)
    // ==========================================================================
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_cities_state ON cities(state_id);
        CREATE INDEX IF NOT EXISTS idx_places_city ON places(city_id);
        CREATE INDEX IF NOT EXISTS idx_places_user ON places(user_id);
        CREATE INDEX IF NOT EXISTS idx_reviews_place ON reviews(place_id);
        CREATE INDEX IF NOT EXISTS idx_reviews_user ON reviews(user_id);
        CREATE INDEX IF NOT EXISTS idx_place_amenity_amenity ON place_amenity(amenity_id);",
    )?;

    Ok(())
}

/// Column list for a kind: base fields first, then the attribute allow-list
fn columns(kind: EntityKind) -> Vec<&'static str> {
    BASE_FIELDS.iter().chain(kind.fields()).copied().collect()
}

fn to_sql(value: Option<&Value>) -> SqlValue {
    match value {
        None | Some(Value::Null) => SqlValue::Null,
        Some(Value::Bool(b)) => SqlValue::Integer(*b as i64),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Some(Value::String(s)) => SqlValue::Text(s.clone()),
        Some(other) => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
    }
}

fn read_row(cols: &[&str], row: &rusqlite::Row<'_>) -> rusqlite::Result<Mapping> {
    let mut map = Mapping::new();
    for (i, col) in cols.iter().enumerate() {
        let value: SqlValue = row.get(i)?;
        map.insert(col.to_string(), from_sql(value));
    }
    Ok(map)
}

fn decode(kind: EntityKind, map: Mapping) -> StoreResult<Record> {
    Record::from_kind_mapping(kind, map).map_err(|e| StoreError::backend(e.to_string()))
}

pub struct DbStorage {
    conn: Mutex<Option<Connection>>,
}

impl DbStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        tracing::info!(path = %path.display(), "sqlite storage opened");
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        DbStorage {
            conn: Mutex::new(Some(conn)),
        }
    }

    fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let guard = self.conn.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| StoreError::backend("sqlite storage is closed"))?;
        f(conn)
    }

    /// Like `with_conn`, but inside the pending write transaction
    fn with_write<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        self.with_conn(|conn| {
            if conn.is_autocommit() {
                conn.execute_batch("BEGIN")?;
            }
            f(conn)
        })
    }
}

impl StorageBackend for DbStorage {
    fn name(&self) -> &'static str {
        "db"
    }

    fn get(&self, kind: EntityKind, id: &str) -> StoreResult<Option<Record>> {
        let cols = columns(kind);
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            cols.join(", "),
            kind.collection()
        );

        let map = self.with_conn(|conn| {
            Ok(conn
                .query_row(&sql, params![id], |row| read_row(&cols, row))
                .optional()?)
        })?;

        map.map(|m| decode(kind, m)).transpose()
    }

    fn all(&self, kind: EntityKind) -> StoreResult<Vec<Record>> {
        let cols = columns(kind);
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            cols.join(", "),
            kind.collection()
        );

        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| read_row(&cols, row))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(|m| decode(kind, m)).collect()
    }

    fn put(&self, record: &Record) -> StoreResult<()> {
        let kind = record.kind();
        let map = record.to_mapping()?;
        let cols = columns(kind);

        let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{}", i)).collect();
        let updates: Vec<String> = cols
            .iter()
            .filter(|c| **c != "id")
            .map(|c| format!("{} = excluded.{}", c, c))
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
            kind.collection(),
            cols.join(", "),
            placeholders.join(", "),
            updates.join(", ")
        );
        let values: Vec<SqlValue> = cols.iter().map(|c| to_sql(map.get(*c))).collect();

        tracing::debug!(key = %record.key(), "put");
        self.with_write(|conn| {
            conn.execute(&sql, params_from_iter(values))?;
            Ok(())
        })
    }

    fn delete(&self, kind: EntityKind, id: &str) -> StoreResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", kind.collection());
        tracing::debug!(kind = %kind, id = %id, "delete");
        self.with_write(|conn| Ok(conn.execute(&sql, params![id])? > 0))
    }

    fn count(&self, kind: EntityKind) -> StoreResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.collection());
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    fn link(&self, place_id: &str, amenity_id: &str) -> StoreResult<bool> {
        self.with_write(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO place_amenity (place_id, amenity_id) VALUES (?1, ?2)",
                params![place_id, amenity_id],
            )?;
            Ok(inserted > 0)
        })
    }

    fn unlink(&self, place_id: &str, amenity_id: &str) -> StoreResult<bool> {
        self.with_write(|conn| {
            let removed = conn.execute(
                "DELETE FROM place_amenity WHERE place_id = ?1 AND amenity_id = ?2",
                params![place_id, amenity_id],
            )?;
            Ok(removed > 0)
        })
    }

    fn amenity_ids(&self, place_id: &str) -> StoreResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT amenity_id FROM place_amenity WHERE place_id = ?1 ORDER BY rowid",
            )?;
            let ids = stmt
                .query_map(params![place_id], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    fn place_ids(&self, amenity_id: &str) -> StoreResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT place_id FROM place_amenity WHERE amenity_id = ?1 ORDER BY rowid",
            )?;
            let ids = stmt
                .query_map(params![amenity_id], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    fn link_count(&self) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM place_amenity", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    fn flush(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            if !conn.is_autocommit() {
                conn.execute_batch("COMMIT")?;
                tracing::debug!("transaction committed");
            }
            Ok(())
        })
    }

    fn rollback(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            if !conn.is_autocommit() {
                conn.execute_batch("ROLLBACK")?;
                tracing::debug!("transaction rolled back");
            }
            Ok(())
        })
    }

    fn close(&self) -> StoreResult<()> {
        let mut guard = self.conn.lock();
        if let Some(conn) = guard.take() {
            if !conn.is_autocommit() {
                tracing::warn!("closing with unflushed changes, rolling back");
                conn.execute_batch("ROLLBACK")?;
            }
            conn.close().map_err(|(_, e)| StoreError::from(e))?;
            tracing::info!("sqlite storage closed");
        }
        Ok(())
    }
}
