//! Storage backends.
//!
//! [`StorageBackend`] is the single interface the registry talks to. Two
//! implementations exist and one of them is chosen once at startup from
//! configuration:
//!
//! - [`FileStorage`]: whole dataset resident in memory, flushed to one JSON
//!   file (write-to-temp-then-rename).
//! - [`DbStorage`]: one SQLite table per entity type plus a `place_amenity`
//!   join table; `flush` commits the open transaction.

pub mod db;
pub mod file;

pub use db::DbStorage;
pub use file::FileStorage;

use crate::config::{Config, StorageKind};
use crate::entities::{EntityKind, Record};
use crate::error::StoreResult;

/// Backend adapter contract, uniform across implementations.
///
/// Adapters do not enforce foreign keys and do not cascade; that is the
/// relationship resolver's job. Deleting an id that does not exist is not
/// an error at this level.
pub trait StorageBackend: Send + Sync {
    /// Short backend name for logs ("file", "db")
    fn name(&self) -> &'static str;

    fn get(&self, kind: EntityKind, id: &str) -> StoreResult<Option<Record>>;

    /// Every entity of `kind`. File backend: insertion order.
    fn all(&self, kind: EntityKind) -> StoreResult<Vec<Record>>;

    /// Insert or overwrite by id (idempotent).
    fn put(&self, record: &Record) -> StoreResult<()>;

    /// Remove by id. Returns `true` if something was removed.
    fn delete(&self, kind: EntityKind, id: &str) -> StoreResult<bool>;

    fn count(&self, kind: EntityKind) -> StoreResult<usize>;

    /// Add a (place, amenity) edge. Returns `false` if the pair already existed.
    fn link(&self, place_id: &str, amenity_id: &str) -> StoreResult<bool>;

    /// Remove a (place, amenity) edge. Returns `false` if it was not there.
    fn unlink(&self, place_id: &str, amenity_id: &str) -> StoreResult<bool>;

    /// Amenity ids linked to a place, in link order
    fn amenity_ids(&self, place_id: &str) -> StoreResult<Vec<String>>;

    /// Place ids linked to an amenity, in link order
    fn place_ids(&self, amenity_id: &str) -> StoreResult<Vec<String>>;

    /// Total number of (place, amenity) edges
    fn link_count(&self) -> StoreResult<usize>;

    /// Durably persist pending state.
    fn flush(&self) -> StoreResult<()>;

    /// Discard every change made since the last successful flush.
    fn rollback(&self) -> StoreResult<()>;

    /// Release backend resources. Idempotent; later operations fail.
    fn close(&self) -> StoreResult<()>;
}

/// Open the backend selected by `config`.
pub fn open_backend(config: &Config) -> StoreResult<Box<dyn StorageBackend>> {
    let backend: Box<dyn StorageBackend> = match config.storage {
        StorageKind::File => Box::new(FileStorage::open(&config.file_path)?),
        StorageKind::Db => Box::new(DbStorage::open(&config.db_path)?),
    };
    tracing::info!(backend = backend.name(), "storage backend opened");
    Ok(backend)
}
