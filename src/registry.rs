// Object Registry - backend-agnostic facade over one StorageBackend
//
// Callers register() entities, then save() writes every registered entity
// through the adapter (refreshing updated_at) and flushes. Registered but
// unsaved entities are invisible to get/all/count.
//
// The registry owns the authoritative state: values handed out by get/all
// are copies and must be registered + saved again to be durable.

use crate::config::Config;
use crate::entities::{Entity, EntityKind, Record};
use crate::error::{StoreError, StoreResult};
use crate::relations::{CascadeReport, Relations};
use crate::storage::{self, StorageBackend};
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;

/// A registered entity; `seq` changes every time the slot is re-registered
struct Staged {
    seq: u64,
    record: Record,
}

#[derive(Default)]
struct Pending {
    staged: Vec<Staged>,
    next_seq: u64,
}

pub struct Registry {
    backend: Box<dyn StorageBackend>,
    /// Identity map of registered, not yet saved entities (one state per key)
    pending: Mutex<Pending>,
    /// Held for every write-then-flush unit (save, cascade, link) so one
    /// unit's rollback never discards another's writes
    writing: Mutex<()>,
}

impl Registry {
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Registry {
            backend,
            pending: Mutex::new(Pending::default()),
            writing: Mutex::new(()),
        }
    }

    /// Open the backend chosen by `config`. The choice is fixed for the
    /// lifetime of the registry.
    pub fn initialize(config: &Config) -> StoreResult<Self> {
        let backend = storage::open_backend(config)?;
        Ok(Self::new(backend))
    }

    /// Close the backend. Idempotent.
    pub fn shutdown(&self) -> StoreResult<()> {
        let dropped = self.pending.lock().staged.len();
        if dropped > 0 {
            tracing::warn!(dropped, "shutting down with unsaved entities");
        }
        self.backend.close()
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    pub fn relations(&self) -> Relations<'_> {
        Relations::new(self)
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Typed lookup; a missing id is `Ok(None)`, never an error
    pub fn get<E: Entity>(&self, id: &str) -> StoreResult<Option<E>> {
        Ok(self.get_record(E::KIND, id)?.and_then(E::from_record))
    }

    pub fn get_record(&self, kind: EntityKind, id: &str) -> StoreResult<Option<Record>> {
        self.backend.get(kind, id)
    }

    /// Lookup by type name ("Place" or "places")
    pub fn get_by_name(&self, type_name: &str, id: &str) -> StoreResult<Option<Record>> {
        self.get_record(type_name.parse()?, id)
    }

    /// Snapshot of every saved entity of type `E`
    pub fn all<E: Entity>(&self) -> StoreResult<Vec<E>> {
        Ok(self
            .all_records(E::KIND)?
            .into_iter()
            .filter_map(E::from_record)
            .collect())
    }

    pub fn all_records(&self, kind: EntityKind) -> StoreResult<Vec<Record>> {
        self.backend.all(kind)
    }

    pub fn count(&self, kind: EntityKind) -> StoreResult<usize> {
        self.backend.count(kind)
    }

    pub fn count_by_name(&self, type_name: &str) -> StoreResult<usize> {
        self.count(type_name.parse()?)
    }

    /// Per-type counts keyed by collection name ("places", "states", ...)
    pub fn stats(&self) -> StoreResult<BTreeMap<&'static str, usize>> {
        EntityKind::ALL
            .iter()
            .map(|kind| Ok((kind.collection(), self.count(*kind)?)))
            .collect()
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Register an entity for the next save(). Re-registering the same id
    /// replaces the staged state.
    pub fn register<R: Into<Record>>(&self, entity: R) {
        let record = entity.into();
        let mut pending = self.pending.lock();
        let seq = pending.next_seq;
        pending.next_seq += 1;

        let slot = pending
            .staged
            .iter_mut()
            .find(|s| s.record.kind() == record.kind() && s.record.id() == record.id());
        match slot {
            Some(slot) => *slot = Staged { seq, record },
            None => pending.staged.push(Staged { seq, record }),
        }
    }

    /// Write every registered entity through the adapter, then flush.
    ///
    /// Returns how many entities were written. Saving with nothing
    /// registered still flushes. On failure the backend is rolled back and
    /// every entity stays registered, so a later save retries all of them.
    pub fn save(&self) -> StoreResult<usize> {
        let _writing = self.lock_writes();
        let batch: Vec<(u64, Record)> = self
            .pending
            .lock()
            .staged
            .iter()
            .map(|s| (s.seq, s.record.clone()))
            .collect();

        if let Err(error) = self.write_batch(&batch) {
            return Err(self.abort(error));
        }

        // entities re-registered while we were writing stay staged
        self.pending
            .lock()
            .staged
            .retain(|s| !batch.iter().any(|(seq, _)| *seq == s.seq));

        tracing::debug!(backend = self.backend.name(), written = batch.len(), "saved");
        Ok(batch.len())
    }

    fn write_batch(&self, batch: &[(u64, Record)]) -> StoreResult<()> {
        for (_, record) in batch {
            let mut record = record.clone();
            record.base_mut().touch();
            self.backend.put(&record)?;
        }
        self.backend.flush()
    }

    /// register + save for a single entity, returning the stored state.
    ///
    /// If the save fails the entity is unregistered again: the caller's
    /// request failed as a whole.
    pub fn persist<R: Into<Record>>(&self, entity: R) -> StoreResult<Record> {
        let record = entity.into();
        let (kind, id) = (record.kind(), record.id().to_string());
        self.register(record);
        if let Err(error) = self.save() {
            self.unregister(kind, &id);
            return Err(error);
        }
        self.get_record(kind, &id)?
            .ok_or_else(|| StoreError::not_found(kind.as_str(), id))
    }

    pub(crate) fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writing.lock()
    }

    /// Roll the backend back after a failed write unit; returns `error`
    pub(crate) fn abort(&self, error: StoreError) -> StoreError {
        tracing::warn!(backend = self.backend.name(), error = %error, "write failed, rolling back");
        if let Err(rollback) = self.backend.rollback() {
            tracing::error!(error = %rollback, "rollback failed");
        }
        error
    }

    /// Delete an entity and everything that depends on it.
    ///
    /// Fails with NotFound when the id is neither saved nor registered.
    pub fn delete(&self, record: &Record) -> StoreResult<CascadeReport> {
        self.delete_by_id(record.kind(), record.id())
    }

    pub fn delete_by_id(&self, kind: EntityKind, id: &str) -> StoreResult<CascadeReport> {
        let stored = self.backend.get(kind, id)?.is_some();
        let staged = self.unregister(kind, id);

        if !stored {
            if staged {
                return Ok(CascadeReport::default());
            }
            return Err(StoreError::not_found(kind.as_str(), id));
        }

        let report = self.relations().cascade_delete(kind, id)?;
        tracing::debug!(kind = %kind, id = %id, removed = report.total(), "deleted");
        Ok(report)
    }

    /// Remove one entity from the backend and the pending set, no cascade
    pub(crate) fn remove(&self, kind: EntityKind, id: &str) -> StoreResult<bool> {
        self.unregister(kind, id);
        self.backend.delete(kind, id)
    }

    fn unregister(&self, kind: EntityKind, id: &str) -> bool {
        let mut pending = self.pending.lock();
        let before = pending.staged.len();
        pending
            .staged
            .retain(|s| !(s.record.kind() == kind && s.record.id() == id));
        pending.staged.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Amenity, City, Place, State};
    use crate::storage::DbStorage;

    fn registry() -> Registry {
        Registry::new(Box::new(DbStorage::open_in_memory().unwrap()))
    }

    #[test]
    fn test_register_is_invisible_until_save() {
        let registry = registry();
        let state = State::new("California");
        registry.register(state.clone());

        assert!(registry.get::<State>(state.id()).unwrap().is_none());
        assert_eq!(registry.save().unwrap(), 1);
        assert!(registry.get::<State>(state.id()).unwrap().is_some());
    }

    #[test]
    fn test_save_refreshes_updated_at() {
        let registry = registry();
        let state = State::new("California");
        let created = state.base.created_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        registry.register(state.clone());
        registry.save().unwrap();

        let stored: State = registry.get(state.id()).unwrap().unwrap();
        assert_eq!(stored.base.created_at, created);
        assert!(stored.base.updated_at > created);
    }

    #[test]
    fn test_empty_save_is_ok() {
        let registry = registry();
        assert_eq!(registry.save().unwrap(), 0);
    }

    #[test]
    fn test_register_twice_keeps_last_state() {
        let registry = registry();
        let mut state = State::new("First");
        registry.register(state.clone());
        state.name = "Second".to_string();
        registry.register(state.clone());
        assert_eq!(registry.save().unwrap(), 1);

        let stored: State = registry.get(state.id()).unwrap().unwrap();
        assert_eq!(stored.name, "Second");
    }

    #[test]
    fn test_all_is_a_snapshot() {
        let registry = registry();
        registry.persist(State::new("A")).unwrap();
        let snapshot = registry.all::<State>().unwrap();
        registry.persist(State::new("B")).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.all::<State>().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_save_rolls_back_and_keeps_entities_staged() {
        let registry = registry();
        let state = State::new("California");
        let place = Place::new("c", "u", "Loft").with_coordinates(f64::NAN, 0.0);
        let amenity = Amenity::new("Wifi");
        registry.register(state.clone());
        registry.register(place.clone());
        registry.register(amenity.clone());

        assert!(registry.save().is_err());

        // a later flush must not commit the half-written batch
        registry.backend().flush().unwrap();
        assert!(registry.get::<State>(state.id()).unwrap().is_none());
        assert!(registry.get::<Amenity>(amenity.id()).unwrap().is_none());

        registry.register(place.clone().with_coordinates(37.7, -122.4));
        assert_eq!(registry.save().unwrap(), 3);
        assert!(registry.get::<State>(state.id()).unwrap().is_some());
        assert!(registry.get::<Place>(place.id()).unwrap().is_some());
        assert!(registry.get::<Amenity>(amenity.id()).unwrap().is_some());
    }

    #[test]
    fn test_failed_persist_unregisters_its_entity() {
        let registry = registry();
        let bad = Place::new("c", "u", "Loft").with_coordinates(f64::NAN, 0.0);
        assert!(registry.persist(bad.clone()).is_err());

        assert_eq!(registry.save().unwrap(), 0);
        registry.persist(State::new("Nevada")).unwrap();
        assert_eq!(registry.count(EntityKind::State).unwrap(), 1);
        assert!(registry.get::<Place>(bad.id()).unwrap().is_none());
    }

    #[test]
    fn test_unknown_type_name() {
        let registry = registry();
        assert!(matches!(
            registry.count_by_name("Spaceship"),
            Err(StoreError::UnknownType(_))
        ));
        assert!(matches!(
            registry.get_by_name("Spaceship", "x"),
            Err(StoreError::UnknownType(_))
        ));
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let registry = registry();
        let err = registry.delete_by_id(EntityKind::City, "nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_unsaved_unregisters() {
        let registry = registry();
        let city = City::new("s", "Staged");
        registry.register(city.clone());
        registry.delete(&city.clone().into()).unwrap();
        assert_eq!(registry.save().unwrap(), 0);
    }

    #[test]
    fn test_stats_lists_every_collection() {
        let registry = registry();
        registry.persist(State::new("A")).unwrap();
        let stats = registry.stats().unwrap();
        assert_eq!(stats.len(), 6);
        assert_eq!(stats["states"], 1);
        assert_eq!(stats["places"], 0);
    }
}
