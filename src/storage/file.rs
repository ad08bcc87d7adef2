// Serialized-File Store
//
// The whole dataset lives in memory as "Type.id" -> attribute mapping and is
// written to a single JSON file on flush. Amenity links are persisted in
// the same file as "PlaceAmenity.<place_id>.<amenity_id>" entries.
//
// File layout:
//   {
//     "State.<id>": {"__class__": "State", "id": ..., "name": ...},
//     "PlaceAmenity.<place_id>.<amenity_id>": {"__class__": "PlaceAmenity", ...},
//     ...
//   }
//
// One mutex guards the dataset. Every mutation and the full flush
// (serialize, write temp file, rename) run under it, so concurrent saves
// can never interleave into a torn file.

use super::StorageBackend;
use crate::codec::{split_key, storage_key, Mapping, CLASS_KEY};
use crate::entities::{EntityKind, Record};
use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Discriminator for persisted amenity links
pub const LINK_CLASS: &str = "PlaceAmenity";

#[derive(Default)]
struct Dataset {
    objects: HashMap<String, Mapping>,
    /// Keys in insertion order
    order: Vec<String>,
    links: Vec<(String, String)>,
    /// State as of the last flush, taken on the first change after it
    checkpoint: Option<Checkpoint>,
    closed: bool,
}

struct Checkpoint {
    objects: HashMap<String, Mapping>,
    order: Vec<String>,
    links: Vec<(String, String)>,
}

impl Dataset {
    /// Remember the flushed state before the first unflushed change
    fn begin(&mut self) {
        if self.checkpoint.is_none() {
            self.checkpoint = Some(Checkpoint {
                objects: self.objects.clone(),
                order: self.order.clone(),
                links: self.links.clone(),
            });
        }
    }

    fn restore(&mut self) -> bool {
        match self.checkpoint.take() {
            Some(saved) => {
                self.objects = saved.objects;
                self.order = saved.order;
                self.links = saved.links;
                true
            }
            None => false,
        }
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            Err(StoreError::backend("file storage is closed"))
        } else {
            Ok(())
        }
    }

    fn insert(&mut self, key: String, map: Mapping) {
        if self.objects.insert(key.clone(), map).is_none() {
            self.order.push(key);
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        if self.objects.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    fn to_file_mapping(&self) -> Mapping {
        let mut out = Mapping::new();
        for key in &self.order {
            if let Some(map) = self.objects.get(key) {
                out.insert(key.clone(), Value::Object(map.clone()));
            }
        }
        for (place_id, amenity_id) in &self.links {
            out.insert(
                format!("{}.{}.{}", LINK_CLASS, place_id, amenity_id),
                json!({
                    CLASS_KEY: LINK_CLASS,
                    "place_id": place_id,
                    "amenity_id": amenity_id,
                }),
            );
        }
        out
    }
}

pub struct FileStorage {
    path: PathBuf,
    data: Mutex<Dataset>,
}

impl FileStorage {
    /// Open the store at `path`, loading the file if there is one.
    ///
    /// A missing file starts an empty dataset. So does a corrupt one: it is
    /// logged and left on disk until the next flush overwrites it.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Mapping>(&bytes) {
                Ok(raw) => load_dataset(raw),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "corrupt storage file, starting empty");
                    Dataset::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no storage file yet, starting empty");
                Dataset::default()
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            path = %path.display(),
            objects = data.order.len(),
            links = data.links.len(),
            "file storage loaded"
        );

        Ok(FileStorage {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

fn load_dataset(raw: Mapping) -> Dataset {
    let mut data = Dataset::default();

    for (key, value) in raw {
        let map = match value {
            Value::Object(map) => map,
            _ => {
                tracing::warn!(key = %key, "skipping non-object entry");
                continue;
            }
        };

        let class = split_key(&key).map(|(class, _)| class).unwrap_or_default();
        if class == LINK_CLASS {
            let place_id = map.get("place_id").and_then(|v| v.as_str());
            let amenity_id = map.get("amenity_id").and_then(|v| v.as_str());
            match (place_id, amenity_id) {
                (Some(p), Some(a)) => data.links.push((p.to_string(), a.to_string())),
                _ => tracing::warn!(key = %key, "skipping malformed link entry"),
            }
            continue;
        }

        // Validate now so reads never have to deal with bad entries
        match Record::from_mapping(map.clone()) {
            Ok(record) if record.key() == key => data.insert(key, map),
            Ok(record) => {
                tracing::warn!(key = %key, expected = %record.key(), "skipping entry stored under wrong key")
            }
            Err(e) => tracing::warn!(key = %key, error = %e, "skipping unreadable entry"),
        }
    }

    data
}

fn decode(map: &Mapping) -> StoreResult<Record> {
    Record::from_mapping(map.clone()).map_err(|e| StoreError::backend(e.to_string()))
}

impl StorageBackend for FileStorage {
    fn name(&self) -> &'static str {
        "file"
    }

    fn get(&self, kind: EntityKind, id: &str) -> StoreResult<Option<Record>> {
        let data = self.data.lock();
        data.ensure_open()?;
        data.objects
            .get(&storage_key(kind, id))
            .map(decode)
            .transpose()
    }

    fn all(&self, kind: EntityKind) -> StoreResult<Vec<Record>> {
        let data = self.data.lock();
        data.ensure_open()?;
        data.order
            .iter()
            .filter(|key| split_key(key).map(|(class, _)| class) == Some(kind.as_str()))
            .filter_map(|key| data.objects.get(key))
            .map(decode)
            .collect()
    }

    fn put(&self, record: &Record) -> StoreResult<()> {
        let map = record.to_mapping()?;
        let mut data = self.data.lock();
        data.ensure_open()?;
        tracing::debug!(key = %record.key(), "put");
        data.begin();
        data.insert(record.key(), map);
        Ok(())
    }

    fn delete(&self, kind: EntityKind, id: &str) -> StoreResult<bool> {
        let mut data = self.data.lock();
        data.ensure_open()?;
        let key = storage_key(kind, id);
        tracing::debug!(key = %key, "delete");
        data.begin();
        Ok(data.remove(&key))
    }

    fn count(&self, kind: EntityKind) -> StoreResult<usize> {
        let data = self.data.lock();
        data.ensure_open()?;
        Ok(data
            .order
            .iter()
            .filter(|key| split_key(key).map(|(class, _)| class) == Some(kind.as_str()))
            .count())
    }

    fn link(&self, place_id: &str, amenity_id: &str) -> StoreResult<bool> {
        let mut data = self.data.lock();
        data.ensure_open()?;
        if data.links.iter().any(|(p, a)| p == place_id && a == amenity_id) {
            return Ok(false);
        }
        data.begin();
        data.links.push((place_id.to_string(), amenity_id.to_string()));
        Ok(true)
    }

    fn unlink(&self, place_id: &str, amenity_id: &str) -> StoreResult<bool> {
        let mut data = self.data.lock();
        data.ensure_open()?;
        data.begin();
        let before = data.links.len();
        data.links.retain(|(p, a)| !(p == place_id && a == amenity_id));
        Ok(data.links.len() != before)
    }

    fn amenity_ids(&self, place_id: &str) -> StoreResult<Vec<String>> {
        let data = self.data.lock();
        data.ensure_open()?;
        Ok(data
            .links
            .iter()
            .filter(|(p, _)| p == place_id)
            .map(|(_, a)| a.clone())
            .collect())
    }

    fn place_ids(&self, amenity_id: &str) -> StoreResult<Vec<String>> {
        let data = self.data.lock();
        data.ensure_open()?;
        Ok(data
            .links
            .iter()
            .filter(|(_, a)| a == amenity_id)
            .map(|(p, _)| p.clone())
            .collect())
    }

    fn link_count(&self) -> StoreResult<usize> {
        let data = self.data.lock();
        data.ensure_open()?;
        Ok(data.links.len())
    }

    fn flush(&self) -> StoreResult<()> {
        let mut data = self.data.lock();
        data.ensure_open()?;

        let bytes = serde_json::to_vec(&data.to_file_mapping())?;
        let tmp = self.temp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        data.checkpoint = None;

        tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "flushed");
        Ok(())
    }

    fn rollback(&self) -> StoreResult<()> {
        let mut data = self.data.lock();
        data.ensure_open()?;
        if data.restore() {
            tracing::debug!(path = %self.path.display(), "unflushed changes discarded");
        }
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let mut data = self.data.lock();
        if !data.closed {
            data.closed = true;
            tracing::info!(path = %self.path.display(), "file storage closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Amenity, Place, State};

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::open(dir.path().join("file.json")).unwrap();
        assert_eq!(store.count(EntityKind::State).unwrap(), 0);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.json");
        fs::write(&path, b"{not json").unwrap();

        let store = FileStorage::open(&path).unwrap();
        assert_eq!(store.count(EntityKind::Place).unwrap(), 0);
    }

    #[test]
    fn test_flush_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.json");

        let state = State::new("California");
        let place = Place::new("c", "u", "Loft");
        let wifi = Amenity::new("Wifi");
        {
            let store = FileStorage::open(&path).unwrap();
            store.put(&Record::State(state.clone())).unwrap();
            store.put(&Record::Place(place.clone())).unwrap();
            store.put(&Record::Amenity(wifi.clone())).unwrap();
            store.link(&place.base.id, &wifi.base.id).unwrap();
            store.flush().unwrap();
        }

        assert!(!dir.path().join("file.json.tmp").exists());

        let store = FileStorage::open(&path).unwrap();
        let loaded = store.get(EntityKind::State, &state.base.id).unwrap().unwrap();
        assert_eq!(loaded, Record::State(state));
        assert_eq!(store.amenity_ids(&place.base.id).unwrap(), vec![wifi.base.id.clone()]);
    }

    #[test]
    fn test_file_layout_uses_type_dot_id_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.json");
        let store = FileStorage::open(&path).unwrap();
        let state = State::new("Texas");
        store.put(&Record::State(state.clone())).unwrap();
        store.flush().unwrap();

        let raw: Mapping = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        let entry = &raw[&format!("State.{}", state.base.id)];
        assert_eq!(entry["__class__"], "State");
        assert_eq!(entry["name"], "Texas");
    }

    #[test]
    fn test_all_keeps_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::open(dir.path().join("file.json")).unwrap();
        let names = ["Zeta", "Alpha", "Mu"];
        for name in names {
            store.put(&Record::State(State::new(name))).unwrap();
        }

        let all: Vec<String> = store
            .all(EntityKind::State)
            .unwrap()
            .into_iter()
            .filter_map(|r| r.into_entity::<State>())
            .map(|s| s.name)
            .collect();
        assert_eq!(all, names);
    }

    #[test]
    fn test_put_overwrites_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::open(dir.path().join("file.json")).unwrap();
        let mut state = State::new("Old");
        store.put(&Record::State(state.clone())).unwrap();
        state.name = "New".to_string();
        store.put(&Record::State(state.clone())).unwrap();

        assert_eq!(store.count(EntityKind::State).unwrap(), 1);
        let loaded: State = store
            .get(EntityKind::State, &state.base.id)
            .unwrap()
            .unwrap()
            .into_entity()
            .unwrap();
        assert_eq!(loaded.name, "New");
    }

    #[test]
    fn test_link_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::open(dir.path().join("file.json")).unwrap();
        assert!(store.link("p", "a").unwrap());
        assert!(!store.link("p", "a").unwrap());
        assert_eq!(store.link_count().unwrap(), 1);
        assert!(store.unlink("p", "a").unwrap());
        assert!(!store.unlink("p", "a").unwrap());
    }

    #[test]
    fn test_rollback_restores_last_flush() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::open(dir.path().join("file.json")).unwrap();
        let kept = State::new("Kept");
        let dropped = State::new("Dropped");

        store.put(&Record::State(kept.clone())).unwrap();
        store.flush().unwrap();
        store.put(&Record::State(dropped.clone())).unwrap();
        store.delete(EntityKind::State, &kept.base.id).unwrap();
        store.link("p", "a").unwrap();
        store.rollback().unwrap();

        assert!(store.get(EntityKind::State, &kept.base.id).unwrap().is_some());
        assert!(store.get(EntityKind::State, &dropped.base.id).unwrap().is_none());
        assert_eq!(store.link_count().unwrap(), 0);

        // a second rollback has nothing to undo
        store.rollback().unwrap();
        assert_eq!(store.count(EntityKind::State).unwrap(), 1);
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::open(dir.path().join("file.json")).unwrap();
        store.close().unwrap();
        store.close().unwrap();
        assert!(store.count(EntityKind::State).is_err());
    }
}
