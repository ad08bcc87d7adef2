// Concurrent saves through one shared registry

use hbnb_store::{Amenity, Config, Entity, EntityKind, FileStorage, Registry, State, StorageKind};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const PER_THREAD: usize = 25;

fn file_config(dir: &TempDir) -> Config {
    Config {
        storage: StorageKind::File,
        file_path: dir.path().join("file.json"),
        ..Config::default()
    }
}

#[test]
fn test_two_concurrent_savers_lose_nothing() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);
    let registry = Arc::new(Registry::initialize(&config).unwrap());

    let states = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            let mut ids = Vec::new();
            for i in 0..PER_THREAD {
                let state = State::new(format!("State {}", i));
                ids.push(state.id().to_string());
                registry.register(state);
                registry.save().unwrap();
            }
            ids
        })
    };
    let amenities = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            let mut ids = Vec::new();
            for i in 0..PER_THREAD {
                let amenity = Amenity::new(format!("Amenity {}", i));
                ids.push(amenity.id().to_string());
                registry.register(amenity);
                registry.save().unwrap();
            }
            ids
        })
    };

    let state_ids = states.join().unwrap();
    let amenity_ids = amenities.join().unwrap();
    registry.shutdown().unwrap();

    // the file on disk is complete and parseable
    let reopened = Registry::initialize(&config).unwrap();
    assert_eq!(reopened.count(EntityKind::State).unwrap(), PER_THREAD);
    assert_eq!(reopened.count(EntityKind::Amenity).unwrap(), PER_THREAD);
    for id in &state_ids {
        assert!(reopened.get::<State>(id).unwrap().is_some());
    }
    for id in &amenity_ids {
        assert!(reopened.get::<Amenity>(id).unwrap().is_some());
    }
}

#[test]
fn test_concurrent_flushes_never_tear_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("file.json");
    let registry = Arc::new(Registry::new(Box::new(FileStorage::open(&path).unwrap())));

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 0..10 {
                    registry.persist(State::new(format!("w{}-{}", worker, i))).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let raw = std::fs::read(&path).unwrap();
    let parsed: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&raw).unwrap();
    assert_eq!(parsed.len(), 40);
}

#[test]
fn test_readers_see_consistent_snapshots_during_writes() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(Registry::initialize(&file_config(&dir)).unwrap());

    let writer = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for i in 0..50 {
                registry.persist(State::new(format!("S{}", i))).unwrap();
            }
        })
    };

    let mut last = 0;
    while !writer.is_finished() {
        let seen = registry.all::<State>().unwrap().len();
        assert!(seen >= last);
        last = seen;
    }
    writer.join().unwrap();
    assert_eq!(registry.count(EntityKind::State).unwrap(), 50);
}
