// Registry integration tests, run against both storage backends

use hbnb_store::{
    Amenity, City, Config, Entity, EntityKind, Place, Registry, Review, State, StorageKind, User,
};
use tempfile::TempDir;

fn config_for(storage: StorageKind, dir: &TempDir) -> Config {
    Config {
        storage,
        file_path: dir.path().join("file.json"),
        db_path: dir.path().join("hbnb.db"),
        ..Config::default()
    }
}

fn each_backend(test: impl Fn(&Config)) {
    for storage in [StorageKind::File, StorageKind::Db] {
        let dir = TempDir::new().unwrap();
        test(&config_for(storage, &dir));
    }
}

#[test]
fn test_identity_survives_reopen() {
    each_backend(|config| {
        let state = State::new("California");
        {
            let registry = Registry::initialize(config).unwrap();
            registry.persist(state.clone()).unwrap();
            registry.shutdown().unwrap();
        }

        let registry = Registry::initialize(config).unwrap();
        let loaded: State = registry.get(state.id()).unwrap().unwrap();
        assert_eq!(loaded.base.id, state.base.id);
        assert_eq!(loaded.base.created_at, state.base.created_at);
        assert!(loaded.base.updated_at >= loaded.base.created_at);
        assert_eq!(loaded.name, "California");
    });
}

#[test]
fn test_counts_track_saves_and_deletes() {
    each_backend(|config| {
        let registry = Registry::initialize(config).unwrap();
        let a = Amenity::new("Wifi");
        let b = Amenity::new("Pool");
        registry.register(a.clone());
        registry.register(b.clone());
        registry.save().unwrap();

        assert_eq!(registry.count(EntityKind::Amenity).unwrap(), 2);
        assert_eq!(registry.count_by_name("amenities").unwrap(), 2);
        assert_eq!(registry.all::<Amenity>().unwrap().len(), 2);

        registry.delete_by_id(EntityKind::Amenity, a.id()).unwrap();
        assert_eq!(registry.count(EntityKind::Amenity).unwrap(), 1);
        assert!(registry.get::<Amenity>(a.id()).unwrap().is_none());
    });
}

#[test]
fn test_resave_keeps_created_at() {
    each_backend(|config| {
        let registry = Registry::initialize(config).unwrap();
        let mut user = User::new("a@example.com", "pw");
        registry.persist(user.clone()).unwrap();

        user.first_name = "Ada".to_string();
        std::thread::sleep(std::time::Duration::from_millis(2));
        registry.persist(user.clone()).unwrap();

        let stored: User = registry.get(user.id()).unwrap().unwrap();
        assert_eq!(stored.first_name, "Ada");
        assert_eq!(stored.base.created_at, user.base.created_at);
        assert!(stored.base.updated_at > stored.base.created_at);
        assert_eq!(registry.count(EntityKind::User).unwrap(), 1);
    });
}

#[test]
fn test_cascade_survives_reopen() {
    each_backend(|config| {
        let user = User::new("owner@example.com", "pw");
        let state = State::new("Oregon");
        let city = City::new(state.id(), "Portland");
        let place = Place::new(city.id(), user.id(), "Cabin");
        let review = Review::new(place.id(), user.id(), "Cozy");
        let amenity = Amenity::new("Fireplace");

        {
            let registry = Registry::initialize(config).unwrap();
            for record in [
                user.clone().into_record(),
                state.clone().into_record(),
                city.clone().into_record(),
                place.clone().into_record(),
                review.clone().into_record(),
                amenity.clone().into_record(),
            ] {
                registry.register(record);
            }
            registry.save().unwrap();
            assert!(registry.relations().link(place.id(), amenity.id()).unwrap());

            let report = registry.delete_by_id(EntityKind::State, state.id()).unwrap();
            assert_eq!(report.total(), 4);
            assert_eq!(report.links_removed, 1);
            registry.shutdown().unwrap();
        }

        let registry = Registry::initialize(config).unwrap();
        let stats = registry.stats().unwrap();
        assert_eq!(stats["states"], 0);
        assert_eq!(stats["cities"], 0);
        assert_eq!(stats["places"], 0);
        assert_eq!(stats["reviews"], 0);
        assert_eq!(stats["users"], 1);
        assert_eq!(stats["amenities"], 1);
        assert_eq!(registry.backend().link_count().unwrap(), 0);
    });
}

#[test]
fn test_links_survive_reopen() {
    each_backend(|config| {
        let place = Place::new("c", "u", "Loft");
        let wifi = Amenity::new("Wifi");
        {
            let registry = Registry::initialize(config).unwrap();
            registry.register(place.clone());
            registry.register(wifi.clone());
            registry.save().unwrap();
            registry.relations().link(place.id(), wifi.id()).unwrap();
            registry.shutdown().unwrap();
        }

        let registry = Registry::initialize(config).unwrap();
        let amenities = registry.relations().amenities_of(place.id()).unwrap();
        assert_eq!(amenities, vec![wifi]);
    });
}

#[test]
fn test_unsaved_entities_are_not_persisted() {
    each_backend(|config| {
        let state = State::new("Ghost");
        {
            let registry = Registry::initialize(config).unwrap();
            registry.register(state.clone());
            registry.shutdown().unwrap();
        }
        let registry = Registry::initialize(config).unwrap();
        assert!(registry.get::<State>(state.id()).unwrap().is_none());
    });
}

#[test]
fn test_shutdown_is_idempotent() {
    each_backend(|config| {
        let registry = Registry::initialize(config).unwrap();
        registry.shutdown().unwrap();
        registry.shutdown().unwrap();
        assert!(registry.count(EntityKind::State).is_err());
    });
}
