// Relationship Resolver - derived collections and cascade delete
//
// Relationships are never stored on the entities themselves. Children are
// found by scanning the registry for a matching foreign key; the
// place/amenity many-to-many lives in the backend's link set.
//
// Ownership graph (cascade direction):
//   State -> City -> Place -> Review
//                         \-> place/amenity links
// Users own places and reviews but deleting a user does not cascade.

use crate::entities::{Amenity, City, Entity, EntityKind, Place, Review};
use crate::error::{StoreError, StoreResult};
use crate::registry::Registry;
use std::collections::BTreeMap;

/// What a cascading delete removed, per entity type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub removed: BTreeMap<EntityKind, usize>,
    pub links_removed: usize,
}

impl CascadeReport {
    pub fn count(&self, kind: EntityKind) -> usize {
        self.removed.get(&kind).copied().unwrap_or(0)
    }

    /// Entities removed (links not included)
    pub fn total(&self) -> usize {
        self.removed.values().sum()
    }

    fn record(&mut self, kind: EntityKind) {
        *self.removed.entry(kind).or_insert(0) += 1;
    }
}

pub struct Relations<'a> {
    registry: &'a Registry,
}

impl<'a> Relations<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Relations { registry }
    }

    // ========================================================================
    // ONE-TO-MANY
    // ========================================================================

    pub fn cities_of(&self, state_id: &str) -> StoreResult<Vec<City>> {
        self.children(|city: &City| city.state_id == state_id)
    }

    pub fn places_of_city(&self, city_id: &str) -> StoreResult<Vec<Place>> {
        self.children(|place: &Place| place.city_id == city_id)
    }

    /// Places in any city of the state, grouped by city
    pub fn places_of_state(&self, state_id: &str) -> StoreResult<Vec<Place>> {
        let mut places = Vec::new();
        for city in self.cities_of(state_id)? {
            places.extend(self.places_of_city(city.id())?);
        }
        Ok(places)
    }

    pub fn reviews_of(&self, place_id: &str) -> StoreResult<Vec<Review>> {
        self.children(|review: &Review| review.place_id == place_id)
    }

    pub fn places_of_user(&self, user_id: &str) -> StoreResult<Vec<Place>> {
        self.children(|place: &Place| place.user_id == user_id)
    }

    pub fn reviews_of_user(&self, user_id: &str) -> StoreResult<Vec<Review>> {
        self.children(|review: &Review| review.user_id == user_id)
    }

    fn children<E, F>(&self, matches: F) -> StoreResult<Vec<E>>
    where
        E: Entity,
        F: Fn(&E) -> bool,
    {
        Ok(self
            .registry
            .all::<E>()?
            .into_iter()
            .filter(|entity| matches(entity))
            .collect())
    }

    // ========================================================================
    // PLACE <-> AMENITY
    // ========================================================================

    /// Amenities linked to a place, in link order. Dangling ids are skipped.
    pub fn amenities_of(&self, place_id: &str) -> StoreResult<Vec<Amenity>> {
        let mut amenities = Vec::new();
        for amenity_id in self.amenity_ids_of(place_id)? {
            if let Some(amenity) = self.registry.get::<Amenity>(&amenity_id)? {
                amenities.push(amenity);
            }
        }
        Ok(amenities)
    }

    pub fn amenity_ids_of(&self, place_id: &str) -> StoreResult<Vec<String>> {
        self.registry.backend().amenity_ids(place_id)
    }

    pub fn places_with(&self, amenity_id: &str) -> StoreResult<Vec<Place>> {
        let mut places = Vec::new();
        for place_id in self.registry.backend().place_ids(amenity_id)? {
            if let Some(place) = self.registry.get::<Place>(&place_id)? {
                places.push(place);
            }
        }
        Ok(places)
    }

    pub fn is_linked(&self, place_id: &str, amenity_id: &str) -> StoreResult<bool> {
        Ok(self
            .amenity_ids_of(place_id)?
            .iter()
            .any(|id| id == amenity_id))
    }

    /// Link an amenity to a place and flush.
    ///
    /// Both ends must exist. Returns `true` when a new link was created and
    /// `false` when the pair was already linked.
    pub fn link(&self, place_id: &str, amenity_id: &str) -> StoreResult<bool> {
        self.require(EntityKind::Place, place_id)?;
        self.require(EntityKind::Amenity, amenity_id)?;

        let _writing = self.registry.lock_writes();
        let backend = self.registry.backend();
        backend
            .link(place_id, amenity_id)
            .and_then(|created| backend.flush().map(|_| created))
            .map_err(|e| self.registry.abort(e))
    }

    /// Remove a link and flush. Unlinking a pair that is not linked is a
    /// no-op returning `false`.
    pub fn unlink(&self, place_id: &str, amenity_id: &str) -> StoreResult<bool> {
        let _writing = self.registry.lock_writes();
        let backend = self.registry.backend();
        backend
            .unlink(place_id, amenity_id)
            .and_then(|removed| {
                if removed {
                    backend.flush()?;
                }
                Ok(removed)
            })
            .map_err(|e| self.registry.abort(e))
    }

    fn require(&self, kind: EntityKind, id: &str) -> StoreResult<()> {
        match self.registry.get_record(kind, id)? {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found(kind.as_str(), id)),
        }
    }

    // ========================================================================
    // CASCADE DELETE
    // ========================================================================

    /// Delete an entity and its dependents, then flush once.
    ///
    /// No dependent survives its owner: deleting a state removes its cities,
    /// their places, those places' reviews and amenity links. The whole tree
    /// goes or none of it does.
    pub fn cascade_delete(&self, kind: EntityKind, id: &str) -> StoreResult<CascadeReport> {
        let _writing = self.registry.lock_writes();
        let mut report = CascadeReport::default();
        self.delete_tree(kind, id, &mut report)
            .and_then(|_| self.registry.backend().flush())
            .map_err(|e| self.registry.abort(e))?;
        Ok(report)
    }

    fn delete_tree(&self, kind: EntityKind, id: &str, report: &mut CascadeReport) -> StoreResult<()> {
        match kind {
            EntityKind::State => {
                for city in self.cities_of(id)? {
                    self.delete_tree(EntityKind::City, city.id(), report)?;
                }
            }
            EntityKind::City => {
                for place in self.places_of_city(id)? {
                    self.delete_tree(EntityKind::Place, place.id(), report)?;
                }
            }
            EntityKind::Place => {
                for review in self.reviews_of(id)? {
                    self.delete_tree(EntityKind::Review, review.id(), report)?;
                }
                for amenity_id in self.amenity_ids_of(id)? {
                    if self.registry.backend().unlink(id, &amenity_id)? {
                        report.links_removed += 1;
                    }
                }
            }
            EntityKind::Amenity => {
                for place_id in self.registry.backend().place_ids(id)? {
                    if self.registry.backend().unlink(&place_id, id)? {
                        report.links_removed += 1;
                    }
                }
            }
            EntityKind::User | EntityKind::Review => {}
        }

        if self.registry.remove(kind, id)? {
            report.record(kind);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{State, User};
    use crate::storage::DbStorage;

    fn registry() -> Registry {
        Registry::new(Box::new(DbStorage::open_in_memory().unwrap()))
    }

    struct Fixture {
        state: State,
        city: City,
        place: Place,
        review: Review,
        amenity: Amenity,
        user: User,
    }

    fn fixture(registry: &Registry) -> Fixture {
        let user = User::new("owner@example.com", "pw");
        let state = State::new("California");
        let city = City::new(state.id(), "San Francisco");
        let place = Place::new(city.id(), user.id(), "Loft");
        let review = Review::new(place.id(), user.id(), "Nice");
        let amenity = Amenity::new("Wifi");

        registry.register(user.clone());
        registry.register(state.clone());
        registry.register(city.clone());
        registry.register(place.clone());
        registry.register(review.clone());
        registry.register(amenity.clone());
        registry.save().unwrap();

        registry.relations().link(place.id(), amenity.id()).unwrap();

        Fixture {
            state,
            city,
            place,
            review,
            amenity,
            user,
        }
    }

    #[test]
    fn test_derived_collections() {
        let registry = registry();
        let f = fixture(&registry);
        let rel = registry.relations();

        assert_eq!(rel.cities_of(f.state.id()).unwrap(), vec![f.city.clone()]);
        assert_eq!(rel.places_of_city(f.city.id()).unwrap(), vec![f.place.clone()]);
        assert_eq!(rel.places_of_state(f.state.id()).unwrap(), vec![f.place.clone()]);
        assert_eq!(rel.reviews_of(f.place.id()).unwrap(), vec![f.review.clone()]);
        assert_eq!(rel.places_of_user(f.user.id()).unwrap(), vec![f.place.clone()]);
        assert_eq!(rel.reviews_of_user(f.user.id()).unwrap().len(), 1);
        assert_eq!(rel.amenities_of(f.place.id()).unwrap(), vec![f.amenity.clone()]);
        assert_eq!(rel.places_with(f.amenity.id()).unwrap(), vec![f.place.clone()]);
    }

    #[test]
    fn test_link_is_idempotent() {
        let registry = registry();
        let f = fixture(&registry);
        let rel = registry.relations();

        assert!(!rel.link(f.place.id(), f.amenity.id()).unwrap());
        assert_eq!(rel.amenities_of(f.place.id()).unwrap().len(), 1);
    }

    #[test]
    fn test_link_requires_both_ends() {
        let registry = registry();
        let f = fixture(&registry);
        let rel = registry.relations();

        assert!(rel.link("ghost", f.amenity.id()).unwrap_err().is_not_found());
        assert!(rel.link(f.place.id(), "ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn test_unlink_missing_pair_is_noop() {
        let registry = registry();
        let f = fixture(&registry);
        let rel = registry.relations();

        assert!(!rel.unlink(f.place.id(), "ghost").unwrap());
        assert!(rel.unlink(f.place.id(), f.amenity.id()).unwrap());
        assert!(!rel.is_linked(f.place.id(), f.amenity.id()).unwrap());
    }

    #[test]
    fn test_state_delete_cascades() {
        let registry = registry();
        let f = fixture(&registry);

        let report = registry.delete_by_id(EntityKind::State, f.state.id()).unwrap();
        assert_eq!(report.count(EntityKind::State), 1);
        assert_eq!(report.count(EntityKind::City), 1);
        assert_eq!(report.count(EntityKind::Place), 1);
        assert_eq!(report.count(EntityKind::Review), 1);
        assert_eq!(report.links_removed, 1);

        assert_eq!(registry.count(EntityKind::City).unwrap(), 0);
        assert_eq!(registry.count(EntityKind::Review).unwrap(), 0);
        assert_eq!(registry.backend().link_count().unwrap(), 0);
        // amenities and users are not owned by the state
        assert_eq!(registry.count(EntityKind::Amenity).unwrap(), 1);
        assert_eq!(registry.count(EntityKind::User).unwrap(), 1);
    }

    #[test]
    fn test_user_delete_does_not_cascade() {
        let registry = registry();
        let f = fixture(&registry);

        let report = registry.delete_by_id(EntityKind::User, f.user.id()).unwrap();
        assert_eq!(report.total(), 1);
        assert_eq!(registry.count(EntityKind::Place).unwrap(), 1);
        assert_eq!(registry.count(EntityKind::Review).unwrap(), 1);
    }

    #[test]
    fn test_amenity_delete_drops_links() {
        let registry = registry();
        let f = fixture(&registry);

        registry.delete_by_id(EntityKind::Amenity, f.amenity.id()).unwrap();
        assert!(registry.relations().amenities_of(f.place.id()).unwrap().is_empty());
        assert_eq!(registry.count(EntityKind::Place).unwrap(), 1);
    }
}
