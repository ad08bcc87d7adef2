// Place Search - filter places by states, cities and required amenities
//
// Location filter: union of the places of every requested state (through its
// cities) and every requested city, first-seen order, no duplicates.
// Amenity filter: keep places linked to every requested amenity.
//
// With no location filter and only amenities requested, the two modes differ:
// Compatibility returns nothing (the historical behavior), Corrected filters
// all places.

use crate::entities::{Amenity, City, Entity, Place, State};
use crate::error::StoreResult;
use crate::registry::Registry;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Corrected,
    Compatibility,
}

/// Search filters; every list may be empty, absent or null
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub states: Vec<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub cities: Vec<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub amenities: Vec<String>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl SearchRequest {
    pub fn is_empty(&self) -> bool {
        self.states.is_empty() && self.cities.is_empty() && self.amenities.is_empty()
    }

    fn has_location(&self) -> bool {
        !self.states.is_empty() || !self.cities.is_empty()
    }
}

pub fn search(registry: &Registry, request: &SearchRequest, mode: SearchMode) -> StoreResult<Vec<Place>> {
    if request.is_empty() {
        return registry.all::<Place>();
    }

    let candidates = if request.has_location() {
        places_in_locations(registry, request)?
    } else {
        match mode {
            SearchMode::Compatibility => return Ok(Vec::new()),
            SearchMode::Corrected => registry.all::<Place>()?,
        }
    };

    let places = if request.amenities.is_empty() {
        candidates
    } else {
        with_all_amenities(registry, candidates, &request.amenities)?
    };

    tracing::debug!(
        states = request.states.len(),
        cities = request.cities.len(),
        amenities = request.amenities.len(),
        ?mode,
        matched = places.len(),
        "place search"
    );
    Ok(places)
}

/// Places of the requested states and cities. Ids that do not resolve to an
/// existing state or city contribute nothing.
fn places_in_locations(registry: &Registry, request: &SearchRequest) -> StoreResult<Vec<Place>> {
    let relations = registry.relations();
    let mut seen = HashSet::new();
    let mut places = Vec::new();

    let mut add = |found: Vec<Place>| {
        for place in found {
            if seen.insert(place.id().to_string()) {
                places.push(place);
            }
        }
    };

    for state_id in &request.states {
        if registry.get::<State>(state_id)?.is_some() {
            add(relations.places_of_state(state_id)?);
        }
    }
    for city_id in &request.cities {
        if registry.get::<City>(city_id)?.is_some() {
            add(relations.places_of_city(city_id)?);
        }
    }

    Ok(places)
}

/// Keep places linked to every amenity in `required`. An id that is not an
/// existing amenity can never be satisfied.
fn with_all_amenities(registry: &Registry, places: Vec<Place>, required: &[String]) -> StoreResult<Vec<Place>> {
    for amenity_id in required {
        if registry.get::<Amenity>(amenity_id)?.is_none() {
            return Ok(Vec::new());
        }
    }

    let relations = registry.relations();
    let mut kept = Vec::new();
    for place in places {
        let linked: HashSet<String> = relations.amenity_ids_of(place.id())?.into_iter().collect();
        if required.iter().all(|id| linked.contains(id)) {
            kept.push(place);
        }
    }
    Ok(kept)
}
