// Place Entity - a listing
//
// Belongs to one City and one User (owner), owns many Reviews, and is
// linked many-to-many with Amenities. The amenity links are NOT stored on
// the Place: they live in the place_amenity edge set (see relations.rs).

use super::{entity_accessors, impl_entity, BaseModel, Entity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    #[serde(flatten)]
    pub base: BaseModel,

    #[serde(default)]
    pub city_id: String,

    /// Owner
    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub number_rooms: i64,

    #[serde(default)]
    pub number_bathrooms: i64,

    #[serde(default)]
    pub max_guest: i64,

    #[serde(default)]
    pub price_by_night: i64,

    #[serde(default)]
    pub latitude: f64,

    #[serde(default)]
    pub longitude: f64,
}

impl Place {
    pub fn new(
        city_id: impl Into<String>,
        user_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Place {
            base: BaseModel::new(),
            city_id: city_id.into(),
            user_id: user_id.into(),
            name: name.into(),
            description: String::new(),
            number_rooms: 0,
            number_bathrooms: 0,
            max_guest: 0,
            price_by_night: 0,
            latitude: 0.0,
            longitude: 0.0,
        }
    }

    /// Builder-style helper for tests and fixtures
    pub fn with_price(mut self, price_by_night: i64) -> Self {
        self.price_by_night = price_by_night;
        self
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }
}

impl Entity for Place {
    entity_accessors!(Place);
}

impl_entity!(Place);
