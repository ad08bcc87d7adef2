// Entity Models
// "Identity persists, values change"
//
// Each entity has:
// - Stable identity (UUID) assigned once at construction, never reused
// - created_at set once, updated_at refreshed on every save
// - A type discriminator (EntityKind) used for storage keys and the codec

pub mod amenity;
pub mod city;
pub mod place;
pub mod review;
pub mod state;
pub mod user;

pub use amenity::Amenity;
pub use city::City;
pub use place::Place;
pub use review::Review;
pub use state::State;
pub use user::User;

use crate::codec::Mapping;
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire and storage format for timestamps (microsecond precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Attributes every entity carries; never writable through an update.
pub const BASE_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];

// ============================================================================
// ENTITY KIND (type discriminator)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    State,
    City,
    Place,
    User,
    Review,
    Amenity,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::State,
        EntityKind::City,
        EntityKind::Place,
        EntityKind::User,
        EntityKind::Review,
        EntityKind::Amenity,
    ];

    /// Discriminator written into `__class__` and storage keys
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::State => "State",
            EntityKind::City => "City",
            EntityKind::Place => "Place",
            EntityKind::User => "User",
            EntityKind::Review => "Review",
            EntityKind::Amenity => "Amenity",
        }
    }

    /// Plural name: relational table and stats key
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::State => "states",
            EntityKind::City => "cities",
            EntityKind::Place => "places",
            EntityKind::User => "users",
            EntityKind::Review => "reviews",
            EntityKind::Amenity => "amenities",
        }
    }

    /// Attribute allow-list (everything beyond the base fields)
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::State => &["name"],
            EntityKind::City => &["state_id", "name"],
            EntityKind::Place => &[
                "city_id",
                "user_id",
                "name",
                "description",
                "number_rooms",
                "number_bathrooms",
                "max_guest",
                "price_by_night",
                "latitude",
                "longitude",
            ],
            EntityKind::User => &["email", "password", "first_name", "last_name"],
            EntityKind::Review => &["place_id", "user_id", "text"],
            EntityKind::Amenity => &["name"],
        }
    }

    /// Fields a create request must supply, in the order they are checked
    pub fn required(&self) -> &'static [&'static str] {
        match self {
            EntityKind::State | EntityKind::Amenity => &["name"],
            EntityKind::City => &["name"],
            EntityKind::Place => &["user_id", "name"],
            EntityKind::User => &["email", "password"],
            EntityKind::Review => &["user_id", "text"],
        }
    }

    /// Fields an update request may not change (beyond the base fields)
    pub fn immutable(&self) -> &'static [&'static str] {
        match self {
            EntityKind::State | EntityKind::Amenity => &[],
            EntityKind::City => &["state_id"],
            EntityKind::Place => &["user_id", "city_id"],
            EntityKind::User => &["email"],
            EntityKind::Review => &["user_id", "place_id"],
        }
    }

    /// Whether `field` may be written by an update request
    pub fn is_updatable(&self, field: &str) -> bool {
        self.fields().contains(&field)
            && !self.immutable().contains(&field)
            && !BASE_FIELDS.contains(&field)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = StoreError;

    /// Accepts the discriminator ("Place") or the collection name ("places")
    fn from_str(name: &str) -> StoreResult<Self> {
        EntityKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == name || kind.collection() == name)
            .ok_or_else(|| StoreError::unknown_type(name))
    }
}

// ============================================================================
// BASE MODEL (identity + timestamps)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseModel {
    #[serde(default = "new_id")]
    pub id: String,

    #[serde(default = "now", with = "timestamp")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "now", with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl BaseModel {
    /// Fresh identity with created_at == updated_at
    pub fn new() -> Self {
        let now = now();
        BaseModel {
            id: new_id(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh updated_at, never letting it fall behind created_at
    pub fn touch(&mut self) {
        self.updated_at = now().max(self.created_at);
    }
}

impl Default for BaseModel {
    fn default() -> Self {
        Self::new()
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time truncated to the precision the codec keeps
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub mod timestamp {
    use super::TIMESTAMP_FORMAT;
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// ENTITY TRAIT
// ============================================================================

/// Shared contract for every persisted type.
///
/// Equality between entities is identity-based: two values with the same id
/// are the same entity regardless of their attribute values.
pub trait Entity: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    fn base(&self) -> &BaseModel;
    fn base_mut(&mut self) -> &mut BaseModel;
    fn into_record(self) -> Record;
    fn from_record(record: Record) -> Option<Self>;

    /// Hook for attributes that need processing when supplied by a caller
    /// (as opposed to reloaded from storage).
    fn accept_input(&mut self, _supplied: &Mapping) {}

    fn id(&self) -> &str {
        &self.base().id
    }
}

macro_rules! impl_entity {
    ($ty:ident) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.base.id == other.base.id
            }
        }

        impl Eq for $ty {}

        impl std::hash::Hash for $ty {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.base.id.hash(state);
            }
        }

        impl From<$ty> for $crate::entities::Record {
            fn from(entity: $ty) -> Self {
                $crate::entities::Record::$ty(entity)
            }
        }
    };
}

pub(crate) use impl_entity;

macro_rules! entity_accessors {
    ($ty:ident) => {
        const KIND: $crate::entities::EntityKind = $crate::entities::EntityKind::$ty;

        fn base(&self) -> &$crate::entities::BaseModel {
            &self.base
        }

        fn base_mut(&mut self) -> &mut $crate::entities::BaseModel {
            &mut self.base
        }

        fn into_record(self) -> $crate::entities::Record {
            $crate::entities::Record::$ty(self)
        }

        fn from_record(record: $crate::entities::Record) -> Option<Self> {
            match record {
                $crate::entities::Record::$ty(entity) => Some(entity),
                _ => None,
            }
        }
    };
}

pub(crate) use entity_accessors;

// ============================================================================
// RECORD (any entity)
// ============================================================================

/// Type-erased entity, the unit the storage backends move around
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    State(State),
    City(City),
    Place(Place),
    User(User),
    Review(Review),
    Amenity(Amenity),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::State(_) => EntityKind::State,
            Record::City(_) => EntityKind::City,
            Record::Place(_) => EntityKind::Place,
            Record::User(_) => EntityKind::User,
            Record::Review(_) => EntityKind::Review,
            Record::Amenity(_) => EntityKind::Amenity,
        }
    }

    pub fn base(&self) -> &BaseModel {
        match self {
            Record::State(e) => e.base(),
            Record::City(e) => e.base(),
            Record::Place(e) => e.base(),
            Record::User(e) => e.base(),
            Record::Review(e) => e.base(),
            Record::Amenity(e) => e.base(),
        }
    }

    pub fn base_mut(&mut self) -> &mut BaseModel {
        match self {
            Record::State(e) => e.base_mut(),
            Record::City(e) => e.base_mut(),
            Record::Place(e) => e.base_mut(),
            Record::User(e) => e.base_mut(),
            Record::Review(e) => e.base_mut(),
            Record::Amenity(e) => e.base_mut(),
        }
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    /// "Type.id" storage key
    pub fn key(&self) -> String {
        crate::codec::storage_key(self.kind(), self.id())
    }

    pub fn into_entity<E: Entity>(self) -> Option<E> {
        E::from_record(self)
    }
}
