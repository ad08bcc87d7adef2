// Amenity Entity - linked to Places through the place_amenity edge set

use super::{entity_accessors, impl_entity, BaseModel, Entity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amenity {
    #[serde(flatten)]
    pub base: BaseModel,

    #[serde(default)]
    pub name: String,
}

impl Amenity {
    pub fn new(name: impl Into<String>) -> Self {
        Amenity {
            base: BaseModel::new(),
            name: name.into(),
        }
    }
}

impl Entity for Amenity {
    entity_accessors!(Amenity);
}

impl_entity!(Amenity);
