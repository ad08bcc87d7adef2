// City Entity - belongs to one State, owns many Places

use super::{entity_accessors, impl_entity, BaseModel, Entity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    #[serde(flatten)]
    pub base: BaseModel,

    /// Parent State id (not enforced by storage)
    #[serde(default)]
    pub state_id: String,

    #[serde(default)]
    pub name: String,
}

impl City {
    pub fn new(state_id: impl Into<String>, name: impl Into<String>) -> Self {
        City {
            base: BaseModel::new(),
            state_id: state_id.into(),
            name: name.into(),
        }
    }
}

impl Entity for City {
    entity_accessors!(City);
}

impl_entity!(City);
