// State Entity - top of the location hierarchy
// A State owns many Cities; deleting it cascades through them.

use super::{entity_accessors, impl_entity, BaseModel, Entity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    #[serde(flatten)]
    pub base: BaseModel,

    #[serde(default)]
    pub name: String,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        State {
            base: BaseModel::new(),
            name: name.into(),
        }
    }
}

impl Entity for State {
    entity_accessors!(State);
}

impl_entity!(State);
