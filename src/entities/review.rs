// Review Entity - written by one User about one Place

use super::{entity_accessors, impl_entity, BaseModel, Entity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    #[serde(flatten)]
    pub base: BaseModel,

    #[serde(default)]
    pub place_id: String,

    /// Author; left dangling if the User is deleted
    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub text: String,
}

impl Review {
    pub fn new(
        place_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Review {
            base: BaseModel::new(),
            place_id: place_id.into(),
            user_id: user_id.into(),
            text: text.into(),
        }
    }
}

impl Entity for Review {
    entity_accessors!(Review);
}

impl_entity!(Review);
