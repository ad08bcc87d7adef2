// User Entity - owns Places and Reviews
//
// Deleting a User does NOT cascade: their Places and Reviews keep a
// dangling user_id.

use super::{entity_accessors, impl_entity, BaseModel, Entity};
use crate::codec::Mapping;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten)]
    pub base: BaseModel,

    #[serde(default)]
    pub email: String,

    /// SHA-256 hex digest, never the plain password
    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,
}

impl User {
    pub fn new(email: impl Into<String>, password: &str) -> Self {
        let mut user = User {
            base: BaseModel::new(),
            email: email.into(),
            password: String::new(),
            first_name: String::new(),
            last_name: String::new(),
        };
        user.set_password(password);
        user
    }

    pub fn set_password(&mut self, plain: &str) {
        self.password = hash_password(plain);
    }

    pub fn check_password(&self, plain: &str) -> bool {
        self.password == hash_password(plain)
    }
}

pub fn hash_password(plain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plain.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Entity for User {
    entity_accessors!(User);

    fn accept_input(&mut self, supplied: &Mapping) {
        if let Some(plain) = supplied.get("password").and_then(|v| v.as_str()) {
            self.set_password(plain);
        }
    }
}

impl_entity!(User);
