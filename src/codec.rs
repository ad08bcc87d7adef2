// Codec - entity <-> plain attribute mapping
//
// The same mapping is used on the wire (JSON responses), in the file store
// (one mapping per "Type.id" key) and as the column source for the
// relational store. A mapping always carries the "__class__" discriminator;
// reading one back strips it.

use crate::entities::{Amenity, City, Entity, EntityKind, Place, Record, Review, State, User, BASE_FIELDS};
use crate::error::{StoreError, StoreResult};
use serde_json::Value;

pub type Mapping = serde_json::Map<String, Value>;

/// Type discriminator key (internal-only on the way back in)
pub const CLASS_KEY: &str = "__class__";

/// "Type.id"
pub fn storage_key(kind: EntityKind, id: &str) -> String {
    format!("{}.{}", kind.as_str(), id)
}

/// Split a "Type.id" key at the first dot
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('.')
}

// ============================================================================
// ENTITY <-> MAPPING
// ============================================================================

pub fn to_mapping<E: Entity>(entity: &E) -> StoreResult<Mapping> {
    match serde_json::to_value(entity)? {
        Value::Object(mut map) => {
            map.insert(CLASS_KEY.to_string(), Value::String(E::KIND.as_str().to_string()));
            Ok(map)
        }
        other => Err(StoreError::backend(format!(
            "{} serialized to a non-object: {}",
            E::KIND,
            other
        ))),
    }
}

/// Rebuild an entity, adopting the id/timestamps present in the mapping
/// and generating whichever are missing.
pub fn from_mapping<E: Entity>(mut map: Mapping) -> StoreResult<E> {
    if let Some(class) = map.remove(CLASS_KEY) {
        if class.as_str() != Some(E::KIND.as_str()) {
            return Err(StoreError::validation(format!(
                "expected {} mapping, got {}",
                E::KIND,
                class
            )));
        }
    }

    serde_json::from_value(Value::Object(map))
        .map_err(|e| StoreError::validation(format!("Invalid {}: {}", E::KIND, e)))
}

impl Record {
    pub fn to_mapping(&self) -> StoreResult<Mapping> {
        match self {
            Record::State(e) => to_mapping(e),
            Record::City(e) => to_mapping(e),
            Record::Place(e) => to_mapping(e),
            Record::User(e) => to_mapping(e),
            Record::Review(e) => to_mapping(e),
            Record::Amenity(e) => to_mapping(e),
        }
    }

    /// Decode a mapping whose kind is known up front
    pub fn from_kind_mapping(kind: EntityKind, map: Mapping) -> StoreResult<Record> {
        Ok(match kind {
            EntityKind::State => Record::State(from_mapping::<State>(map)?),
            EntityKind::City => Record::City(from_mapping::<City>(map)?),
            EntityKind::Place => Record::Place(from_mapping::<Place>(map)?),
            EntityKind::User => Record::User(from_mapping::<User>(map)?),
            EntityKind::Review => Record::Review(from_mapping::<Review>(map)?),
            EntityKind::Amenity => Record::Amenity(from_mapping::<Amenity>(map)?),
        })
    }

    /// Decode a self-describing mapping (kind taken from `__class__`)
    pub fn from_mapping(map: Mapping) -> StoreResult<Record> {
        let class = map
            .get(CLASS_KEY)
            .and_then(|v| v.as_str())
            .ok_or_else(|| StoreError::validation(format!("Missing {}", CLASS_KEY)))?;
        let kind: EntityKind = class.parse()?;
        Record::from_kind_mapping(kind, map)
    }

    /// Build a brand-new record from caller-supplied attributes.
    ///
    /// Required fields are checked in order ("Missing <field>"), only the
    /// kind's allow-listed attributes are kept, and the id/timestamps are
    /// always freshly generated.
    pub fn from_input(kind: EntityKind, supplied: &Mapping) -> StoreResult<Record> {
        for field in kind.required() {
            if !supplied.contains_key(*field) {
                return Err(StoreError::missing(field));
            }
        }

        let map = allowed_subset(kind, supplied, |field| kind.fields().contains(&field));
        let mut record = Record::from_kind_mapping(kind, map)?;
        record.accept_input(supplied);
        Ok(record)
    }

    /// Apply caller-supplied attributes to an existing record.
    ///
    /// Base fields, the kind's immutable fields and unknown keys are
    /// ignored; a known key with a value of the wrong type is rejected.
    pub fn apply_update(&self, supplied: &Mapping) -> StoreResult<Record> {
        let kind = self.kind();
        let mut map = self.to_mapping()?;
        for (field, value) in allowed_subset(kind, supplied, |field| kind.is_updatable(field)) {
            map.insert(field, value);
        }

        let mut record = Record::from_kind_mapping(kind, map)?;
        record.accept_input(supplied);
        Ok(record)
    }

    fn accept_input(&mut self, supplied: &Mapping) {
        match self {
            Record::State(e) => e.accept_input(supplied),
            Record::City(e) => e.accept_input(supplied),
            Record::Place(e) => e.accept_input(supplied),
            Record::User(e) => e.accept_input(supplied),
            Record::Review(e) => e.accept_input(supplied),
            Record::Amenity(e) => e.accept_input(supplied),
        }
    }
}

fn allowed_subset<F>(kind: EntityKind, supplied: &Mapping, allowed: F) -> Mapping
where
    F: Fn(&str) -> bool,
{
    let mut out = Mapping::new();
    for (field, value) in supplied {
        if allowed(field) && !BASE_FIELDS.contains(&field.as_str()) {
            out.insert(field.clone(), value.clone());
        } else {
            tracing::debug!(kind = %kind, field = %field, "ignoring field");
        }
    }
    out
}
