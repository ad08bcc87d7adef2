// HBNB Store - Core Library
// Entities, codec, storage backends, registry, relationships and search.
// Exposes all modules for use in the CLI, the API server, and tests.

pub mod codec;
pub mod config;
pub mod entities;
pub mod error;
pub mod logging;
pub mod registry;
pub mod relations;
pub mod search;
pub mod storage;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use codec::Mapping;
pub use config::{Config, StorageKind};
pub use entities::{Amenity, BaseModel, City, Entity, EntityKind, Place, Record, Review, State, User};
pub use error::{StoreError, StoreResult};
pub use registry::Registry;
pub use relations::{CascadeReport, Relations};
pub use search::{search, SearchMode, SearchRequest};
pub use storage::{open_backend, DbStorage, FileStorage, StorageBackend};

/// Crate version, reported by the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
