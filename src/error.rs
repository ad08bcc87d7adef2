// Error taxonomy for the persistence layer
//
// NotFound and Validation are request-scoped (404 / 400 at the HTTP edge),
// UnknownType is a programming error, BackendIo is a storage failure (500),
// Config only happens at startup.

use thiserror::Error;

/// Error type for registry, storage and relationship operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("{0}")]
    Validation(String),

    #[error("unknown entity type: {0}")]
    UnknownType(String),

    #[error("backend I/O error: {0}")]
    BackendIo(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    pub fn not_found<K: Into<String>, I: Into<String>>(kind: K, id: I) -> Self {
        StoreError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Validation failure for a required field that was not supplied.
    pub fn missing(field: &str) -> Self {
        StoreError::Validation(format!("Missing {}", field))
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        StoreError::Validation(msg.into())
    }

    pub fn unknown_type<T: Into<String>>(name: T) -> Self {
        StoreError::UnknownType(name.into())
    }

    pub fn backend<T: Into<String>>(msg: T) -> Self {
        StoreError::BackendIo(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        StoreError::Config(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        StoreError::BackendIo(error.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        StoreError::BackendIo(format!("sqlite: {}", error))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::BackendIo(format!("json: {}", error))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_message() {
        let err = StoreError::missing("name");
        assert_eq!(err.to_string(), "Missing name");
    }

    #[test]
    fn test_not_found_display() {
        let err = StoreError::not_found("Place", "abc");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Place not found: abc");
    }

    #[test]
    fn test_io_error_becomes_backend_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StoreError = io.into();
        assert!(matches!(err, StoreError::BackendIo(_)));
    }
}
