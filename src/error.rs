//! Unified error type for stores, the client and the HTTP layer.

use thiserror::Error;

/// Things that can go wrong when reading or writing records.
///
/// The HTTP layer only distinguishes "not found" from "bad input" from
/// everything else, so most variants carry a plain message.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// No record with this id in the entity's collection.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity name, e.g. `companies`.
        entity: String,
        /// Record id that was looked up.
        id: String,
    },
    /// Entity name the store does not serve.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    /// Payload failed validation or could not be parsed.
    #[error("invalid input: {0}")]
    BadInput(String),
    /// Missing or rejected credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// File system problem (read, write, rename).
    #[error("i/o error: {0}")]
    Io(String),
    /// Failed to serialize records to bytes.
    #[error("serialization error: {0}")]
    Serialize(String),
    /// Failed to deserialize bytes back into records.
    #[error("deserialization error: {0}")]
    Deserialize(String),
    /// Bad configuration (invalid path, policy, env value, etc.).
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn not_found(entity: &str, id: &str) -> Self {
        Error::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Error::Io(err.to_string())
        } else if err.is_syntax() || err.is_eof() || err.is_data() {
            Error::Deserialize(err.to_string())
        } else {
            Error::Serialize(err.to_string())
        }
    }
}

/// Result alias using our [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
