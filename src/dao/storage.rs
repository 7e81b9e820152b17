use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or rejected the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human readable context.
        message: String,
        /// Backend specific failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A conditional write lost the race against another writer.
    #[error("conditional write conflict on {entity} `{id}`")]
    Conflict {
        /// Kind of document that was being written.
        entity: &'static str,
        /// Identifier of the document.
        id: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a conflict for the given document.
    pub fn conflict(entity: &'static str, id: impl ToString) -> Self {
        StorageError::Conflict {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the error is an optimistic-concurrency conflict that can be retried.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}
