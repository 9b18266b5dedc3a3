use thiserror::Error;

use crate::database::manager::DatabaseError;
use crate::error::ApiError;

/// Observer system errors. These are logged, never returned to clients.
#[derive(Debug, Error, Clone)]
pub enum ObserverError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Observer recursion error: depth {depth} exceeds maximum {max_depth}")]
    RecursionError { depth: usize, max_depth: usize },
}

impl From<DatabaseError> for ObserverError {
    fn from(error: DatabaseError) -> Self {
        ObserverError::DatabaseError(error.to_string())
    }
}

impl From<sqlx::Error> for ObserverError {
    fn from(error: sqlx::Error) -> Self {
        ObserverError::DatabaseError(error.to_string())
    }
}

impl From<ApiError> for ObserverError {
    fn from(error: ApiError) -> Self {
        ObserverError::ServiceError(error.to_string())
    }
}
