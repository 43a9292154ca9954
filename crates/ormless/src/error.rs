//! Error types for ormless

use thiserror::Error;
use tokio_postgres::error::SqlState;

/// Result type alias for ormless operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for compiling and running SQL
#[derive(Debug, Error)]
pub enum OrmError {
    /// A self or parent column reference was compiled where no such context exists
    #[error("Context error: {0}")]
    Context(String),

    /// The expression tree is malformed
    #[error("Compile error: {0}")]
    Compile(String),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[source] tokio_postgres::Error),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Serialization failure (SQLSTATE 40001)
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    /// Deadlock detected (SQLSTATE 40P01)
    #[error("Deadlock detected: {0}")]
    DeadlockDetected(String),

    /// A transaction kept conflicting until no attempts were left
    #[error("Transaction gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<OrmError>,
    },

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// JSON result could not be deserialized into the requested type
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a context error
    pub fn context(message: impl Into<String>) -> Self {
        Self::Context(message.into())
    }

    /// Create a compile error
    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Serialization failures and deadlocks resolve by running the whole
    /// transaction again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SerializationFailure(_) | Self::DeadlockDetected(_) => true,
            Self::Query(err) => matches!(
                err.code(),
                Some(code) if *code == SqlState::T_R_SERIALIZATION_FAILURE
                    || *code == SqlState::T_R_DEADLOCK_DETECTED
            ),
            _ => false,
        }
    }

    /// SQLSTATE of the classified database conditions, if any.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::UniqueViolation(_) => Some("23505"),
            Self::ForeignKeyViolation(_) => Some("23503"),
            Self::CheckViolation(_) => Some("23514"),
            Self::SerializationFailure(_) => Some("40001"),
            Self::DeadlockDetected(_) => Some("40P01"),
            Self::Query(err) => err.code().map(|code| code.code()),
            _ => None,
        }
    }

    /// Parse a tokio_postgres error into a more specific OrmError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                "40001" => return Self::SerializationFailure(message.to_string()),
                "40P01" => return Self::DeadlockDetected(message.to_string()),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

impl From<tokio_postgres::Error> for OrmError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::from_db_error(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(OrmError::SerializationFailure("could not serialize".into()).is_retryable());
        assert!(OrmError::DeadlockDetected("deadlock".into()).is_retryable());
        assert!(!OrmError::UniqueViolation("users_pkey: dup".into()).is_retryable());
        assert!(!OrmError::context("no column").is_retryable());
    }

    #[test]
    fn exhausted_retries_wrap_the_last_error() {
        let err = OrmError::RetriesExhausted {
            attempts: 3,
            source: Box::new(OrmError::SerializationFailure("conflict".into())),
        };
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Transaction gave up after 3 attempts: Serialization failure: conflict"
        );
        let source = std::error::Error::source(&err).map(|e| e.to_string());
        assert_eq!(source.as_deref(), Some("Serialization failure: conflict"));
    }

    #[test]
    fn classified_errors_report_sqlstate() {
        assert_eq!(
            OrmError::DeadlockDetected("x".into()).sqlstate(),
            Some("40P01")
        );
        assert_eq!(OrmError::compile("x").sqlstate(), None);
    }
}
