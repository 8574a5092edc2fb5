//! Error types for sqlkit

use thiserror::Error;

/// Result type alias for sqlkit operations
pub type DbResult<T> = Result<T, DbError>;

/// Error types for statement building and database access
#[derive(Debug, Error)]
pub enum DbError {
    /// Invalid builder/adapter call pattern, detected before any SQL
    /// reaches a connection
    #[error("Builder error: {0}")]
    Builder(String),

    /// Statement failed on the connection; carries the offending SQL
    #[error("Query error: {message}; SQL: {sql}")]
    Query { sql: String, message: String },

    /// Commit/rollback called in an invalid transaction state
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Connection-level failure (connect, protocol, I/O)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Row value could not be mapped to a scalar
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl DbError {
    /// Create a builder (usage) error
    pub fn builder(message: impl Into<String>) -> Self {
        Self::Builder(message.into())
    }

    /// Create a query error for a specific statement
    pub fn query(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            sql: sql.into(),
            message: message.into(),
        }
    }

    /// Create a transaction state error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction(message.into())
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Check if this is a builder (usage) error
    pub fn is_builder(&self) -> bool {
        matches!(self, Self::Builder(_))
    }

    /// Check if this is a query error
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query { .. })
    }

    /// Check if this is a transaction state error
    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }
}
