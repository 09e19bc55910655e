use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntityGraphError {
    #[error("connection error: {0}")]
    ConnectionError(String),
    #[error("schema error: {0}")]
    SchemaError(String),
    #[error("query error: {0}")]
    QueryError(String),
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("transaction error: {0}")]
    TransactionError(String),
    #[error("failed to apply schema changes: {0}")]
    SchemaDefinitionError(String),
    #[error("failed to create indexes: {0}")]
    IndexDefinitionError(String),
    #[error("index {0} did not become usable before the wait timed out")]
    IndexWaitTimeout(String),
    #[error("wait for index {0} was cancelled")]
    IndexWaitCancelled(String),
    #[error("unknown label: {0}")]
    UnknownLabel(String),
    #[error("malformed relation pattern: {0}")]
    MalformedRelationPattern(String),
}

impl EntityGraphError {
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        EntityGraphError::ConnectionError(msg.into())
    }

    pub fn schema<T: Into<String>>(msg: T) -> Self {
        EntityGraphError::SchemaError(msg.into())
    }

    pub fn query<T: Into<String>>(msg: T) -> Self {
        EntityGraphError::QueryError(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        EntityGraphError::NotFound(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        EntityGraphError::InvalidInput(msg.into())
    }

    pub fn transaction<T: Into<String>>(msg: T) -> Self {
        EntityGraphError::TransactionError(msg.into())
    }

    pub fn schema_definition<T: Into<String>>(msg: T) -> Self {
        EntityGraphError::SchemaDefinitionError(msg.into())
    }

    pub fn index_definition<T: Into<String>>(msg: T) -> Self {
        EntityGraphError::IndexDefinitionError(msg.into())
    }

    pub fn unknown_label<T: Into<String>>(msg: T) -> Self {
        EntityGraphError::UnknownLabel(msg.into())
    }

    pub fn malformed_pattern<T: Into<String>>(msg: T) -> Self {
        EntityGraphError::MalformedRelationPattern(msg.into())
    }
}
