use thiserror::Error;

/// Errors surfaced by an attribute source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Connection failed: {reason}")]
    Connection { reason: String },

    #[error("Authentication rejected for user {username}")]
    Authentication { username: String },

    #[error("Query '{pattern}' failed: {reason}")]
    Query { pattern: String, reason: String },

    #[error("Attribute fetch failed for {object}: {reason}")]
    AttributeFetch { object: String, reason: String },

    #[error("Operation '{operation}' failed on {object}: {reason}")]
    Invoke {
        object: String,
        operation: String,
        reason: String,
    },
}

/// Category-level failures inside one collection cycle. Per-entity fetch
/// failures and reset failures are absorbed at the row level and never
/// reach this type.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("query failed: {0}")]
    Query(#[source] SourceError),

    #[error("report write failed: {0}")]
    Write(#[from] std::io::Error),
}
