use thiserror::Error;

/// Failures surfaced by the store adapter, the search engine and the
/// applications built on them. An unreachable target is not an error: see
/// [`crate::search::PathOutcome`].
#[derive(Debug, Error)]
pub enum RouteGraphError {
    /// The store could not be reached or opened. Fatal for the current request.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("schema error: {0}")]
    SchemaError(String),
    #[error("query error: {0}")]
    QueryError(String),
    /// A business key or identity resolved to nothing.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl RouteGraphError {
    pub fn unavailable<T: Into<String>>(msg: T) -> Self {
        RouteGraphError::StoreUnavailable(msg.into())
    }

    pub fn schema<T: Into<String>>(msg: T) -> Self {
        RouteGraphError::SchemaError(msg.into())
    }

    pub fn query<T: Into<String>>(msg: T) -> Self {
        RouteGraphError::QueryError(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        RouteGraphError::NotFound(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        RouteGraphError::InvalidInput(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RouteGraphError::NotFound(_))
    }
}
