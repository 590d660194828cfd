/// All errors that can be returned by a `CollectionStore` implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// No row in the collection matched the given identifier predicate.
    #[error("no row in '{collection}' with {column} = {value}")]
    RowNotFound {
        collection: String,
        column: String,
        value: String,
    },

    /// A write referenced an identifier that already exists in the collection.
    #[error("duplicate {column} = {value} in '{collection}'")]
    DuplicateRow {
        collection: String,
        column: String,
        value: String,
    },

    /// The query itself was malformed (e.g. an inverted range).
    #[error("invalid query against '{collection}': {message}")]
    InvalidQuery { collection: String, message: String },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// True when the error is the typed not-found condition, which UIs render
    /// as an absent state rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::RowNotFound { .. })
    }
}
