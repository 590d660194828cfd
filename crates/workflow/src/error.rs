use plotline_storage::StoreError;

/// All errors surfaced by the workflow dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A required creation field was missing or empty (400-class).
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    /// No workflow record with the given identifier (404-class).
    #[error("workflow record not found: {id}")]
    RecordNotFound { id: String },

    /// The stored row did not deserialize into a workflow record.
    #[error("workflow record {id} is malformed: {message}")]
    MalformedRecord { id: String, message: String },

    /// A persistence failure from the collection store.
    #[error(transparent)]
    Store(#[from] StoreError),
}
