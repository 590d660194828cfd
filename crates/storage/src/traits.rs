use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::query::{SelectQuery, SelectResponse};
use crate::record::Record;

/// The client contract for a remote collection store.
///
/// A `CollectionStore` implementation fronts a named-table record store
/// reachable over a request/response protocol: filtered/searched/ordered/
/// ranged reads with exact counts, and insert/upsert/delete writes. The
/// store is schema-free at this layer; collections are addressed by name and
/// rows are opaque `Record` maps.
///
/// ## Error convention
///
/// Reads that match zero rows return an empty `rows` vector, not an error;
/// the typed `StoreError::RowNotFound` is reserved for operations that
/// address a single row by identifier. Backend failures of any other kind
/// surface as `StoreError::Backend` with the transport's message passed
/// through verbatim.
///
/// ## Thread safety
///
/// Implementations must be `Send + Sync + 'static` to be shared behind an
/// `Arc` in axum application state and across async task boundaries.
#[async_trait]
pub trait CollectionStore: Send + Sync + 'static {
    /// Read a slice of a collection.
    ///
    /// Applies, in order: filters (ANDed), the OR'd substring search, the
    /// sort key, then the inclusive zero-indexed range. When `query.count`
    /// is set the response carries the exact total of matching rows across
    /// all pages, computed against the same filter/search state.
    async fn select(
        &self,
        collection: &str,
        query: &SelectQuery,
    ) -> Result<SelectResponse, StoreError>;

    /// Insert a new row and return it as stored.
    ///
    /// A missing or null `id` column is assigned a generated identifier.
    /// Returns `Err(StoreError::DuplicateRow)` if the given id already
    /// exists.
    async fn insert(&self, collection: &str, values: Record) -> Result<Record, StoreError>;

    /// Insert-or-update keyed by `conflict_column`.
    ///
    /// When an existing row matches `values[conflict_column]`, the provided
    /// columns are overlaid onto that row; otherwise the values are inserted
    /// as a new row. Returns the row as stored after the write.
    async fn upsert(
        &self,
        collection: &str,
        values: Record,
        conflict_column: &str,
    ) -> Result<Record, StoreError>;

    /// Delete every row where `column` equals `value`.
    ///
    /// Deleting zero rows is a success, matching the remote protocol.
    async fn delete(&self, collection: &str, column: &str, value: &Value)
        -> Result<(), StoreError>;
}
