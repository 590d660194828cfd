use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use plotline_storage::{CollectionStore, Record};

/// A failed write, carrying the remote message verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MutationError(pub String);

/// Performs insert/upsert/delete against one bound collection and normalizes
/// every outcome into a `Result` — no failure escapes as a panic or an
/// unhandled error.
///
/// The gateway keeps a shared `loading` flag (set for the duration of every
/// call, cleared on all exit paths) and a `last_error` field (cleared when a
/// call starts, overwritten on failure). Concurrent calls on one gateway are
/// not queued; they race on these fields and the last call to settle wins
/// the visible state. Callers refresh their fetchers after a successful
/// mutation; the gateway itself triggers nothing.
pub struct MutationGateway {
    store: Arc<dyn CollectionStore>,
    collection: String,
    loading: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl MutationGateway {
    pub fn new(store: Arc<dyn CollectionStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            loading: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    /// True while any call on this gateway is in flight.
    pub fn loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// The error of the most recent settled call, if it failed.
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.lock().await.clone()
    }

    /// Create a record; returns it as stored (with any generated id).
    pub async fn insert(&self, values: Record) -> Result<Record, MutationError> {
        self.begin().await;
        let result = self
            .store
            .insert(&self.collection, values)
            .await
            .map_err(|e| MutationError(e.to_string()));
        self.settle(result).await
    }

    /// Create-or-update keyed by `id`. For intended updates the id must be
    /// present in `values`; the gateway does not detect its absence.
    pub async fn upsert(&self, values: Record) -> Result<Record, MutationError> {
        self.upsert_on(values, "id").await
    }

    /// Create-or-update keyed by an explicit conflict column.
    pub async fn upsert_on(
        &self,
        values: Record,
        conflict_column: &str,
    ) -> Result<Record, MutationError> {
        self.begin().await;
        let result = self
            .store
            .upsert(&self.collection, values, conflict_column)
            .await
            .map_err(|e| MutationError(e.to_string()));
        self.settle(result).await
    }

    /// Delete the record whose `id` equals `key`.
    pub async fn remove(&self, key: Value) -> Result<(), MutationError> {
        self.remove_by("id", key).await
    }

    /// Delete by an explicit identifier column.
    pub async fn remove_by(&self, column: &str, key: Value) -> Result<(), MutationError> {
        self.begin().await;
        let result = self
            .store
            .delete(&self.collection, column, &key)
            .await
            .map_err(|e| MutationError(e.to_string()));
        self.settle(result).await
    }

    async fn begin(&self) {
        self.loading.store(true, Ordering::SeqCst);
        *self.last_error.lock().await = None;
    }

    /// Record the outcome and clear `loading` on every exit path.
    async fn settle<T>(&self, result: Result<T, MutationError>) -> Result<T, MutationError> {
        if let Err(e) = &result {
            *self.last_error.lock().await = Some(e.0.clone());
        }
        self.loading.store(false, Ordering::SeqCst);
        result
    }
}
