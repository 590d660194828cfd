use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;

use plotline_storage::{CollectionStore, SelectQuery};

use crate::fetch::{FetchError, FetchState};

/// Loads exactly one record by identifier from a named collection.
///
/// The identifier is optional: with no key set, the fetcher resolves
/// immediately to `{data: None, loading: false}` without issuing a request,
/// so views can defer fetching until a route parameter arrives.
///
/// Staleness: every key change or refresh takes a new generation ticket; a
/// response whose ticket has been superseded by the time it arrives is
/// discarded, so the view never sees a row for a stale identifier.
pub struct RowFetcher<T> {
    store: Arc<dyn CollectionStore>,
    collection: String,
    key_column: String,
    columns: Option<Vec<String>>,
    key: Mutex<Option<Value>>,
    state: Mutex<FetchState<Option<T>>>,
    generation: AtomicU64,
}

impl<T> RowFetcher<T>
where
    T: DeserializeOwned + Clone + Send,
{
    pub fn new(store: Arc<dyn CollectionStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            key_column: "id".to_string(),
            columns: None,
            key: Mutex::new(None),
            state: Mutex::new(FetchState::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Override the identifier column (default `id`).
    pub fn with_key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = column.into();
        self
    }

    /// Restrict the select list (default: all columns).
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Snapshot of the current fetch state.
    pub async fn state(&self) -> FetchState<Option<T>> {
        self.state.lock().await.clone()
    }

    /// Point the fetcher at a new identifier and fetch it, superseding any
    /// in-flight request. `None` resolves immediately with no remote call.
    pub async fn set_key(&self, key: Option<Value>) {
        *self.key.lock().await = key.clone();
        match key {
            Some(key) => self.run_fetch(key).await,
            None => {
                // Take a ticket so an in-flight fetch for the old key is
                // discarded when it lands.
                self.generation.fetch_add(1, Ordering::SeqCst);
                let mut state = self.state.lock().await;
                state.loading = false;
                state.error = None;
                state.data = None;
            }
        }
    }

    /// Force exactly one more read of the current key. No key, no request.
    pub async fn refresh(&self) {
        let key = self.key.lock().await.clone();
        if let Some(key) = key {
            self.run_fetch(key).await;
        }
    }

    async fn run_fetch(&self, key: Value) {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.lock().await;
            state.loading = true;
            state.error = None;
        }

        let mut query = SelectQuery::new().eq(self.key_column.clone(), key).range(0, 0);
        if let Some(columns) = &self.columns {
            query = query.select(columns.clone());
        }
        let result = self.store.select(&self.collection, &query).await;

        let mut state = self.state.lock().await;
        if self.generation.load(Ordering::SeqCst) != ticket {
            return; // superseded while in flight; discard
        }
        state.loading = false;
        match result {
            Ok(resp) => match resp.rows.into_iter().next() {
                Some(row) => match serde_json::from_value::<T>(Value::Object(row)) {
                    Ok(data) => {
                        state.data = Some(data);
                        state.error = None;
                    }
                    Err(e) => {
                        state.data = None;
                        state.error = Some(FetchError::Decode(e.to_string()));
                    }
                },
                None => {
                    state.data = None;
                    state.error = Some(FetchError::NotFound);
                }
            },
            Err(e) if e.is_not_found() => {
                state.data = None;
                state.error = Some(FetchError::NotFound);
            }
            Err(e) => {
                state.data = None;
                state.error = Some(FetchError::Remote(e.to_string()));
            }
        }
    }
}
