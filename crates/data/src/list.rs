use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;

use plotline_storage::{CollectionStore, OrderBy, SelectQuery};

use crate::fetch::{FetchError, FetchState};

/// One list session's query specification.
///
/// `page` is 1-indexed and clamped to at least 1; `page_size` is fixed for
/// the lifetime of the session. A filter value of null becomes an explicit
/// is-null predicate, not an equality match.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filters: BTreeMap<String, Value>,
    pub search: String,
    pub search_columns: Vec<String>,
    pub order: Option<OrderBy>,
    pub page: usize,
    pub page_size: usize,
}

impl ListQuery {
    pub fn new(page_size: usize) -> Self {
        Self {
            filters: BTreeMap::new(),
            search: String::new(),
            search_columns: Vec::new(),
            order: None,
            page: 1,
            page_size: page_size.max(1),
        }
    }

    pub fn filter(mut self, column: impl Into<String>, value: Value) -> Self {
        self.filters.insert(column.into(), value);
        self
    }

    pub fn search_columns(mut self, columns: Vec<String>) -> Self {
        self.search_columns = columns;
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(OrderBy {
            column: column.into(),
            ascending,
        });
        self
    }
}

/// A resolved page: the rows of the current page plus the exact count of all
/// matching rows across every page.
#[derive(Debug, Clone, PartialEq)]
pub struct ListData<T> {
    pub rows: Vec<T>,
    pub total: u64,
}

impl<T> Default for ListData<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            total: 0,
        }
    }
}

/// Loads a filtered, searched, ordered, paginated slice of a collection.
///
/// Every query mutation (`set_page`, `set_search`, `set_filter`,
/// `set_order`) issues exactly one superseding fetch; `refresh` forces one
/// more without changing the query. Responses for superseded requests are
/// discarded at the commit boundary (last request wins).
///
/// On failure the rows are cleared and `total` reset to 0 alongside the
/// error, so callers must check `error` before trusting an empty page as
/// "no data".
pub struct ListFetcher<T> {
    store: Arc<dyn CollectionStore>,
    collection: String,
    query: Mutex<ListQuery>,
    state: Mutex<FetchState<ListData<T>>>,
    generation: AtomicU64,
}

impl<T> ListFetcher<T>
where
    T: DeserializeOwned + Clone + Send,
{
    pub fn new(
        store: Arc<dyn CollectionStore>,
        collection: impl Into<String>,
        query: ListQuery,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            query: Mutex::new(query),
            state: Mutex::new(FetchState::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Snapshot of the current fetch state.
    pub async fn state(&self) -> FetchState<ListData<T>> {
        self.state.lock().await.clone()
    }

    /// Snapshot of the current query specification.
    pub async fn query(&self) -> ListQuery {
        self.query.lock().await.clone()
    }

    /// Initial load, or a manual refresh of the unchanged query.
    pub async fn fetch(&self) {
        self.run_fetch().await;
    }

    pub async fn set_page(&self, page: usize) {
        self.query.lock().await.page = page.max(1);
        self.run_fetch().await;
    }

    pub async fn set_search(&self, term: impl Into<String>) {
        self.query.lock().await.search = term.into();
        self.run_fetch().await;
    }

    /// Set or replace one fixed filter. A null value filters for rows where
    /// the column is exactly null.
    pub async fn set_filter(&self, column: impl Into<String>, value: Value) {
        self.query.lock().await.filters.insert(column.into(), value);
        self.run_fetch().await;
    }

    pub async fn clear_filter(&self, column: &str) {
        self.query.lock().await.filters.remove(column);
        self.run_fetch().await;
    }

    pub async fn set_order(&self, order: Option<OrderBy>) {
        self.query.lock().await.order = order;
        self.run_fetch().await;
    }

    async fn run_fetch(&self) {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let spec = self.query.lock().await.clone();
        {
            let mut state = self.state.lock().await;
            state.loading = true;
            state.error = None;
        }

        let result = self
            .store
            .select(&self.collection, &build_select(&spec))
            .await;

        let mut state = self.state.lock().await;
        if self.generation.load(Ordering::SeqCst) != ticket {
            return; // superseded while in flight; discard
        }
        state.loading = false;
        match result {
            Ok(resp) => {
                let total = resp.count.unwrap_or(resp.rows.len() as u64);
                let rows = resp
                    .rows
                    .into_iter()
                    .map(|row| serde_json::from_value::<T>(Value::Object(row)))
                    .collect::<Result<Vec<T>, _>>();
                match rows {
                    Ok(rows) => {
                        state.data = ListData { rows, total };
                        state.error = None;
                    }
                    Err(e) => {
                        state.data = ListData::default();
                        state.error = Some(FetchError::Decode(e.to_string()));
                    }
                }
            }
            Err(e) => {
                state.data = ListData::default();
                state.error = Some(FetchError::Remote(e.to_string()));
            }
        }
    }
}

/// Translate a `ListQuery` into one store round trip: ANDed filters, the
/// OR'd search (only when both term and columns are non-empty), the sort
/// key, the zero-indexed inclusive page range, and an exact count.
fn build_select(spec: &ListQuery) -> SelectQuery {
    let mut query = SelectQuery::new().with_count();
    for (column, value) in &spec.filters {
        query = if value.is_null() {
            query.is_null(column.clone())
        } else {
            query.eq(column.clone(), value.clone())
        };
    }
    if !spec.search.is_empty() && !spec.search_columns.is_empty() {
        query = query.search(spec.search.clone(), spec.search_columns.clone());
    }
    if let Some(order) = &spec.order {
        query = query.order_by(order.column.clone(), order.ascending);
    }
    // Saturate so an absurd page or page size degrades to an empty
    // tail range instead of overflowing.
    let page = spec.page.max(1);
    let size = spec.page_size.max(1);
    let from = (page - 1).saturating_mul(size);
    let to = from.saturating_add(size - 1);
    query.range(from, to)
}
