//! In-memory reference backend for `CollectionStore`.
//!
//! Implements the full remote-store contract (filters, OR'd search, ordering,
//! ranged reads with exact counts, insert/upsert/delete) against a map of
//! collection name to rows. The server uses it for local serving and seeding;
//! the rest of the workspace tests against it.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::query::{Filter, SelectQuery, SelectResponse};
use crate::record::{record_column, Record};
use crate::traits::CollectionStore;

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load rows into a collection, replacing its current contents.
    /// Used by the server's seed path and by tests.
    pub async fn load(&self, collection: &str, rows: Vec<Record>) {
        let mut collections = self.collections.write().await;
        collections.insert(collection.to_string(), rows);
    }
}

/// True when the record passes every filter (filters are ANDed).
fn matches_filters(record: &Record, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match filter {
        // SQL semantics: equality against null matches nothing.
        Filter::Eq { column, value } => {
            !value.is_null() && record_column(record, column) == value
        }
        Filter::IsNull { column } => record_column(record, column).is_null(),
    })
}

/// True when ANY listed column contains the term, case-insensitively.
/// Only string columns participate; an empty term or column list matches all.
fn matches_search(record: &Record, term: &str, columns: &[String]) -> bool {
    if term.is_empty() || columns.is_empty() {
        return true;
    }
    let needle = term.to_lowercase();
    columns.iter().any(|column| {
        record_column(record, column)
            .as_str()
            .is_some_and(|text| text.to_lowercase().contains(&needle))
    })
}

/// Total order over JSON scalars for sorting: null < bool < number < string,
/// with non-scalar values last in insertion order.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            _ => 4,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Keep only the requested columns. Unknown columns come back as null, the
/// way a remote select-list echoes its projection.
fn project(record: &Record, columns: &[String]) -> Record {
    columns
        .iter()
        .map(|c| (c.clone(), record_column(record, c).clone()))
        .collect()
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn select(
        &self,
        collection: &str,
        query: &SelectQuery,
    ) -> Result<SelectResponse, StoreError> {
        if let Some((from, to)) = query.range {
            if from > to {
                return Err(StoreError::InvalidQuery {
                    collection: collection.to_string(),
                    message: format!("inverted range ({from}, {to})"),
                });
            }
        }

        let collections = self.collections.read().await;
        let rows = collections.get(collection).map(Vec::as_slice).unwrap_or(&[]);

        let mut matched: Vec<&Record> = rows
            .iter()
            .filter(|r| matches_filters(r, &query.filters))
            .filter(|r| {
                query
                    .search
                    .as_ref()
                    .is_none_or(|s| matches_search(r, &s.term, &s.columns))
            })
            .collect();

        if let Some(order) = &query.order {
            matched.sort_by(|a, b| {
                let ord = compare_values(
                    record_column(a, &order.column),
                    record_column(b, &order.column),
                );
                if order.ascending { ord } else { ord.reverse() }
            });
        }

        // Exact count before the range is applied.
        let count = query.count.then_some(matched.len() as u64);

        let sliced: Vec<&Record> = match query.range {
            Some((from, to)) if from < matched.len() => {
                let end = to.saturating_add(1).min(matched.len());
                matched[from..end].to_vec()
            }
            Some(_) => Vec::new(),
            None => matched,
        };

        let rows = sliced
            .into_iter()
            .map(|r| match &query.columns {
                Some(columns) => project(r, columns),
                None => r.clone(),
            })
            .collect();

        Ok(SelectResponse { rows, count })
    }

    async fn insert(&self, collection: &str, mut values: Record) -> Result<Record, StoreError> {
        let mut collections = self.collections.write().await;
        let rows = collections.entry(collection.to_string()).or_default();

        match values.get("id") {
            Some(id) if !id.is_null() => {
                if rows.iter().any(|r| record_column(r, "id") == id) {
                    return Err(StoreError::DuplicateRow {
                        collection: collection.to_string(),
                        column: "id".to_string(),
                        value: id.to_string(),
                    });
                }
            }
            _ => {
                values.insert(
                    "id".to_string(),
                    Value::String(Uuid::new_v4().to_string()),
                );
            }
        }

        rows.push(values.clone());
        Ok(values)
    }

    async fn upsert(
        &self,
        collection: &str,
        mut values: Record,
        conflict_column: &str,
    ) -> Result<Record, StoreError> {
        let mut collections = self.collections.write().await;
        let rows = collections.entry(collection.to_string()).or_default();

        let conflict_value = values.get(conflict_column).cloned();
        if let Some(conflict_value) = conflict_value.filter(|v| !v.is_null()) {
            if let Some(existing) = rows
                .iter_mut()
                .find(|r| record_column(r, conflict_column) == &conflict_value)
            {
                // Overlay only the provided columns; others keep their value.
                for (column, value) in values {
                    existing.insert(column, value);
                }
                return Ok(existing.clone());
            }
        }

        if values.get("id").is_none_or(Value::is_null) {
            values.insert(
                "id".to_string(),
                Value::String(Uuid::new_v4().to_string()),
            );
        }
        rows.push(values.clone());
        Ok(values)
    }

    async fn delete(
        &self,
        collection: &str,
        column: &str,
        value: &Value,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        if let Some(rows) = collections.get_mut(collection) {
            rows.retain(|r| record_column(r, column) != value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: Value) -> Record {
        pairs.as_object().cloned().expect("object literal")
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .load(
                "beats",
                vec![
                    row(json!({"id": "b1", "title": "Dragon attacks", "summary": "fire", "arc_id": "a1"})),
                    row(json!({"id": "b2", "title": "Quiet morning", "summary": "the dragon sleeps", "arc_id": "a1"})),
                    row(json!({"id": "b3", "title": "Journey begins", "summary": "on the road", "arc_id": null})),
                    row(json!({"id": "b4", "title": "Council meets", "summary": "politics", "arc_id": "a2"})),
                ],
            )
            .await;
        store
    }

    #[tokio::test]
    async fn eq_filter_ands_and_matches() {
        let store = seeded().await;
        let resp = store
            .select("beats", &SelectQuery::new().eq("arc_id", json!("a1")))
            .await
            .unwrap();
        assert_eq!(resp.rows.len(), 2);
    }

    #[tokio::test]
    async fn null_filter_is_explicit_is_null_predicate() {
        let store = seeded().await;
        let resp = store
            .select("beats", &SelectQuery::new().is_null("arc_id"))
            .await
            .unwrap();
        assert_eq!(resp.rows.len(), 1);
        assert_eq!(record_column(&resp.rows[0], "id"), &json!("b3"));

        // Equality against null matches nothing, as in SQL.
        let resp = store
            .select("beats", &SelectQuery::new().eq("arc_id", Value::Null))
            .await
            .unwrap();
        assert!(resp.rows.is_empty());
    }

    #[tokio::test]
    async fn search_ors_across_columns_case_insensitively() {
        let store = seeded().await;
        let resp = store
            .select(
                "beats",
                &SelectQuery::new().search(
                    "dragon",
                    vec!["title".to_string(), "summary".to_string()],
                ),
            )
            .await
            .unwrap();
        // b1 matches on title, b2 only on summary; b3/b4 on neither.
        let ids: Vec<&Value> = resp.rows.iter().map(|r| record_column(r, "id")).collect();
        assert_eq!(ids, vec![&json!("b1"), &json!("b2")]);
    }

    #[tokio::test]
    async fn range_past_end_keeps_exact_count() {
        let store = seeded().await;
        let resp = store
            .select("beats", &SelectQuery::new().range(100, 109).with_count())
            .await
            .unwrap();
        assert!(resp.rows.is_empty());
        assert_eq!(resp.count, Some(4));
    }

    #[tokio::test]
    async fn range_ending_at_usize_max_does_not_overflow() {
        let store = seeded().await;
        let resp = store
            .select(
                "beats",
                &SelectQuery::new().range(0, usize::MAX).with_count(),
            )
            .await
            .unwrap();
        assert_eq!(resp.rows.len(), 4);
        assert_eq!(resp.count, Some(4));
    }

    #[tokio::test]
    async fn range_is_inclusive_and_clamped() {
        let store = seeded().await;
        let resp = store
            .select(
                "beats",
                &SelectQuery::new()
                    .order_by("id", true)
                    .range(2, 9)
                    .with_count(),
            )
            .await
            .unwrap();
        assert_eq!(resp.rows.len(), 2);
        assert_eq!(record_column(&resp.rows[0], "id"), &json!("b3"));
        assert_eq!(resp.count, Some(4));
    }

    #[tokio::test]
    async fn order_descending() {
        let store = seeded().await;
        let resp = store
            .select("beats", &SelectQuery::new().order_by("title", false))
            .await
            .unwrap();
        assert_eq!(record_column(&resp.rows[0], "title"), &json!("Quiet morning"));
    }

    #[tokio::test]
    async fn projection_returns_only_selected_columns() {
        let store = seeded().await;
        let resp = store
            .select(
                "beats",
                &SelectQuery::new()
                    .select(vec!["id".to_string(), "title".to_string()])
                    .eq("id", json!("b1")),
            )
            .await
            .unwrap();
        assert_eq!(resp.rows[0].len(), 2);
        assert!(resp.rows[0].get("summary").is_none());
    }

    #[tokio::test]
    async fn insert_assigns_id_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let created = store
            .insert("projects", row(json!({"name": "Saga"})))
            .await
            .unwrap();
        assert!(created.get("id").is_some_and(|v| v.is_string()));

        let err = store
            .insert("projects", created.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRow { .. }));
    }

    #[tokio::test]
    async fn upsert_overlays_existing_row() {
        let store = seeded().await;
        let updated = store
            .upsert(
                "beats",
                row(json!({"id": "b1", "title": "Dragon retreats"})),
                "id",
            )
            .await
            .unwrap();
        assert_eq!(record_column(&updated, "title"), &json!("Dragon retreats"));
        // Columns not provided keep their value.
        assert_eq!(record_column(&updated, "summary"), &json!("fire"));

        let resp = store
            .select("beats", &SelectQuery::new().with_count())
            .await
            .unwrap();
        assert_eq!(resp.count, Some(4));
    }

    #[tokio::test]
    async fn upsert_without_match_inserts() {
        let store = seeded().await;
        store
            .upsert("beats", row(json!({"id": "b9", "title": "Epilogue"})), "id")
            .await
            .unwrap();
        let resp = store
            .select("beats", &SelectQuery::new().with_count())
            .await
            .unwrap();
        assert_eq!(resp.count, Some(5));
    }

    #[tokio::test]
    async fn delete_zero_rows_is_success() {
        let store = seeded().await;
        store
            .delete("beats", "id", &json!("missing"))
            .await
            .unwrap();
        store.delete("beats", "id", &json!("b4")).await.unwrap();
        let resp = store
            .select("beats", &SelectQuery::new().with_count())
            .await
            .unwrap();
        assert_eq!(resp.count, Some(3));
    }

    #[tokio::test]
    async fn inverted_range_is_invalid() {
        let store = seeded().await;
        let err = store
            .select("beats", &SelectQuery::new().range(5, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery { .. }));
    }
}
