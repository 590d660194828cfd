//! Core HTTP route handlers: health, collection CRUD proxy, workflows.
//!
//! The CRUD routes go through the same data-access layer the client views
//! use (`RowFetcher`, `ListFetcher`, `MutationGateway`), so the server and
//! the views share one contract against the collection store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use plotline_data::{FetchError, ListFetcher, ListQuery, MutationGateway, RowFetcher};
use plotline_storage::Record;
use plotline_workflow::{WorkflowError, WorkflowPhase};

use super::json_error;
use super::state::AppState;

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

fn default_true() -> bool {
    true
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    25
}

/// Body of POST /collections/{name}/query — mirrors `ListQuery`.
#[derive(Debug, Deserialize)]
pub(crate) struct QueryBody {
    #[serde(default)]
    filters: BTreeMap<String, Value>,
    #[serde(default)]
    search: String,
    #[serde(default)]
    search_columns: Vec<String>,
    #[serde(default)]
    order_by: Option<String>,
    #[serde(default = "default_true")]
    ascending: bool,
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_page_size")]
    page_size: usize,
}

/// POST /collections/{name}/query
pub(crate) async fn handle_query(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<QueryBody>,
) -> impl IntoResponse {
    let mut query = ListQuery::new(body.page_size).search_columns(body.search_columns);
    query.filters = body.filters;
    query.search = body.search;
    query.page = body.page.max(1);
    if let Some(column) = body.order_by {
        query = query.order_by(column, body.ascending);
    }

    let fetcher: ListFetcher<Record> = ListFetcher::new(state.store.clone(), name, query);
    fetcher.fetch().await;
    let fetched = fetcher.state().await;

    match fetched.error {
        None => (
            StatusCode::OK,
            Json(json!({"rows": fetched.data.rows, "total": fetched.data.total})),
        )
            .into_response(),
        Some(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()).into_response(),
    }
}

/// GET /collections/{name}/{id}
///
/// `?column=` overrides the identifier column (default `id`).
pub(crate) async fn handle_get_row(
    State(state): State<Arc<AppState>>,
    Path((name, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let mut fetcher: RowFetcher<Record> = RowFetcher::new(state.store.clone(), name);
    if let Some(column) = params.get("column") {
        fetcher = fetcher.with_key_column(column.clone());
    }
    fetcher.set_key(Some(Value::String(id.clone()))).await;
    let fetched = fetcher.state().await;

    match (fetched.data, fetched.error) {
        (Some(row), _) => (StatusCode::OK, Json(Value::Object(row))).into_response(),
        (None, Some(FetchError::NotFound)) => {
            json_error(StatusCode::NOT_FOUND, &format!("row '{}' not found", id)).into_response()
        }
        (None, Some(e)) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()).into_response()
        }
        (None, None) => json_error(StatusCode::NOT_FOUND, "no row").into_response(),
    }
}

/// POST /collections/{name}
pub(crate) async fn handle_insert_row(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let Some(values) = body.as_object().cloned() else {
        return json_error(StatusCode::BAD_REQUEST, "body must be a JSON object")
            .into_response();
    };

    let gateway = MutationGateway::new(state.store.clone(), name);
    match gateway.insert(values).await {
        Ok(created) => (StatusCode::CREATED, Json(Value::Object(created))).into_response(),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.0).into_response(),
    }
}

/// Body of PUT /collections/{name}.
#[derive(Debug, Deserialize)]
pub(crate) struct UpsertBody {
    values: Value,
    #[serde(default)]
    on_conflict: Option<String>,
}

/// PUT /collections/{name}
pub(crate) async fn handle_upsert_row(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<UpsertBody>,
) -> impl IntoResponse {
    let Some(values) = body.values.as_object().cloned() else {
        return json_error(StatusCode::BAD_REQUEST, "'values' must be a JSON object")
            .into_response();
    };

    let gateway = MutationGateway::new(state.store.clone(), name);
    let conflict_column = body.on_conflict.as_deref().unwrap_or("id");
    match gateway.upsert_on(values, conflict_column).await {
        Ok(stored) => (StatusCode::OK, Json(Value::Object(stored))).into_response(),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.0).into_response(),
    }
}

/// DELETE /collections/{name}/{id}
///
/// `?column=` overrides the identifier column (default `id`).
pub(crate) async fn handle_delete_row(
    State(state): State<Arc<AppState>>,
    Path((name, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let gateway = MutationGateway::new(state.store.clone(), name);
    let column = params.get("column").map(String::as_str).unwrap_or("id");
    match gateway.remove_by(column, Value::String(id)).await {
        Ok(()) => (StatusCode::OK, Json(json!({"deleted": true}))).into_response(),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.0).into_response(),
    }
}

/// Body of POST /workflows.
#[derive(Debug, Deserialize)]
pub(crate) struct CreateWorkflowBody {
    #[serde(default)]
    wf_assistant_name: String,
    #[serde(default)]
    narrative_project_id: String,
    #[serde(default)]
    status: Option<String>,
}

/// POST /workflows
pub(crate) async fn handle_create_workflow(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateWorkflowBody>,
) -> impl IntoResponse {
    let initial_status = match body.status.as_deref() {
        None => WorkflowPhase::PrepJson,
        Some(s) => match s.parse::<WorkflowPhase>() {
            Ok(phase) => phase,
            Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()).into_response(),
        },
    };

    match state
        .dispatcher
        .create(
            &body.wf_assistant_name,
            &body.narrative_project_id,
            initial_status,
        )
        .await
    {
        Ok(id) => (StatusCode::CREATED, Json(json!({"id": id}))).into_response(),
        Err(e @ WorkflowError::MissingField { .. }) => {
            json_error(StatusCode::BAD_REQUEST, &e.to_string()).into_response()
        }
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()).into_response(),
    }
}

/// POST /workflows/{id}/dispatch
pub(crate) async fn handle_dispatch_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.dispatcher.dispatch(&id).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e @ WorkflowError::RecordNotFound { .. }) => {
            json_error(StatusCode::NOT_FOUND, &e.to_string()).into_response()
        }
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()).into_response(),
    }
}
