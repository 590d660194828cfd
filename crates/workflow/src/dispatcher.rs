use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use plotline_storage::{CollectionStore, Record, SelectQuery, StoreError};

use crate::assistant::{AssistantClient, AssistantRequest};
use crate::error::WorkflowError;
use crate::phase::WorkflowPhase;
use crate::record::{WorkflowRecord, WORKFLOW_COLLECTION};

/// The envelope returned to the external driver after one dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    /// `"Complete"` when the invocation succeeded (including terminal and
    /// unrecognized-status no-ops), `"Error"` when the phase action failed.
    pub outcome: String,
    pub message: String,
    /// Wall time of this invocation, formatted `HH:MM:SS.mmm`.
    pub elapsed: String,
}

/// A failed phase action. Dispatch logs it with the record id and leaves the
/// record on its current status so the driver can retry the same phase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PhaseError(pub String);

/// What a completed phase action reports back.
pub struct PhaseReport {
    pub message: String,
    /// Override for the status to persist; `None` advances to the natural
    /// successor in the phase order.
    pub next: Option<WorkflowPhase>,
}

/// One phase's unit of work. Each phase is an independently fallible
/// sub-operation; the dispatcher only owns the branch-and-advance logic.
#[async_trait]
pub trait PhaseAction: Send + Sync {
    async fn run(
        &self,
        phase: WorkflowPhase,
        record: &WorkflowRecord,
    ) -> Result<PhaseReport, PhaseError>;
}

/// Default action: delegate every non-terminal phase to the assistant
/// pipeline with the record's envelope.
pub struct AssistantPhaseAction {
    client: Arc<dyn AssistantClient>,
}

impl AssistantPhaseAction {
    pub fn new(client: Arc<dyn AssistantClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PhaseAction for AssistantPhaseAction {
    async fn run(
        &self,
        phase: WorkflowPhase,
        record: &WorkflowRecord,
    ) -> Result<PhaseReport, PhaseError> {
        let response = self
            .client
            .invoke(AssistantRequest {
                assistant: record.wf_assistant_name.clone(),
                phase: phase.to_string(),
                record_id: record.id.clone(),
                project_id: record.narrative_project_id.clone(),
            })
            .await
            .map_err(|e| PhaseError(e.to_string()))?;
        Ok(PhaseReport {
            message: response.message,
            next: None,
        })
    }
}

/// Creates workflow records and advances them one bounded step at a time.
pub struct WorkflowDispatcher {
    store: Arc<dyn CollectionStore>,
    action: Arc<dyn PhaseAction>,
}

impl WorkflowDispatcher {
    pub fn new(store: Arc<dyn CollectionStore>, action: Arc<dyn PhaseAction>) -> Self {
        Self { store, action }
    }

    /// Create exactly one workflow record and return its identifier.
    ///
    /// Both names must be non-empty; a persistence failure aborts the whole
    /// operation with no record left referenced.
    pub async fn create(
        &self,
        assistant_name: &str,
        project_id: &str,
        initial_status: WorkflowPhase,
    ) -> Result<String, WorkflowError> {
        if assistant_name.trim().is_empty() {
            return Err(WorkflowError::MissingField {
                field: "wf_assistant_name",
            });
        }
        if project_id.trim().is_empty() {
            return Err(WorkflowError::MissingField {
                field: "narrative_project_id",
            });
        }

        let now = now_rfc3339();
        let mut values = Record::new();
        values.insert(
            "narrative_project_id".to_string(),
            json!(project_id),
        );
        values.insert("wf_assistant_name".to_string(), json!(assistant_name));
        values.insert("status".to_string(), json!(initial_status.as_str()));
        values.insert("created_at".to_string(), json!(now));
        values.insert("updated_at".to_string(), json!(now));

        let created = self.store.insert(WORKFLOW_COLLECTION, values).await?;
        let id = created
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                StoreError::Backend("created workflow record has no id".to_string())
            })?;
        tracing::info!(record_id = %id, assistant = %assistant_name, "workflow record created");
        Ok(id)
    }

    /// Load the record, branch on its status, and perform at most one
    /// phase's action.
    ///
    /// The dispatcher never loops: advancing through the whole phase
    /// sequence requires repeated external invocation, which keeps each
    /// unit of work bounded and resumable after a crash. A failed phase
    /// leaves `status` untouched for retry. There is no claim step, so the
    /// caller must ensure at most one driver dispatches a given record id
    /// at a time.
    pub async fn dispatch(&self, id: &str) -> Result<DispatchOutcome, WorkflowError> {
        let started = Instant::now();

        let resp = self
            .store
            .select(
                WORKFLOW_COLLECTION,
                &SelectQuery::new().eq("id", json!(id)).range(0, 0),
            )
            .await?;
        let row = resp
            .rows
            .into_iter()
            .next()
            .ok_or_else(|| WorkflowError::RecordNotFound { id: id.to_string() })?;
        let record: WorkflowRecord = serde_json::from_value(Value::Object(row))
            .map_err(|e| WorkflowError::MalformedRecord {
                id: id.to_string(),
                message: e.to_string(),
            })?;

        let phase = match record.status.parse::<WorkflowPhase>() {
            Ok(phase) => phase,
            Err(e) => {
                // Non-fatal to the dispatcher, fatal to this record's
                // progress: it stalls until the status is corrected.
                tracing::warn!(record_id = %record.id, status = %record.status, "unrecognized workflow status");
                return Ok(DispatchOutcome {
                    outcome: "Complete".to_string(),
                    message: e.to_string(),
                    elapsed: format_elapsed(started.elapsed()),
                });
            }
        };

        if phase.is_terminal() {
            return Ok(DispatchOutcome {
                outcome: "Complete".to_string(),
                message: "workflow already complete".to_string(),
                elapsed: format_elapsed(started.elapsed()),
            });
        }

        match self.action.run(phase, &record).await {
            Ok(report) => {
                let next = report.next.or_else(|| phase.next());
                if let Some(next) = next {
                    let mut values = Record::new();
                    values.insert("id".to_string(), json!(record.id));
                    values.insert("status".to_string(), json!(next.as_str()));
                    values.insert("updated_at".to_string(), json!(now_rfc3339()));
                    self.store
                        .upsert(WORKFLOW_COLLECTION, values, "id")
                        .await?;
                    tracing::info!(record_id = %record.id, from = %phase, to = %next, "workflow phase advanced");
                }
                Ok(DispatchOutcome {
                    outcome: "Complete".to_string(),
                    message: if report.message.is_empty() {
                        format!("phase '{}' done", phase)
                    } else {
                        report.message
                    },
                    elapsed: format_elapsed(started.elapsed()),
                })
            }
            Err(e) => {
                tracing::error!(record_id = %record.id, phase = %phase, error = %e, "workflow phase failed; status not advanced");
                Ok(DispatchOutcome {
                    outcome: "Error".to_string(),
                    message: e.to_string(),
                    elapsed: format_elapsed(started.elapsed()),
                })
            }
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Format a duration as `HH:MM:SS.mmm`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_ms = elapsed.as_millis();
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total_secs / 3600,
        total_secs / 60 % 60,
        total_secs % 60,
        ms
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use plotline_storage::MemoryStore;

    struct OkAction;

    #[async_trait]
    impl PhaseAction for OkAction {
        async fn run(
            &self,
            phase: WorkflowPhase,
            _record: &WorkflowRecord,
        ) -> Result<PhaseReport, PhaseError> {
            Ok(PhaseReport {
                message: format!("ran '{}'", phase),
                next: None,
            })
        }
    }

    struct FailAction;

    #[async_trait]
    impl PhaseAction for FailAction {
        async fn run(
            &self,
            _phase: WorkflowPhase,
            _record: &WorkflowRecord,
        ) -> Result<PhaseReport, PhaseError> {
            Err(PhaseError("pipeline unreachable".to_string()))
        }
    }

    fn dispatcher(
        store: Arc<MemoryStore>,
        action: Arc<dyn PhaseAction>,
    ) -> WorkflowDispatcher {
        WorkflowDispatcher::new(store, action)
    }

    async fn status_of(store: &MemoryStore, id: &str) -> String {
        let resp = store
            .select(
                WORKFLOW_COLLECTION,
                &SelectQuery::new().eq("id", json!(id)),
            )
            .await
            .unwrap();
        resp.rows[0]
            .get("status")
            .and_then(Value::as_str)
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn create_validates_required_fields() {
        let store = Arc::new(MemoryStore::new());
        let d = dispatcher(store, Arc::new(OkAction));

        let err = d.create("", "p1", WorkflowPhase::PrepJson).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::MissingField { field: "wf_assistant_name" }
        ));

        let err = d
            .create("outline-bot", "  ", WorkflowPhase::PrepJson)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::MissingField { field: "narrative_project_id" }
        ));
    }

    #[tokio::test]
    async fn create_persists_exactly_one_record() {
        let store = Arc::new(MemoryStore::new());
        let d = dispatcher(store.clone(), Arc::new(OkAction));

        let id = d
            .create("outline-bot", "p1", WorkflowPhase::PrepJson)
            .await
            .unwrap();
        assert_eq!(status_of(&store, &id).await, "Prep JSON");

        let resp = store
            .select(WORKFLOW_COLLECTION, &SelectQuery::new().with_count())
            .await
            .unwrap();
        assert_eq!(resp.count, Some(1));
    }

    #[tokio::test]
    async fn dispatch_unknown_id_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let d = dispatcher(store, Arc::new(OkAction));

        let err = d.dispatch("missing").await.unwrap_err();
        assert!(matches!(err, WorkflowError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn dispatch_advances_one_phase_per_invocation() {
        let store = Arc::new(MemoryStore::new());
        let d = dispatcher(store.clone(), Arc::new(OkAction));

        let id = d
            .create("outline-bot", "p1", WorkflowPhase::PrepJson)
            .await
            .unwrap();

        let outcome = d.dispatch(&id).await.unwrap();
        assert_eq!(outcome.outcome, "Complete");
        assert_eq!(status_of(&store, &id).await, "Prep Prompt");

        // One step per call, nothing more.
        d.dispatch(&id).await.unwrap();
        assert_eq!(status_of(&store, &id).await, "Run GPT Assistant");
    }

    #[tokio::test]
    async fn driving_to_completion_takes_the_whole_chain() {
        let store = Arc::new(MemoryStore::new());
        let d = dispatcher(store.clone(), Arc::new(OkAction));

        let id = d
            .create("outline-bot", "p1", WorkflowPhase::PrepJson)
            .await
            .unwrap();
        for _ in 0..8 {
            d.dispatch(&id).await.unwrap();
        }
        assert_eq!(status_of(&store, &id).await, "Complete");
    }

    #[tokio::test]
    async fn terminal_record_redispatch_is_a_success_no_op() {
        let store = Arc::new(MemoryStore::new());
        let d = dispatcher(store.clone(), Arc::new(FailAction));

        let id = d
            .create("outline-bot", "p1", WorkflowPhase::Complete)
            .await
            .unwrap();
        let outcome = d.dispatch(&id).await.unwrap();
        assert_eq!(outcome.outcome, "Complete");
        assert_eq!(outcome.message, "workflow already complete");
        assert_eq!(status_of(&store, &id).await, "Complete");
    }

    #[tokio::test]
    async fn unrecognized_status_returns_success_without_mutation() {
        let store = Arc::new(MemoryStore::new());
        store
            .load(
                WORKFLOW_COLLECTION,
                vec![serde_json::json!({
                    "id": "w1",
                    "narrative_project_id": "p1",
                    "wf_assistant_name": "outline-bot",
                    "status": "Bogus",
                })
                .as_object()
                .cloned()
                .unwrap()],
            )
            .await;
        let d = dispatcher(store.clone(), Arc::new(OkAction));

        let outcome = d.dispatch("w1").await.unwrap();
        assert_eq!(outcome.outcome, "Complete");
        assert!(outcome.message.contains("Bogus"));
        assert_eq!(status_of(&store, "w1").await, "Bogus");
    }

    #[tokio::test]
    async fn failed_phase_leaves_status_for_retry() {
        let store = Arc::new(MemoryStore::new());
        let d = dispatcher(store.clone(), Arc::new(FailAction));

        let id = d
            .create("outline-bot", "p1", WorkflowPhase::Polling)
            .await
            .unwrap();
        let outcome = d.dispatch(&id).await.unwrap();
        assert_eq!(outcome.outcome, "Error");
        assert!(outcome.message.contains("pipeline unreachable"));
        assert_eq!(status_of(&store, &id).await, "Polling");
    }

    #[test]
    fn elapsed_format_is_hh_mm_ss_mmm() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00:00.000");
        assert_eq!(format_elapsed(Duration::from_millis(42)), "00:00:00.042");
        assert_eq!(
            format_elapsed(Duration::from_millis(3_661_500)),
            "01:01:01.500"
        );
    }
}
