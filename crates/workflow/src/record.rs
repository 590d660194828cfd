use serde::{Deserialize, Serialize};

/// Collection holding the workflow control records.
pub const WORKFLOW_COLLECTION: &str = "automation_controls";

/// The persisted automation-control row driving one assistant run.
///
/// Created once by [`crate::WorkflowDispatcher::create`]; its `status` column
/// is mutated only by dispatch and is never deleted by this layer — lifecycle
/// termination is `status` reaching the terminal phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: String,
    pub narrative_project_id: String,
    pub wf_assistant_name: String,
    pub status: String,
    /// RFC 3339 timestamp string.
    #[serde(default)]
    pub created_at: Option<String>,
    /// RFC 3339 timestamp string.
    #[serde(default)]
    pub updated_at: Option<String>,
}
