//! The assistant workflow state machine.
//!
//! A workflow is one long-running assistant automation run, persisted as an
//! automation-control record whose `status` column names the current phase.
//! The [`WorkflowDispatcher`] creates records and advances them one bounded
//! step per invocation: each dispatch loads the record, branches on its
//! status, runs at most one phase's action, and returns. Progress across the
//! whole phase sequence requires an external driver re-invoking dispatch,
//! which keeps every unit of work independently retryable after a crash.

mod assistant;
mod dispatcher;
mod error;
mod phase;
mod record;

pub use assistant::{
    AssistantClient, AssistantError, AssistantRequest, AssistantResponse, HttpAssistant,
    NullAssistant,
};
pub use dispatcher::{
    format_elapsed, AssistantPhaseAction, DispatchOutcome, PhaseAction, PhaseError, PhaseReport,
    WorkflowDispatcher,
};
pub use error::WorkflowError;
pub use phase::{UnrecognizedStatus, WorkflowPhase};
pub use record::{WorkflowRecord, WORKFLOW_COLLECTION};
