use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One named step in the workflow's closed, ordered status set.
///
/// The string forms are the exact values persisted in the record's `status`
/// column; any other value is the unrecognized error state, which the
/// dispatcher logs without transitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowPhase {
    #[serde(rename = "Prep JSON")]
    PrepJson,
    #[serde(rename = "Prep Prompt")]
    PrepPrompt,
    #[serde(rename = "Run GPT Assistant")]
    RunAssistant,
    #[serde(rename = "Check Loop Batch")]
    CheckLoopBatch,
    #[serde(rename = "Polling")]
    Polling,
    #[serde(rename = "Re-Send Last Response")]
    ResendLastResponse,
    #[serde(rename = "Parse Response")]
    ParseResponse,
    #[serde(rename = "Final Validation")]
    FinalValidation,
    #[serde(rename = "Complete")]
    Complete,
}

impl WorkflowPhase {
    /// All phases in intended progression order.
    pub const ALL: [WorkflowPhase; 9] = [
        WorkflowPhase::PrepJson,
        WorkflowPhase::PrepPrompt,
        WorkflowPhase::RunAssistant,
        WorkflowPhase::CheckLoopBatch,
        WorkflowPhase::Polling,
        WorkflowPhase::ResendLastResponse,
        WorkflowPhase::ParseResponse,
        WorkflowPhase::FinalValidation,
        WorkflowPhase::Complete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowPhase::PrepJson => "Prep JSON",
            WorkflowPhase::PrepPrompt => "Prep Prompt",
            WorkflowPhase::RunAssistant => "Run GPT Assistant",
            WorkflowPhase::CheckLoopBatch => "Check Loop Batch",
            WorkflowPhase::Polling => "Polling",
            WorkflowPhase::ResendLastResponse => "Re-Send Last Response",
            WorkflowPhase::ParseResponse => "Parse Response",
            WorkflowPhase::FinalValidation => "Final Validation",
            WorkflowPhase::Complete => "Complete",
        }
    }

    /// The phase that follows this one; `None` for the terminal phase.
    pub fn next(self) -> Option<WorkflowPhase> {
        let position = Self::ALL.iter().position(|p| *p == self)?;
        Self::ALL.get(position + 1).copied()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowPhase::Complete)
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status value outside the closed phase set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized workflow status '{0}'")]
pub struct UnrecognizedStatus(pub String);

impl FromStr for WorkflowPhase {
    type Err = UnrecognizedStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| UnrecognizedStatus(s.to_string()))
    }
}
