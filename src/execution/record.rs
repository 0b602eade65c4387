//! Durable Execution Records
//!
//! The persisted shape of an execution and its append-only step history.
//! Only the engine mutates these, through an
//! [`ExecutionRepository`](crate::store::ExecutionRepository).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::context::{Entity, StepResultEntry};

/// Lifecycle status of an execution.
///
/// `Paused` is the only non-terminal status that outlives an engine call.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Paused,
    Succeeded,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// True for statuses no engine call will ever leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single recorded step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepExecutionStatus {
    Succeeded,
    Failed,
}

impl StepExecutionStatus {
    pub fn from_passed(passed: bool) -> Self {
        if passed {
            Self::Succeeded
        } else {
            Self::Failed
        }
    }
}

/// What caused an execution to start.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TriggerContext {
    /// e.g. "on_create", "on_status_change", "manual"
    pub trigger_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_status: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl TriggerContext {
    pub fn new(trigger_type: impl Into<String>) -> Self {
        Self {
            trigger_type: trigger_type.into(),
            ..Self::default()
        }
    }
}

/// One executed step. Appended once, never rewritten.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StepExecutionRecord {
    pub id: String,
    pub step_id: String,
    pub status: StepExecutionStatus,
    pub passed: bool,
    #[serde(default)]
    pub blocking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_ms: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// A durable run of one workflow against one entity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    /// Set only while paused: the step awaiting an external decision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<String>,
    pub success_count: u32,
    pub failure_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_context: Option<TriggerContext>,
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    /// Entity snapshot as of the last status update
    #[serde(default)]
    pub entity: Entity,
    #[serde(default)]
    pub step_executions: Vec<StepExecutionRecord>,
    /// External decisions by the id of the paused record they resolved
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub decisions: BTreeMap<String, StepResultEntry>,
}

impl WorkflowExecution {
    /// Number of step dispatches recorded so far.
    pub fn steps_dispatched(&self) -> usize {
        self.step_executions.len()
    }

    pub fn is_paused(&self) -> bool {
        self.status == ExecutionStatus::Paused
    }

    /// Latest recorded outcome per step, in the shape handlers see them.
    ///
    /// A step visited more than once (loops) keeps its most recent result.
    /// A record resolved by [`Engine::resume`](crate::execution::Engine::resume)
    /// is replaced by its decision.
    pub fn step_results(&self) -> BTreeMap<String, StepResultEntry> {
        let mut results = BTreeMap::new();
        for record in &self.step_executions {
            let entry = match self.decisions.get(&record.id) {
                Some(decision) => decision.clone(),
                None => StepResultEntry {
                    passed: record.passed,
                    message: record.message.clone(),
                    data: record.result_data.clone(),
                },
            };
            results.insert(record.step_id.clone(), entry);
        }
        results
    }

    /// Most recent record for a step, if it ran.
    pub fn last_record_for(&self, step_id: &str) -> Option<&StepExecutionRecord> {
        self.step_executions
            .iter()
            .rev()
            .find(|r| r.step_id == step_id)
    }
}
