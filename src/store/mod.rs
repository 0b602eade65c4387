//! Execution and Workflow Repositories
//!
//! The engine persists every transition through [`ExecutionRepository`] and
//! looks up definitions for resume through [`WorkflowRepository`]. Two
//! implementations ship: in-memory (tests, embedding) and file-backed
//! (durable across process restarts).

pub mod file;
pub mod memory;

use chrono::{DateTime, Utc};

use crate::error::{EngineError, EngineResult};
use crate::execution::context::{Entity, StepResultEntry};
use crate::execution::record::{ExecutionStatus, StepExecutionRecord, WorkflowExecution};
use crate::workflow::WorkflowDefinition;

pub use file::{FileExecutionStore, FileWorkflowStore};
pub use memory::{InMemoryExecutionStore, InMemoryWorkflowStore};

/// A status transition plus the bookkeeping that travels with it.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: ExecutionStatus,
    pub current_step_id: Option<String>,
    pub success_count: u32,
    pub failure_count: u32,
    pub error_message: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
    /// New entity snapshot; `None` keeps the stored one
    pub entity: Option<Entity>,
    /// Decision to store, keyed by the id of the record it resolves
    pub decision: Option<(String, StepResultEntry)>,
}

impl StatusUpdate {
    /// Transition that keeps the record's counters and fields as they are.
    pub fn status_only(execution: &WorkflowExecution, status: ExecutionStatus) -> Self {
        Self {
            status,
            current_step_id: execution.current_step_id.clone(),
            success_count: execution.success_count,
            failure_count: execution.failure_count,
            error_message: execution.error_message.clone(),
            finished_at: execution.finished_at,
            entity: None,
            decision: None,
        }
    }
}

/// Durable storage for execution records.
///
/// Implementations must be safe to share between threads; each method is a
/// single atomic operation on one record.
pub trait ExecutionRepository: Send + Sync {
    /// Stores a new execution. Fails if the id is already taken.
    fn create(&self, execution: &WorkflowExecution) -> EngineResult<()>;

    /// Appends a step record. Only legal while the execution is running.
    fn add_step_execution(&self, execution_id: &str, record: StepExecutionRecord)
        -> EngineResult<()>;

    /// Applies `update` if the stored status still equals `expected`,
    /// returning the updated record.
    fn update_status(
        &self,
        execution_id: &str,
        expected: ExecutionStatus,
        update: StatusUpdate,
    ) -> EngineResult<WorkflowExecution>;

    fn get(&self, execution_id: &str) -> EngineResult<Option<WorkflowExecution>>;

    /// All executions, oldest first.
    fn list(&self) -> EngineResult<Vec<WorkflowExecution>>;
}

/// Read access to workflow definitions by id.
pub trait WorkflowRepository: Send + Sync {
    fn get(&self, workflow_id: &str) -> EngineResult<Option<WorkflowDefinition>>;
}

pub(crate) fn ensure_running(execution: &WorkflowExecution) -> EngineResult<()> {
    if execution.status != ExecutionStatus::Running {
        return Err(EngineError::StaleTransition {
            execution_id: execution.id.clone(),
            expected: ExecutionStatus::Running,
            actual: execution.status,
        });
    }
    Ok(())
}

/// Optimistic status transition shared by the store implementations.
pub(crate) fn apply_update(
    execution: &mut WorkflowExecution,
    expected: ExecutionStatus,
    update: StatusUpdate,
) -> EngineResult<()> {
    if execution.status != expected {
        return Err(EngineError::StaleTransition {
            execution_id: execution.id.clone(),
            expected,
            actual: execution.status,
        });
    }

    execution.status = update.status;
    execution.current_step_id = update.current_step_id;
    execution.success_count = update.success_count;
    execution.failure_count = update.failure_count;
    execution.error_message = update.error_message;
    execution.finished_at = update.finished_at;
    if let Some(entity) = update.entity {
        execution.entity = entity;
    }
    if let Some((record_id, entry)) = update.decision {
        execution.decisions.insert(record_id, entry);
    }
    Ok(())
}
