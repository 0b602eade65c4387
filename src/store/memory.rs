//! In-memory repositories.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{EngineError, EngineResult};
use crate::execution::record::{ExecutionStatus, StepExecutionRecord, WorkflowExecution};
use crate::workflow::WorkflowDefinition;

use super::{apply_update, ensure_running, ExecutionRepository, StatusUpdate, WorkflowRepository};

fn lock<T>(mutex: &Mutex<T>) -> EngineResult<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| EngineError::LockPoisoned)
}

#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    executions: Mutex<HashMap<String, WorkflowExecution>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionRepository for InMemoryExecutionStore {
    fn create(&self, execution: &WorkflowExecution) -> EngineResult<()> {
        let mut executions = lock(&self.executions)?;
        if executions.contains_key(&execution.id) {
            return Err(EngineError::DuplicateExecution(execution.id.clone()));
        }
        executions.insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    fn add_step_execution(
        &self,
        execution_id: &str,
        record: StepExecutionRecord,
    ) -> EngineResult<()> {
        let mut executions = lock(&self.executions)?;
        let execution = executions
            .get_mut(execution_id)
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;
        ensure_running(execution)?;
        execution.step_executions.push(record);
        Ok(())
    }

    fn update_status(
        &self,
        execution_id: &str,
        expected: ExecutionStatus,
        update: StatusUpdate,
    ) -> EngineResult<WorkflowExecution> {
        let mut executions = lock(&self.executions)?;
        let execution = executions
            .get_mut(execution_id)
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;
        apply_update(execution, expected, update)?;
        Ok(execution.clone())
    }

    fn get(&self, execution_id: &str) -> EngineResult<Option<WorkflowExecution>> {
        Ok(lock(&self.executions)?.get(execution_id).cloned())
    }

    fn list(&self) -> EngineResult<Vec<WorkflowExecution>> {
        let mut all: Vec<WorkflowExecution> = lock(&self.executions)?.values().cloned().collect();
        all.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    workflows: Mutex<HashMap<String, WorkflowDefinition>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a definition under its id.
    pub fn insert(&self, workflow: WorkflowDefinition) -> EngineResult<()> {
        lock(&self.workflows)?.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    pub fn remove(&self, workflow_id: &str) -> EngineResult<Option<WorkflowDefinition>> {
        Ok(lock(&self.workflows)?.remove(workflow_id))
    }
}

impl WorkflowRepository for InMemoryWorkflowStore {
    fn get(&self, workflow_id: &str) -> EngineResult<Option<WorkflowDefinition>> {
        Ok(lock(&self.workflows)?.get(workflow_id).cloned())
    }
}
