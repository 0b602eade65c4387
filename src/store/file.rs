//! File-backed repositories
//!
//! Executions are stored as pretty JSON, one file per execution:
//!
//! ```text
//! <data_dir>/executions/<execution_id>.json
//! <data_dir>/workflows/<workflow_id>.yaml
//! ```
//!
//! Every write goes to a sibling temp file first and is renamed into place,
//! so a crash never leaves a half-written record behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::execution::record::{ExecutionStatus, StepExecutionRecord, WorkflowExecution};
use crate::workflow::{load_workflow, save_workflow, WorkflowDefinition};

use super::{apply_update, ensure_running, ExecutionRepository, StatusUpdate, WorkflowRepository};

/// Ids become file names, so only a conservative character set is accepted.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn write_atomic(path: &Path, contents: &str) -> EngineResult<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents).map_err(|e| EngineError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| EngineError::io(path, e))
}

fn ensure_dir(dir: &Path) -> EngineResult<()> {
    fs::create_dir_all(dir).map_err(|e| EngineError::io(dir, e))
}

/// Stores each execution as `<dir>/<id>.json`.
#[derive(Debug)]
pub struct FileExecutionStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileExecutionStore {
    /// Opens (creating if needed) `<data_dir>/executions`.
    pub fn open(data_dir: impl AsRef<Path>) -> EngineResult<Self> {
        let dir = data_dir.as_ref().join("executions");
        ensure_dir(&dir)?;
        debug!("Execution store at {}", dir.display());
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, execution_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", execution_id))
    }

    fn guard(&self) -> EngineResult<MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| EngineError::LockPoisoned)
    }

    fn read(&self, execution_id: &str) -> EngineResult<Option<WorkflowExecution>> {
        if !is_safe_id(execution_id) {
            return Ok(None);
        }
        let path = self.path_for(execution_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| EngineError::io(&path, e))?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn read_existing(&self, execution_id: &str) -> EngineResult<WorkflowExecution> {
        self.read(execution_id)?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))
    }

    fn write(&self, execution: &WorkflowExecution) -> EngineResult<()> {
        let json = serde_json::to_string_pretty(execution)?;
        write_atomic(&self.path_for(&execution.id), &json)
    }
}

impl ExecutionRepository for FileExecutionStore {
    fn create(&self, execution: &WorkflowExecution) -> EngineResult<()> {
        if !is_safe_id(&execution.id) {
            return Err(EngineError::Config(format!(
                "Execution id '{}' is not usable as a file name",
                execution.id
            )));
        }
        let _guard = self.guard()?;
        if self.path_for(&execution.id).exists() {
            return Err(EngineError::DuplicateExecution(execution.id.clone()));
        }
        self.write(execution)?;
        debug!("Created execution record {}", execution.id);
        Ok(())
    }

    fn add_step_execution(
        &self,
        execution_id: &str,
        record: StepExecutionRecord,
    ) -> EngineResult<()> {
        let _guard = self.guard()?;
        let mut execution = self.read_existing(execution_id)?;
        ensure_running(&execution)?;
        execution.step_executions.push(record);
        self.write(&execution)
    }

    fn update_status(
        &self,
        execution_id: &str,
        expected: ExecutionStatus,
        update: StatusUpdate,
    ) -> EngineResult<WorkflowExecution> {
        let _guard = self.guard()?;
        let mut execution = self.read_existing(execution_id)?;
        apply_update(&mut execution, expected, update)?;
        self.write(&execution)?;
        Ok(execution)
    }

    fn get(&self, execution_id: &str) -> EngineResult<Option<WorkflowExecution>> {
        self.read(execution_id)
    }

    fn list(&self) -> EngineResult<Vec<WorkflowExecution>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| EngineError::io(&self.dir, e))?;
        let mut all = Vec::new();

        for entry in entries {
            let path = entry.map_err(|e| EngineError::io(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(|e| EngineError::io(&path, e))
                .and_then(|content| Ok(serde_json::from_str::<WorkflowExecution>(&content)?));
            match parsed {
                Ok(execution) => all.push(execution),
                Err(e) => warn!("Skipping unreadable execution record: {}", e),
            }
        }

        all.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}

/// Stores workflow definitions as `<dir>/<id>.yaml`.
#[derive(Debug, Clone)]
pub struct FileWorkflowStore {
    dir: PathBuf,
}

impl FileWorkflowStore {
    /// Opens (creating if needed) `<data_dir>/workflows`.
    pub fn open(data_dir: impl AsRef<Path>) -> EngineResult<Self> {
        let dir = data_dir.as_ref().join("workflows");
        ensure_dir(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, workflow_id: &str) -> PathBuf {
        self.dir.join(format!("{}.yaml", workflow_id))
    }

    /// Registers a definition so later resumes can find it.
    pub fn save(&self, workflow: &WorkflowDefinition) -> EngineResult<PathBuf> {
        if !is_safe_id(&workflow.id) {
            return Err(EngineError::Config(format!(
                "Workflow id '{}' is not usable as a file name",
                workflow.id
            )));
        }
        let path = self.path_for(&workflow.id);
        save_workflow(workflow, &path)?;
        info!("Registered workflow '{}'", workflow.id);
        Ok(path)
    }
}

impl WorkflowRepository for FileWorkflowStore {
    fn get(&self, workflow_id: &str) -> EngineResult<Option<WorkflowDefinition>> {
        if !is_safe_id(workflow_id) {
            return Ok(None);
        }
        let path = self.path_for(workflow_id);
        if !path.exists() {
            return Ok(None);
        }
        let mut workflow = load_workflow(&path)?;
        workflow.id = workflow_id.to_string();
        Ok(Some(workflow))
    }
}
