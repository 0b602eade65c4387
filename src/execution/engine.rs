//! Workflow Execution Engine
//!
//! The interpreter that walks a workflow's branch graph for one entity:
//! - dispatches each step to its handler and records the outcome durably
//!   before branching
//! - follows `on_pass` / `on_fail` until a branch is absent
//! - suspends on blocking steps and picks up again in [`Engine::resume`]
//! - guards against runaway cycles with a per-call dispatch limit
//!
//! Every transition goes through the [`ExecutionRepository`], so a paused
//! execution can be resumed by a different process.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::{EngineConfig, DEFAULT_MAX_STEP_DISPATCHES};
use crate::error::{EngineError, EngineResult};
use crate::handlers::HandlerServices;
use crate::store::{ExecutionRepository, StatusUpdate, WorkflowRepository};
use crate::workflow::WorkflowDefinition;

use super::context::{Entity, ExecutionContext};
use super::record::{
    ExecutionStatus, StepExecutionRecord, StepExecutionStatus, TriggerContext, WorkflowExecution,
};
use super::step::execute_step;

/// Input for starting a new execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunRequest {
    pub entity: Entity,
    pub entity_type: String,
    pub entity_id: String,
    pub entity_name: Option<String>,
    pub actor_email: Option<String>,
    pub trigger_context: Option<TriggerContext>,
}

impl RunRequest {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>, entity: Entity) -> Self {
        Self {
            entity,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            ..Self::default()
        }
    }

    pub fn with_entity_name(mut self, name: impl Into<String>) -> Self {
        self.entity_name = Some(name.into());
        self
    }

    pub fn with_actor(mut self, email: impl Into<String>) -> Self {
        self.actor_email = Some(email.into());
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerContext) -> Self {
        self.trigger_context = Some(trigger);
        self
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    success: u32,
    failure: u32,
}

/// Outcome of the most recent step, which decides the terminal status when
/// its branch is absent.
#[derive(Debug, Clone)]
struct Verdict {
    passed: bool,
    failure: Option<String>,
}

impl Verdict {
    fn passed() -> Self {
        Self {
            passed: true,
            failure: None,
        }
    }
}

/// Workflow execution engine.
///
/// Holds no per-run state: every [`run`](Engine::run) or
/// [`resume`](Engine::resume) builds its own context, so one engine can serve
/// concurrent executions.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use procflow::execution::{Engine, RunRequest};
/// use procflow::store::{InMemoryExecutionStore, InMemoryWorkflowStore};
/// use procflow::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("review.yaml")?;
///     let workflows = Arc::new(InMemoryWorkflowStore::new());
///     workflows.insert(workflow.clone())?;
///
///     let engine = Engine::new(Arc::new(InMemoryExecutionStore::new()), workflows);
///     let entity = serde_json::json!({"owner": "a@x.com"});
///     let request = RunRequest::new(
///         "data_product",
///         "dp-1",
///         entity.as_object().cloned().unwrap_or_default(),
///     );
///
///     let execution = engine.run(&workflow, request)?;
///     println!("{}", execution.status);
///     Ok(())
/// }
/// ```
pub struct Engine {
    executions: Arc<dyn ExecutionRepository>,
    workflows: Arc<dyn WorkflowRepository>,
    services: HandlerServices,
    max_step_dispatches: usize,
}

impl Engine {
    /// Creates an engine with default handler services.
    pub fn new(
        executions: Arc<dyn ExecutionRepository>,
        workflows: Arc<dyn WorkflowRepository>,
    ) -> Self {
        Self {
            executions,
            workflows,
            services: HandlerServices::default(),
            max_step_dispatches: DEFAULT_MAX_STEP_DISPATCHES,
        }
    }

    /// Creates an engine whose services and limits follow `config`.
    pub fn from_config(
        config: &EngineConfig,
        executions: Arc<dyn ExecutionRepository>,
        workflows: Arc<dyn WorkflowRepository>,
    ) -> Self {
        let mut engine = Self::new(executions, workflows);
        engine.set_services(HandlerServices::from_config(config));
        engine.set_max_step_dispatches(config.max_step_dispatches);
        engine
    }

    /// Replaces the collaborators handed to step handlers.
    pub fn set_services(&mut self, services: HandlerServices) {
        self.services = services;
    }

    /// Sets the dispatch limit applied to each `run` / `resume` call.
    pub fn set_max_step_dispatches(&mut self, max: usize) {
        self.max_step_dispatches = max;
    }

    pub fn services(&self) -> &HandlerServices {
        &self.services
    }

    pub fn get_execution(&self, execution_id: &str) -> EngineResult<Option<WorkflowExecution>> {
        self.executions.get(execution_id)
    }

    pub fn list_executions(&self) -> EngineResult<Vec<WorkflowExecution>> {
        self.executions.list()
    }

    /// Runs `workflow` against the request's entity.
    ///
    /// Returns the stored execution once it is terminal or paused. Step
    /// failures are part of the returned record; only repository faults are
    /// errors here.
    pub fn run(
        &self,
        workflow: &WorkflowDefinition,
        request: RunRequest,
    ) -> EngineResult<WorkflowExecution> {
        let execution = WorkflowExecution {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            status: ExecutionStatus::Running,
            current_step_id: None,
            success_count: 0,
            failure_count: 0,
            error_message: None,
            started_at: Utc::now(),
            finished_at: None,
            triggered_by: request.actor_email,
            trigger_context: request.trigger_context,
            entity_type: request.entity_type,
            entity_id: request.entity_id,
            entity_name: request.entity_name,
            entity: request.entity,
            step_executions: Vec::new(),
            decisions: BTreeMap::new(),
        };
        self.executions.create(&execution)?;

        info!(
            "Starting workflow '{}' for {} '{}' (execution {})",
            workflow.name, execution.entity_type, execution.entity_id, execution.id
        );

        let mut ctx = ExecutionContext::restore(&execution);
        let entry = workflow.entry_step().map(|step| step.step_id.clone());
        if entry.is_none() {
            warn!("Workflow '{}' has no steps", workflow.id);
        }

        self.drive(workflow, &mut ctx, Tally::default(), entry, Verdict::passed())
    }

    /// Resolves a paused execution with an external decision and continues.
    ///
    /// `step_result` becomes the paused step's verdict and picks its
    /// `on_pass` / `on_fail` branch; `result_data` is merged into that step's
    /// result for later steps. No record is appended for the paused step and
    /// its tally is left as counted when it paused.
    pub fn resume(
        &self,
        execution_id: &str,
        step_result: bool,
        result_data: Option<Map<String, Value>>,
    ) -> EngineResult<WorkflowExecution> {
        let stored = self
            .executions
            .get(execution_id)?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;
        if !stored.is_paused() {
            if stored.status.is_terminal() {
                warn!(
                    "Execution {} already finished {}, nothing to resume",
                    execution_id, stored.status
                );
            } else {
                warn!(
                    "Execution {} is still running in another call",
                    execution_id
                );
            }
            return Err(EngineError::NotPaused {
                execution_id: execution_id.to_string(),
                status: stored.status,
            });
        }

        let workflow = self
            .workflows
            .get(&stored.workflow_id)?
            .ok_or_else(|| EngineError::WorkflowNotFound(stored.workflow_id.clone()))?;
        let paused_id = stored
            .current_step_id
            .clone()
            .ok_or_else(|| EngineError::MissingCursor(execution_id.to_string()))?;

        // The decision is durable from the claim on, so later resumes
        // rebuild the same step results.
        let mut ctx = ExecutionContext::restore(&stored);
        ctx.apply_decision(&paused_id, step_result, result_data.as_ref());
        let decision = stored
            .last_record_for(&paused_id)
            .zip(ctx.step_results.get(&paused_id))
            .map(|(record, entry)| (record.id.clone(), entry.clone()));

        // Claim the execution; a concurrent resume loses here.
        let execution = self.executions.update_status(
            execution_id,
            ExecutionStatus::Paused,
            StatusUpdate {
                current_step_id: None,
                decision,
                ..StatusUpdate::status_only(&stored, ExecutionStatus::Running)
            },
        )?;

        info!(
            "Resuming execution {} at step '{}' ({})",
            execution_id,
            paused_id,
            if step_result { "approved" } else { "rejected" }
        );

        let tally = Tally {
            success: execution.success_count,
            failure: execution.failure_count,
        };
        let supplied_message = result_data
            .as_ref()
            .and_then(|data| data.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let verdict = Verdict {
            passed: step_result,
            failure: Some(
                supplied_message.unwrap_or_else(|| format!("Rejected at step {}", paused_id)),
            ),
        };

        let Some(paused_step) = workflow.get_step(&paused_id) else {
            return self.finish(
                &ctx,
                tally,
                ExecutionStatus::Failed,
                Some(format!("Step not found: {}", paused_id)),
            );
        };
        let next = paused_step.next_step(step_result).map(str::to_string);

        self.drive(&workflow, &mut ctx, tally, next, verdict)
    }

    /// The interpreter loop shared by `run` and `resume`.
    fn drive(
        &self,
        workflow: &WorkflowDefinition,
        ctx: &mut ExecutionContext,
        mut tally: Tally,
        mut next: Option<String>,
        mut last: Verdict,
    ) -> EngineResult<WorkflowExecution> {
        let steps = workflow.step_index();
        let mut dispatched = 0usize;

        while let Some(step_id) = next.take() {
            if dispatched >= self.max_step_dispatches {
                warn!(
                    "Execution {} hit the step limit of {}",
                    ctx.execution_id, self.max_step_dispatches
                );
                return self.finish(
                    ctx,
                    tally,
                    ExecutionStatus::Failed,
                    Some(format!("Step limit exceeded ({})", self.max_step_dispatches)),
                );
            }

            let Some(step) = steps.get(step_id.as_str()).copied() else {
                return self.finish(
                    ctx,
                    tally,
                    ExecutionStatus::Failed,
                    Some(format!("Step not found: {}", step_id)),
                );
            };
            dispatched += 1;

            let started_at = Utc::now();
            let timer = Instant::now();
            let outcome = execute_step(step, ctx, &self.services);
            let duration_ms = timer.elapsed().as_secs_f64() * 1000.0;

            debug!(
                "Step '{}' {} in {:.1}ms",
                step.step_id,
                if outcome.passed { "passed" } else { "failed" },
                duration_ms
            );

            let appended = self.executions.add_step_execution(
                &ctx.execution_id,
                StepExecutionRecord {
                    id: Uuid::new_v4().to_string(),
                    step_id: step.step_id.clone(),
                    status: StepExecutionStatus::from_passed(outcome.passed),
                    passed: outcome.passed,
                    blocking: outcome.blocking,
                    message: outcome.message.clone(),
                    result_data: outcome.data.clone(),
                    error_message: outcome.error.clone(),
                    duration_ms,
                    started_at,
                    finished_at: Utc::now(),
                },
            );
            if let Err(err) = appended {
                return Err(self.abandon(ctx, tally, err));
            }
            ctx.record_result(&step.step_id, &outcome);

            if outcome.passed {
                tally.success += 1;
            } else {
                tally.failure += 1;
            }

            if outcome.blocking {
                info!(
                    "Execution {} paused at step '{}'",
                    ctx.execution_id, step.step_id
                );
                let paused = self.executions.update_status(
                    &ctx.execution_id,
                    ExecutionStatus::Running,
                    StatusUpdate {
                        status: ExecutionStatus::Paused,
                        current_step_id: Some(step.step_id.clone()),
                        success_count: tally.success,
                        failure_count: tally.failure,
                        error_message: None,
                        finished_at: None,
                        entity: Some(ctx.entity.clone()),
                        decision: None,
                    },
                );
                return paused.map_err(|err| self.abandon(ctx, tally, err));
            }

            next = step.next_step(outcome.passed).map(str::to_string);
            last = Verdict {
                passed: outcome.passed,
                failure: outcome.failure_reason(),
            };
        }

        if last.passed {
            self.finish(ctx, tally, ExecutionStatus::Succeeded, None)
        } else {
            self.finish(ctx, tally, ExecutionStatus::Failed, last.failure)
        }
    }

    /// Marks a run FAILED after a repository fault, as far as the
    /// repository still allows, and hands the fault back.
    fn abandon(&self, ctx: &ExecutionContext, tally: Tally, err: EngineError) -> EngineError {
        error!(
            "Repository error in execution {}: {}",
            ctx.execution_id, err
        );
        let reason = format!("Repository error: {}", err);
        if let Err(finish_err) = self.finish(ctx, tally, ExecutionStatus::Failed, Some(reason)) {
            warn!(
                "Could not mark execution {} failed: {}",
                ctx.execution_id, finish_err
            );
        }
        err
    }

    fn finish(
        &self,
        ctx: &ExecutionContext,
        tally: Tally,
        status: ExecutionStatus,
        error_message: Option<String>,
    ) -> EngineResult<WorkflowExecution> {
        match &error_message {
            Some(reason) => info!(
                "Execution {} finished {}: {}",
                ctx.execution_id, status, reason
            ),
            None => info!("Execution {} finished {}", ctx.execution_id, status),
        }

        self.executions.update_status(
            &ctx.execution_id,
            ExecutionStatus::Running,
            StatusUpdate {
                status,
                current_step_id: None,
                success_count: tally.success,
                failure_count: tally.failure,
                error_message,
                finished_at: Some(Utc::now()),
                entity: Some(ctx.entity.clone()),
                decision: None,
            },
        )
    }
}
