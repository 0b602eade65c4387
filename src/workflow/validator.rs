//! Workflow Validation
//!
//! Lints a workflow definition without rejecting it. The interpreter never
//! calls this: dangling branches and unknown kinds are legal to load and fail
//! only when a run reaches them. Cycles are allowed (loops are expressed with
//! `on_fail` pointing back to an earlier step).

use std::collections::{HashSet, VecDeque};

use log::{debug, info};
use thiserror::Error;

use super::model::{Step, WorkflowDefinition};

/// Finding reported by [`validate_workflow`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    #[error("Workflow has no steps")]
    EmptyWorkflow,

    #[error("Duplicate step ID: '{0}'")]
    DuplicateStepId(String),

    #[error("Step #{0} has empty or whitespace-only ID")]
    EmptyStepId(usize),

    #[error("Step '{step}' has unknown type '{kind}'")]
    UnknownStepKind { step: String, kind: String },

    #[error("Step '{step}' is missing required config '{key}'")]
    MissingConfig { step: String, key: &'static str },

    #[error("Step '{step}' {branch} references unknown step '{reference}'")]
    InvalidReference {
        step: String,
        branch: &'static str,
        reference: String,
    },

    #[error("Step '{0}' is unreachable from the entry step")]
    UnreachableStep(String),
}

impl ValidationIssue {
    /// Errors make a run fail when reached; everything else is advisory.
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::UnreachableStep(_))
    }
}

/// Validates a single step's fields.
fn validate_step(index: usize, step: &Step) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if step.step_id.trim().is_empty() {
        issues.push(ValidationIssue::EmptyStepId(index));
        return issues;
    }

    if !step.kind.is_known() {
        issues.push(ValidationIssue::UnknownStepKind {
            step: step.step_id.clone(),
            kind: step.kind.to_string(),
        });
        return issues;
    }

    for key in step.kind.required_config_keys().iter().copied() {
        let present = match step.config.get(key) {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        };
        if !present {
            issues.push(ValidationIssue::MissingConfig {
                step: step.step_id.clone(),
                key,
            });
        }
    }

    issues
}

/// Collects every step id reachable from the entry step via branches.
fn reachable_steps(workflow: &WorkflowDefinition) -> HashSet<&str> {
    let index = workflow.step_index();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&Step> = VecDeque::new();

    if let Some(entry) = workflow.entry_step() {
        seen.insert(entry.step_id.as_str());
        queue.push_back(entry);
    }

    while let Some(step) = queue.pop_front() {
        for (_, target) in step.branches() {
            if let Some(next) = index.get(target) {
                if seen.insert(next.step_id.as_str()) {
                    queue.push_back(next);
                }
            }
        }
    }

    seen
}

/// Lints a workflow, returning every finding in step order.
///
/// Checks:
/// 1. Workflow is not empty
/// 2. No duplicate or blank step IDs
/// 3. Step kinds are known and carry their required config
/// 4. Branch references point to existing steps
/// 5. Every step is reachable from the entry step
pub fn validate_workflow(workflow: &WorkflowDefinition) -> Vec<ValidationIssue> {
    info!(
        "Validating workflow '{}' with {} steps",
        workflow.id,
        workflow.steps.len()
    );

    if workflow.steps.is_empty() {
        return vec![ValidationIssue::EmptyWorkflow];
    }

    let mut issues = Vec::new();
    let mut seen_ids: HashSet<&str> = HashSet::new();

    for (i, step) in workflow.steps.iter().enumerate() {
        if !step.step_id.is_empty() && !seen_ids.insert(step.step_id.as_str()) {
            issues.push(ValidationIssue::DuplicateStepId(step.step_id.clone()));
        }
        issues.extend(validate_step(i, step));
    }

    for step in &workflow.steps {
        for (branch, target) in step.branches() {
            if !seen_ids.contains(target) {
                issues.push(ValidationIssue::InvalidReference {
                    step: step.step_id.clone(),
                    branch,
                    reference: target.to_string(),
                });
            }
        }
    }

    let reachable = reachable_steps(workflow);
    for step in &workflow.steps {
        if !step.step_id.is_empty() && !reachable.contains(step.step_id.as_str()) {
            debug!("Step '{}' has no inbound path from the entry", step.step_id);
            issues.push(ValidationIssue::UnreachableStep(step.step_id.clone()));
        }
    }

    info!("Validation produced {} finding(s)", issues.len());
    issues
}
