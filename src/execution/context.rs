//! Execution Context
//!
//! The per-run bag of entity data, identifiers and accumulated step results
//! threaded through every handler of one execution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::outcome::StepOutcome;
use super::record::{TriggerContext, WorkflowExecution};

/// Business entity data as a JSON object.
pub type Entity = Map<String, Value>;

/// A completed step's result as later steps see it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StepResultEntry {
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

/// Mutable state for one execution.
///
/// Owned by exactly one engine call and lent to one handler at a time.
/// `entity` is the run's own copy: handler mutations never reach the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    pub entity: Entity,
    pub entity_type: String,
    pub entity_id: String,
    pub entity_name: Option<String>,
    pub actor_email: Option<String>,
    pub trigger_context: Option<TriggerContext>,
    pub execution_id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub step_results: BTreeMap<String, StepResultEntry>,
}

impl ExecutionContext {
    /// Rebuilds the context of a stored execution, for resume.
    ///
    /// The entity comes from the record's last snapshot and the step results
    /// from its history; no live caller input is involved.
    pub fn restore(execution: &WorkflowExecution) -> Self {
        Self {
            entity: execution.entity.clone(),
            entity_type: execution.entity_type.clone(),
            entity_id: execution.entity_id.clone(),
            entity_name: execution.entity_name.clone(),
            actor_email: execution.triggered_by.clone(),
            trigger_context: execution.trigger_context.clone(),
            execution_id: execution.id.clone(),
            workflow_id: execution.workflow_id.clone(),
            workflow_name: execution.workflow_name.clone(),
            step_results: execution.step_results(),
        }
    }

    /// Makes a step's outcome visible to later steps.
    pub fn record_result(&mut self, step_id: &str, outcome: &StepOutcome) {
        self.step_results.insert(
            step_id.to_string(),
            StepResultEntry {
                passed: outcome.passed,
                message: outcome.message.clone(),
                data: outcome.data.clone(),
            },
        );
    }

    /// Applies an external decision to a paused step's result.
    ///
    /// `result_data` is merged over whatever data the step produced when it
    /// paused.
    pub fn apply_decision(
        &mut self,
        step_id: &str,
        passed: bool,
        result_data: Option<&Map<String, Value>>,
    ) {
        let entry = self
            .step_results
            .entry(step_id.to_string())
            .or_insert_with(|| StepResultEntry {
                passed,
                message: None,
                data: None,
            });
        entry.passed = passed;

        if let Some(extra) = result_data {
            let data = entry.data.get_or_insert_with(Map::new);
            for (key, value) in extra {
                data.insert(key.clone(), value.clone());
            }
        }
        if let Some(Value::String(message)) = result_data.and_then(|d| d.get("message")) {
            entry.message = Some(message.clone());
        }
    }

    /// Read-only projection handed to sandboxed scripts.
    pub fn script_projection(&self) -> Value {
        serde_json::json!({
            "entity": self.entity,
            "entity_type": self.entity_type,
            "entity_id": self.entity_id,
            "entity_name": self.entity_name,
            "user_email": self.actor_email,
            "execution_id": self.execution_id,
            "workflow_id": self.workflow_id,
            "workflow_name": self.workflow_name,
            "step_results": self.step_results,
        })
    }

    /// Looks up a top-level entity attribute as a non-empty string.
    pub fn entity_str(&self, key: &str) -> Option<&str> {
        self.entity
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Context used across handler tests.
    pub(crate) fn sample_context(entity: Value) -> ExecutionContext {
        let entity = match entity {
            Value::Object(map) => map,
            _ => Entity::new(),
        };
        ExecutionContext {
            entity,
            entity_type: "data_product".to_string(),
            entity_id: "dp-1".to_string(),
            entity_name: Some("Sales".to_string()),
            actor_email: Some("u@x.com".to_string()),
            trigger_context: None,
            execution_id: "exec-1".to_string(),
            workflow_id: "wf-1".to_string(),
            workflow_name: "Review".to_string(),
            step_results: BTreeMap::new(),
        }
    }

    #[test]
    fn test_record_result() {
        let mut ctx = sample_context(json!({}));
        ctx.record_result("a", &StepOutcome::pass("ok"));

        assert!(ctx.step_results["a"].passed);
        assert_eq!(ctx.step_results["a"].message.as_deref(), Some("ok"));
    }

    #[test]
    fn test_apply_decision_merges_data() {
        let mut ctx = sample_context(json!({}));
        let mut data = Map::new();
        data.insert("status".to_string(), json!("pending"));
        ctx.record_result("a1", &StepOutcome::pass("requested").with_data(data).blocking());

        let decision = json!({"status": "rejected", "message": "Not today"});
        ctx.apply_decision("a1", false, decision.as_object());

        let entry = &ctx.step_results["a1"];
        assert!(!entry.passed);
        assert_eq!(entry.data.as_ref().unwrap()["status"], "rejected");
        assert_eq!(entry.message.as_deref(), Some("Not today"));
    }

    #[test]
    fn test_apply_decision_without_prior_result() {
        let mut ctx = sample_context(json!({}));
        ctx.apply_decision("a1", true, None);
        assert!(ctx.step_results["a1"].passed);
    }

    #[test]
    fn test_script_projection_fields() {
        let ctx = sample_context(json!({"size": 3}));
        let projection = ctx.script_projection();

        assert_eq!(projection["entity"]["size"], 3);
        assert_eq!(projection["user_email"], "u@x.com");
        assert!(projection["step_results"].is_object());
    }

    #[test]
    fn test_entity_str_ignores_blank() {
        let ctx = sample_context(json!({"owner": "  ", "name": "x"}));
        assert_eq!(ctx.entity_str("owner"), None);
        assert_eq!(ctx.entity_str("name"), Some("x"));
        assert_eq!(ctx.entity_str("missing"), None);
    }
}
