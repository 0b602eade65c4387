//! Individual Step Execution
//!
//! Dispatches one step to its handler and normalizes whatever happens into a
//! [`StepOutcome`]:
//! - unknown step kinds fail with `Unknown step type: <kind>`
//! - handler errors become failed outcomes carrying the error text
//! - a panicking handler is caught and reported the same way
//!
//! Nothing raised by a handler escapes this function.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use log::{debug, error};

use crate::handlers::{build_handler, HandlerServices};
use crate::workflow::Step;

use super::context::ExecutionContext;
use super::outcome::StepOutcome;

/// Executes a single workflow step against the context.
///
/// The context's entity may be mutated by the handler (tag steps); the
/// caller records the outcome.
pub fn execute_step(
    step: &Step,
    ctx: &mut ExecutionContext,
    services: &HandlerServices,
) -> StepOutcome {
    let Some(handler) = build_handler(step, services) else {
        error!("Step '{}' has unknown type '{}'", step.step_id, step.kind);
        return StepOutcome::error(format!("Unknown step type: {}", step.kind));
    };

    debug!("Executing step '{}' ({})", step.step_id, step.kind);
    let result = panic::catch_unwind(AssertUnwindSafe(|| handler.execute(ctx)));

    match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            error!("Step '{}' failed: {}", step.step_id, err);
            err.into()
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            error!("Step '{}' panicked: {}", step.step_id, reason);
            StepOutcome::error(format!("Step handler panicked: {}", reason))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::context::tests::sample_context;
    use crate::execution::context::Entity;
    use crate::expression::{ExpressionEvaluator, ExpressionResult};
    use serde_json::json;
    use std::sync::Arc;

    struct PanickingEvaluator;

    impl ExpressionEvaluator for PanickingEvaluator {
        fn evaluate_rule(&self, _: &str, _: &Entity) -> ExpressionResult<(bool, String)> {
            panic!("evaluator exploded");
        }

        fn evaluate_condition(&self, _: &str, _: &Entity) -> ExpressionResult<bool> {
            panic!("evaluator exploded");
        }
    }

    fn step(kind: &str, config: serde_json::Value) -> Step {
        let mut step = Step::new("s1", kind);
        step.config = config.as_object().cloned().unwrap_or_default();
        step
    }

    #[test]
    fn test_unknown_kind() {
        let mut ctx = sample_context(json!({}));
        let outcome = execute_step(&step("teleport", json!({})), &mut ctx, &HandlerServices::default());
        assert!(!outcome.passed);
        assert_eq!(outcome.error.as_deref(), Some("Unknown step type: teleport"));
    }

    #[test]
    fn test_deeply_nested_condition_fails_step() {
        let mut ctx = sample_context(json!({"x": true}));
        let condition = format!("{}x{}", "(".repeat(200_000), ")".repeat(200_000));
        let outcome = execute_step(
            &step("conditional", json!({"condition": condition})),
            &mut ctx,
            &HandlerServices::default(),
        );
        assert!(!outcome.passed);
        assert!(outcome
            .error
            .unwrap()
            .contains("Expression nested too deeply"));
    }

    #[test]
    fn test_handler_error_becomes_outcome() {
        let mut ctx = sample_context(json!({}));
        let outcome = execute_step(&step("validation", json!({})), &mut ctx, &HandlerServices::default());
        assert!(!outcome.passed);
        assert_eq!(outcome.error.as_deref(), Some("No rule configured"));
        assert!(outcome.message.is_none());
    }

    #[test]
    fn test_expression_error_becomes_outcome() {
        let mut ctx = sample_context(json!({}));
        let outcome = execute_step(
            &step("validation", json!({"rule": "size >"})),
            &mut ctx,
            &HandlerServices::default(),
        );
        assert!(!outcome.passed);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_panic_is_contained() {
        let services = HandlerServices::default().with_evaluator(Arc::new(PanickingEvaluator));
        let mut ctx = sample_context(json!({}));
        let outcome = execute_step(&step("conditional", json!({"condition": "x"})), &mut ctx, &services);

        assert!(!outcome.passed);
        assert_eq!(
            outcome.error.as_deref(),
            Some("Step handler panicked: evaluator exploded")
        );
    }

    #[test]
    fn test_tag_step_mutates_context_entity() {
        let mut ctx = sample_context(json!({}));
        let outcome = execute_step(
            &step("assign_tag", json!({"key": "tier", "value": "gold"})),
            &mut ctx,
            &HandlerServices::default(),
        );
        assert!(outcome.passed);
        assert_eq!(ctx.entity["tags"]["tier"], "gold");
    }
}
