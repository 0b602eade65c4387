//! Conditional steps: branch on `config.condition`.

use serde_json::json;

use super::{require_str, StepHandler};
use crate::execution::context::ExecutionContext;
use crate::execution::outcome::{data_map, StepError, StepOutcome};
use crate::expression::ExpressionEvaluator;
use crate::workflow::StepConfig;

pub struct ConditionalHandler<'a> {
    config: &'a StepConfig,
    evaluator: &'a dyn ExpressionEvaluator,
}

impl<'a> ConditionalHandler<'a> {
    pub fn new(config: &'a StepConfig, evaluator: &'a dyn ExpressionEvaluator) -> Self {
        Self { config, evaluator }
    }
}

impl StepHandler for ConditionalHandler<'_> {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<StepOutcome, StepError> {
        let condition = require_str(self.config, "condition", "No condition configured")?;
        let result = self.evaluator.evaluate_condition(condition, &ctx.entity)?;

        Ok(
            StepOutcome::from_verdict(result, format!("Condition evaluated to: {}", result))
                .with_data(data_map([
                    ("condition", json!(condition)),
                    ("result", json!(result)),
                ])),
        )
    }
}
