//! Validation steps: evaluate `config.rule` against the entity.

use serde_json::json;

use super::{require_str, StepHandler};
use crate::execution::context::ExecutionContext;
use crate::execution::outcome::{data_map, StepError, StepOutcome};
use crate::expression::ExpressionEvaluator;
use crate::workflow::StepConfig;

pub struct ValidationHandler<'a> {
    config: &'a StepConfig,
    evaluator: &'a dyn ExpressionEvaluator,
}

impl<'a> ValidationHandler<'a> {
    pub fn new(config: &'a StepConfig, evaluator: &'a dyn ExpressionEvaluator) -> Self {
        Self { config, evaluator }
    }
}

impl StepHandler for ValidationHandler<'_> {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<StepOutcome, StepError> {
        let rule = require_str(self.config, "rule", "No rule configured")?;
        let (passed, message) = self.evaluator.evaluate_rule(rule, &ctx.entity)?;

        Ok(StepOutcome::from_verdict(passed, message).with_data(data_map([("rule", json!(rule))])))
    }
}
