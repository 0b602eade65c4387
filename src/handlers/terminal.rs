//! Terminal `pass` and `fail` steps.

use super::{config_str, StepHandler};
use crate::execution::context::ExecutionContext;
use crate::execution::outcome::{StepError, StepOutcome};
use crate::workflow::StepConfig;

pub struct PassHandler;

impl StepHandler for PassHandler {
    fn execute(&self, _ctx: &mut ExecutionContext) -> Result<StepOutcome, StepError> {
        Ok(StepOutcome::pass("Workflow completed successfully"))
    }
}

pub struct FailHandler<'a> {
    config: &'a StepConfig,
}

impl<'a> FailHandler<'a> {
    pub fn new(config: &'a StepConfig) -> Self {
        Self { config }
    }
}

impl StepHandler for FailHandler<'_> {
    fn execute(&self, _ctx: &mut ExecutionContext) -> Result<StepOutcome, StepError> {
        let message = config_str(self.config, "message").unwrap_or("Workflow failed");
        Ok(StepOutcome::fail(message))
    }
}
