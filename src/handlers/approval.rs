//! Approval steps
//!
//! Requests a decision from the resolved approvers and suspends the run. The
//! step always records `passed = true`; the real verdict arrives through
//! [`Engine::resume`](crate::execution::Engine::resume).

use log::info;
use serde_json::json;

use super::recipients::{self, Audience};
use super::{config_bool, config_u64, StepHandler};
use crate::config::ApprovalConfig;
use crate::execution::context::ExecutionContext;
use crate::execution::outcome::{data_map, StepError, StepOutcome};
use crate::workflow::StepConfig;

const DEFAULT_TIMEOUT_DAYS: u64 = 7;

pub struct ApprovalHandler<'a> {
    config: &'a StepConfig,
    fallbacks: &'a ApprovalConfig,
}

impl<'a> ApprovalHandler<'a> {
    pub fn new(config: &'a StepConfig, fallbacks: &'a ApprovalConfig) -> Self {
        Self { config, fallbacks }
    }
}

impl StepHandler for ApprovalHandler<'_> {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<StepOutcome, StepError> {
        let spec = self.config.get("approvers");
        if !recipients::is_configured(spec) {
            return Err(StepError::MissingConfig("No approvers configured"));
        }
        let timeout_days = config_u64(self.config, "timeout_days", DEFAULT_TIMEOUT_DAYS)?;
        let require_all = config_bool(self.config, "require_all", false)?;

        let approvers = spec
            .map(|s| recipients::resolve(s, ctx, self.fallbacks, Audience::Approvers))
            .unwrap_or_default();
        if approvers.is_empty() {
            return Err(StepError::Other(
                "Approvers could not be resolved to anyone".to_string(),
            ));
        }

        info!(
            "Approval for {} '{}' requested from {}",
            ctx.entity_type,
            ctx.entity_id,
            approvers.join(", ")
        );

        let message = format!("Approval requested from: {}", approvers.join(", "));
        let data = data_map([
            ("approvers", json!(approvers)),
            ("timeout_days", json!(timeout_days)),
            ("require_all", json!(require_all)),
            ("status", json!("pending")),
        ]);
        Ok(StepOutcome::pass(message).with_data(data).blocking())
    }
}
