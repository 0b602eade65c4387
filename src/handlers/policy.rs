//! Policy check steps: evaluate a stored [`Policy`](crate::policy::Policy)
//! rule against the entity.

use log::{debug, warn};
use serde_json::json;

use super::{require_str, StepHandler};
use crate::execution::context::ExecutionContext;
use crate::execution::outcome::{data_map, StepError, StepOutcome};
use crate::expression::ExpressionEvaluator;
use crate::policy::PolicyStore;
use crate::workflow::StepConfig;

pub struct PolicyCheckHandler<'a> {
    config: &'a StepConfig,
    policies: &'a dyn PolicyStore,
    evaluator: &'a dyn ExpressionEvaluator,
}

impl<'a> PolicyCheckHandler<'a> {
    pub fn new(
        config: &'a StepConfig,
        policies: &'a dyn PolicyStore,
        evaluator: &'a dyn ExpressionEvaluator,
    ) -> Self {
        Self {
            config,
            policies,
            evaluator,
        }
    }
}

impl StepHandler for PolicyCheckHandler<'_> {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<StepOutcome, StepError> {
        let policy_id = require_str(self.config, "policy_id", "No policy_id configured")?;

        let Some(policy) = self.policies.get(policy_id) else {
            return Ok(StepOutcome::error(format!("Policy not found: {}", policy_id))
                .with_data(data_map([("policy_id", json!(policy_id))])));
        };

        if !policy.is_active {
            debug!("Policy '{}' is inactive, skipping", policy.id);
            return Ok(
                StepOutcome::pass(format!("Policy '{}' is inactive, skipped", policy.name))
                    .with_data(data_map([
                        ("policy_id", json!(policy.id)),
                        ("policy_name", json!(policy.name)),
                        ("skipped", json!(true)),
                    ])),
            );
        }

        let (passed, technical) = match self.evaluator.evaluate_rule(&policy.rule, &ctx.entity) {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!("Policy '{}' could not be evaluated: {}", policy.id, err);
                return Ok(StepOutcome::error(StepError::from(err).to_string()).with_data(
                    data_map([
                        ("policy_id", json!(policy.id)),
                        ("policy_name", json!(policy.name)),
                        ("rule", json!(policy.rule)),
                    ]),
                ));
            }
        };
        let message = match (&policy.failure_message, passed) {
            (Some(friendly), false) => format!("{}\n\nTechnical: {}", friendly, technical),
            _ => technical.clone(),
        };

        Ok(StepOutcome::from_verdict(passed, message).with_data(data_map([
            ("policy_id", json!(policy.id)),
            ("policy_name", json!(policy.name)),
            ("rule", json!(policy.rule)),
            ("severity", json!(policy.severity)),
            ("failure_message", json!(policy.failure_message)),
            ("technical_message", json!(technical)),
        ])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::context::tests::sample_context;
    use crate::expression::DefaultEvaluator;
    use crate::policy::{InMemoryPolicyStore, Policy};
    use serde_json::Value;

    fn store() -> InMemoryPolicyStore {
        InMemoryPolicyStore::with_policies([
            Policy::new("owner", "Owner required", "owner != null")
                .with_failure_message("Every data product needs an owner."),
            Policy::new("size", "Non-empty", "size > 0"),
            Policy::new("legacy", "Legacy", "size > 100").inactive(),
            Policy::new("broken", "Broken", "size >"),
        ])
    }

    fn run(policy_id: &str, entity: Value) -> Result<StepOutcome, StepError> {
        let config = json!({"policy_id": policy_id}).as_object().cloned().unwrap();
        let policies = store();
        let mut ctx = sample_context(entity);
        PolicyCheckHandler::new(&config, &policies, &DefaultEvaluator).execute(&mut ctx)
    }

    #[test]
    fn test_policy_passes() {
        let outcome = run("size", json!({"size": 3})).unwrap();
        assert!(outcome.passed);
        let data = outcome.data.unwrap();
        assert_eq!(data["policy_name"], "Non-empty");
        assert_eq!(data["severity"], "medium");
        assert_eq!(data["failure_message"], Value::Null);
    }

    #[test]
    fn test_failure_message_precedes_technical() {
        let outcome = run("owner", json!({})).unwrap();
        assert!(!outcome.passed);

        let message = outcome.message.unwrap();
        assert!(message.starts_with("Every data product needs an owner.\n\nTechnical: "));
        let technical = outcome.data.unwrap()["technical_message"].clone();
        assert!(message.ends_with(technical.as_str().unwrap()));
    }

    #[test]
    fn test_inactive_policy_is_skipped() {
        let outcome = run("legacy", json!({"size": 1})).unwrap();
        assert!(outcome.passed);
        assert_eq!(outcome.message.as_deref(), Some("Policy 'Legacy' is inactive, skipped"));
        assert_eq!(outcome.data.unwrap()["skipped"], true);
    }

    #[test]
    fn test_unknown_policy() {
        let outcome = run("ghost", json!({})).unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.error.as_deref(), Some("Policy not found: ghost"));
        assert_eq!(outcome.data.unwrap()["policy_id"], "ghost");
    }

    #[test]
    fn test_unparseable_rule_keeps_policy_data() {
        let outcome = run("broken", json!({"size": 1})).unwrap();
        assert!(!outcome.passed);
        assert!(outcome.error.is_some());
        let data = outcome.data.unwrap();
        assert_eq!(data["policy_id"], "broken");
        assert_eq!(data["rule"], "size >");
    }

    #[test]
    fn test_missing_policy_id() {
        let config = StepConfig::new();
        let policies = store();
        let mut ctx = sample_context(json!({}));
        let err = PolicyCheckHandler::new(&config, &policies, &DefaultEvaluator)
            .execute(&mut ctx)
            .unwrap_err();
        assert_eq!(err.to_string(), "No policy_id configured");
    }
}
