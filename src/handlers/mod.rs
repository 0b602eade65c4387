//! Step Handlers
//!
//! One handler per [`StepKind`]. A handler is built per dispatch from the
//! step's configuration plus shared [`HandlerServices`], runs once against the
//! execution context, and is dropped.
//!
//! Handlers report faults as [`StepError`] values; the dispatcher in
//! [`crate::execution::step`] turns those into failed outcomes.

pub mod approval;
pub mod conditional;
pub mod delivery;
pub mod notification;
pub mod policy;
pub mod recipients;
pub mod script;
pub mod tags;
pub mod terminal;
pub mod validation;

use std::sync::Arc;

use serde_json::Value;

use crate::config::{ApprovalConfig, EngineConfig, ScriptConfig};
use crate::delivery::DeliveryService;
use crate::execution::context::ExecutionContext;
use crate::execution::outcome::{StepError, StepOutcome};
use crate::expression::{DefaultEvaluator, ExpressionEvaluator};
use crate::notify::{LogNotifier, Notifier};
use crate::policy::{InMemoryPolicyStore, PolicyStore};
use crate::workflow::{Step, StepConfig, StepKind};

/// Runs one step against the execution context.
pub trait StepHandler {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<StepOutcome, StepError>;
}

/// Collaborators and settings shared by every handler of an engine.
#[derive(Clone)]
pub struct HandlerServices {
    pub evaluator: Arc<dyn ExpressionEvaluator>,
    pub policies: Arc<dyn PolicyStore>,
    pub notifier: Arc<dyn Notifier>,
    /// `None` makes delivery steps fail with "Delivery service not initialized"
    pub delivery: Option<Arc<dyn DeliveryService>>,
    pub script: ScriptConfig,
    pub approvals: ApprovalConfig,
}

impl Default for HandlerServices {
    fn default() -> Self {
        Self {
            evaluator: Arc::new(DefaultEvaluator),
            policies: Arc::new(InMemoryPolicyStore::new()),
            notifier: Arc::new(LogNotifier),
            delivery: None,
            script: ScriptConfig::default(),
            approvals: ApprovalConfig::default(),
        }
    }
}

impl std::fmt::Debug for HandlerServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerServices")
            .field("delivery", &self.delivery.is_some())
            .field("script", &self.script)
            .field("approvals", &self.approvals)
            .finish_non_exhaustive()
    }
}

impl HandlerServices {
    /// Default collaborators with settings taken from `config`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            script: config.script.clone(),
            approvals: config.approvals.clone(),
            ..Self::default()
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_policies(mut self, policies: Arc<dyn PolicyStore>) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_delivery(mut self, delivery: Arc<dyn DeliveryService>) -> Self {
        self.delivery = Some(delivery);
        self
    }
}

/// Builds the handler for a step, or `None` for an unknown kind.
pub fn build_handler<'a>(
    step: &'a Step,
    services: &'a HandlerServices,
) -> Option<Box<dyn StepHandler + 'a>> {
    let config = &step.config;
    let handler: Box<dyn StepHandler + 'a> = match &step.kind {
        StepKind::Validation => Box::new(validation::ValidationHandler::new(
            config,
            services.evaluator.as_ref(),
        )),
        StepKind::Approval => Box::new(approval::ApprovalHandler::new(config, &services.approvals)),
        StepKind::Notification => Box::new(notification::NotificationHandler::new(
            config,
            services.notifier.as_ref(),
            &services.approvals,
        )),
        StepKind::AssignTag => Box::new(tags::AssignTagHandler::new(config)),
        StepKind::RemoveTag => Box::new(tags::RemoveTagHandler::new(config)),
        StepKind::Conditional => Box::new(conditional::ConditionalHandler::new(
            config,
            services.evaluator.as_ref(),
        )),
        StepKind::Script => Box::new(script::ScriptHandler::new(config, &services.script)),
        StepKind::Pass => Box::new(terminal::PassHandler),
        StepKind::Fail => Box::new(terminal::FailHandler::new(config)),
        StepKind::PolicyCheck => Box::new(policy::PolicyCheckHandler::new(
            config,
            services.policies.as_ref(),
            services.evaluator.as_ref(),
        )),
        StepKind::Delivery => Box::new(delivery::DeliveryHandler::new(
            config,
            services.delivery.as_deref(),
        )),
        StepKind::Unknown(_) => return None,
    };
    Some(handler)
}

/// Non-blank string config value.
pub(crate) fn config_str<'a>(config: &'a StepConfig, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Required non-blank string, failing with `missing` when absent.
pub(crate) fn require_str<'a>(
    config: &'a StepConfig,
    key: &str,
    missing: &'static str,
) -> Result<&'a str, StepError> {
    config_str(config, key).ok_or(StepError::MissingConfig(missing))
}

/// Unsigned integer config value; numeric strings are accepted.
pub(crate) fn config_u64(
    config: &StepConfig,
    key: &'static str,
    default: u64,
) -> Result<u64, StepError> {
    let invalid = |value: &Value| StepError::InvalidConfig {
        key,
        message: format!("expected a non-negative integer, got {}", value),
    };
    match config.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| invalid(&Value::Number(n.clone()))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| invalid(&Value::String(s.clone()))),
        Some(other) => Err(invalid(other)),
    }
}

/// Boolean config value; `"true"`/`"false"` strings are accepted.
pub(crate) fn config_bool(
    config: &StepConfig,
    key: &'static str,
    default: bool,
) -> Result<bool, StepError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(true),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(false),
        Some(other) => Err(StepError::InvalidConfig {
            key,
            message: format!("expected a boolean, got {}", other),
        }),
    }
}
