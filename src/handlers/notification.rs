//! Notification steps
//!
//! Sends `custom_message`, or the named `template`, to the resolved
//! recipients through the configured [`Notifier`]. Never blocks.

use std::collections::HashMap;

use log::warn;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

use super::recipients::{self, Audience};
use super::{config_str, StepHandler};
use crate::config::ApprovalConfig;
use crate::execution::context::ExecutionContext;
use crate::execution::outcome::{data_map, StepError, StepOutcome};
use crate::notify::{Notification, Notifier};
use crate::workflow::StepConfig;

/// Message templates keyed by name. `{entity_type}` and `{entity_name}` are
/// substituted from the context.
static TEMPLATES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (
            "validation_failed",
            "Validation failed for {entity_type} '{entity_name}'",
        ),
        (
            "validation_passed",
            "Validation passed for {entity_type} '{entity_name}'",
        ),
        (
            "product_approved",
            "Data product '{entity_name}' has been approved",
        ),
        (
            "product_rejected",
            "Data product '{entity_name}' has been rejected",
        ),
        (
            "approval_requested",
            "Approval requested for {entity_type} '{entity_name}'",
        ),
    ])
});

const DEFAULT_TEMPLATE: &str = "Workflow notification for {entity_name}";

/// Renders a named template, falling back to the generic message.
pub fn render_template(template: Option<&str>, ctx: &ExecutionContext) -> String {
    let text = template
        .and_then(|name| TEMPLATES.get(name))
        .copied()
        .unwrap_or(DEFAULT_TEMPLATE);
    let entity_name = ctx.entity_name.as_deref().unwrap_or(&ctx.entity_id);

    text.replace("{entity_type}", &ctx.entity_type)
        .replace("{entity_name}", entity_name)
}

pub struct NotificationHandler<'a> {
    config: &'a StepConfig,
    notifier: &'a dyn Notifier,
    fallbacks: &'a ApprovalConfig,
}

impl<'a> NotificationHandler<'a> {
    pub fn new(
        config: &'a StepConfig,
        notifier: &'a dyn Notifier,
        fallbacks: &'a ApprovalConfig,
    ) -> Self {
        Self {
            config,
            notifier,
            fallbacks,
        }
    }
}

impl StepHandler for NotificationHandler<'_> {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<StepOutcome, StepError> {
        let spec = self.config.get("recipients");
        if !recipients::is_configured(spec) {
            return Err(StepError::MissingConfig("No recipients configured"));
        }

        let resolved = spec
            .map(|s| recipients::resolve(s, ctx, self.fallbacks, Audience::Recipients))
            .unwrap_or_default();
        if resolved.is_empty() {
            return Err(StepError::Other(
                "Recipients could not be resolved to anyone".to_string(),
            ));
        }

        let template = config_str(self.config, "template");
        if let Some(name) = template {
            if !TEMPLATES.contains_key(name) {
                warn!("Unknown notification template '{}', using default text", name);
            }
        }
        let message = match config_str(self.config, "custom_message") {
            Some(custom) => custom.to_string(),
            None => render_template(template, ctx),
        };

        self.notifier.notify(&Notification {
            recipients: resolved.clone(),
            message: message.clone(),
            template: template.map(str::to_string),
            entity_type: ctx.entity_type.clone(),
            entity_id: ctx.entity_id.clone(),
            execution_id: ctx.execution_id.clone(),
        })?;

        let data = data_map([
            ("recipients", json!(resolved)),
            ("template", template.map_or(Value::Null, |t| json!(t))),
            ("message", json!(message)),
        ]);
        Ok(StepOutcome::pass(format!("Notification sent to: {}", resolved.join(", "))).with_data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::context::tests::sample_context;
    use crate::notify::NotifyError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct BrokenNotifier;

    impl Notifier for BrokenNotifier {
        fn notify(&self, _: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("smtp down".to_string()))
        }
    }

    fn config(value: Value) -> StepConfig {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_template_message() {
        let notifier = RecordingNotifier::default();
        let fallbacks = ApprovalConfig::default();
        let cfg = config(json!({"recipients": "owner", "template": "product_approved"}));
        let mut ctx = sample_context(json!({"owner": "o@x.com"}));

        let outcome = NotificationHandler::new(&cfg, &notifier, &fallbacks)
            .execute(&mut ctx)
            .unwrap();

        assert!(outcome.passed);
        assert!(!outcome.blocking);
        assert_eq!(outcome.message.as_deref(), Some("Notification sent to: o@x.com"));

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message, "Data product 'Sales' has been approved");
    }

    #[test]
    fn test_custom_message_wins() {
        let notifier = RecordingNotifier::default();
        let fallbacks = ApprovalConfig::default();
        let cfg = config(json!({
            "recipients": "a@x.com",
            "template": "validation_failed",
            "custom_message": "Please fix the schema"
        }));
        let mut ctx = sample_context(json!({}));

        let outcome = NotificationHandler::new(&cfg, &notifier, &fallbacks)
            .execute(&mut ctx)
            .unwrap();
        assert_eq!(outcome.data.unwrap()["message"], "Please fix the schema");
    }

    #[test]
    fn test_default_template() {
        let ctx = sample_context(json!({}));
        assert_eq!(render_template(None, &ctx), "Workflow notification for Sales");
        assert_eq!(
            render_template(Some("validation_passed"), &ctx),
            "Validation passed for data_product 'Sales'"
        );
        assert_eq!(
            render_template(Some("nonsense"), &ctx),
            "Workflow notification for Sales"
        );
    }

    #[test]
    fn test_missing_recipients() {
        let notifier = RecordingNotifier::default();
        let fallbacks = ApprovalConfig::default();
        let cfg = config(json!({}));
        let mut ctx = sample_context(json!({}));

        let err = NotificationHandler::new(&cfg, &notifier, &fallbacks)
            .execute(&mut ctx)
            .unwrap_err();
        assert_eq!(err.to_string(), "No recipients configured");
    }

    #[test]
    fn test_notifier_failure_is_step_error() {
        let fallbacks = ApprovalConfig::default();
        let cfg = config(json!({"recipients": "a@x.com"}));
        let mut ctx = sample_context(json!({}));

        let err = NotificationHandler::new(&cfg, &BrokenNotifier, &fallbacks)
            .execute(&mut ctx)
            .unwrap_err();
        assert!(matches!(err, StepError::Notify(_)));
    }
}
