//! Tag steps
//!
//! Tags live in the run's entity copy as `entity["tags"]`, an object of
//! key -> value. Both operations are idempotent.

use chrono::Utc;
use log::info;
use serde_json::{json, Map, Value};

use super::{config_str, require_str, StepHandler};
use crate::execution::context::ExecutionContext;
use crate::execution::outcome::{data_map, StepError, StepOutcome};
use crate::workflow::StepConfig;

/// The entity's tag map, created when missing.
fn tags_mut(ctx: &mut ExecutionContext) -> Result<&mut Map<String, Value>, StepError> {
    let slot = ctx
        .entity
        .entry("tags".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if slot.is_null() {
        *slot = Value::Object(Map::new());
    }
    slot.as_object_mut()
        .ok_or_else(|| StepError::Other("Entity 'tags' is not an object".to_string()))
}

/// Resolves a dynamic tag value.
fn resolve_value_source(source: &str, ctx: &ExecutionContext) -> Option<String> {
    match source {
        "current_user" => ctx.actor_email.clone(),
        "project_name" => ctx
            .entity_str("project_name")
            .or_else(|| ctx.entity_str("project_id"))
            .map(str::to_string),
        "entity_name" => ctx.entity_name.clone(),
        "timestamp" => Some(Utc::now().to_rfc3339()),
        _ => None,
    }
}

fn literal_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub struct AssignTagHandler<'a> {
    config: &'a StepConfig,
}

impl<'a> AssignTagHandler<'a> {
    pub fn new(config: &'a StepConfig) -> Self {
        Self { config }
    }
}

impl StepHandler for AssignTagHandler<'_> {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<StepOutcome, StepError> {
        let key = require_str(self.config, "key", "No tag key configured")?;

        let value = match config_str(self.config, "value_source") {
            Some(source) => resolve_value_source(source, ctx),
            None => literal_value(self.config.get("value")),
        }
        .filter(|v| !v.is_empty())
        .ok_or(StepError::MissingConfig("Could not resolve tag value"))?;

        info!(
            "Assigning tag {}={} to {} {}",
            key, value, ctx.entity_type, ctx.entity_id
        );
        tags_mut(ctx)?.insert(key.to_string(), json!(value));

        Ok(StepOutcome::pass(format!("Assigned tag {}={}", key, value))
            .with_data(data_map([("key", json!(key)), ("value", json!(value))])))
    }
}

pub struct RemoveTagHandler<'a> {
    config: &'a StepConfig,
}

impl<'a> RemoveTagHandler<'a> {
    pub fn new(config: &'a StepConfig) -> Self {
        Self { config }
    }
}

impl StepHandler for RemoveTagHandler<'_> {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<StepOutcome, StepError> {
        let key = require_str(self.config, "key", "No tag key configured")?;

        let removed = match ctx.entity.get_mut("tags") {
            Some(Value::Object(tags)) => tags.remove(key).is_some(),
            _ => false,
        };
        if removed {
            info!(
                "Removed tag {} from {} {}",
                key, ctx.entity_type, ctx.entity_id
            );
        }

        Ok(StepOutcome::pass(format!("Removed tag {}", key))
            .with_data(data_map([("key", json!(key)), ("removed", json!(removed))])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::context::tests::sample_context;

    fn config(value: Value) -> StepConfig {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_assign_literal_value_is_idempotent() {
        let cfg = config(json!({"key": "tier", "value": "gold"}));
        let mut ctx = sample_context(json!({}));
        let handler = AssignTagHandler::new(&cfg);

        handler.execute(&mut ctx).unwrap();
        let first = ctx.entity.clone();
        let outcome = handler.execute(&mut ctx).unwrap();

        assert!(outcome.passed);
        assert_eq!(ctx.entity, first);
        assert_eq!(ctx.entity["tags"]["tier"], "gold");
    }

    #[test]
    fn test_assign_from_value_source() {
        let cfg = config(json!({"key": "owner", "value_source": "current_user"}));
        let mut ctx = sample_context(json!({"tags": {"x": "1"}}));
        AssignTagHandler::new(&cfg).execute(&mut ctx).unwrap();

        assert_eq!(ctx.entity["tags"]["owner"], "u@x.com");
        assert_eq!(ctx.entity["tags"]["x"], "1");
    }

    #[test]
    fn test_project_name_falls_back_to_project_id() {
        let ctx = sample_context(json!({"project_id": "p-9"}));
        assert_eq!(resolve_value_source("project_name", &ctx).as_deref(), Some("p-9"));
        assert!(resolve_value_source("timestamp", &ctx).is_some());
        assert!(resolve_value_source("moon_phase", &ctx).is_none());
    }

    #[test]
    fn test_unresolvable_value() {
        let cfg = config(json!({"key": "owner", "value_source": "moon_phase"}));
        let mut ctx = sample_context(json!({}));
        let err = AssignTagHandler::new(&cfg).execute(&mut ctx).unwrap_err();
        assert_eq!(err.to_string(), "Could not resolve tag value");
    }

    #[test]
    fn test_missing_key() {
        let cfg = config(json!({"value": "x"}));
        let mut ctx = sample_context(json!({}));
        let err = AssignTagHandler::new(&cfg).execute(&mut ctx).unwrap_err();
        assert_eq!(err.to_string(), "No tag key configured");

        let err = RemoveTagHandler::new(&cfg).execute(&mut ctx).unwrap_err();
        assert_eq!(err.to_string(), "No tag key configured");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let cfg = config(json!({"key": "tier"}));
        let mut ctx = sample_context(json!({"tags": {"tier": "gold", "pii": "yes"}}));
        let handler = RemoveTagHandler::new(&cfg);

        let first = handler.execute(&mut ctx).unwrap();
        let second = handler.execute(&mut ctx).unwrap();

        assert!(first.passed && second.passed);
        assert_eq!(first.data.unwrap()["removed"], true);
        assert_eq!(second.data.unwrap()["removed"], false);
        assert_eq!(ctx.entity["tags"], json!({"pii": "yes"}));
    }

    #[test]
    fn test_remove_without_tags() {
        let cfg = config(json!({"key": "tier"}));
        let mut ctx = sample_context(json!({}));
        assert!(RemoveTagHandler::new(&cfg).execute(&mut ctx).unwrap().passed);
        assert!(!ctx.entity.contains_key("tags"));
    }

    #[test]
    fn test_non_object_tags_rejected() {
        let cfg = config(json!({"key": "tier", "value": "gold"}));
        let mut ctx = sample_context(json!({"tags": ["a", "b"]}));
        assert!(AssignTagHandler::new(&cfg).execute(&mut ctx).is_err());
    }
}
