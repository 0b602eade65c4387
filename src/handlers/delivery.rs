//! Delivery steps: hand an entity change to the [`DeliveryService`].

use log::{info, warn};
use serde_json::{json, Value};

use super::{config_str, StepHandler};
use crate::delivery::{DeliveryChangeType, DeliveryMode, DeliveryPayload, DeliveryService};
use crate::execution::context::ExecutionContext;
use crate::execution::outcome::{StepError, StepOutcome};
use crate::workflow::StepConfig;

pub struct DeliveryHandler<'a> {
    config: &'a StepConfig,
    service: Option<&'a dyn DeliveryService>,
}

impl<'a> DeliveryHandler<'a> {
    pub fn new(config: &'a StepConfig, service: Option<&'a dyn DeliveryService>) -> Self {
        Self { config, service }
    }

    fn change_type(&self) -> DeliveryChangeType {
        match config_str(self.config, "change_type") {
            None => DeliveryChangeType::Grant,
            Some(raw) => DeliveryChangeType::parse(raw).unwrap_or_else(|| {
                warn!("Unknown delivery change type '{}', using grant", raw);
                DeliveryChangeType::Grant
            }),
        }
    }

    /// Configured modes, or `None` for the service defaults.
    fn modes(&self) -> Option<Vec<DeliveryMode>> {
        let raw = self.config.get("modes")?.as_array()?;
        let modes: Vec<DeliveryMode> = raw
            .iter()
            .filter_map(|value| {
                let name = value.as_str()?;
                let mode = DeliveryMode::parse(name);
                if mode.is_none() {
                    warn!("Skipping unknown delivery mode '{}'", name);
                }
                mode
            })
            .collect();
        (!modes.is_empty()).then_some(modes)
    }

    fn payload(&self, ctx: &ExecutionContext) -> DeliveryPayload {
        let mut data = serde_json::Map::new();
        data.insert("entity".to_string(), Value::Object(ctx.entity.clone()));
        if let Some(Value::Object(extra)) = self.config.get("data") {
            for (key, value) in extra {
                data.insert(key.clone(), value.clone());
            }
        }

        DeliveryPayload {
            change_type: self.change_type(),
            entity_type: ctx.entity_type.clone(),
            entity_id: ctx.entity_id.clone(),
            data,
            user: ctx.actor_email.clone(),
        }
    }
}

impl StepHandler for DeliveryHandler<'_> {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<StepOutcome, StepError> {
        let Some(service) = self.service else {
            return Ok(StepOutcome::error("Delivery service not initialized"));
        };

        let payload = self.payload(ctx);
        let modes = self.modes();
        info!(
            "Delivering {} for {} {}",
            payload.change_type, payload.entity_type, payload.entity_id
        );

        let results = service.deliver(&payload, modes.as_deref())?;
        let total = results.results.len();
        let data = results.to_data();

        if results.all_success() {
            return Ok(
                StepOutcome::pass(format!("Delivered via {} mode(s)", total)).with_data(data)
            );
        }
        if results.any_success() {
            return Ok(StepOutcome::pass(format!(
                "Partially delivered ({}/{} modes succeeded)",
                results.success_count(),
                total
            ))
            .with_data(data));
        }

        let errors = results.errors();
        let error = if errors.is_empty() {
            "All delivery modes failed".to_string()
        } else {
            errors.join("; ")
        };
        Ok(StepOutcome::error(error).with_data(data))
    }
}
