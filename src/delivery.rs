//! Change Delivery
//!
//! Delivery steps hand a payload describing an entity change to a
//! [`DeliveryService`], which applies it through one or more modes (direct
//! system calls, indirect via a queued change, or a manual ticket). The
//! engine only depends on the trait.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChangeType {
    Grant,
    Revoke,
    TagAssign,
    TagRemove,
    StatusChange,
}

impl DeliveryChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grant => "grant",
            Self::Revoke => "revoke",
            Self::TagAssign => "tag_assign",
            Self::TagRemove => "tag_remove",
            Self::StatusChange => "status_change",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "grant" => Some(Self::Grant),
            "revoke" => Some(Self::Revoke),
            "tag_assign" => Some(Self::TagAssign),
            "tag_remove" => Some(Self::TagRemove),
            "status_change" => Some(Self::StatusChange),
            _ => None,
        }
    }
}

impl fmt::Display for DeliveryChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Direct,
    Indirect,
    Manual,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Indirect => "indirect",
            Self::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "direct" => Some(Self::Direct),
            "indirect" => Some(Self::Indirect),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPayload {
    pub change_type: DeliveryChangeType,
    pub entity_type: String,
    pub entity_id: String,
    /// `entity` plus any extra step-configured keys
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Outcome of one delivery mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeResult {
    pub mode: DeliveryMode,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModeResult {
    pub fn ok(mode: DeliveryMode, message: impl Into<String>) -> Self {
        Self {
            mode,
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(mode: DeliveryMode, error: impl Into<String>) -> Self {
        Self {
            mode,
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Per-mode results of one delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResults {
    pub results: Vec<ModeResult>,
}

impl DeliveryResults {
    pub fn new(results: Vec<ModeResult>) -> Self {
        Self { results }
    }

    /// True when at least one mode ran and every mode succeeded.
    pub fn all_success(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.success)
    }

    pub fn any_success(&self) -> bool {
        self.results.iter().any(|r| r.success)
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn errors(&self) -> Vec<String> {
        self.results.iter().filter_map(|r| r.error.clone()).collect()
    }

    /// Shape recorded as the step's result data.
    pub fn to_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("results".to_string(), json!(self.results));
        data.insert("all_success".to_string(), json!(self.all_success()));
        data.insert("any_success".to_string(), json!(self.any_success()));
        data.insert("errors".to_string(), json!(self.errors()));
        data
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Delivery service unavailable: {0}")]
    Unavailable(String),

    #[error("Delivery failed: {0}")]
    Failed(String),
}

/// Applies entity changes to downstream systems.
pub trait DeliveryService: Send + Sync {
    /// Delivers `payload`; `None` modes means the service's own defaults.
    fn deliver(
        &self,
        payload: &DeliveryPayload,
        modes: Option<&[DeliveryMode]>,
    ) -> Result<DeliveryResults, DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_change_type_and_mode() {
        assert_eq!(DeliveryChangeType::parse("revoke"), Some(DeliveryChangeType::Revoke));
        assert_eq!(DeliveryChangeType::parse("explode"), None);
        assert_eq!(DeliveryMode::parse("manual"), Some(DeliveryMode::Manual));
        assert_eq!(DeliveryMode::parse("carrier_pigeon"), None);
    }

    #[test]
    fn test_results_summary() {
        let results = DeliveryResults::new(vec![
            ModeResult::ok(DeliveryMode::Direct, "applied"),
            ModeResult::failed(DeliveryMode::Manual, "ticket system down"),
        ]);

        assert!(!results.all_success());
        assert!(results.any_success());
        assert_eq!(results.success_count(), 1);
        assert_eq!(results.errors(), vec!["ticket system down".to_string()]);

        let data = results.to_data();
        assert_eq!(data["any_success"], true);
        assert_eq!(data["results"][0]["mode"], "direct");
    }

    #[test]
    fn test_empty_results_are_not_success() {
        let results = DeliveryResults::default();
        assert!(!results.all_success());
        assert!(!results.any_success());
    }
}
