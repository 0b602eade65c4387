//! Compliance Policies
//!
//! A policy is a named, reusable rule that `policy_check` steps evaluate by
//! id. Policies live in a [`PolicyStore`]; the CLI loads them from
//! `<data_dir>/policies.yaml`:
//!
//! ```yaml
//! - id: owner-required
//!   name: Owner required
//!   rule: "owner != null"
//!   severity: high
//!   failure_message: Every data product needs an owner.
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub rule: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_active() -> bool {
    true
}

fn default_severity() -> String {
    "medium".to_string()
}

impl Policy {
    pub fn new(id: impl Into<String>, name: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rule: rule.into(),
            is_active: true,
            severity: default_severity(),
            failure_message: None,
            description: None,
        }
    }

    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Lookup of policies by id.
pub trait PolicyStore: Send + Sync {
    fn get(&self, policy_id: &str) -> Option<Policy>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryPolicyStore {
    policies: HashMap<String, Policy>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policies(policies: impl IntoIterator<Item = Policy>) -> Self {
        let mut store = Self::new();
        for policy in policies {
            store.insert(policy);
        }
        store
    }

    pub fn insert(&mut self, policy: Policy) {
        self.policies.insert(policy.id.clone(), policy);
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Loads a YAML list of policies. A missing file yields an empty store.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        let policies: Vec<Policy> = serde_yaml::from_str(&content)?;
        info!("Loaded {} policies from {}", policies.len(), path.display());
        Ok(Self::with_policies(policies))
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn get(&self, policy_id: &str) -> Option<Policy> {
        self.policies.get(policy_id).cloned()
    }
}
