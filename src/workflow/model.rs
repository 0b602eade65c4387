//! Workflow Data Model
//!
//! Core data structures representing workflow steps and their branches.
//!
//! # Example YAML Format
//!
//! ```yaml
//! id: dataset-review
//! name: Dataset review
//! steps:
//!   - step_id: check_size
//!     type: validation
//!     config:
//!       rule: "size > 0"
//!     on_pass: approve
//!     on_fail: reject
//!
//!   - step_id: approve
//!     type: approval
//!     config:
//!       approvers: requester
//!     on_pass: done
//!
//!   - step_id: reject
//!     type: fail
//!     config:
//!       message: Dataset is empty
//!
//!   - step_id: done
//!     type: pass
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind-specific step configuration.
pub type StepConfig = Map<String, Value>;

/// The closed set of step kinds understood by the engine.
///
/// Kind strings that are not recognised are kept as [`StepKind::Unknown`] so a
/// workflow still loads; dispatching such a step fails at run time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    Validation,
    Approval,
    Notification,
    AssignTag,
    RemoveTag,
    Conditional,
    Script,
    Pass,
    Fail,
    PolicyCheck,
    Delivery,
    Unknown(String),
}

impl StepKind {
    /// All known kinds, in declaration order.
    pub const KNOWN: [StepKind; 11] = [
        StepKind::Validation,
        StepKind::Approval,
        StepKind::Notification,
        StepKind::AssignTag,
        StepKind::RemoveTag,
        StepKind::Conditional,
        StepKind::Script,
        StepKind::Pass,
        StepKind::Fail,
        StepKind::PolicyCheck,
        StepKind::Delivery,
    ];

    /// Identifier used in workflow files.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Validation => "validation",
            Self::Approval => "approval",
            Self::Notification => "notification",
            Self::AssignTag => "assign_tag",
            Self::RemoveTag => "remove_tag",
            Self::Conditional => "conditional",
            Self::Script => "script",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::PolicyCheck => "policy_check",
            Self::Delivery => "delivery",
            Self::Unknown(kind) => kind,
        }
    }

    /// Config keys a step of this kind cannot run without.
    pub fn required_config_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Validation => &["rule"],
            Self::Approval => &["approvers"],
            Self::Notification => &["recipients"],
            Self::AssignTag | Self::RemoveTag => &["key"],
            Self::Conditional => &["condition"],
            Self::Script => &["code"],
            Self::PolicyCheck => &["policy_id"],
            Self::Pass | Self::Fail | Self::Delivery | Self::Unknown(_) => &[],
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<String> for StepKind {
    fn from(kind: String) -> Self {
        match kind.trim() {
            "validation" => Self::Validation,
            "approval" => Self::Approval,
            "notification" => Self::Notification,
            "assign_tag" => Self::AssignTag,
            "remove_tag" => Self::RemoveTag,
            "conditional" => Self::Conditional,
            "script" => Self::Script,
            "pass" => Self::Pass,
            "fail" => Self::Fail,
            "policy_check" => Self::PolicyCheck,
            "delivery" => Self::Delivery,
            _ => Self::Unknown(kind),
        }
    }
}

impl From<&str> for StepKind {
    fn from(kind: &str) -> Self {
        Self::from(kind.to_string())
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a single step in a workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Step {
    /// Identifier unique within the owning workflow
    #[serde(alias = "id")]
    pub step_id: String,

    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Which handler runs this step
    #[serde(rename = "type", alias = "step_type")]
    pub kind: StepKind,

    /// Handler-specific configuration
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: StepConfig,

    /// Step to run when this one passes; absent means the run ends here
    #[serde(default, deserialize_with = "blank_as_none", skip_serializing_if = "Option::is_none")]
    pub on_pass: Option<String>,

    /// Step to run when this one fails; absent means the run ends here
    #[serde(default, deserialize_with = "blank_as_none", skip_serializing_if = "Option::is_none")]
    pub on_fail: Option<String>,
}

/// Deserializes a branch reference, treating null and blank strings as absent.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Option::<String>::deserialize(deserializer)?;
    Ok(val
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

impl Step {
    /// Creates a new step of the given kind with empty configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use procflow::workflow::{Step, StepKind};
    ///
    /// let step = Step::new("check", StepKind::Validation)
    ///     .with_config("rule", "size > 0")
    ///     .on_pass("approve")
    ///     .on_fail("reject");
    /// ```
    pub fn new(step_id: impl Into<String>, kind: impl Into<StepKind>) -> Self {
        Self {
            step_id: step_id.into().trim().to_string(),
            name: None,
            kind: kind.into(),
            config: StepConfig::new(),
            on_pass: None,
            on_fail: None,
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets one configuration entry.
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Sets the pass branch.
    pub fn on_pass(mut self, step_id: impl Into<String>) -> Self {
        self.on_pass = Some(step_id.into());
        self
    }

    /// Sets the fail branch.
    pub fn on_fail(mut self, step_id: impl Into<String>) -> Self {
        self.on_fail = Some(step_id.into());
        self
    }

    /// Resolves the branch taken for a pass/fail result.
    pub fn next_step(&self, passed: bool) -> Option<&str> {
        if passed {
            self.on_pass.as_deref()
        } else {
            self.on_fail.as_deref()
        }
    }

    /// Branch targets declared by this step, labelled by branch.
    pub fn branches(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [("on_pass", self.on_pass.as_deref()), ("on_fail", self.on_fail.as_deref())]
            .into_iter()
            .filter_map(|(label, target)| target.map(|t| (label, t)))
    }
}

/// A complete workflow: an ordered list of steps whose first element is the
/// entry point.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    /// Stable workflow identifier (defaults to the file stem when loaded)
    #[serde(default)]
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Inactive workflows still load and run; activation is a caller concern
    #[serde(default = "default_active")]
    pub is_active: bool,

    /// Ordered list of steps
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_active() -> bool {
    true
}

impl WorkflowDefinition {
    /// Creates a new empty workflow.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            version: None,
            is_active: true,
            steps: Vec::new(),
        }
    }

    /// Creates a workflow from a list of steps.
    pub fn from_steps(id: impl Into<String>, name: impl Into<String>, steps: Vec<Step>) -> Self {
        let mut workflow = Self::new(id, name);
        workflow.steps = steps;
        workflow
    }

    /// Adds a step to the workflow.
    pub fn add_step(&mut self, step: Step) -> Result<(), String> {
        if self.steps.iter().any(|s| s.step_id == step.step_id) {
            return Err(format!("Step '{}' already exists", step.step_id));
        }
        self.steps.push(step);
        Ok(())
    }

    /// Adds a step, builder style. Duplicates are the lint's business.
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Gets a step by ID.
    pub fn get_step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// Gets a mutable reference to a step by ID.
    pub fn get_step_mut(&mut self, step_id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.step_id == step_id)
    }

    /// The step where every run starts.
    pub fn entry_step(&self) -> Option<&Step> {
        self.steps.first()
    }

    /// Builds a `step_id -> Step` index. On duplicate ids the first step wins.
    pub fn step_index(&self) -> HashMap<&str, &Step> {
        let mut index = HashMap::with_capacity(self.steps.len());
        for step in &self.steps {
            index.entry(step.step_id.as_str()).or_insert(step);
        }
        index
    }

    /// Returns the number of steps in the workflow.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the workflow has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
