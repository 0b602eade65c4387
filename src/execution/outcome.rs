//! Step Outcomes
//!
//! What a handler returns, and the error type handlers use for faults that
//! the dispatcher turns into failed outcomes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::delivery::DeliveryError;
use crate::expression::ExpressionError;
use crate::notify::NotifyError;

/// Result of running one step.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Suspends the run after this step is recorded, whatever `passed` says
    #[serde(default)]
    pub blocking: bool,
}

impl StepOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// A failed outcome carrying an error rather than a verdict.
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            passed: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn from_verdict(passed: bool, message: impl Into<String>) -> Self {
        if passed {
            Self::pass(message)
        } else {
            Self::fail(message)
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    /// Human explanation for a failure: the message, else the error.
    pub fn failure_reason(&self) -> Option<String> {
        self.message.clone().or_else(|| self.error.clone())
    }
}

/// Faults inside a handler.
///
/// Never escapes a step: the dispatcher converts it into
/// `StepOutcome { passed: false, error: Some(..) }`.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{0}")]
    MissingConfig(&'static str),

    #[error("Invalid config value for '{key}': {message}")]
    InvalidConfig { key: &'static str, message: String },

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Script I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<StepError> for StepOutcome {
    fn from(err: StepError) -> Self {
        StepOutcome::error(err.to_string())
    }
}

/// Builds an outcome data map from key/value pairs.
pub(crate) fn data_map<I, K>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
