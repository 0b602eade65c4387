//! Notifications
//!
//! Notification steps resolve recipients and a message, then hand both to a
//! [`Notifier`]. [`LogNotifier`] is the default and writes to the log.

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A message ready to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    pub entity_type: String,
    pub entity_id: String,
    pub execution_id: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            "Notification to [{}] ({} {}): {}",
            notification.recipients.join(", "),
            notification.entity_type,
            notification.entity_id,
            notification.message
        );
        Ok(())
    }
}
