//! Procflow - Process Automation Workflow Engine
//!
//! Runs branching business workflows (validation, approvals, notifications,
//! tagging, policy checks, scripts, change delivery) against a business
//! entity. Workflows may pause indefinitely on a human decision and resume
//! later, from the same process or another one, using only the durable
//! execution record.
//!
//! # Architecture
//!
//! - [`workflow`]: Workflow definitions, YAML parsing and linting
//! - [`execution`]: The branching interpreter with pause/resume
//! - [`handlers`]: One handler per step kind
//! - [`expression`]: The rule/condition language
//! - [`store`]: In-memory and file-backed execution and workflow stores
//! - [`monitoring`]: Execution timelines
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use procflow::execution::{Engine, RunRequest};
//! use procflow::store::{FileExecutionStore, FileWorkflowStore};
//! use procflow::load_workflow;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load a workflow from YAML and register it for later resumes
//!     let workflow = load_workflow("review.yaml")?;
//!     let workflows = Arc::new(FileWorkflowStore::open(".procflow")?);
//!     workflows.save(&workflow)?;
//!
//!     // Create execution engine
//!     let executions = Arc::new(FileExecutionStore::open(".procflow")?);
//!     let engine = Engine::new(executions, workflows);
//!
//!     // Run it; an approval step leaves the execution paused
//!     let entity = serde_json::json!({"name": "Sales", "owner": "a@x.com"});
//!     let request = RunRequest::new("data_product", "dp-1", entity.as_object().cloned().unwrap_or_default())
//!         .with_actor("requester@x.com");
//!     let execution = engine.run(&workflow, request)?;
//!
//!     if execution.is_paused() {
//!         engine.resume(&execution.id, true, None)?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod delivery;
pub mod error;
pub mod execution;
pub mod expression;
pub mod handlers;
pub mod monitoring;
pub mod notify;
pub mod policy;
pub mod store;
pub mod workflow;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use execution::engine::{Engine, RunRequest};
pub use execution::record::{ExecutionStatus, WorkflowExecution};
pub use workflow::model::{Step, StepKind, WorkflowDefinition};
pub use workflow::parser::load_workflow;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Procflow";
