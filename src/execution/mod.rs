//! Workflow Execution Module
//!
//! Runs workflow definitions against business entities and keeps the
//! durable record of every run.
//!
//! # Architecture
//!
//! - [`engine`]: The branching interpreter with pause/resume
//! - [`step`]: Dispatch of a single step to its handler
//! - [`context`]: Per-run entity data and accumulated step results
//! - [`outcome`]: What handlers return
//! - [`record`]: Durable execution and step records

pub mod context;
pub mod engine;
pub mod outcome;
pub mod record;
pub mod step;

pub use context::{Entity, ExecutionContext, StepResultEntry};
pub use engine::{Engine, RunRequest};
pub use outcome::{StepError, StepOutcome};
pub use record::{
    ExecutionStatus, StepExecutionRecord, StepExecutionStatus, TriggerContext, WorkflowExecution,
};
pub use step::execute_step;
