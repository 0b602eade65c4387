//! Execution Monitoring Module
//!
//! Reporting over recorded executions.
//!
//! # Components
//!
//! - [`ExecutionTimeline`]: Per-step timings and Gantt charts

pub mod timeline;

pub use timeline::{ExecutionTimeline, TimelineEntry};
