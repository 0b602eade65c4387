//! Workflow Definition Module
//!
//! Provides data structures and utilities for defining, parsing, and
//! linting process-automation workflows.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Step, StepKind, WorkflowDefinition)
//! - [`parser`]: YAML parsing, loading and saving
//! - [`validator`]: Lint rules for step references and configuration

pub mod model;
pub mod parser;
pub mod validator;

pub use model::{Step, StepConfig, StepKind, WorkflowDefinition};
pub use parser::{load_workflow, parse_workflow, save_workflow};
pub use validator::{validate_workflow, ValidationIssue};
