//! Workflow Parser
//!
//! Handles loading and saving workflow definitions as YAML files.

use std::fs;
use std::path::Path;

use log::{debug, info, warn};

use super::model::WorkflowDefinition;
use super::validator::validate_workflow;
use crate::error::{EngineError, EngineResult};

/// Parses a workflow from YAML text.
///
/// Blank ids and names are left as they are; see [`load_workflow`] for the
/// file-based defaults.
pub fn parse_workflow(yaml_content: &str) -> EngineResult<WorkflowDefinition> {
    let workflow: WorkflowDefinition = serde_yaml::from_str(yaml_content)?;
    debug!("Parsed {} steps", workflow.steps.len());
    Ok(workflow)
}

/// Loads a workflow from a YAML file.
///
/// This function:
/// 1. Reads and parses the YAML file
/// 2. Defaults a missing `id` to the file stem and a missing `name` to the id
/// 3. Logs lint findings as warnings (they never reject the workflow)
///
/// # Example
///
/// ```rust,no_run
/// use procflow::workflow::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("review.yaml")?;
///     println!("Loaded {} steps", workflow.steps.len());
///     Ok(())
/// }
/// ```
pub fn load_workflow(path: impl AsRef<Path>) -> EngineResult<WorkflowDefinition> {
    let path = path.as_ref();
    info!("Loading workflow from: {}", path.display());

    let yaml_content = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
    debug!("YAML content loaded ({} bytes)", yaml_content.len());

    let mut workflow = parse_workflow(&yaml_content)?;

    if workflow.id.trim().is_empty() {
        workflow.id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("workflow")
            .to_string();
    }
    if workflow.name.trim().is_empty() {
        workflow.name = workflow.id.clone();
    }

    for issue in validate_workflow(&workflow) {
        warn!("{}: {}", workflow.id, issue);
    }

    info!(
        "Loaded workflow '{}' ({} steps)",
        workflow.id,
        workflow.steps.len()
    );
    Ok(workflow)
}

/// Saves a workflow to a YAML file.
pub fn save_workflow(workflow: &WorkflowDefinition, path: impl AsRef<Path>) -> EngineResult<()> {
    let path = path.as_ref();
    let yaml_content = serde_yaml::to_string(workflow)?;
    fs::write(path, yaml_content).map_err(|e| EngineError::io(path, e))?;
    info!("Workflow saved to: {}", path.display());
    Ok(())
}
