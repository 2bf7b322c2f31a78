//! Workflow step bookkeeping after successful output registration.

use log::info;
use serde_json::{json, Map, Value};

use crate::error::{AppRunnerError, Result};
use crate::lims::entities::{Workflow, WorkflowStep, WorkflowTemplateStep};
use crate::lims::{Entity, LimsClient};
use crate::specs::workunit::WorkunitDefinition;

/// Finds or creates the workflow of the workunit's container and the step
/// for `workflow_template_step_id`. Returns the step id.
///
/// # Errors
///
/// * `WorkflowStepFailed` for any lookup or save failure
pub fn register_workflow_step(
    definition: &WorkunitDefinition,
    workflow_template_step_id: i64,
    client: &dyn LimsClient,
) -> Result<i64> {
    find_or_create_step(definition, workflow_template_step_id, client).map_err(|e| match e {
        AppRunnerError::WorkflowStepFailed(_) => e,
        other => AppRunnerError::WorkflowStepFailed(other.to_string()),
    })
}

fn find_or_create(endpoint: &str, query: Value, client: &dyn LimsClient) -> Result<i64> {
    if let Some(existing) = client.read(endpoint, &query)?.first() {
        let id = existing
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| AppRunnerError::lims(endpoint, format!("existing {} has no id", endpoint)))?;
        info!("Found existing {} {}", endpoint, id);
        return Ok(id);
    }
    let saved = client.save(endpoint, &query)?;
    let id = saved
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| AppRunnerError::WorkflowStepFailed(format!("saved {} has no id", endpoint)))?;
    info!("Created {} {}", endpoint, id);
    Ok(id)
}

fn find_or_create_step(
    definition: &WorkunitDefinition,
    workflow_template_step_id: i64,
    client: &dyn LimsClient,
) -> Result<i64> {
    let registration = definition.registration()?;
    let template_step = WorkflowTemplateStep::find(workflow_template_step_id, client)?.ok_or_else(|| {
        AppRunnerError::WorkflowStepFailed(format!(
            "workflow template step {} does not exist",
            workflow_template_step_id
        ))
    })?;
    let workflow_template_id = template_step.workflow_template_id().ok_or_else(|| {
        AppRunnerError::WorkflowStepFailed(format!(
            "workflow template step {} has no workflow template",
            workflow_template_step_id
        ))
    })?;

    let workflow_id = find_or_create(
        Workflow::ENDPOINT,
        json!({
            "containerid": registration.container_id,
            "workflowtemplateid": workflow_template_id,
        }),
        client,
    )?;

    let mut step = Map::new();
    step.insert("workflowid".to_string(), json!(workflow_id));
    step.insert("workflowtemplatestepid".to_string(), json!(workflow_template_step_id));
    step.insert("workunitid".to_string(), json!(registration.workunit_id));
    if let Some(user_id) = registration.user_id {
        step.insert("supervisorid".to_string(), json!(user_id));
    }
    if let Some(dataset_id) = definition.execution.dataset {
        step.insert("datasetid".to_string(), json!(dataset_id));
    }
    find_or_create(WorkflowStep::ENDPOINT, Value::Object(step), client)
}
