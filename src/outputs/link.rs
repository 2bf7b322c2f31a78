//! Link outputs.

use log::info;
use serde_json::{json, Value};

use crate::error::{AppRunnerError, Result};
use crate::lims::entities::Link;
use crate::lims::{Entity, LimsClient};
use crate::specs::outputs::{SaveLinkSpec, UpdateExisting};
use crate::specs::workunit::WorkunitDefinition;

/// Creates or updates a link on the requested entity. Links are matched by
/// name and parent.
pub fn register_link(spec: &SaveLinkSpec, definition: &WorkunitDefinition, client: &dyn LimsClient) -> Result<Value> {
    spec.validate()?;
    let parent_id = spec.target_id(definition.registration()?.workunit_id);
    let query = json!({
        "name": spec.name,
        "parentclassname": spec.entity_type,
        "parentid": parent_id,
    });
    let existing = Link::find_by(&query, client)?.first().map(|link| link.id());

    let mut payload = json!({
        "name": spec.name,
        "url": spec.url,
        "parentclassname": spec.entity_type,
        "parentid": parent_id,
    });
    match (spec.update_existing, existing) {
        (UpdateExisting::No, Some(id)) => {
            return Err(AppRunnerError::RegisterFailed(format!(
                "Link '{}' already exists on {} {} (id {})",
                spec.name, spec.entity_type, parent_id, id
            )))
        }
        (UpdateExisting::Required, None) => {
            return Err(AppRunnerError::RegisterFailed(format!(
                "Link '{}' not found on {} {}",
                spec.name, spec.entity_type, parent_id
            )))
        }
        (_, Some(id)) => payload["id"] = json!(id),
        (_, None) => {}
    }

    let saved = client
        .save(Link::ENDPOINT, &payload)
        .map_err(|e| AppRunnerError::RegisterFailed(e.to_string()))?;
    info!("Saved link '{}' on {} {}", spec.name, spec.entity_type, parent_id);
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lims::MockClient;
    use crate::specs::workunit::{ContainerType, WorkunitExecutionDefinition, WorkunitRegistrationDefinition};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn definition() -> WorkunitDefinition {
        WorkunitDefinition {
            execution: WorkunitExecutionDefinition {
                raw_parameters: BTreeMap::new(),
                dataset: None,
                resources: vec![1],
            },
            registration: Some(WorkunitRegistrationDefinition {
                application_id: 10,
                application_name: "app".to_string(),
                workunit_id: 300,
                workunit_name: "wu".to_string(),
                container_id: 3000,
                container_type: ContainerType::Project,
                storage_id: 2,
                storage_output_folder: PathBuf::from("out"),
                user_id: None,
            }),
        }
    }

    fn link(url: &str, update_existing: UpdateExisting) -> SaveLinkSpec {
        SaveLinkSpec {
            name: "Report".to_string(),
            url: url.to_string(),
            entity_type: "Workunit".to_string(),
            entity_id: None,
            update_existing,
        }
    }

    #[test]
    fn test_create_then_update() {
        let mock = MockClient::new();
        let first = register_link(&link("https://a", UpdateExisting::IfExists), &definition(), &mock).unwrap();
        assert_eq!(first["parentid"], 300);

        register_link(&link("https://b", UpdateExisting::IfExists), &definition(), &mock).unwrap();
        let links = mock.entities("link");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0]["url"], "https://b");
    }

    #[test]
    fn test_policies() {
        let mock = MockClient::new();
        let err = register_link(&link("https://a", UpdateExisting::Required), &definition(), &mock).unwrap_err();
        assert_eq!(err.kind(), "RegisterFailed");

        register_link(&link("https://a", UpdateExisting::No), &definition(), &mock).unwrap();
        let err = register_link(&link("https://a", UpdateExisting::No), &definition(), &mock).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_other_entity_requires_id() {
        let mock = MockClient::new();
        let mut spec = link("https://a", UpdateExisting::IfExists);
        spec.entity_type = "Dataset".to_string();
        assert_eq!(
            register_link(&spec, &definition(), &mock).unwrap_err().kind(),
            "SpecInvalid"
        );

        spec.entity_id = Some(55);
        let saved = register_link(&spec, &definition(), &mock).unwrap();
        assert_eq!(saved["parentid"], 55);
        assert_eq!(saved["parentclassname"], "Dataset");
    }
}
