//! Dataset outputs: a delimited file saved as a LIMS dataset.

use log::{info, warn};
use serde_json::{json, Value};

use crate::error::{AppRunnerError, Result};
use crate::lims::entities::Dataset;
use crate::lims::{Entity, LimsClient};
use crate::specs::outputs::SaveDatasetSpec;
use crate::specs::workunit::WorkunitDefinition;
use crate::util::table::Table;

/// Columns with at least one cell containing any of `invalid_characters`.
pub fn invalid_columns(table: &Table, invalid_characters: &str) -> Vec<String> {
    if invalid_characters.is_empty() {
        return Vec::new();
    }
    table
        .columns()
        .iter()
        .enumerate()
        .filter(|(index, _)| {
            table
                .column_values(*index)
                .iter()
                .any(|cell| cell.chars().any(|c| invalid_characters.contains(c)))
        })
        .map(|(_, name)| name.clone())
        .collect()
}

/// The attribute/item form of `table`. A column is typed `Integer` when
/// every value parses as one, `String` otherwise.
pub fn table_to_dataset(table: &Table) -> Value {
    let attributes: Vec<Value> = table
        .columns()
        .iter()
        .enumerate()
        .map(|(index, name)| {
            json!({
                "name": name,
                "position": index + 1,
                "type": if table.is_integer_column(index) { "Integer" } else { "String" },
            })
        })
        .collect();
    let items: Vec<Value> = table
        .rows()
        .iter()
        .enumerate()
        .map(|(row_index, row)| {
            let fields: Vec<Value> = row
                .iter()
                .enumerate()
                .map(|(index, value)| json!({ "attributeposition": index + 1, "value": value }))
                .collect();
            json!({ "field": fields, "position": row_index + 1 })
        })
        .collect();
    json!({ "attribute": attributes, "item": items })
}

fn warn_on_trailing_spaces(table: &Table) {
    for (index, name) in table.columns().iter().enumerate() {
        if table
            .column_values(index)
            .iter()
            .any(|cell| cell.ends_with(char::is_whitespace))
        {
            warn!("Column '{}' contains trailing spaces", name);
        }
    }
}

/// Reads the file and saves it as a dataset in the workunit's container.
///
/// # Errors
///
/// * `RegisterFailed` when a cell contains an invalid character or the LIMS
///   rejects the dataset
pub fn register_dataset(spec: &SaveDatasetSpec, definition: &WorkunitDefinition, client: &dyn LimsClient) -> Result<Value> {
    let registration = definition.registration()?;
    let table = Table::read_csv(&spec.local_path, &spec.separator, spec.has_header)?;

    let invalid = invalid_columns(&table, &spec.invalid_characters);
    if !invalid.is_empty() {
        return Err(AppRunnerError::RegisterFailed(format!(
            "Invalid characters found in columns: {:?}",
            invalid
        )));
    }
    warn_on_trailing_spaces(&table);

    let mut payload = table_to_dataset(&table);
    payload["name"] = json!(spec.dataset_name());
    payload["containerid"] = json!(registration.container_id);
    payload["workunitid"] = json!(registration.workunit_id);

    let saved = client
        .save(Dataset::ENDPOINT, &payload)
        .map_err(|e| AppRunnerError::RegisterFailed(e.to_string()))?;
    info!(
        "Saved dataset {} ({} rows) as id {}",
        spec.dataset_name(),
        table.num_rows(),
        saved["id"]
    );
    Ok(saved)
}
