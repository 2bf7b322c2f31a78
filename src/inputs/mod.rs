//! Input Staging
//!
//! - [`resolve`]: input specs to concrete file actions, no side effects
//! - [`prepare`]: copies, links, static writes and archive extraction
//! - [`integrity`]: state of already materialised inputs

pub mod integrity;
pub mod prepare;
pub mod resolve;

use std::path::{Path, PathBuf};

use log::error;

pub use integrity::{check_integrity, list_input_states, FileState, IntegrityState};
pub use prepare::{clean_folder, prepare_folder};
pub use resolve::{ResolvedInput, ResolvedInputs, Resolver};

use crate::error::{AppRunnerError, Result};
use crate::lims::LimsClient;
use crate::specs::parser::load_inputs_spec;

fn default_target(inputs_yaml: &Path, target_folder: Option<&Path>) -> PathBuf {
    match target_folder {
        Some(folder) => folder.to_path_buf(),
        None => inputs_yaml
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

/// States of the inputs declared in `inputs_yaml`.
pub fn list_folder(
    inputs_yaml: &Path,
    target_folder: Option<&Path>,
    client: &dyn LimsClient,
    check_files: bool,
) -> Result<Vec<FileState>> {
    let spec = load_inputs_spec(inputs_yaml)?;
    list_input_states(&spec.inputs, &default_target(inputs_yaml, target_folder), client, check_files)
}

/// Fails when any input is missing or incorrect.
pub fn check_folder(inputs_yaml: &Path, target_folder: Option<&Path>, client: &dyn LimsClient) -> Result<Vec<FileState>> {
    let states = list_folder(inputs_yaml, target_folder, client, true)?;
    let bad: Vec<String> = states
        .iter()
        .filter(|s| !s.integrity.is_usable())
        .map(|s| format!("{} ({})", s.name, s.integrity))
        .collect();
    if !bad.is_empty() {
        error!("Inputs not ready: {}", bad.join(", "));
        return Err(AppRunnerError::materialise(
            default_target(inputs_yaml, target_folder),
            format!("inputs not ready: {}", bad.join(", ")),
        ));
    }
    Ok(states)
}
