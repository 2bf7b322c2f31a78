//! Integrity of materialised inputs.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use super::resolve::{ResolvedDirectory, ResolvedFile, ResolvedInput, ResolvedStaticFile, Resolver};
use crate::error::{AppRunnerError, Result};
use crate::lims::LimsClient;
use crate::specs::inputs::InputSpec;
use crate::util::checksum::md5sum;

/// State of a local artifact relative to its resolved input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityState {
    /// Nothing at the expected path.
    Missing,
    /// Present, but there is nothing to check it against.
    NotChecked,
    Correct,
    /// Present with a wrong checksum or content; needs to be prepared again.
    Incorrect,
}

impl IntegrityState {
    pub fn exists(self) -> bool {
        self != IntegrityState::Missing
    }

    /// Whether the artifact can be used as is.
    pub fn is_usable(self) -> bool {
        matches!(self, IntegrityState::NotChecked | IntegrityState::Correct)
    }
}

impl fmt::Display for IntegrityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntegrityState::Missing => "Missing",
            IntegrityState::NotChecked => "NotChecked",
            IntegrityState::Correct => "Correct",
            IntegrityState::Incorrect => "Incorrect",
        };
        f.write_str(name)
    }
}

/// Checks the artifact at `local_path` against `input`. Unreadable
/// artifacts count as incorrect.
pub fn check_integrity(input: &ResolvedInput, local_path: &Path) -> IntegrityState {
    if !local_path.exists() {
        return IntegrityState::Missing;
    }
    let checked = match input {
        ResolvedInput::File(file) => check_file(file, local_path),
        ResolvedInput::StaticFile(file) => check_static_file(file, local_path),
        ResolvedInput::Directory(directory) => check_directory(directory, local_path),
    };
    checked.unwrap_or(IntegrityState::Incorrect)
}

fn state_of(correct: bool) -> IntegrityState {
    if correct {
        IntegrityState::Correct
    } else {
        IntegrityState::Incorrect
    }
}

fn check_file(file: &ResolvedFile, local_path: &Path) -> Result<IntegrityState> {
    Ok(match &file.checksum {
        None => IntegrityState::NotChecked,
        Some(expected) => state_of(md5sum(local_path)? == *expected),
    })
}

fn check_static_file(file: &ResolvedStaticFile, local_path: &Path) -> Result<IntegrityState> {
    let existing = fs::read(local_path).map_err(|source| AppRunnerError::Io {
        path: local_path.to_path_buf(),
        source,
    })?;
    Ok(state_of(existing == file.content.as_bytes()))
}

/// A directory must be non-empty; with a checksum, its cached archive must
/// also be present and match.
fn check_directory(directory: &ResolvedDirectory, local_path: &Path) -> Result<IntegrityState> {
    let is_empty = fs::read_dir(local_path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true);
    if !local_path.is_dir() || is_empty {
        return Ok(IntegrityState::Incorrect);
    }

    let Some(expected) = &directory.checksum else {
        return Ok(IntegrityState::NotChecked);
    };
    let parent = local_path.parent().unwrap_or_else(|| Path::new("."));
    let name = local_path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let cache_file = parent.join(format!("{}.zip", name));
    if !cache_file.is_file() {
        return Ok(IntegrityState::Incorrect);
    }
    Ok(state_of(md5sum(&cache_file)? == *expected))
}

/// One row of `inputs list`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileState {
    pub name: String,
    pub path: PathBuf,
    pub exists: bool,
    pub integrity: IntegrityState,
}

/// Resolves `specs` and reports the state of each input in `target_folder`.
///
/// Without `check_files` the integrity is always `NotChecked`.
pub fn list_input_states(
    specs: &[InputSpec],
    target_folder: &Path,
    client: &dyn LimsClient,
    check_files: bool,
) -> Result<Vec<FileState>> {
    let inputs = Resolver::new(client).resolve(specs)?;
    Ok(inputs
        .iter()
        .map(|input| {
            let path = target_folder.join(input.filename());
            let integrity = if check_files {
                check_integrity(input, &path)
            } else {
                IntegrityState::NotChecked
            };
            FileState {
                name: input.filename().to_string(),
                exists: path.exists(),
                path,
                integrity,
            }
        })
        .collect())
}

/// Renders the states as an aligned text table.
pub fn format_input_states(states: &[FileState]) -> String {
    let width = states
        .iter()
        .map(|s| s.name.len())
        .chain(std::iter::once("File".len()))
        .max()
        .unwrap_or_default();
    let mut out = format!("{:<width$}  {:<6}  {}\n", "File", "Exists", "Integrity", width = width);
    for state in states {
        out.push_str(&format!(
            "{:<width$}  {:<6}  {}\n",
            state.name,
            if state.exists { "Yes" } else { "No" },
            state.integrity,
            width = width
        ));
    }
    out
}
