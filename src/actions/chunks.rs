//! Chunk discovery.
//!
//! The dispatch command lists the chunk directories it prepared in
//! `<work_dir>/chunks.yml`. Every listed directory must exist and contain a
//! readable `inputs.yml`.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{AppRunnerError, IoContext, Result};
use crate::util::paths::normalize;

pub const CHUNKS_FILE: &str = "chunks.yml";
pub const INPUTS_FILE: &str = "inputs.yml";
pub const OUTPUTS_FILE: &str = "outputs.yml";

/// Contents of `chunks.yml`. Paths are relative to the work directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunksFile {
    #[serde(default)]
    pub chunks: Vec<PathBuf>,
}

impl ChunksFile {
    /// Reads `<work_dir>/chunks.yml`. A missing or empty file lists no chunks.
    pub fn read(work_dir: &Path) -> Result<Self> {
        let path = work_dir.join(CHUNKS_FILE);
        if !path.exists() {
            debug!("{} does not exist", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path).with_path(&path)?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).map_err(|e| AppRunnerError::spec(path.display().to_string(), e.to_string()))
    }

    pub fn write(&self, work_dir: &Path) -> Result<()> {
        let path = work_dir.join(CHUNKS_FILE);
        fs::write(&path, serde_yaml::to_string(self)?).with_path(&path)
    }

    /// The listed chunks as absolute directories.
    pub fn chunk_dirs(&self, work_dir: &Path) -> Vec<PathBuf> {
        self.chunks.iter().map(|chunk| normalize(&work_dir.join(chunk))).collect()
    }
}

/// Fails unless `chunk_dir` is a directory with a readable `inputs.yml`.
pub fn validate_chunk_dir(chunk_dir: &Path) -> Result<()> {
    if !chunk_dir.is_dir() {
        return Err(AppRunnerError::Resolve(format!(
            "Chunk directory {} does not exist",
            chunk_dir.display()
        )));
    }
    let inputs = chunk_dir.join(INPUTS_FILE);
    fs::File::open(&inputs).with_path(&inputs)?;
    Ok(())
}

/// The validated chunk directories to drive.
///
/// Without `chunk` every listed chunk is returned. A named chunk must be
/// listed, unless `chunks.yml` lists nothing, in which case
/// `<work_dir>/<chunk>` is used directly.
pub fn select_chunks(work_dir: &Path, chunk: Option<&str>) -> Result<Vec<PathBuf>> {
    let listed = ChunksFile::read(work_dir)?.chunk_dirs(work_dir);

    let selected = match chunk {
        None => {
            if listed.is_empty() {
                info!("No chunks listed in {}", work_dir.join(CHUNKS_FILE).display());
            }
            listed
        }
        Some(name) => {
            let wanted = normalize(&work_dir.join(name));
            if listed.is_empty() || listed.contains(&wanted) {
                vec![wanted]
            } else {
                return Err(AppRunnerError::Resolve(format!(
                    "Chunk '{}' is not listed in {}",
                    name,
                    work_dir.join(CHUNKS_FILE).display()
                )));
            }
        }
    };

    for chunk_dir in &selected {
        validate_chunk_dir(chunk_dir)?;
    }
    Ok(selected)
}

/// Chunk directory relative to the work directory, for log lines.
pub fn chunk_label(work_dir: &Path, chunk_dir: &Path) -> String {
    chunk_dir
        .strip_prefix(work_dir)
        .unwrap_or(chunk_dir)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_chunk(work_dir: &Path, name: &str) {
        fs::create_dir_all(work_dir.join(name)).unwrap();
        fs::write(work_dir.join(name).join(INPUTS_FILE), "inputs: []\n").unwrap();
    }

    #[test]
    fn test_missing_or_empty_file_means_no_chunks() {
        let dir = tempdir().unwrap();
        assert!(select_chunks(dir.path(), None).unwrap().is_empty());

        fs::write(dir.path().join(CHUNKS_FILE), "").unwrap();
        assert!(select_chunks(dir.path(), None).unwrap().is_empty());

        fs::write(dir.path().join(CHUNKS_FILE), "chunks: []\n").unwrap();
        assert!(select_chunks(dir.path(), None).unwrap().is_empty());
    }

    #[test]
    fn test_chunks_in_listed_order() {
        let dir = tempdir().unwrap();
        make_chunk(dir.path(), "b");
        make_chunk(dir.path(), "a");
        ChunksFile {
            chunks: vec![PathBuf::from("b"), PathBuf::from("./a")],
        }
        .write(dir.path())
        .unwrap();

        let chunks = select_chunks(dir.path(), None).unwrap();
        assert_eq!(chunks, vec![dir.path().join("b"), dir.path().join("a")]);
        assert_eq!(chunk_label(dir.path(), &chunks[1]), "a");
    }

    #[test]
    fn test_named_chunk() {
        let dir = tempdir().unwrap();
        make_chunk(dir.path(), "a");
        make_chunk(dir.path(), "b");

        assert_eq!(select_chunks(dir.path(), Some("b")).unwrap(), vec![dir.path().join("b")]);

        fs::write(dir.path().join(CHUNKS_FILE), "chunks: [a]\n").unwrap();
        assert_eq!(select_chunks(dir.path(), Some("a")).unwrap(), vec![dir.path().join("a")]);
        let err = select_chunks(dir.path(), Some("b")).unwrap_err();
        assert_eq!(err.kind(), "ResolveError");
    }

    #[test]
    fn test_listed_chunk_must_have_inputs() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::write(dir.path().join(CHUNKS_FILE), "chunks: [a]\n").unwrap();
        assert_eq!(select_chunks(dir.path(), None).unwrap_err().kind(), "IoError");

        fs::write(dir.path().join(CHUNKS_FILE), "chunks: [missing]\n").unwrap();
        assert_eq!(select_chunks(dir.path(), None).unwrap_err().kind(), "ResolveError");
    }

    #[test]
    fn test_malformed_chunks_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CHUNKS_FILE), "chunk: [a]\n").unwrap();
        assert_eq!(ChunksFile::read(dir.path()).unwrap_err().kind(), "SpecInvalid");
    }
}
