//! Input specifications.
//!
//! `inputs.yml` declares the files a chunk needs. Each entry is tagged by
//! `type`; the resolver in [`crate::inputs`] turns them into concrete file
//! actions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::commands::default_true;

/// Where a `file` input comes from: `{local: <path>}` or
/// `{ssh: {host, path}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileSource {
    /// Absolute path on the local filesystem.
    Local { local: PathBuf },
    /// Absolute path on a remote host, fetched over SSH.
    Ssh { ssh: SshSource },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SshSource {
    pub host: String,
    pub path: PathBuf,
}

impl FileSource {
    /// rsync/scp notation of the source, with an optional SSH user.
    pub fn transfer_uri(&self, ssh_user: Option<&str>) -> String {
        match self {
            FileSource::Local { local } => local.to_string_lossy().into_owned(),
            FileSource::Ssh { ssh } => match ssh_user {
                Some(user) => format!("{}@{}:{}", user, ssh.host, ssh.path.display()),
                None => format!("{}:{}", ssh.host, ssh.path.display()),
            },
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            FileSource::Local { local } => local,
            FileSource::Ssh { ssh } => &ssh.path,
        }
    }
}

/// A single LIMS resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BfabricResourceSpec {
    pub id: i64,
    /// Defaults to the basename of the resource's storage path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default = "default_true")]
    pub check_checksum: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    #[default]
    Zip,
}

/// A zip resource extracted into a directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BfabricResourceArchiveSpec {
    pub id: i64,
    pub filename: String,
    #[serde(default)]
    pub extract: ArchiveFormat,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Drops the single top-level directory shared by all entries.
    #[serde(default)]
    pub strip_root: bool,
    #[serde(default = "default_true")]
    pub check_checksum: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    #[default]
    Csv,
    Parquet,
}

/// A LIMS dataset written as a table file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BfabricDatasetSpec {
    pub id: i64,
    pub filename: String,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub format: DatasetFormat,
}

/// Column selector: a name (case-insensitive) or a zero-based index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Name(String),
}

impl Default for ColumnRef {
    fn default() -> Self {
        ColumnRef::Name("Resource".to_string())
    }
}

/// A dataset whose rows reference resources; every resource is downloaded
/// into the `filename` directory together with a parquet manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BfabricResourceDatasetSpec {
    pub id: i64,
    pub filename: String,
    #[serde(default)]
    pub column: ColumnRef,
    /// Glob patterns over the resources' relative storage paths.
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "default_output_dataset_filename")]
    pub output_dataset_filename: String,
    #[serde(default = "default_output_dataset_file_column")]
    pub output_dataset_file_column: String,
    /// Writes the manifest without downloading the resources.
    #[serde(default)]
    pub output_dataset_only: bool,
    #[serde(default = "default_true")]
    pub check_checksum: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    ResourceSample,
}

/// A derived annotation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BfabricAnnotationSpec {
    pub annotation: AnnotationKind,
    pub resource_ids: Vec<i64>,
    #[serde(default = "default_separator")]
    pub separator: String,
    pub filename: String,
}

/// A file from a local or SSH source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSpec {
    pub source: FileSource,
    /// Defaults to the basename of the source path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Symlink instead of copying; local sources only.
    #[serde(default)]
    pub link: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl FileSpec {
    pub fn resolved_filename(&self) -> String {
        self.filename.clone().unwrap_or_else(|| {
            self.source
                .path()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }
}

/// Inline text content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticFileSpec {
    pub content: String,
    pub filename: String,
}

/// Inline YAML data, dumped to a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticYamlSpec {
    pub data: Value,
    pub filename: String,
}

/// One entry of `inputs.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputSpec {
    BfabricResource(BfabricResourceSpec),
    BfabricResourceArchive(BfabricResourceArchiveSpec),
    BfabricDataset(BfabricDatasetSpec),
    BfabricResourceDataset(BfabricResourceDatasetSpec),
    BfabricAnnotation(BfabricAnnotationSpec),
    File(FileSpec),
    StaticFile(StaticFileSpec),
    StaticYaml(StaticYamlSpec),
}

impl InputSpec {
    pub fn type_name(&self) -> &'static str {
        match self {
            InputSpec::BfabricResource(_) => "bfabric_resource",
            InputSpec::BfabricResourceArchive(_) => "bfabric_resource_archive",
            InputSpec::BfabricDataset(_) => "bfabric_dataset",
            InputSpec::BfabricResourceDataset(_) => "bfabric_resource_dataset",
            InputSpec::BfabricAnnotation(_) => "bfabric_annotation",
            InputSpec::File(_) => "file",
            InputSpec::StaticFile(_) => "static_file",
            InputSpec::StaticYaml(_) => "static_yaml",
        }
    }
}

/// The `inputs.yml` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputsSpec {
    pub inputs: Vec<InputSpec>,
}

fn default_separator() -> String {
    ",".to_string()
}

fn default_output_dataset_filename() -> String {
    "dataset.parquet".to_string()
}

fn default_output_dataset_file_column() -> String {
    "File".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUTS: &str = r#"
inputs:
  - type: bfabric_resource
    id: 100
  - type: bfabric_resource_archive
    id: 101
    filename: archive
    strip_root: true
    exclude_patterns: ["*.log"]
  - type: bfabric_dataset
    id: 5
    filename: dataset.tsv
    separator: "\t"
  - type: bfabric_resource_dataset
    id: 6
    filename: raw
    column: 0
  - type: bfabric_annotation
    annotation: resource_sample
    resource_ids: [1, 2]
    filename: annotation.csv
  - type: file
    source:
      ssh:
        host: fgcz-s-022
        path: /srv/data/file.txt
  - type: static_file
    content: "hello"
    filename: hello.txt
  - type: static_yaml
    data: {a: 1}
    filename: params.yml
"#;

    #[test]
    fn test_parse_all_kinds() {
        let spec: InputsSpec = serde_yaml::from_str(INPUTS).unwrap();
        let kinds: Vec<&str> = spec.inputs.iter().map(InputSpec::type_name).collect();
        assert_eq!(
            kinds,
            vec![
                "bfabric_resource",
                "bfabric_resource_archive",
                "bfabric_dataset",
                "bfabric_resource_dataset",
                "bfabric_annotation",
                "file",
                "static_file",
                "static_yaml"
            ]
        );
    }

    #[test]
    fn test_defaults() {
        let spec: InputsSpec = serde_yaml::from_str(INPUTS).unwrap();

        let InputSpec::BfabricResource(resource) = &spec.inputs[0] else {
            panic!("expected resource");
        };
        assert!(resource.check_checksum);
        assert!(resource.filename.is_none());

        let InputSpec::BfabricDataset(dataset) = &spec.inputs[2] else {
            panic!("expected dataset");
        };
        assert_eq!(dataset.separator, "\t");
        assert_eq!(dataset.format, DatasetFormat::Csv);

        let InputSpec::BfabricResourceDataset(rd) = &spec.inputs[3] else {
            panic!("expected resource dataset");
        };
        assert_eq!(rd.column, ColumnRef::Index(0));
        assert_eq!(rd.output_dataset_filename, "dataset.parquet");
        assert_eq!(rd.output_dataset_file_column, "File");
    }

    #[test]
    fn test_file_source_uri() {
        let spec: InputsSpec = serde_yaml::from_str(INPUTS).unwrap();
        let InputSpec::File(file) = &spec.inputs[5] else {
            panic!("expected file");
        };
        assert_eq!(file.resolved_filename(), "file.txt");
        assert_eq!(
            file.source.transfer_uri(Some("bob")),
            "bob@fgcz-s-022:/srv/data/file.txt"
        );
        assert_eq!(file.source.transfer_uri(None), "fgcz-s-022:/srv/data/file.txt");
    }

    #[test]
    fn test_unknown_type_and_field_rejected() {
        let unknown_type = "inputs:\n  - type: bfabric_order_fasta\n    id: 1\n    filename: x\n";
        assert!(serde_yaml::from_str::<InputsSpec>(unknown_type).is_err());

        let unknown_field = "inputs:\n  - type: static_file\n    content: x\n    filename: y\n    mode: 1\n";
        assert!(serde_yaml::from_str::<InputsSpec>(unknown_field).is_err());
    }

    #[test]
    fn test_round_trip_is_stable() {
        let spec: InputsSpec = serde_yaml::from_str(INPUTS).unwrap();
        let dumped = serde_yaml::to_string(&spec).unwrap();
        let reparsed: InputsSpec = serde_yaml::from_str(&dumped).unwrap();
        assert_eq!(spec, reparsed);
    }
}
