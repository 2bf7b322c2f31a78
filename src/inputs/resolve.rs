//! Input Resolution
//!
//! Turns declarative input specs into a flat list of concrete file actions
//! without touching the filesystem. LIMS-backed specs issue read-only
//! lookups to find storages, resources and datasets.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use glob::Pattern;
use log::{debug, info};
use serde_json::Value;

use crate::error::{AppRunnerError, Result};
use crate::lims::entities::{scalar_to_string, Dataset, Entity, Resource, Sample, Storage};
use crate::lims::LimsClient;
use crate::specs::inputs::{
    ArchiveFormat, BfabricAnnotationSpec, BfabricDatasetSpec, BfabricResourceDatasetSpec, ColumnRef,
    DatasetFormat, FileSource, InputSpec, SshSource,
};
use crate::util::paths::validate_relative_filename;
use crate::util::table::Table;

/// A file copied or linked from a source.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFile {
    pub filename: String,
    pub source: FileSource,
    pub link: bool,
    pub checksum: Option<String>,
}

/// Body of a static file.
#[derive(Debug, Clone, PartialEq)]
pub enum StaticContent {
    Text(String),
    Bytes(Vec<u8>),
}

impl StaticContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            StaticContent::Text(text) => text.as_bytes(),
            StaticContent::Bytes(bytes) => bytes,
        }
    }
}

/// A file written from in-memory content.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStaticFile {
    pub filename: String,
    pub content: StaticContent,
}

/// An archive extracted into a directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDirectory {
    pub filename: String,
    pub source: FileSource,
    pub extract: ArchiveFormat,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub strip_root: bool,
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedInput {
    File(ResolvedFile),
    StaticFile(ResolvedStaticFile),
    Directory(ResolvedDirectory),
}

impl ResolvedInput {
    pub fn filename(&self) -> &str {
        match self {
            ResolvedInput::File(f) => &f.filename,
            ResolvedInput::StaticFile(f) => &f.filename,
            ResolvedInput::Directory(d) => &d.filename,
        }
    }
}

/// A validated list of resolved inputs.
///
/// Filenames are unique and relative, `.` stands alone, and nothing is placed
/// inside a directory that an archive will be extracted to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedInputs {
    files: Vec<ResolvedInput>,
}

impl ResolvedInputs {
    pub fn new(files: Vec<ResolvedInput>) -> Result<Self> {
        for file in &files {
            validate_relative_filename(file.filename()).map_err(AppRunnerError::Resolve)?;
        }

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for file in &files {
            *counts.entry(file.filename()).or_default() += 1;
        }
        let duplicates: Vec<&str> = counts
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(name, _)| *name)
            .collect();
        if !duplicates.is_empty() {
            return Err(AppRunnerError::Resolve(format!(
                "Duplicate filenames in resolved inputs: {}",
                duplicates.join(", ")
            )));
        }

        if counts.contains_key(".") && counts.len() > 1 {
            return Err(AppRunnerError::Resolve(
                "Current directory '.' cannot coexist with other files".to_string(),
            ));
        }

        for directory in files.iter().filter_map(|f| match f {
            ResolvedInput::Directory(d) => Some(d.filename.as_str()),
            _ => None,
        }) {
            if let Some(path) = counts
                .keys()
                .find(|path| **path != directory && Path::new(path).starts_with(directory))
            {
                return Err(AppRunnerError::Resolve(format!(
                    "Path '{}' conflicts with directory '{}' (would be inside extracted directory)",
                    path, directory
                )));
            }
        }

        Ok(Self { files })
    }

    pub fn files(&self) -> &[ResolvedInput] {
        &self.files
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedInput> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Keeps only the entries whose filename is listed in `filter`, either
    /// literally or as a glob.
    ///
    /// # Errors
    ///
    /// * `Resolve` when nothing matches
    pub fn apply_filter(self, filter: &[String]) -> Result<Self> {
        let patterns: Vec<Option<Pattern>> = filter.iter().map(|f| Pattern::new(f).ok()).collect();
        let files: Vec<ResolvedInput> = self
            .files
            .into_iter()
            .filter(|f| {
                filter.iter().zip(&patterns).any(|(name, pattern)| {
                    name == f.filename() || pattern.as_ref().is_some_and(|p| p.matches(f.filename()))
                })
            })
            .collect();
        if files.is_empty() {
            return Err(AppRunnerError::Resolve(format!(
                "Filter {} did not match any input files",
                filter.join(", ")
            )));
        }
        Ok(Self { files })
    }
}

/// Include/exclude glob filter over relative storage paths.
///
/// An empty include list keeps everything; exclusion wins over inclusion.
pub struct PathFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| {
                    Pattern::new(p).map_err(|e| AppRunnerError::spec("patterns", format!("'{}': {}", p, e)))
                })
                .collect::<Result<Vec<_>>>()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| p.matches(path));
        included && !self.exclude.iter().any(|p| p.matches(path))
    }
}

fn resource_source(resource: &Resource, storage: &Storage) -> FileSource {
    FileSource::Ssh {
        ssh: SshSource {
            host: storage.host().to_string(),
            path: storage.absolute_path(resource.relative_path()).into(),
        },
    }
}

/// Resolves input specs against a LIMS client.
pub struct Resolver<'a> {
    client: &'a dyn LimsClient,
}

impl<'a> Resolver<'a> {
    pub fn new(client: &'a dyn LimsClient) -> Self {
        Self { client }
    }

    /// Resolves every spec, keeping declaration order.
    pub fn resolve(&self, specs: &[InputSpec]) -> Result<ResolvedInputs> {
        let resources = self.prefetch_resources(specs)?;
        let mut files = Vec::new();

        for spec in specs {
            debug!("Resolving {} input", spec.type_name());
            match spec {
                InputSpec::BfabricResource(spec) => {
                    let (resource, storage) = lookup(&resources, spec.id)?;
                    files.push(ResolvedInput::File(ResolvedFile {
                        filename: spec.filename.clone().unwrap_or_else(|| resource.filename()),
                        source: resource_source(resource, storage),
                        link: false,
                        checksum: checksum_if(spec.check_checksum, resource),
                    }));
                }
                InputSpec::BfabricResourceArchive(spec) => {
                    let (resource, storage) = lookup(&resources, spec.id)?;
                    files.push(ResolvedInput::Directory(ResolvedDirectory {
                        filename: spec.filename.clone(),
                        source: resource_source(resource, storage),
                        extract: spec.extract,
                        include_patterns: spec.include_patterns.clone(),
                        exclude_patterns: spec.exclude_patterns.clone(),
                        strip_root: spec.strip_root,
                        checksum: checksum_if(spec.check_checksum, resource),
                    }));
                }
                InputSpec::BfabricDataset(spec) => files.push(self.resolve_dataset(spec)?),
                InputSpec::BfabricResourceDataset(spec) => files.extend(self.resolve_resource_dataset(spec)?),
                InputSpec::BfabricAnnotation(spec) => files.push(self.resolve_annotation(spec)?),
                InputSpec::File(spec) => files.push(ResolvedInput::File(ResolvedFile {
                    filename: spec.resolved_filename(),
                    source: spec.source.clone(),
                    link: spec.link,
                    checksum: spec.checksum.clone(),
                })),
                InputSpec::StaticFile(spec) => files.push(ResolvedInput::StaticFile(ResolvedStaticFile {
                    filename: spec.filename.clone(),
                    content: StaticContent::Text(spec.content.clone()),
                })),
                InputSpec::StaticYaml(spec) => files.push(ResolvedInput::StaticFile(ResolvedStaticFile {
                    filename: spec.filename.clone(),
                    content: StaticContent::Text(serde_yaml::to_string(&spec.data)?),
                })),
            }
        }

        info!("Resolved {} input specs into {} files", specs.len(), files.len());
        ResolvedInputs::new(files)
    }

    /// Fetches the resources of all resource and archive specs, plus their
    /// storages, in two batched reads.
    fn prefetch_resources(&self, specs: &[InputSpec]) -> Result<HashMap<i64, (Resource, Storage)>> {
        let ids: Vec<i64> = specs
            .iter()
            .filter_map(|spec| match spec {
                InputSpec::BfabricResource(s) => Some(s.id),
                InputSpec::BfabricResourceArchive(s) => Some(s.id),
                _ => None,
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.resources_with_storage(&ids)
    }

    fn resources_with_storage(&self, ids: &[i64]) -> Result<HashMap<i64, (Resource, Storage)>> {
        let resources = Resource::find_all(ids, self.client)?;
        let storage_ids: Vec<i64> = resources
            .values()
            .filter_map(Resource::storage_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let storages = Storage::find_all(&storage_ids, self.client)?;

        resources
            .into_iter()
            .map(|(id, resource)| {
                let storage = resource
                    .storage_id()
                    .and_then(|sid| storages.get(&sid))
                    .cloned()
                    .ok_or_else(|| AppRunnerError::Resolve(format!("Storage of resource {} not found", id)))?;
                Ok((id, (resource, storage)))
            })
            .collect()
    }

    fn resolve_dataset(&self, spec: &BfabricDatasetSpec) -> Result<ResolvedInput> {
        let table = Dataset::find_required(spec.id, self.client)?.to_table()?;
        let content = match spec.format {
            DatasetFormat::Csv => StaticContent::Text(table.to_csv(&spec.separator)?),
            DatasetFormat::Parquet => StaticContent::Bytes(table.to_parquet()?),
        };
        Ok(ResolvedInput::StaticFile(ResolvedStaticFile {
            filename: spec.filename.clone(),
            content,
        }))
    }

    fn resolve_resource_dataset(&self, spec: &BfabricResourceDatasetSpec) -> Result<Vec<ResolvedInput>> {
        let table = Dataset::find_required(spec.id, self.client)?.to_table()?;
        let column = select_column(&table, &spec.column).ok_or_else(|| {
            AppRunnerError::Resolve(format!(
                "Column {:?} not found in dataset {} (columns: {})",
                spec.column,
                spec.id,
                table.columns().join(", ")
            ))
        })?;

        let row_ids = table
            .column_values(column)
            .into_iter()
            .map(|cell| {
                cell.trim().parse::<i64>().map_err(|_| {
                    AppRunnerError::Resolve(format!("'{}' in dataset {} is not a resource id", cell, spec.id))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let unique_ids: Vec<i64> = row_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let resources = self.resources_with_storage(&unique_ids)?;

        let filter = PathFilter::new(&spec.include_patterns, &spec.exclude_patterns)?;
        let mut kept_rows = Vec::new();
        let mut kept = Vec::new();
        for (row, id) in table.rows().iter().zip(&row_ids) {
            let (resource, storage) = lookup(&resources, *id)?;
            if filter.matches(resource.relative_path()) {
                kept_rows.push(row.clone());
                kept.push((resource, storage));
            }
        }
        debug!(
            "Dataset {}: {} of {} rows kept after filtering",
            spec.id,
            kept.len(),
            row_ids.len()
        );

        let mut manifest = Table::new(table.columns().to_vec(), kept_rows)?;
        let file_column = unique_column_name(&manifest, &spec.output_dataset_file_column)?;
        manifest.push_column(file_column, kept.iter().map(|(r, _)| r.filename()).collect())?;

        let mut files = vec![ResolvedInput::StaticFile(ResolvedStaticFile {
            filename: join_filename(&spec.filename, &spec.output_dataset_filename),
            content: StaticContent::Bytes(manifest.to_parquet()?),
        })];
        if !spec.output_dataset_only {
            files.extend(kept.into_iter().map(|(resource, storage)| {
                ResolvedInput::File(ResolvedFile {
                    filename: join_filename(&spec.filename, &resource.filename()),
                    source: resource_source(resource, storage),
                    link: false,
                    checksum: checksum_if(spec.check_checksum, resource),
                })
            }));
        }
        Ok(files)
    }

    fn resolve_annotation(&self, spec: &BfabricAnnotationSpec) -> Result<ResolvedInput> {
        let resources = Resource::find_all(&spec.resource_ids, self.client)?;
        if let Some(missing) = spec.resource_ids.iter().find(|id| !resources.contains_key(id)) {
            return Err(AppRunnerError::Resolve(format!("Resource {} not found", missing)));
        }
        let sample_ids: Vec<i64> = resources
            .values()
            .filter_map(Resource::sample_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let samples = Sample::find_all(&sample_ids, self.client)?;

        let ordered: Vec<&Resource> = spec.resource_ids.iter().filter_map(|id| resources.get(id)).collect();
        let resource_rows: Vec<BTreeMap<String, String>> =
            ordered.iter().map(|r| flatten_relations(r.data(), "resource_")).collect();
        let sample_rows: Vec<Option<BTreeMap<String, String>>> = ordered
            .iter()
            .map(|r| {
                r.sample_id()
                    .and_then(|id| samples.get(&id))
                    .map(|s| flatten_relations(s.data(), "sample_"))
            })
            .collect();

        let resource_columns = union_keys(resource_rows.iter());
        let sample_columns = union_keys(sample_rows.iter().flatten());
        let columns: Vec<String> = resource_columns.iter().chain(&sample_columns).cloned().collect();
        let rows = resource_rows
            .iter()
            .zip(&sample_rows)
            .map(|(resource, sample)| {
                let mut row: Vec<String> = resource_columns
                    .iter()
                    .map(|c| resource.get(c).cloned().unwrap_or_default())
                    .collect();
                row.extend(sample_columns.iter().map(|c| {
                    sample
                        .as_ref()
                        .and_then(|s| s.get(c).cloned())
                        .unwrap_or_default()
                }));
                row
            })
            .collect();

        let table = Table::new(columns, rows)?;
        Ok(ResolvedInput::StaticFile(ResolvedStaticFile {
            filename: spec.filename.clone(),
            content: StaticContent::Text(table.to_csv(&spec.separator)?),
        }))
    }
}

fn lookup(resources: &HashMap<i64, (Resource, Storage)>, id: i64) -> Result<(&Resource, &Storage)> {
    resources
        .get(&id)
        .map(|(r, s)| (r, s))
        .ok_or_else(|| AppRunnerError::Resolve(format!("Resource {} not found", id)))
}

fn checksum_if(check: bool, resource: &Resource) -> Option<String> {
    if check {
        resource.checksum().map(str::to_string)
    } else {
        None
    }
}

fn join_filename(directory: &str, name: &str) -> String {
    if directory == "." {
        name.to_string()
    } else {
        format!("{}/{}", directory.trim_end_matches('/'), name)
    }
}

fn select_column(table: &Table, column: &ColumnRef) -> Option<usize> {
    match column {
        ColumnRef::Index(index) => (*index < table.columns().len()).then_some(*index),
        ColumnRef::Name(name) => table.column_index_ignore_case(name),
    }
}

fn unique_column_name(table: &Table, name: &str) -> Result<String> {
    if table.column_index(name).is_none() {
        return Ok(name.to_string());
    }
    (1..10)
        .map(|i| format!("{}.{}", name, i))
        .find(|candidate| table.column_index(candidate).is_none())
        .ok_or_else(|| AppRunnerError::Resolve("Could not determine unique output file column name.".to_string()))
}

/// Flattens one entity into prefixed string columns; `{"id": n}` relations
/// become `<prefix><key>_id`.
fn flatten_relations(data: &Value, prefix: &str) -> BTreeMap<String, String> {
    let mut row = BTreeMap::new();
    if let Some(object) = data.as_object() {
        for (key, value) in object {
            match value {
                Value::Object(relation) if relation.contains_key("id") => {
                    let id = relation.get("id").map(scalar_to_string).unwrap_or_default();
                    row.insert(format!("{}{}_id", prefix, key), id);
                }
                Value::Object(_) | Value::Array(_) => {
                    row.insert(format!("{}{}", prefix, key), value.to_string());
                }
                scalar => {
                    row.insert(format!("{}{}", prefix, key), scalar_to_string(scalar));
                }
            }
        }
    }
    row
}

fn union_keys<'r>(rows: impl Iterator<Item = &'r BTreeMap<String, String>>) -> Vec<String> {
    rows.flat_map(|row| row.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lims::MockClient;
    use crate::specs::inputs::InputsSpec;
    use serde_json::json;

    fn seeded_client() -> MockClient {
        let mock = MockClient::new();
        mock.insert("storage", json!({"id": 2, "host": "fgcz-s-022", "basepath": "/srv/data/"}));
        mock.insert(
            "resource",
            json!({"id": 10, "relativepath": "/p1/a.raw", "filechecksum": "abc", "storage": {"id": 2}, "sample": {"id": 5}}),
        );
        mock.insert(
            "resource",
            json!({"id": 11, "relativepath": "/p1/b.mzML", "filechecksum": "def", "storage": {"id": 2}}),
        );
        mock.insert(
            "resource",
            json!({"id": 12, "relativepath": "/p1/archive.zip", "filechecksum": "zzz", "storage": {"id": 2}}),
        );
        mock.insert("sample", json!({"id": 5, "name": "S1", "groupingvar": {"id": 3}}));
        mock.insert(
            "dataset",
            json!({
                "id": 50,
                "attribute": [
                    {"name": "Resource", "position": 1},
                    {"name": "Name", "position": 2}
                ],
                "item": [
                    {"position": 1, "field": [{"attributeposition": 1, "value": "10"}, {"attributeposition": 2, "value": "first"}]},
                    {"position": 2, "field": [{"attributeposition": 1, "value": "11"}, {"attributeposition": 2, "value": "second"}]}
                ]
            }),
        );
        mock
    }

    fn specs(yaml: &str) -> Vec<InputSpec> {
        serde_yaml::from_str::<InputsSpec>(yaml).unwrap().inputs
    }

    #[test]
    fn test_resource_resolution() {
        let mock = seeded_client();
        let resolved = Resolver::new(&mock)
            .resolve(&specs("inputs:\n  - type: bfabric_resource\n    id: 10\n  - type: bfabric_resource\n    id: 11\n    filename: renamed.mzML\n    check_checksum: false\n"))
            .unwrap();

        let ResolvedInput::File(first) = &resolved.files()[0] else {
            panic!("expected file");
        };
        assert_eq!(first.filename, "a.raw");
        assert_eq!(first.checksum.as_deref(), Some("abc"));
        assert_eq!(first.source.transfer_uri(None), "fgcz-s-022:/srv/data/p1/a.raw");

        let ResolvedInput::File(second) = &resolved.files()[1] else {
            panic!("expected file");
        };
        assert_eq!(second.filename, "renamed.mzML");
        assert!(second.checksum.is_none());
    }

    #[test]
    fn test_missing_resource() {
        let mock = seeded_client();
        let err = Resolver::new(&mock)
            .resolve(&specs("inputs:\n  - type: bfabric_resource\n    id: 99\n"))
            .unwrap_err();
        assert_eq!(err.kind(), "ResolveError");
    }

    #[test]
    fn test_duplicate_filenames_rejected() {
        let mock = seeded_client();
        let err = Resolver::new(&mock)
            .resolve(&specs(
                "inputs:\n  - type: static_file\n    content: a\n    filename: data.csv\n  - type: bfabric_dataset\n    id: 50\n    filename: data.csv\n",
            ))
            .unwrap_err();
        assert_eq!(err.kind(), "ResolveError");
        assert!(err.to_string().contains("Duplicate filenames in resolved inputs: data.csv"));
    }

    #[test]
    fn test_dot_and_directory_conflicts() {
        let static_file = |name: &str| {
            ResolvedInput::StaticFile(ResolvedStaticFile {
                filename: name.to_string(),
                content: StaticContent::Text(String::new()),
            })
        };
        let directory = ResolvedInput::Directory(ResolvedDirectory {
            filename: "archive".to_string(),
            source: FileSource::Local {
                local: "/x.zip".into(),
            },
            extract: ArchiveFormat::Zip,
            include_patterns: vec![],
            exclude_patterns: vec![],
            strip_root: false,
            checksum: None,
        });

        let err = ResolvedInputs::new(vec![static_file("."), static_file("a")]).unwrap_err();
        assert!(err.to_string().contains("'.' cannot coexist"));

        let err = ResolvedInputs::new(vec![directory.clone(), static_file("archive/inner.txt")]).unwrap_err();
        assert!(err.to_string().contains("conflicts with directory 'archive'"));

        assert!(ResolvedInputs::new(vec![directory, static_file("archive_other.txt")]).is_ok());
    }

    #[test]
    fn test_apply_filter() {
        let mock = seeded_client();
        let resolved = Resolver::new(&mock)
            .resolve(&specs(
                "inputs:\n  - type: static_file\n    content: a\n    filename: a.txt\n  - type: static_file\n    content: b\n    filename: b.txt\n",
            ))
            .unwrap();

        let filtered = resolved.clone().apply_filter(&["b.txt".to_string()]).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.files()[0].filename(), "b.txt");
        assert_eq!(resolved.clone().apply_filter(&["*.txt".to_string()]).unwrap().len(), 2);

        let err = resolved.apply_filter(&["nope".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Filter nope did not match any input files"));
    }

    #[test]
    fn test_dataset_csv() {
        let mock = seeded_client();
        let resolved = Resolver::new(&mock)
            .resolve(&specs("inputs:\n  - type: bfabric_dataset\n    id: 50\n    filename: dataset.tsv\n    separator: \"\\t\"\n"))
            .unwrap();
        let ResolvedInput::StaticFile(file) = &resolved.files()[0] else {
            panic!("expected static file");
        };
        assert_eq!(
            file.content,
            StaticContent::Text("Resource\tName\n10\tfirst\n11\tsecond\n".to_string())
        );
    }

    #[test]
    fn test_resource_dataset_with_exclude() {
        let mock = seeded_client();
        let resolved = Resolver::new(&mock)
            .resolve(&specs(
                "inputs:\n  - type: bfabric_resource_dataset\n    id: 50\n    filename: raw\n    column: resource\n    exclude_patterns: [\"*.mzML\"]\n",
            ))
            .unwrap();

        let names: Vec<&str> = resolved.iter().map(ResolvedInput::filename).collect();
        assert_eq!(names, vec!["raw/dataset.parquet", "raw/a.raw"]);

        let ResolvedInput::StaticFile(manifest) = &resolved.files()[0] else {
            panic!("expected manifest");
        };
        assert_eq!(&manifest.content.as_bytes()[..4], b"PAR1");
    }

    #[test]
    fn test_resource_dataset_manifest_only() {
        let mock = seeded_client();
        let resolved = Resolver::new(&mock)
            .resolve(&specs(
                "inputs:\n  - type: bfabric_resource_dataset\n    id: 50\n    filename: raw\n    column: 0\n    output_dataset_only: true\n",
            ))
            .unwrap();
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn test_unique_column_name() {
        let table = Table::new(vec!["File".to_string(), "File.1".to_string()], vec![]).unwrap();
        assert_eq!(unique_column_name(&table, "File").unwrap(), "File.2");
        assert_eq!(unique_column_name(&table, "Other").unwrap(), "Other");
    }

    #[test]
    fn test_annotation_resource_sample() {
        let mock = seeded_client();
        let resolved = Resolver::new(&mock)
            .resolve(&specs(
                "inputs:\n  - type: bfabric_annotation\n    annotation: resource_sample\n    resource_ids: [10, 11]\n    filename: annotation.csv\n",
            ))
            .unwrap();
        let ResolvedInput::StaticFile(file) = &resolved.files()[0] else {
            panic!("expected static file");
        };
        let StaticContent::Text(text) = &file.content else {
            panic!("expected text");
        };
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "resource_filechecksum,resource_id,resource_relativepath,resource_sample_id,resource_storage_id,sample_groupingvar_id,sample_id,sample_name"
        );
        assert_eq!(lines.next().unwrap(), "abc,10,/p1/a.raw,5,2,3,5,S1");
        assert_eq!(lines.next().unwrap(), "def,11,/p1/b.mzML,,2,,,");
    }

    #[test]
    fn test_path_filter() {
        let filter = PathFilter::new(&["*.raw".to_string()], &["*/skip_*".to_string()]).unwrap();
        assert!(filter.matches("/p1/a.raw"));
        assert!(!filter.matches("/p1/skip_a.raw"));
        assert!(!filter.matches("/p1/a.txt"));
    }
}
