//! Input Materialisation
//!
//! Writes resolved inputs into a target folder.
//!
//! # Copy Strategy
//!
//! 1. `rsync -Pav` (local or `[user@]host:path` source)
//! 2. Local source: plain filesystem copy
//! 3. SSH source: `scp`, creating the target directory first
//!
//! A failing strategy falls through to the next one. Static files are only
//! rewritten when their content changes, so their mtime stays stable.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::resolve::{ResolvedDirectory, ResolvedFile, ResolvedInput, ResolvedInputs, ResolvedStaticFile, PathFilter, Resolver};
use crate::error::{AppRunnerError, IoContext, Result};
use crate::lims::LimsClient;
use crate::specs::inputs::FileSource;
use crate::specs::parser::load_inputs_spec;
use crate::util::checksum::md5sum;
use crate::util::paths::{absolutize, expand_user, normalize, relative_to};
use crate::util::process::try_run_captured;
use crate::util::scp::scp;

/// Materialises one resolved input below `working_dir`.
pub fn prepare_input(input: &ResolvedInput, working_dir: &Path, ssh_user: Option<&str>) -> Result<()> {
    match input {
        ResolvedInput::File(file) => prepare_resolved_file(file, working_dir, ssh_user),
        ResolvedInput::StaticFile(file) => prepare_static_file(file, working_dir),
        ResolvedInput::Directory(directory) => prepare_directory(directory, working_dir, ssh_user),
    }
}

/// Materialises every input in declaration order.
pub fn prepare_inputs(inputs: &ResolvedInputs, working_dir: &Path, ssh_user: Option<&str>) -> Result<()> {
    for input in inputs.iter() {
        prepare_input(input, working_dir, ssh_user)?;
    }
    info!("Prepared {} inputs in {}", inputs.len(), working_dir.display());
    Ok(())
}

/// Removes every materialised input that exists. Archives lose their
/// extracted files and the cached `.zip`.
pub fn clean_inputs(inputs: &ResolvedInputs, working_dir: &Path) -> Result<()> {
    for input in inputs.iter() {
        match input {
            ResolvedInput::Directory(directory) => clean_directory(directory, working_dir)?,
            _ => remove_if_exists(&working_dir.join(input.filename()))?,
        }
    }
    Ok(())
}

/// Removes what `prepare_directory` extracted.
///
/// A subfolder target belongs to the archive alone and is removed as a
/// whole. When the target is the working directory itself, only the
/// entries listed in the cached archive are removed.
fn clean_directory(directory: &ResolvedDirectory, working_dir: &Path) -> Result<()> {
    let output_dir = normalize(&working_dir.join(&directory.filename));
    let archive_path = archive_cache_path(working_dir, &directory.filename);

    if !extracts_in_place(working_dir, &output_dir) {
        if output_dir.is_dir() {
            fs::remove_dir_all(&output_dir).with_path(&output_dir)?;
            info!("Removed {}", output_dir.display());
        }
    } else if archive_path.is_file() {
        let filter = PathFilter::new(&directory.include_patterns, &directory.exclude_patterns)?;
        for (_, target) in archive_targets(&archive_path, &output_dir, &filter, directory.strip_root)? {
            remove_if_exists(&target)?;
            remove_empty_parents(&target, &output_dir);
        }
    } else {
        warn!(
            "Cached archive {} is missing, cannot tell which files to remove from {}",
            archive_path.display(),
            output_dir.display()
        );
    }
    remove_if_exists(&archive_path)
}

fn remove_empty_parents(path: &Path, stop: &Path) {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) || fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    if path.symlink_metadata().is_ok() {
        fs::remove_file(path).with_path(path)?;
        info!("Removed {}", path.display());
    }
    Ok(())
}

/// Resolves `inputs_yaml` and returns the inputs together with the target
/// folder, which defaults to the folder containing the spec.
fn resolve_folder(
    inputs_yaml: &Path,
    target_folder: Option<&Path>,
    client: &dyn LimsClient,
    filter: Option<&[String]>,
) -> Result<(ResolvedInputs, PathBuf)> {
    let inputs_yaml = absolutize(&expand_user(inputs_yaml));
    let target_folder = match target_folder {
        Some(folder) => absolutize(&expand_user(folder)),
        None => inputs_yaml
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let spec = load_inputs_spec(&inputs_yaml)?;
    let mut inputs = Resolver::new(client).resolve(&spec.inputs)?;
    if let Some(filter) = filter {
        inputs = inputs.apply_filter(filter)?;
    }
    Ok((inputs, target_folder))
}

/// Prepares the inputs of a chunk folder.
///
/// # Arguments
///
/// * `inputs_yaml` - Path to the `inputs.yml` document
/// * `target_folder` - Where to place the files, defaults to the spec's folder
/// * `client` - LIMS client for resolving entity-backed inputs
/// * `ssh_user` - User for remote transfers, if different from the current one
/// * `filter` - Only prepare inputs whose filename matches
pub fn prepare_folder(
    inputs_yaml: &Path,
    target_folder: Option<&Path>,
    client: &dyn LimsClient,
    ssh_user: Option<&str>,
    filter: Option<&[String]>,
) -> Result<()> {
    let (inputs, target_folder) = resolve_folder(inputs_yaml, target_folder, client, filter)?;
    prepare_inputs(&inputs, &target_folder, ssh_user)
}

/// Removes the inputs of a chunk folder that `prepare_folder` would write.
pub fn clean_folder(
    inputs_yaml: &Path,
    target_folder: Option<&Path>,
    client: &dyn LimsClient,
    filter: Option<&[String]>,
) -> Result<()> {
    let (inputs, target_folder) = resolve_folder(inputs_yaml, target_folder, client, filter)?;
    clean_inputs(&inputs, &target_folder)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    Ok(())
}

pub fn prepare_resolved_file(file: &ResolvedFile, working_dir: &Path, ssh_user: Option<&str>) -> Result<()> {
    let output_path = working_dir.join(&file.filename);
    ensure_parent(&output_path)?;

    if file.link {
        return link_symbolic(&file.source, &output_path);
    }

    if let Some(expected) = &file.checksum {
        if output_path.is_file() && md5sum(&output_path)? == *expected {
            debug!("Skipping {}: already present with correct checksum", output_path.display());
            return Ok(());
        }
    }

    copy_file(&file.source, &output_path, ssh_user)?;
    verify_checksum(&output_path, file.checksum.as_deref())
}

fn verify_checksum(path: &Path, expected: Option<&str>) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let actual = md5sum(path)?;
    if actual != expected {
        return Err(AppRunnerError::materialise(
            path,
            format!("checksum mismatch: expected {}, got {}", expected, actual),
        ));
    }
    Ok(())
}

fn copy_file(source: &FileSource, output_path: &Path, ssh_user: Option<&str>) -> Result<()> {
    let target = output_path.display().to_string();
    let rsync_source = match source {
        FileSource::Local { local } => absolutize(&expand_user(local)).display().to_string(),
        FileSource::Ssh { .. } => source.transfer_uri(ssh_user),
    };
    if try_run_captured(&["rsync".to_string(), "-Pav".to_string(), rsync_source, target.clone()]) {
        return Ok(());
    }
    warn!("rsync failed for {}, falling back", target);

    let fallback = match source {
        FileSource::Local { local } => {
            let local = absolutize(&expand_user(local));
            info!("cp {} {}", local.display(), target);
            fs::copy(&local, output_path).map(|_| ()).map_err(|e| e.to_string())
        }
        FileSource::Ssh { .. } => {
            scp(&source.transfer_uri(None), &target, ssh_user, true).map_err(|e| e.to_string())
        }
    };
    fallback.map_err(|reason| {
        AppRunnerError::materialise(
            output_path,
            format!("all copy strategies failed for {} ({})", source.transfer_uri(ssh_user), reason),
        )
    })
}

/// Creates a symlink to a local source, relative to the link's folder.
///
/// An existing link to the same file is kept; any other existing link is
/// replaced. A regular file in the way is an error.
fn link_symbolic(source: &FileSource, output_path: &Path) -> Result<()> {
    let FileSource::Local { local } = source else {
        return Err(AppRunnerError::materialise(output_path, "Cannot link to a remote file."));
    };
    let source_path = fs::canonicalize(expand_user(local))
        .map_err(|e| AppRunnerError::materialise(local, format!("link source not accessible: {}", e)))?;
    let parent = output_path.parent().unwrap_or_else(|| Path::new("."));
    let link_dir = fs::canonicalize(parent).with_path(parent)?;
    let link_target = relative_to(&source_path, &link_dir);

    match output_path.symlink_metadata() {
        Ok(meta) if meta.file_type().is_symlink() => {
            if fs::canonicalize(output_path).ok().as_deref() == Some(source_path.as_path()) {
                info!("Link already exists and points to the correct file");
                return Ok(());
            }
            info!("rm {}", output_path.display());
            fs::remove_file(output_path).with_path(output_path)?;
        }
        Ok(_) => {
            return Err(AppRunnerError::materialise(
                output_path,
                "output path already exists and is not a symlink",
            ));
        }
        Err(_) => {}
    }

    info!("ln -s {} {}", link_target.display(), output_path.display());
    std::os::unix::fs::symlink(&link_target, output_path).with_path(output_path)
}

/// Writes a static file unless it already holds the same content.
pub fn prepare_static_file(file: &ResolvedStaticFile, working_dir: &Path) -> Result<()> {
    let path = working_dir.join(&file.filename);
    ensure_parent(&path)?;
    let content = file.content.as_bytes();

    if path.exists() {
        if !path.is_file() {
            return Err(AppRunnerError::materialise(&path, "path exists but is not a file"));
        }
        if fs::read(&path).with_path(&path)? == content {
            debug!("Skipping {} as it already has the same content", path.display());
            return Ok(());
        }
    }

    let staging = partial_path(&path);
    fs::write(&staging, content).with_path(&staging)?;
    fs::rename(&staging, &path).with_path(&path)?;
    info!("Written to {}", path.display());
    Ok(())
}

/// Sibling a file is written to before it is renamed into place.
fn partial_path(path: &Path) -> PathBuf {
    path.with_file_name(format!(
        ".{}.partial",
        path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    ))
}

fn archive_cache_path(working_dir: &Path, filename: &str) -> PathBuf {
    working_dir.join(format!("{}.zip", filename))
}

/// Whether an archive is extracted straight into the working directory.
fn extracts_in_place(working_dir: &Path, output_dir: &Path) -> bool {
    output_dir == normalize(working_dir)
}

/// Downloads an archive next to its target directory and extracts it.
///
/// The `<filename>.zip` download is kept as a cache; a cached archive with
/// the expected checksum is not downloaded again. Entries whose content is
/// unchanged are left alone, the rest are written to a `.partial` sibling
/// and renamed into place. Files of an earlier extraction that the archive
/// no longer contains are removed, unless the target is the working
/// directory itself.
pub fn prepare_directory(directory: &ResolvedDirectory, working_dir: &Path, ssh_user: Option<&str>) -> Result<()> {
    let archive_name = format!("{}.zip", directory.filename);
    prepare_resolved_file(
        &ResolvedFile {
            filename: archive_name.clone(),
            source: directory.source.clone(),
            link: false,
            checksum: directory.checksum.clone(),
        },
        working_dir,
        ssh_user,
    )?;

    let output_dir = normalize(&working_dir.join(&directory.filename));
    fs::create_dir_all(&output_dir).with_path(&output_dir)?;

    let filter = PathFilter::new(&directory.include_patterns, &directory.exclude_patterns)?;
    let extracted = extract_zip(&working_dir.join(archive_name), &output_dir, &filter, directory.strip_root)?;
    if !extracts_in_place(working_dir, &output_dir) {
        let removed = prune_stale(&output_dir, &extracted)?;
        if removed > 0 {
            info!("Removed {} stale files from {}", removed, output_dir.display());
        }
    }
    Ok(())
}

fn zip_error(path: &Path, error: zip::result::ZipError) -> AppRunnerError {
    AppRunnerError::materialise(path, format!("invalid zip archive: {}", error))
}

/// The single top-level directory shared by every entry, if there is one.
fn common_root(names: &[PathBuf]) -> Option<PathBuf> {
    let first = names.first()?.components().next()?;
    let shared = names
        .iter()
        .all(|name| name.components().count() > 1 && name.components().next() == Some(first));
    shared.then(|| PathBuf::from(first.as_os_str()))
}

/// Entry index and target path of every file entry that passes `filter`.
fn archive_targets(
    archive_path: &Path,
    output_dir: &Path,
    filter: &PathFilter,
    strip_root: bool,
) -> Result<Vec<(usize, PathBuf)>> {
    let file = File::open(archive_path).with_path(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| zip_error(archive_path, e))?;

    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let entry = archive.by_index(index).map_err(|e| zip_error(archive_path, e))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.enclosed_name().map(Path::to_path_buf).ok_or_else(|| {
            AppRunnerError::materialise(archive_path, format!("unsafe entry name '{}'", entry.name()))
        })?;
        entries.push((index, name));
    }

    let names: Vec<PathBuf> = entries.iter().map(|(_, name)| name.clone()).collect();
    let root = if strip_root { common_root(&names) } else { None };
    if let Some(root) = &root {
        debug!("Stripping archive root {}", root.display());
    }

    Ok(entries
        .into_iter()
        .filter(|(_, name)| filter.matches(&name.to_string_lossy()))
        .map(|(index, name)| {
            let relative = match &root {
                Some(root) => name.strip_prefix(root).map(Path::to_path_buf).unwrap_or(name),
                None => name,
            };
            (index, output_dir.join(relative))
        })
        .collect())
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Whether the regular file at `path` holds exactly the bytes of `reader`.
fn same_content(reader: &mut impl Read, size: u64, path: &Path) -> io::Result<bool> {
    match path.symlink_metadata() {
        Ok(meta) if meta.is_file() && meta.len() == size => {}
        _ => return Ok(false),
    }
    let mut file = File::open(path)?;
    let mut expected = [0u8; 8192];
    let mut actual = [0u8; 8192];
    loop {
        let n = read_full(reader, &mut expected)?;
        let m = read_full(&mut file, &mut actual)?;
        if expected[..n] != actual[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

/// Extracts the selected entries and returns their target paths.
fn extract_zip(
    archive_path: &Path,
    output_dir: &Path,
    filter: &PathFilter,
    strip_root: bool,
) -> Result<BTreeSet<PathBuf>> {
    let targets = archive_targets(archive_path, output_dir, filter, strip_root)?;
    let file = File::open(archive_path).with_path(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| zip_error(archive_path, e))?;

    let mut written = 0;
    for (index, target) in &targets {
        ensure_parent(target)?;

        let mut entry = archive.by_index(*index).map_err(|e| zip_error(archive_path, e))?;
        let size = entry.size();
        if same_content(&mut entry, size, target).with_path(target)? {
            continue;
        }
        drop(entry);

        let mut entry = archive.by_index(*index).map_err(|e| zip_error(archive_path, e))?;
        let staging = partial_path(target);
        let mut out = File::create(&staging).with_path(&staging)?;
        io::copy(&mut entry, &mut out).with_path(&staging)?;
        fs::rename(&staging, target).with_path(target)?;
        written += 1;
    }

    info!(
        "Extracted {} files to {} ({} unchanged)",
        written,
        output_dir.display(),
        targets.len() - written
    );
    Ok(targets.into_iter().map(|(_, target)| target).collect())
}

/// Removes files below `dir` that are not in `keep`.
fn prune_stale(dir: &Path, keep: &BTreeSet<PathBuf>) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir).with_path(dir)? {
        let path = entry.with_path(dir)?.path();
        if path.symlink_metadata().with_path(&path)?.is_dir() {
            removed += prune_stale(&path, keep)?;
        } else if !keep.contains(&path) {
            fs::remove_file(&path).with_path(&path)?;
            debug!("Removed stale {}", path.display());
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::resolve::StaticContent;
    use crate::lims::MockClient;
    use crate::specs::inputs::ArchiveFormat;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, content) in entries {
            writer
                .start_file(*name, zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn directory(source: &Path, strip_root: bool, exclude: &[&str]) -> ResolvedDirectory {
        ResolvedDirectory {
            filename: "extracted".to_string(),
            source: FileSource::Local {
                local: source.to_path_buf(),
            },
            extract: ArchiveFormat::Zip,
            include_patterns: Vec::new(),
            exclude_patterns: exclude.iter().map(|s| s.to_string()).collect(),
            strip_root,
            checksum: None,
        }
    }

    #[test]
    fn test_extract_strip_root_and_exclude() {
        let src = tempdir().unwrap();
        let work = tempdir().unwrap();
        let archive = src.path().join("data.zip");
        write_zip(
            &archive,
            &[("root/a.txt", "a"), ("root/b.log", "b"), ("root/sub/c.txt", "c")],
        );

        prepare_directory(&directory(&archive, true, &["*.log"]), work.path(), None).unwrap();

        let out = work.path().join("extracted");
        assert_eq!(fs::read_to_string(out.join("a.txt")).unwrap(), "a");
        assert_eq!(fs::read_to_string(out.join("sub/c.txt")).unwrap(), "c");
        assert!(!out.join("b.log").exists());
        assert!(!out.join("root").exists());
        assert!(work.path().join("extracted.zip").exists());
    }

    #[test]
    fn test_extract_keeps_multiple_roots() {
        let src = tempdir().unwrap();
        let work = tempdir().unwrap();
        let archive = src.path().join("data.zip");
        write_zip(&archive, &[("root/a.txt", "a"), ("other/b.txt", "b")]);

        prepare_directory(&directory(&archive, true, &[]), work.path(), None).unwrap();

        let out = work.path().join("extracted");
        assert!(out.join("root/a.txt").exists());
        assert!(out.join("other/b.txt").exists());
    }

    fn archive_input(source: &Path, filename: &str) -> ResolvedInput {
        ResolvedInput::Directory(ResolvedDirectory {
            filename: filename.to_string(),
            ..directory(source, false, &[])
        })
    }

    fn partial_files(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().ends_with(".partial"))
            .collect()
    }

    #[test]
    fn test_archive_into_working_dir_keeps_other_files() {
        let src = tempdir().unwrap();
        let work = tempdir().unwrap();
        let archive = src.path().join("data.zip");
        write_zip(&archive, &[("a.txt", "a"), ("sub/c.txt", "c")]);
        fs::write(work.path().join("inputs.yml"), "inputs: []\n").unwrap();
        fs::write(work.path().join("user_result.txt"), "keep").unwrap();

        let inputs = ResolvedInputs::new(vec![archive_input(&archive, ".")]).unwrap();
        prepare_inputs(&inputs, work.path(), None).unwrap();
        assert_eq!(fs::read_to_string(work.path().join("a.txt")).unwrap(), "a");
        assert_eq!(fs::read_to_string(work.path().join("sub/c.txt")).unwrap(), "c");
        assert!(work.path().join("inputs.yml").exists());
        assert!(work.path().join("user_result.txt").exists());

        // a second run must not touch unrelated files either
        prepare_inputs(&inputs, work.path(), None).unwrap();
        assert!(work.path().join("user_result.txt").exists());

        clean_inputs(&inputs, work.path()).unwrap();
        assert!(!work.path().join("a.txt").exists());
        assert!(!work.path().join("sub").exists());
        assert!(!work.path().join("..zip").exists());
        assert_eq!(fs::read_to_string(work.path().join("user_result.txt")).unwrap(), "keep");
        assert!(work.path().join("inputs.yml").exists());
    }

    #[test]
    fn test_reextract_skips_unchanged_and_drops_stale() {
        let src = tempdir().unwrap();
        let work = tempdir().unwrap();
        let archive = src.path().join("data.zip");
        write_zip(&archive, &[("a.txt", "a"), ("b.txt", "b")]);
        let input = directory(&archive, false, &[]);

        prepare_directory(&input, work.path(), None).unwrap();
        let out = work.path().join("extracted");
        let first = fs::metadata(out.join("a.txt")).unwrap().modified().unwrap();

        std::thread::sleep(Duration::from_millis(20));
        write_zip(&archive, &[("a.txt", "a"), ("c.txt", "cc")]);
        prepare_directory(&input, work.path(), None).unwrap();

        assert_eq!(fs::metadata(out.join("a.txt")).unwrap().modified().unwrap(), first);
        assert!(!out.join("b.txt").exists());
        assert_eq!(fs::read_to_string(out.join("c.txt")).unwrap(), "cc");
        assert!(partial_files(&out).is_empty());
    }

    #[test]
    fn test_prepare_then_clean_removes_only_inputs() {
        let src = tempdir().unwrap();
        let work = tempdir().unwrap();
        let archive = src.path().join("data.zip");
        write_zip(&archive, &[("root/a.txt", "a")]);
        let copied = src.path().join("copied.txt");
        fs::write(&copied, "copy me").unwrap();
        let linked = src.path().join("linked.txt");
        fs::write(&linked, "link me").unwrap();
        fs::write(work.path().join("user_result.txt"), "keep").unwrap();

        let inputs = ResolvedInputs::new(vec![
            archive_input(&archive, "extracted"),
            ResolvedInput::File(ResolvedFile {
                filename: "copied.txt".to_string(),
                source: FileSource::Local { local: copied.clone() },
                link: false,
                checksum: None,
            }),
            ResolvedInput::File(ResolvedFile {
                filename: "linked.txt".to_string(),
                source: FileSource::Local { local: linked.clone() },
                link: true,
                checksum: None,
            }),
        ])
        .unwrap();

        prepare_inputs(&inputs, work.path(), None).unwrap();
        assert!(work.path().join("extracted/root/a.txt").exists());
        assert!(work.path().join("extracted.zip").exists());
        assert_eq!(fs::read_to_string(work.path().join("copied.txt")).unwrap(), "copy me");
        assert_eq!(fs::read_to_string(work.path().join("linked.txt")).unwrap(), "link me");

        clean_inputs(&inputs, work.path()).unwrap();
        let mut left: Vec<String> = fs::read_dir(work.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["user_result.txt"]);
        assert!(copied.exists());
        assert!(linked.exists());
    }

    #[test]
    fn test_common_root() {
        let names = |v: &[&str]| v.iter().map(PathBuf::from).collect::<Vec<_>>();
        assert_eq!(common_root(&names(&["p/a", "p/b/c"])), Some(PathBuf::from("p")));
        assert_eq!(common_root(&names(&["p/a", "q/b"])), None);
        assert_eq!(common_root(&names(&["p/a", "top.txt"])), None);
        assert_eq!(common_root(&[]), None);
    }

    #[test]
    fn test_static_file_keeps_mtime_when_identical() {
        let work = tempdir().unwrap();
        let file = ResolvedStaticFile {
            filename: "nested/config.txt".to_string(),
            content: StaticContent::Text("hello".to_string()),
        };

        prepare_static_file(&file, work.path()).unwrap();
        let path = work.path().join("nested/config.txt");
        let first = fs::metadata(&path).unwrap().modified().unwrap();

        std::thread::sleep(Duration::from_millis(20));
        prepare_static_file(&file, work.path()).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), first);

        let changed = ResolvedStaticFile {
            content: StaticContent::Text("bye".to_string()),
            ..file
        };
        prepare_static_file(&changed, work.path()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "bye");
    }

    #[test]
    fn test_local_copy_with_checksum() {
        let src = tempdir().unwrap();
        let work = tempdir().unwrap();
        let source = src.path().join("in.txt");
        fs::write(&source, "hello\n").unwrap();

        let mut file = ResolvedFile {
            filename: "out/in.txt".to_string(),
            source: FileSource::Local { local: source },
            link: false,
            checksum: Some("b1946ac92492d2347c6235b4d2611184".to_string()),
        };
        prepare_resolved_file(&file, work.path(), None).unwrap();
        assert_eq!(fs::read_to_string(work.path().join("out/in.txt")).unwrap(), "hello\n");

        fs::remove_file(work.path().join("out/in.txt")).unwrap();
        file.checksum = Some("0".repeat(32));
        let err = prepare_resolved_file(&file, work.path(), None).unwrap_err();
        assert_eq!(err.kind(), "MaterialiseFailed");
    }

    #[test]
    fn test_missing_local_source_fails() {
        let work = tempdir().unwrap();
        let file = ResolvedFile {
            filename: "x.txt".to_string(),
            source: FileSource::Local {
                local: work.path().join("does-not-exist"),
            },
            link: false,
            checksum: None,
        };
        let err = prepare_resolved_file(&file, work.path(), None).unwrap_err();
        assert_eq!(err.kind(), "MaterialiseFailed");
    }

    #[test]
    fn test_symlink_is_relative_and_idempotent() {
        let root = tempdir().unwrap();
        let source = root.path().join("data/in.txt");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, "x").unwrap();
        let work = root.path().join("work");
        fs::create_dir_all(&work).unwrap();

        let file = ResolvedFile {
            filename: "in.txt".to_string(),
            source: FileSource::Local { local: source },
            link: true,
            checksum: None,
        };
        prepare_resolved_file(&file, &work, None).unwrap();
        let link = work.join("in.txt");
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("../data/in.txt"));

        prepare_resolved_file(&file, &work, None).unwrap();
        assert_eq!(fs::read_to_string(&link).unwrap(), "x");

        fs::remove_file(&link).unwrap();
        fs::write(&link, "regular").unwrap();
        assert!(prepare_resolved_file(&file, &work, None).is_err());
    }

    #[test]
    fn test_link_to_remote_rejected() {
        let work = tempdir().unwrap();
        let file = ResolvedFile {
            filename: "in.txt".to_string(),
            source: FileSource::Ssh {
                ssh: crate::specs::inputs::SshSource {
                    host: "host".to_string(),
                    path: PathBuf::from("/a"),
                },
            },
            link: true,
            checksum: None,
        };
        let err = prepare_resolved_file(&file, work.path(), None).unwrap_err();
        assert!(err.to_string().contains("Cannot link to a remote file."));
    }

    #[test]
    fn test_prepare_and_clean_folder() {
        let work = tempdir().unwrap();
        let inputs_yaml = work.path().join("inputs.yml");
        fs::write(
            &inputs_yaml,
            "inputs:\n  - type: static_file\n    content: a\n    filename: a.txt\n  - type: static_yaml\n    data: {k: 1}\n    filename: sub/b.yml\n",
        )
        .unwrap();
        let mock = MockClient::new();

        prepare_folder(&inputs_yaml, None, &mock, None, None).unwrap();
        assert_eq!(fs::read_to_string(work.path().join("a.txt")).unwrap(), "a");
        assert_eq!(fs::read_to_string(work.path().join("sub/b.yml")).unwrap(), "k: 1\n");

        clean_folder(&inputs_yaml, None, &mock, None).unwrap();
        assert!(!work.path().join("a.txt").exists());
        assert!(!work.path().join("sub/b.yml").exists());
        assert!(inputs_yaml.exists());
    }

    #[test]
    fn test_prepare_folder_with_filter() {
        let work = tempdir().unwrap();
        let inputs_yaml = work.path().join("inputs.yml");
        fs::write(
            &inputs_yaml,
            "inputs:\n  - type: static_file\n    content: a\n    filename: a.txt\n  - type: static_file\n    content: b\n    filename: b.txt\n",
        )
        .unwrap();
        let mock = MockClient::new();

        prepare_folder(&inputs_yaml, None, &mock, None, Some(&["b.txt".to_string()])).unwrap();
        assert!(!work.path().join("a.txt").exists());
        assert!(work.path().join("b.txt").exists());
    }

    #[test]
    fn test_duplicate_inputs_write_nothing() {
        let work = tempdir().unwrap();
        let inputs_yaml = work.path().join("inputs.yml");
        fs::write(
            &inputs_yaml,
            "inputs:\n  - type: static_file\n    content: a\n    filename: data.csv\n  - type: static_file\n    content: b\n    filename: data.csv\n",
        )
        .unwrap();

        let err = prepare_folder(&inputs_yaml, None, &MockClient::new(), None, None).unwrap_err();
        assert_eq!(err.kind(), "ResolveError");
        assert!(!work.path().join("data.csv").exists());
    }
}
