//! Path helpers.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Returns the user's home directory from `HOME`.
pub fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

/// Expands a leading `~` to the home directory.
pub fn expand_user(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => match home_dir() {
            Some(home) => home.join(components.as_path()),
            None => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

/// Makes `path` absolute against the current directory and removes `.` and
/// `..` components lexically, without touching the filesystem.
pub fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    normalize(&joined)
}

/// Removes `.` and `..` components lexically.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push("..");
                }
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// Expresses `target` relative to the directory `base`, walking up with
/// `..` where needed. Both paths should be absolute.
pub fn relative_to(target: &Path, base: &Path) -> PathBuf {
    let target: Vec<Component> = target.components().collect();
    let base: Vec<Component> = base.components().collect();

    let common = target
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..base.len() {
        result.push("..");
    }
    for component in &target[common..] {
        result.push(component.as_os_str());
    }
    if result.as_os_str().is_empty() {
        result.push(".");
    }
    result
}

/// Checks a target filename of a resolved input: relative, no `:` and no
/// `..` escaping the target folder.
pub fn validate_relative_filename(filename: &str) -> Result<(), String> {
    if filename.is_empty() {
        return Err("filename must not be empty".to_string());
    }
    if filename.starts_with('/') {
        return Err(format!("filename '{}' must be relative", filename));
    }
    if filename.contains(':') {
        return Err(format!("filename '{}' must not contain ':'", filename));
    }
    if Path::new(filename)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(format!(
            "filename '{}' must not point outside the target folder",
            filename
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
    }

    #[test]
    fn test_relative_to_sibling() {
        let rel = relative_to(Path::new("/data/inputs/x.txt"), Path::new("/data/work/chunk"));
        assert_eq!(rel, PathBuf::from("../../inputs/x.txt"));
    }

    #[test]
    fn test_relative_to_child() {
        let rel = relative_to(Path::new("/data/work/x.txt"), Path::new("/data/work"));
        assert_eq!(rel, PathBuf::from("x.txt"));
    }

    #[test]
    fn test_absolutize_keeps_absolute() {
        assert_eq!(absolutize(Path::new("/srv/./x")), PathBuf::from("/srv/x"));
        assert!(absolutize(Path::new("rel")).is_absolute());
    }

    #[test]
    fn test_expand_user_leaves_plain_paths() {
        assert_eq!(expand_user(Path::new("/etc/hosts")), PathBuf::from("/etc/hosts"));
        assert_eq!(expand_user(Path::new("a/~")), PathBuf::from("a/~"));
    }

    #[test]
    fn test_validate_relative_filename() {
        assert!(validate_relative_filename("data/file.csv").is_ok());
        assert!(validate_relative_filename(".").is_ok());
        assert!(validate_relative_filename("/abs").is_err());
        assert!(validate_relative_filename("host:file").is_err());
        assert!(validate_relative_filename("../escape").is_err());
        assert!(validate_relative_filename("").is_err());
    }
}
