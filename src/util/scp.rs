//! SCP transfers between the local host and storage hosts.

use std::fs;
use std::path::Path;

use log::debug;

use super::process::run_captured;
use crate::error::{AppRunnerError, IoContext, Result};

/// A path is remote when it carries a `host:` prefix.
pub fn is_remote(path: &str) -> bool {
    path.contains(':')
}

/// Copies a single file with `scp`, exactly one side being remote.
///
/// The target must name a file, not a directory. When `mkdir` is set the
/// target's parent directory is created first (over `ssh` for remote
/// targets). When `user` is given it is prepended to the remote side.
pub fn scp(source: &str, target: &str, user: Option<&str>, mkdir: bool) -> Result<()> {
    let source_remote = is_remote(source);
    let target_remote = is_remote(target);

    if source_remote == target_remote {
        return Err(AppRunnerError::materialise(
            target,
            format!(
                "either source or target should be remote, but not both (source_remote={}, target_remote={})",
                source_remote, target_remote
            ),
        ));
    }
    if target.ends_with('/') {
        return Err(AppRunnerError::materialise(
            target,
            "target should be a file, not a directory",
        ));
    }

    let mut source = source.to_string();
    let mut target = target.to_string();
    if let Some(user) = user {
        if source_remote {
            source = format!("{}@{}", user, source);
        } else {
            target = format!("{}@{}", user, target);
        }
    }

    if mkdir {
        if target_remote {
            if let Some((host, path)) = target.split_once(':') {
                let parent = Path::new(path)
                    .parent()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_else(|| ".".to_string());
                debug!("ssh {} mkdir -p {}", host, parent);
                run_captured(&[
                    "ssh".to_string(),
                    host.to_string(),
                    "mkdir".to_string(),
                    "-p".to_string(),
                    parent,
                ])?;
            }
        } else if let Some(parent) = Path::new(&target).parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
    }

    run_captured(&["scp".to_string(), source, target])
}
