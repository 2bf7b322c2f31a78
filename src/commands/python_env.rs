//! Ephemeral Python environments through `uv run`.
//!
//! # Binary Resolution Priority
//!
//! 1. Next to the runner executable
//! 2. Development path: `{project_root}/runtime/uv`
//! 3. System PATH

use std::path::PathBuf;
use std::process::Command;

use log::{info, warn};
use once_cell::sync::Lazy;

use super::exec::tokenize;
use crate::error::Result;
use crate::specs::commands::CommandPythonEnv;
use crate::util::paths::{absolutize, expand_user};

/// Lazily-resolved path to the `uv` binary.
pub static UV_PATH: Lazy<PathBuf> = Lazy::new(|| {
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(PathBuf::from)) {
        let prod_path = exe_dir.join("uv");
        if prod_path.exists() {
            info!("Using bundled uv: {}", prod_path.display());
            return prod_path;
        }
    }

    let dev_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("runtime").join("uv");
    if dev_path.exists() {
        info!("Using development uv: {}", dev_path.display());
        return dev_path;
    }

    if let Ok(output) = Command::new("which").arg("uv").output() {
        if output.status.success() {
            let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path_str.is_empty() {
                info!("Using system uv: {}", path_str);
                return PathBuf::from(path_str);
            }
        }
    }

    warn!("uv binary not found, relying on PATH lookup at execution time");
    PathBuf::from("uv")
});

/// `uv run [-p <version>] --with <pylock> [--with <deps>] [--refresh] -- <command> <args>`.
pub fn to_shell(command: &CommandPythonEnv, args: &[String]) -> Result<Vec<String>> {
    to_shell_with(&UV_PATH.to_string_lossy(), command, args)
}

fn to_shell_with(uv: &str, command: &CommandPythonEnv, args: &[String]) -> Result<Vec<String>> {
    let mut argv = vec![uv.to_string(), "run".to_string()];
    if let Some(version) = &command.python_version {
        argv.push("-p".to_string());
        argv.push(version.clone());
    }
    argv.push("--with".to_string());
    argv.push(absolutize(&expand_user(&command.pylock)).display().to_string());
    if !command.local_extra_deps.is_empty() {
        let deps = command
            .local_extra_deps
            .iter()
            .map(|dep| absolutize(&expand_user(dep)).display().to_string())
            .collect::<Vec<_>>()
            .join(",");
        argv.push("--with".to_string());
        argv.push(deps);
    }
    if command.refresh {
        argv.push("--refresh".to_string());
    }
    argv.push("--".to_string());
    argv.extend(tokenize(&command.command)?);
    argv.extend(args.iter().cloned());
    Ok(argv)
}
