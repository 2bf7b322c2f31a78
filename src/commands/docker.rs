//! Container command synthesis.
//!
//! Mount order is fixed: the shared client config (unless disabled), the work
//! directory, then the declared read-only and writeable mounts.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;
use once_cell::sync::Lazy;

use super::exec::tokenize;
use crate::error::{AppRunnerError, Result};
use crate::specs::commands::{CommandDocker, MountOptions};
use crate::util::paths::{absolutize, expand_user};

/// Container path of the shared client config.
pub const CONTAINER_CONFIG_PATH: &str = "/home/user/.bfabricpy.yml";

/// `uid:gid` of the current user, passed as `--user`.
static USER_SPEC: Lazy<std::result::Result<String, String>> = Lazy::new(|| query_user_spec("id"));

fn id_output(program: &str, flag: &str) -> std::result::Result<String, String> {
    let output = Command::new(program)
        .arg(flag)
        .output()
        .map_err(|e| format!("'{} {}' could not be run: {}", program, flag, e))?;
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || value.is_empty() {
        return Err(format!("'{} {}' failed with {}", program, flag, output.status));
    }
    Ok(value)
}

fn query_user_spec(program: &str) -> std::result::Result<String, String> {
    Ok(format!("{}:{}", id_output(program, "-u")?, id_output(program, "-g")?))
}

/// The `uid:gid` containers run as. Never falls back to root.
pub fn current_user_spec() -> Result<&'static str> {
    USER_SPEC
        .as_deref()
        .map_err(|reason| AppRunnerError::Config(format!("cannot determine the container user: {}", reason)))
}

/// A bind mount: host path, container path, read-only flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub target: PathBuf,
    pub read_only: bool,
}

impl Mount {
    fn to_arg(&self) -> String {
        let mut arg = format!(
            "type=bind,source={},target={}",
            self.host.display(),
            self.target.display()
        );
        if self.read_only {
            arg.push_str(",readonly");
        }
        arg
    }
}

/// Collects every mount in argv order. Host paths are `~`-expanded and
/// absolutised; container paths are kept verbatim.
pub fn collect_mounts(options: &MountOptions, work_dir: &Path) -> Vec<Mount> {
    let mut mounts = Vec::new();
    if options.share_bfabric_config {
        mounts.push((PathBuf::from("~/.bfabricpy.yml"), PathBuf::from(CONTAINER_CONFIG_PATH), true));
    }
    let work_dir_target = options
        .work_dir_target
        .clone()
        .unwrap_or_else(|| work_dir.to_path_buf());
    mounts.push((work_dir.to_path_buf(), work_dir_target, false));
    mounts.extend(options.read_only.iter().map(|(h, t)| (h.clone(), t.clone(), true)));
    mounts.extend(options.writeable.iter().map(|(h, t)| (h.clone(), t.clone(), false)));

    mounts
        .into_iter()
        .map(|(host, target, read_only)| Mount {
            host: absolutize(&expand_user(&host)),
            target,
            read_only,
        })
        .collect()
}

/// Builds the engine argv. `work_dir` defaults to the current directory.
pub fn to_shell(command: &CommandDocker, work_dir: Option<&Path>, args: &[String]) -> Result<Vec<String>> {
    let work_dir = absolutize(&expand_user(work_dir.unwrap_or_else(|| Path::new("."))));
    to_shell_as(command, &work_dir, current_user_spec()?, args)
}

fn to_shell_as(command: &CommandDocker, work_dir: &Path, user: &str, args: &[String]) -> Result<Vec<String>> {
    let mut argv = vec![
        command.engine.binary().to_string(),
        "run".to_string(),
        "--user".to_string(),
        user.to_string(),
        "--rm".to_string(),
    ];

    for mount in collect_mounts(&command.mounts, work_dir) {
        argv.push("--mount".to_string());
        argv.push(mount.to_arg());
    }
    if let Some(entrypoint) = &command.entrypoint {
        argv.push("--entrypoint".to_string());
        argv.push(entrypoint.clone());
    }
    for (key, value) in &command.env {
        argv.push("--env".to_string());
        argv.push(format!("{}={}", key, value));
    }
    if let Some(mac_address) = &command.mac_address {
        argv.push("--mac-address".to_string());
        argv.push(mac_address.clone());
    }
    if let Some(hostname) = &command.hostname {
        argv.push("--hostname".to_string());
        argv.push(hostname.clone());
    }
    argv.extend(command.custom_args.iter().cloned());
    argv.push(command.image.clone());
    argv.extend(tokenize(&command.command)?);
    argv.extend(args.iter().cloned());

    debug!("Container argv: {:?}", argv);
    Ok(argv)
}
