//! Command specifications.
//!
//! A command is a tagged union on `type`. Execution lives in
//! [`crate::commands`]; this module only holds the data model.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One command of an app version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Legacy alias of `exec` without environment options.
    Shell(CommandShell),
    Exec(CommandExec),
    Docker(CommandDocker),
    PythonEnv(CommandPythonEnv),
}

impl Command {
    /// The command string before tokenisation.
    pub fn command_text(&self) -> &str {
        match self {
            Command::Shell(c) => &c.command,
            Command::Exec(c) => &c.command,
            Command::Docker(c) => &c.command,
            Command::PythonEnv(c) => &c.command,
        }
    }

    /// Tag value as written in YAML.
    pub fn type_name(&self) -> &'static str {
        match self {
            Command::Shell(_) => "shell",
            Command::Exec(_) => "exec",
            Command::Docker(_) => "docker",
            Command::PythonEnv(_) => "python_env",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandShell {
    pub command: String,
}

/// Runs a tokenised command line directly, without a shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandExec {
    pub command: String,
    /// Variables overlaid on the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Prepended to `PATH`; earlier entries win.
    #[serde(default)]
    pub prepend_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerEngine {
    #[default]
    Docker,
    Podman,
}

impl ContainerEngine {
    pub fn binary(&self) -> &'static str {
        match self {
            ContainerEngine::Docker => "docker",
            ContainerEngine::Podman => "podman",
        }
    }
}

/// Bind mounts of a container command, in addition to the work directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountOptions {
    /// Container path of the work directory; defaults to the host path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir_target: Option<PathBuf>,
    /// `(host, container)` pairs mounted read-only.
    #[serde(default)]
    pub read_only: Vec<(PathBuf, PathBuf)>,
    /// `(host, container)` pairs mounted read-write.
    #[serde(default)]
    pub writeable: Vec<(PathBuf, PathBuf)>,
    /// Mounts `~/.bfabricpy.yml` read-only into the container.
    #[serde(default = "default_true")]
    pub share_bfabric_config: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            work_dir_target: None,
            read_only: Vec::new(),
            writeable: Vec::new(),
            share_bfabric_config: true,
        }
    }
}

/// Runs the command inside a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandDocker {
    pub image: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub engine: ContainerEngine,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default)]
    pub mounts: MountOptions,
    /// Passed verbatim to `<engine> run` before the image.
    #[serde(default)]
    pub custom_args: Vec<String>,
}

/// Runs the command in an ephemeral Python environment created by `uv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandPythonEnv {
    /// Locked requirements of the environment.
    pub pylock: PathBuf,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_version: Option<String>,
    /// Local packages (wheels or project directories) installed on top.
    #[serde(default)]
    pub local_extra_deps: Vec<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub prepend_paths: Vec<PathBuf>,
    /// Ignores cached package data.
    #[serde(default)]
    pub refresh: bool,
}

/// The commands of one app version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandsSpec {
    /// Called as `<dispatch> <workunit_ref> <work_dir>`.
    pub dispatch: Command,
    /// Called as `<process> <chunk_dir>`.
    pub process: Command,
    /// Called as `<collect> <workunit_ref> <chunk_dir>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collect: Option<Command>,
}

pub(crate) fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exec_defaults() {
        let command: Command = serde_yaml::from_str("type: exec\ncommand: echo hi\n").unwrap();
        match command {
            Command::Exec(exec) => {
                assert_eq!(exec.command, "echo hi");
                assert!(exec.env.is_empty());
                assert!(exec.prepend_paths.is_empty());
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_parse_docker_mounts() {
        let yaml = r#"
type: docker
image: alpine:3
command: echo hi
engine: podman
mounts:
  read_only: [["/data/ref", "/ref"]]
  share_bfabric_config: false
"#;
        let command: Command = serde_yaml::from_str(yaml).unwrap();
        let Command::Docker(docker) = command else {
            panic!("expected docker");
        };
        assert_eq!(docker.engine, ContainerEngine::Podman);
        assert_eq!(
            docker.mounts.read_only,
            vec![(PathBuf::from("/data/ref"), PathBuf::from("/ref"))]
        );
        assert!(!docker.mounts.share_bfabric_config);
    }

    #[test]
    fn test_mount_defaults_share_config() {
        let command: Command =
            serde_yaml::from_str("type: docker\nimage: x\ncommand: y\n").unwrap();
        let Command::Docker(docker) = command else {
            panic!("expected docker");
        };
        assert!(docker.mounts.share_bfabric_config);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: Result<Command, _> =
            serde_yaml::from_str("type: exec\ncommand: x\nbogus: 1\n");
        assert!(result.is_err());

        let result: Result<Command, _> = serde_yaml::from_str("type: app_zip\ncommand: x\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_commands_spec_round_trip() {
        let yaml = r#"
dispatch:
  type: shell
  command: dispatch.sh
process:
  type: python_env
  pylock: /app/pylock.toml
  command: python -m app
  python_version: "3.12"
"#;
        let spec: CommandsSpec = serde_yaml::from_str(yaml).unwrap();
        assert!(spec.collect.is_none());
        assert_eq!(spec.process.type_name(), "python_env");

        let dumped = serde_yaml::to_string(&spec).unwrap();
        let reparsed: CommandsSpec = serde_yaml::from_str(&dumped).unwrap();
        assert_eq!(spec, reparsed);
    }
}
