//! Command Execution
//!
//! Every command kind is turned into an argv list ([`to_shell`]) and a child
//! environment ([`to_env`]), then run directly without an intermediate shell.
//!
//! - [`exec`]: `shell` and `exec` commands
//! - [`docker`]: `docker`/`podman run` synthesis
//! - [`python_env`]: `uv run` environments

pub mod docker;
pub mod exec;
pub mod python_env;

use std::collections::BTreeMap;
use std::path::Path;

use log::info;

use crate::error::Result;
use crate::specs::commands::Command;
use crate::util::process::run_argv;

/// The argv of `command` followed by `args`.
///
/// `work_dir` is only used by container commands, which mount it; it defaults
/// to the current directory.
pub fn to_shell(command: &Command, args: &[String], work_dir: Option<&Path>) -> Result<Vec<String>> {
    match command {
        Command::Shell(shell) => {
            let mut argv = exec::tokenize(&shell.command)?;
            argv.extend(args.iter().cloned());
            Ok(argv)
        }
        Command::Exec(cmd) => exec::to_shell(cmd, args),
        Command::Docker(cmd) => docker::to_shell(cmd, work_dir, args),
        Command::PythonEnv(cmd) => python_env::to_shell(cmd, args),
    }
}

/// The child environment, derived from `base`.
///
/// Container commands pass their variables as `--env` arguments, so the engine
/// itself runs with `base` unchanged.
pub fn to_env(command: &Command, base: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>> {
    match command {
        Command::Shell(_) | Command::Docker(_) => Ok(base.clone()),
        Command::Exec(cmd) => exec::to_env(cmd, base),
        Command::PythonEnv(cmd) => exec::compose_env(base, &cmd.prepend_paths, &cmd.env),
    }
}

/// Runs `command` with `args` appended and waits for it.
///
/// # Errors
///
/// * `CommandFailed` when the child exits non-zero
/// * `SpecInvalid` when the command string cannot be tokenised
pub fn execute_command(command: &Command, args: &[String], work_dir: Option<&Path>) -> Result<()> {
    let argv = to_shell(command, args, work_dir)?;
    let env = to_env(command, &exec::current_env())?;
    info!("Running {} command", command.type_name());
    run_argv(&argv, Some(&env))
}
