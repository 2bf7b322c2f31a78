//! Child process helpers shared by the command executor and the file
//! transfer utilities.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;

use log::{debug, error, info};

use crate::error::{AppRunnerError, Result};

/// Formats an argv list the way a POSIX shell would need it quoted.
pub fn display_argv(argv: &[String]) -> String {
    shlex::try_join(argv.iter().map(String::as_str)).unwrap_or_else(|_| argv.join(" "))
}

fn build_command(argv: &[String], env: Option<&BTreeMap<String, String>>) -> Result<Command> {
    let (program, args) = argv.split_first().ok_or_else(|| AppRunnerError::CommandFailed {
        argv: Vec::new(),
        exit_code: None,
    })?;

    let mut command = Command::new(program);
    command.args(args);

    if let Some(env) = env {
        command.env_clear();
        command.envs(env);
    }

    Ok(command)
}

/// Runs `argv` with inherited stdio and waits for it to exit.
///
/// When `env` is given it replaces the child's environment entirely.
///
/// # Errors
///
/// * `CommandFailed` when the child exits unsuccessfully
/// * `Io` when the program cannot be spawned
pub fn run_argv(argv: &[String], env: Option<&BTreeMap<String, String>>) -> Result<()> {
    let mut command = build_command(argv, env)?;
    info!("{}", display_argv(argv));
    debug!("Split command: {:?}", argv);

    let status = command.status().map_err(|source| AppRunnerError::Io {
        path: PathBuf::from(&argv[0]),
        source,
    })?;

    if status.success() {
        Ok(())
    } else {
        error!("Command exited with code {:?}", status.code());
        Err(AppRunnerError::CommandFailed {
            argv: argv.to_vec(),
            exit_code: status.code(),
        })
    }
}

/// Runs `argv` capturing its output, logging stderr on failure.
pub fn run_captured(argv: &[String]) -> Result<()> {
    let mut command = build_command(argv, None)?;
    info!("{}", display_argv(argv));

    let output = command.output().map_err(|source| AppRunnerError::Io {
        path: PathBuf::from(&argv[0]),
        source,
    })?;

    if output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("stdout:\n{}", stdout);
        }
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            error!("stderr:\n{}", stderr);
        }
        Err(AppRunnerError::CommandFailed {
            argv: argv.to_vec(),
            exit_code: output.status.code(),
        })
    }
}

/// Like [`run_captured`] but reports failure of any kind as `false`.
pub fn try_run_captured(argv: &[String]) -> bool {
    match run_captured(argv) {
        Ok(()) => true,
        Err(e) => {
            debug!("{}", e);
            false
        }
    }
}
