//! Direct process execution without a shell.

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::error::{AppRunnerError, Result};
use crate::specs::commands::CommandExec;

/// Splits a command string with POSIX shell rules.
pub fn tokenize(command: &str) -> Result<Vec<String>> {
    let tokens = shlex::split(command).ok_or_else(|| {
        AppRunnerError::spec("command", format!("cannot tokenize command: {}", command))
    })?;
    if tokens.is_empty() {
        return Err(AppRunnerError::spec("command", "command is empty"));
    }
    Ok(tokens)
}

/// Tokenised command followed by `args`.
pub fn to_shell(command: &CommandExec, args: &[String]) -> Result<Vec<String>> {
    let mut argv = tokenize(&command.command)?;
    argv.extend(args.iter().cloned());
    Ok(argv)
}

/// The current process environment as a sorted map. Non-UTF-8 entries are
/// skipped.
pub fn current_env() -> BTreeMap<String, String> {
    env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Applies `prepend_paths` to `PATH`, then overlays `overlay`.
///
/// Earlier entries of `prepend_paths` take precedence over later ones and over
/// the inherited `PATH`.
pub fn compose_env(
    base: &BTreeMap<String, String>,
    prepend_paths: &[PathBuf],
    overlay: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>> {
    let mut env = base.clone();

    if !prepend_paths.is_empty() {
        let mut entries: Vec<PathBuf> = prepend_paths.to_vec();
        if let Some(path) = base.get("PATH") {
            entries.extend(env::split_paths(&OsString::from(path)));
        }
        let joined = env::join_paths(entries)
            .map_err(|e| AppRunnerError::spec("prepend_paths", e.to_string()))?;
        env.insert("PATH".to_string(), joined.to_string_lossy().into_owned());
    }

    env.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(env)
}

pub fn to_env(command: &CommandExec, base: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>> {
    compose_env(base, &command.prepend_paths, &command.env)
}
