//! B-Fabric App Runner CLI Entry Point
//!
//! # Usage
//!
//! ```bash
//! # Run every phase of an app for workunit 123
//! bfabric-app-runner app run --app-spec app.yml --workunit-ref 123 --work-dir work
//!
//! # Only stage the inputs of one chunk
//! bfabric-app-runner inputs prepare --inputs-yaml work/chunk1/inputs.yml
//!
//! # Check a spec file
//! bfabric-app-runner validate app-spec app.yml
//! ```

use std::env;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use log::debug;

use bfabric_app_runner::cli::{run, Cli};
use bfabric_app_runner::{APP_NAME, VERSION};

/// Environment variable raising the log level to debug.
const DEBUG_ENV_VAR: &str = "BFABRICPY_DEBUG";

fn debug_requested() -> bool {
    env::var(DEBUG_ENV_VAR)
        .map(|value| {
            let value = value.trim().to_ascii_lowercase();
            !value.is_empty() && value != "0" && value != "false"
        })
        .unwrap_or(false)
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose || debug_requested());
    debug!("{} v{}", APP_NAME, VERSION);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}: {}", "[ERROR]".red().bold(), e.kind(), e);
            ExitCode::FAILURE
        }
    }
}
