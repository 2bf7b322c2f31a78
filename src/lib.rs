//! B-Fabric App Runner
//!
//! Executes LIMS workunits: an app's dispatch command splits the work into
//! chunks, then each chunk gets its inputs staged, is processed and has its
//! outputs registered back in the LIMS.
//!
//! # Architecture
//!
//! - [`specs`]: app, inputs, outputs and workunit documents
//! - [`commands`]: turning command specs into processes
//! - [`inputs`]: resolving and materialising input files
//! - [`outputs`]: registering results in the LIMS
//! - [`actions`]: the phase driver
//! - [`lims`]: the LIMS client contract, entities and config
//! - [`util`]: paths, checksums, tables and transfers
//!
//! # Example
//!
//! ```rust,no_run
//! use bfabric_app_runner::actions::{execute_run, ActionRun};
//! use bfabric_app_runner::lims::MockClient;
//!
//! fn main() -> bfabric_app_runner::Result<()> {
//!     let client = MockClient::new();
//!     let action = ActionRun {
//!         work_dir: "work".into(),
//!         app_ref: "app.yml".into(),
//!         workunit_ref: "workunit.yml".parse().unwrap_or_else(|never| match never {}),
//!         chunk: None,
//!         ssh_user: None,
//!         filter: None,
//!         force_storage: None,
//!         read_only: true,
//!     };
//!     execute_run(&action, &client)
//! }
//! ```

pub mod actions;
pub mod cli;
pub mod commands;
pub mod error;
pub mod inputs;
pub mod lims;
pub mod outputs;
pub mod specs;
pub mod util;

pub use error::{AppRunnerError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "bfabric-app-runner";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, env!("CARGO_PKG_NAME"));
    }
}
