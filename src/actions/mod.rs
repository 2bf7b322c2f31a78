//! Phase Driver
//!
//! Drives an app through its phases for one workunit:
//! `dispatch → (inputs → process → outputs)*`, one chunk at a time in the
//! order of `chunks.yml`.
//!
//! - [`types`]: the five actions and the action config file
//! - [`chunks`]: `chunks.yml` and chunk selection
//! - [`execute`]: phase execution and workunit status transitions
//! - [`timeline`]: per-phase timing of a run

pub mod chunks;
pub mod execute;
pub mod timeline;
pub mod types;

pub use chunks::ChunksFile;
pub use execute::{execute, execute_dispatch, execute_inputs, execute_outputs, execute_process, execute_run};
pub use timeline::PhaseTimeline;
pub use types::{Action, ActionConfig, ActionDispatch, ActionInputs, ActionOutputs, ActionProcess, ActionRun};
