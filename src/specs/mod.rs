//! Spec Models
//!
//! Typed representations of the YAML documents the runner consumes:
//!
//! - [`app`]: app spec templates and concrete app versions
//! - [`commands`]: the `dispatch`/`process`/`collect` command union
//! - [`inputs`] / [`outputs`]: `inputs.yml` and `outputs.yml`
//! - [`workunit`]: the workunit definition envelope
//! - [`interpolation`]: `${app.*}` / `${workunit.*}` rendering
//! - [`parser`] / [`validator`]: loading plus semantic checks
//!
//! All models reject unknown keys.

pub mod app;
pub mod commands;
pub mod inputs;
pub mod interpolation;
pub mod outputs;
pub mod parser;
pub mod validator;
pub mod workunit;

pub use app::{AppSpec, AppSpecTemplate, AppVersion};
pub use commands::{Command, CommandsSpec};
pub use inputs::{InputSpec, InputsSpec};
pub use outputs::{OutputSpec, OutputsSpec, UpdateExisting};
pub use parser::{load_app_version, load_inputs_spec, load_outputs_spec, load_runnable_app, RunnableApp};
pub use workunit::{WorkunitDefinition, WorkunitRef};
