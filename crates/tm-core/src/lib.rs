//! tm-core - Core library for Tidemark
//!
//! This crate provides the migration [`Step`] model, the [`Registry`] that
//! independently written migration units register into, and configuration
//! parsing shared by the engine and the CLI.

pub mod config;
pub mod error;
pub mod registry;
pub mod step;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use registry::{key_from_source_path, Registry, StepSet};
pub use step::{Action, ActionError, ActionResult, Step, StepKey};
