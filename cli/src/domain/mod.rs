//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod config;
pub mod error;
pub mod spec;
pub mod target;

pub use config::{UnirunConfig, validate_config};
pub use error::{BackendOp, ConfigError, RunError, SelectionError, SpecBuildError, StreamKind};
pub use spec::SpecOverrides;
pub use target::TargetFilters;
