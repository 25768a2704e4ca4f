//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, filesystem
//! access, project files, archives and terminal prompts.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod chooser;
pub mod config;
pub mod fs;
pub mod initrd;
pub mod logging;
pub mod project;
pub mod qemu;
pub mod signal;
