//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, SSH
//! transport, artifact downloads, bundle packing, config files and log setup.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod artifacts;
pub mod bundle;
pub mod command_runner;
pub mod config;
pub mod logging;
pub mod ssh;
