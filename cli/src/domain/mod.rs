//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod agent;
pub mod artifact;
pub mod config;
pub mod error;
pub mod event;
pub mod outcome;
pub mod platform;
pub mod properties;
pub mod target;
pub mod work;

pub use agent::{InstallDecision, InstalledAgent, decide};
pub use artifact::ArtifactDescriptor;
pub use config::{RunConfig, validate_config_key, validate_config_value};
pub use error::{
    ConfigError, FailAs, FailureKind, JobFailure, ResolutionError, ValidationError,
};
pub use event::{ConvergeEvent, InstallEvent, JobEvent};
pub use outcome::{
    AggregateResult, ConvergeOutcome, JobOutcome, MultiTargetFailure, Phase, aggregate,
};
pub use platform::{PackageKind, Platform};
pub use target::{Protocol, Target};
pub use work::{RecipeSpecifier, WorkItem};
