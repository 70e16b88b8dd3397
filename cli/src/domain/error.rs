//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

// ── Validation errors ─────────────────────────────────────────────────────────

/// Errors raised while validating the unit of work, before any target is touched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Property '{0}' is malformed. Properties must be given as key=value.")]
    MalformedProperty(String),

    #[error("Property '{0}' has an empty key.")]
    EmptyPropertyKey(String),

    #[error("Resource type '{0}' is invalid: must match ^[a-z_][a-z0-9_]*$")]
    InvalidResourceType(String),

    #[error("Resource '{0}' requires a name.")]
    MissingResourceName(String),

    #[error("Recipe '{0}' could not be found. Pass a path to a recipe file or cookbook directory.")]
    RecipeNotFound(String),

    #[error("Recipe specifier '{0}' is invalid: expected <cookbook> or <cookbook>::<recipe>.")]
    InvalidRecipeSpecifier(String),
}

// ── Resolution errors ─────────────────────────────────────────────────────────

/// Errors raised while expanding a target specification.
///
/// Always fatal for the whole run: no job starts when resolution fails.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("No targets were given. Pass a host name, a comma-separated list, or a range like web[1:3].")]
    Empty,

    #[error("Target '{entry}' is malformed: {reason}")]
    Malformed { entry: String, reason: String },

    #[error("Target '{entry}' uses unsupported protocol '{protocol}'. Supported: ssh")]
    UnsupportedProtocol { entry: String, protocol: String },

    #[error("Target specification expands to {count} hosts, more than the maximum of {max}.")]
    TooManyTargets { count: usize, max: usize },
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration key/value validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown setting: {key}\n\nValid settings: {valid}")]
    UnknownKey { key: String, valid: String },

    #[error("Invalid value for {key}: {value}\n\nValid values: {valid}")]
    InvalidValue {
        key: String,
        value: String,
        valid: String,
    },
}

// ── Per-target failures ───────────────────────────────────────────────────────

/// Classification of a failure captured at a job boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The target could not be reached or authenticated.
    Connection,
    /// Installation is disabled but the agent is missing or too old.
    CheckOnly,
    /// No installable artifact could be located for the target platform.
    ArtifactLookup,
    /// The artifact could not be downloaded or failed verification.
    Download,
    /// A file could not be uploaded to the target.
    Upload,
    /// The remote package install command failed.
    RemoteInstall,
    /// Packaging, uploading or running the converge failed.
    Converge,
    /// The job's task panicked or was torn down unexpectedly.
    Internal,
}

impl FailureKind {
    /// Stable machine-readable code used by JSON output.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Connection => "connection_error",
            Self::CheckOnly => "agent_version_unmet",
            Self::ArtifactLookup => "artifact_lookup_error",
            Self::Download => "download_error",
            Self::Upload => "upload_error",
            Self::RemoteInstall => "remote_install_error",
            Self::Converge => "converge_error",
            Self::Internal => "internal_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connection => "connection failed",
            Self::CheckOnly => "agent version requirement not met",
            Self::ArtifactLookup => "artifact lookup failed",
            Self::Download => "download failed",
            Self::Upload => "upload failed",
            Self::RemoteInstall => "remote install failed",
            Self::Converge => "converge failed",
            Self::Internal => "internal error",
        };
        f.write_str(label)
    }
}

/// The single terminal failure captured by a job.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("{kind}: {message}")]
pub struct JobFailure {
    /// What went wrong.
    pub kind: FailureKind,
    /// One-line human readable message.
    pub message: String,
    /// Optional diagnostic detail, e.g. the remote agent's stacktrace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JobFailure {
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    /// Attach diagnostic detail to the failure.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Extension for classifying an adapter error at a phase boundary.
pub trait FailAs<T> {
    /// Convert the error into a [`JobFailure`] of the given kind.
    ///
    /// # Errors
    ///
    /// Returns the classified failure when `self` is an error.
    fn fail_as(self, kind: FailureKind) -> Result<T, JobFailure>;
}

impl<T> FailAs<T> for anyhow::Result<T> {
    fn fail_as(self, kind: FailureKind) -> Result<T, JobFailure> {
        self.map_err(|e| JobFailure::new(kind, format!("{e:#}")))
    }
}
