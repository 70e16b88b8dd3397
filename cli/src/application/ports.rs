//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`, never from `crate::infra`,
//! `crate::commands`, or `crate::output`.
//!
//! Ports used inside jobs are `Send + Sync` and use `async_trait`, because
//! every job runs on its own tokio task.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{
    ArtifactDescriptor, InstalledAgent, JobEvent, JobOutcome, PackageKind, Platform, RunConfig,
    Target, WorkItem,
};

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts local process execution so infrastructure can be swapped or mocked.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a program and capture its output, using the runner's default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;

    /// Run a program with extra environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds the
    /// runner's timeout. On timeout, the child process must be killed (not
    /// left orphaned).
    async fn run_with_env(&self, program: &str, args: &[&str], envs: &[(&str, &str)]) -> Result<Output>;
}

// ── Target Connection Ports ───────────────────────────────────────────────────

/// Everything the agent needs to converge against an uploaded policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInvocation {
    /// Per-target remote working directory.
    pub work_dir: String,
    /// Remote path of the generated agent configuration.
    pub config_path: String,
    /// Remote path of the uploaded policy archive.
    pub archive_path: String,
    /// Run list, e.g. `recipe[pushrun_run::default]`.
    pub run_list: String,
}

/// Terminal result of one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentExit {
    /// Exit code, or `None` when the agent was killed by a signal.
    pub code: Option<i32>,
    /// Combined output, kept for diagnostics.
    pub output: String,
}

/// Remote I/O against a single target, one implementation per protocol.
///
/// These methods are the only points where the orchestration core performs
/// remote I/O. Timeouts, if any, belong to the implementation.
#[async_trait]
pub trait TargetConnection: Send + Sync {
    /// Establish (or verify) connectivity and authentication.
    async fn connect(&self) -> Result<()>;
    /// Release any connection resources.
    async fn disconnect(&self) -> Result<()>;
    /// Query the installed agent version. Absence is a normal value.
    async fn installed_agent_version(&self) -> Result<InstalledAgent>;
    /// Probe operating system, distribution and architecture.
    async fn platform(&self) -> Result<Platform>;
    /// Create a fresh remote working directory and return its path.
    async fn create_remote_dir(&self) -> Result<String>;
    /// Upload a local file into `remote_dir`, returning its remote path.
    async fn upload(&self, local: &Path, remote_dir: &str) -> Result<String>;
    /// Install an uploaded agent package.
    async fn run_remote_install(&self, remote_path: &str, package: PackageKind) -> Result<()>;
    /// Run the agent against an uploaded policy. Blocks until it exits.
    async fn run_agent(&self, invocation: &AgentInvocation) -> Result<AgentExit>;
    /// Read a remote text file, `None` when it does not exist.
    async fn read_remote_file(&self, path: &str) -> Result<Option<String>>;
    /// Recursively remove a remote directory.
    async fn remove_remote_dir(&self, path: &str) -> Result<()>;
}

/// Creates unconnected connections for resolved targets. Never does I/O.
pub trait ConnectionFactory: Send + Sync {
    fn open(&self, target: &Target) -> Box<dyn TargetConnection>;
}

// ── Artifact Port ─────────────────────────────────────────────────────────────

/// Locates and downloads installable agent packages.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Find the artifact for a platform.
    async fn locate(&self, platform: &Platform) -> Result<ArtifactDescriptor>;
    /// Download (or reuse a verified cached copy of) an artifact, returning
    /// the local path.
    async fn download(&self, artifact: &ArtifactDescriptor) -> Result<PathBuf>;
}

// ── Progress Reporting Ports ──────────────────────────────────────────────────

/// Per-target live status sink. Called concurrently from every job; each
/// target's events arrive in order because one job owns one target.
pub trait StatusSink: Send + Sync {
    /// Every resolved target id, in order. Called once per run, after
    /// validation and resolution and before any job starts.
    fn resolved(&self, _targets: &[String]) {}
    /// A phase transition for `target`.
    fn event(&self, target: &str, event: &JobEvent);
    /// The terminal outcome for a target. Called exactly once per job.
    fn finished(&self, outcome: &JobOutcome);
}

/// Abstracts run-level progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait, no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── Configuration Bundle Ports ────────────────────────────────────────────────

/// Read-only view of a built bundle, shared by every job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyArchive {
    /// Local path of the archive to upload.
    pub path: PathBuf,
    /// Run list the agent converges.
    pub run_list: String,
}

/// A locally built configuration bundle. Deleted exactly once, by its owner.
pub trait ConfigBundle: Send + Sync {
    fn archive(&self) -> &PolicyArchive;
    /// Remove the bundle from local storage.
    fn delete(self: Box<Self>) -> Result<()>;
}

/// Builds a configuration bundle from a work item.
pub trait BundleBuilder {
    fn build(&self, work: &WorkItem) -> Result<Box<dyn ConfigBundle>>;
}

// ── Config Store Port ─────────────────────────────────────────────────────────

/// Abstracts loading and saving `RunConfig`.
pub trait ConfigStore {
    /// Load the config, or defaults when no file exists.
    fn load(&self) -> Result<RunConfig>;
    fn save(&self, config: &RunConfig) -> Result<()>;
    /// Path of the backing file.
    fn path(&self) -> Result<PathBuf>;
}
