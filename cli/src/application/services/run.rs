//! Run use-case: validate, resolve, bundle, execute, aggregate.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::application::ports::{
    ArtifactSource, BundleBuilder, ConnectionFactory, ProgressReporter, StatusSink,
};
use crate::application::services::converge::Converger;
use crate::application::services::host::TargetHost;
use crate::application::services::install::AgentInstaller;
use crate::application::services::job::{Job, JobContext, JobRunner};
use crate::application::services::resolve::TargetResolver;
use crate::domain::{
    AggregateResult, JobFailure, MultiTargetFailure, ResolutionError, RunConfig, ValidationError,
    WorkItem, aggregate,
};

/// What to run, and where, as given on the command line.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub targets: String,
    pub subject: String,
    pub name: Option<String>,
    pub properties: Vec<String>,
}

/// Collaborators for a run.
pub struct RunDeps<'a> {
    pub connections: &'a dyn ConnectionFactory,
    pub artifacts: Arc<dyn ArtifactSource>,
    pub bundles: &'a dyn BundleBuilder,
    pub sink: Arc<dyn StatusSink>,
}

/// Failures that end a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("invalid configuration: {0:#}")]
    Config(anyhow::Error),

    #[error("failed to build configuration bundle: {0:#}")]
    Bundle(anyhow::Error),

    /// The only target failed.
    #[error("{target}: {failure}")]
    Target { target: String, failure: JobFailure },

    #[error(transparent)]
    MultiTarget(#[from] MultiTargetFailure),
}

impl RunError {
    /// Stable machine-readable code used by JSON output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Resolution(_) => "resolution_error",
            Self::Config(_) => "config_error",
            Self::Bundle(_) => "bundle_error",
            Self::Target { failure, .. } => failure.kind.code(),
            Self::MultiTarget(_) => "multi_target_failure",
        }
    }
}

/// Execute a run end to end.
///
/// Validation happens before any target is resolved or contacted. With one
/// resolved target the job runs on the caller's task and its failure is
/// returned as-is; with several, jobs run concurrently and any failure is
/// reported as a [`MultiTargetFailure`]. The configuration bundle is deleted
/// exactly once, after every job has finished.
///
/// # Errors
///
/// Returns a [`RunError`] for invalid input, unresolvable targets, a bundle
/// build failure, or failed targets.
pub async fn run_converge(
    request: &RunRequest,
    config: &RunConfig,
    deps: RunDeps<'_>,
    reporter: &impl ProgressReporter,
) -> Result<AggregateResult, RunError> {
    let work = WorkItem::parse(&request.subject, request.name.as_deref(), &request.properties)?;
    let installer =
        AgentInstaller::new(&config.agent, Arc::clone(&deps.artifacts)).map_err(RunError::Config)?;

    let hosts = TargetResolver::new(config, deps.connections).resolve(&request.targets)?;
    let ids: Vec<String> = hosts.iter().map(TargetHost::id).collect();
    deps.sink.resolved(&ids);
    reporter.step(&format!("building configuration bundle for {}...", work.describe()));
    let bundle = deps
        .bundles
        .build(&work)
        .map_err(|e| match e.downcast::<ValidationError>() {
            Ok(invalid) => RunError::Validation(invalid),
            Err(e) => RunError::Bundle(e),
        })?;
    info!(archive = %bundle.archive().path.display(), run_list = %bundle.archive().run_list, "bundle built");

    let ctx = Arc::new(JobContext {
        installer,
        converger: Converger::new(),
        archive: bundle.archive().clone(),
        sink: Arc::clone(&deps.sink),
    });
    let mut jobs: Vec<Job> = hosts
        .into_iter()
        .map(|host| Job::new(host, Arc::clone(&ctx)))
        .collect();

    reporter.step(&format!(
        "converging {} on {} target(s)...",
        work.describe(),
        jobs.len()
    ));
    let result = if jobs.len() == 1 {
        let outcome = jobs.remove(0).run().await;
        match outcome.failure {
            Some(failure) => Err(RunError::Target { target: outcome.target, failure }),
            None => Ok(aggregate(vec![outcome])),
        }
    } else {
        let outcomes = JobRunner::new(Arc::clone(&deps.sink)).run_all(jobs).await;
        aggregate(outcomes).into_result().map_err(RunError::from)
    };

    if let Err(e) = bundle.delete() {
        warn!(error = %e, "failed to delete configuration bundle");
        reporter.warn(&format!("failed to delete local configuration bundle: {e:#}"));
    }

    if result.is_ok() {
        reporter.success("run complete");
    }
    result
}
