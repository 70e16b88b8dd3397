//! Jobs and the concurrent job runner.
//!
//! A job owns one `TargetHost` and drives it through connect, install and
//! converge. In multi-target mode every job runs on its own tokio task, and
//! anything that goes wrong inside one job, panics included, becomes that
//! job's outcome without touching the others.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{error, info};

use crate::application::ports::{PolicyArchive, StatusSink};
use crate::application::services::converge::Converger;
use crate::application::services::host::TargetHost;
use crate::application::services::install::AgentInstaller;
use crate::domain::{ConvergeOutcome, FailureKind, JobEvent, JobFailure, JobOutcome, Phase};

/// Routes one target's events to the shared status sink.
pub struct TargetReporter {
    target: String,
    sink: Arc<dyn StatusSink>,
}

impl TargetReporter {
    #[must_use]
    pub fn new(target: impl Into<String>, sink: Arc<dyn StatusSink>) -> Self {
        Self { target: target.into(), sink }
    }

    pub fn emit(&self, event: impl Into<JobEvent>) {
        self.sink.event(&self.target, &event.into());
    }
}

/// Read-only state shared by every job of a run.
pub struct JobContext {
    pub installer: AgentInstaller,
    pub converger: Converger,
    pub archive: PolicyArchive,
    pub sink: Arc<dyn StatusSink>,
}

pub struct Job {
    host: TargetHost,
    ctx: Arc<JobContext>,
    phase: Phase,
}

impl Job {
    #[must_use]
    pub fn new(host: TargetHost, ctx: Arc<JobContext>) -> Self {
        Self { host, ctx, phase: Phase::Connect }
    }

    #[must_use]
    pub fn target_id(&self) -> String {
        self.host.id()
    }

    /// Furthest phase entered so far.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run the pipeline, propagating the first failure.
    ///
    /// # Errors
    ///
    /// Returns the classified failure of the phase that failed.
    pub async fn execute(&mut self) -> Result<ConvergeOutcome, JobFailure> {
        let reporter = TargetReporter::new(self.host.id(), Arc::clone(&self.ctx.sink));

        self.phase = Phase::Connect;
        reporter.emit(JobEvent::Connecting);
        self.host.connect().await?;
        reporter.emit(JobEvent::Connected);

        self.phase = Phase::Install;
        self.ctx.installer.run(&mut self.host, &reporter).await?;

        self.phase = Phase::Converge;
        let outcome = self
            .ctx
            .converger
            .run(&self.host, &self.ctx.archive, &reporter)
            .await?;

        self.phase = Phase::Complete;
        Ok(outcome)
    }

    /// Run the pipeline to exactly one outcome and report it to the sink.
    ///
    /// Never fails: errors and panics inside the pipeline are captured in the
    /// outcome. The connection is released either way.
    pub async fn run(mut self) -> JobOutcome {
        let target = self.host.id();
        let result = AssertUnwindSafe(self.execute()).catch_unwind().await;
        self.host.disconnect().await;

        let outcome = match result {
            Ok(Ok(converge)) => JobOutcome::succeeded(target, converge),
            Ok(Err(failure)) => JobOutcome::failed(target, self.phase, failure),
            Err(panic) => {
                let failure = JobFailure::new(FailureKind::Internal, panic_message(panic.as_ref()));
                JobOutcome::failed(target, self.phase, failure)
            }
        };
        match &outcome.failure {
            Some(failure) => error!(target_host = %outcome.target, phase = ?outcome.phase, %failure, "job failed"),
            None => info!(target_host = %outcome.target, converge = ?outcome.converge, "job succeeded"),
        }
        self.ctx.sink.finished(&outcome);
        outcome
    }
}

/// Runs jobs concurrently and collects their outcomes.
pub struct JobRunner {
    sink: Arc<dyn StatusSink>,
}

impl JobRunner {
    #[must_use]
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self { sink }
    }

    /// Start every job at once and wait for all of them.
    ///
    /// Returns one outcome per job, in the order the jobs were given,
    /// regardless of completion order.
    pub async fn run_all(&self, jobs: Vec<Job>) -> Vec<JobOutcome> {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| (job.target_id(), tokio::spawn(job.run())))
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (target, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // The job never reached its own reporting.
                    let message = if e.is_panic() {
                        panic_message(e.into_panic().as_ref())
                    } else {
                        format!("job did not complete: {e}")
                    };
                    let outcome = JobOutcome::failed(
                        target,
                        Phase::Connect,
                        JobFailure::new(FailureKind::Internal, message),
                    );
                    self.sink.finished(&outcome);
                    outcome
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let text = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("job panicked: {text}")
}
