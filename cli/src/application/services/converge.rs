//! Converge state machine: `CreatingRemotePolicy → RunningAgent → outcome`.
//!
//! The remote working directory is per target and per run, and is removed
//! afterwards whatever the outcome.

use std::path::Path;

use anyhow::Context;
use tracing::{debug, warn};

use crate::application::ports::{AgentInvocation, PolicyArchive, TargetConnection};
use crate::application::services::host::TargetHost;
use crate::application::services::job::TargetReporter;
use crate::domain::agent::{render_agent_config, stacktrace_path};
use crate::domain::outcome::classify_agent_exit;
use crate::domain::{ConvergeEvent, ConvergeOutcome, FailAs, FailureKind, JobFailure};

/// Lines of agent output kept when no stacktrace is available.
const OUTPUT_TAIL_LINES: usize = 40;

#[derive(Debug, Default, Clone, Copy)]
pub struct Converger;

impl Converger {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Upload the policy and run the agent on a connected host.
    ///
    /// # Errors
    ///
    /// Returns a [`FailureKind::Converge`] failure when the remote policy
    /// cannot be staged, the agent cannot be run, or it exits with a failing
    /// code. In the last case the remote stacktrace is attached as detail.
    pub async fn run(
        &self,
        host: &TargetHost,
        archive: &PolicyArchive,
        reporter: &TargetReporter,
    ) -> Result<ConvergeOutcome, JobFailure> {
        let conn = host.connection().fail_as(FailureKind::Converge)?;

        reporter.emit(ConvergeEvent::CreatingRemotePolicy);
        let work_dir = conn
            .create_remote_dir()
            .await
            .context("failed to create remote working directory")
            .fail_as(FailureKind::Converge)?;
        debug!(target_host = %host.id(), dir = %work_dir, "remote working directory");

        let result = converge_in(conn, &work_dir, archive, reporter).await;

        if let Err(e) = conn.remove_remote_dir(&work_dir).await {
            warn!(target_host = %host.id(), dir = %work_dir, error = %e, "failed to clean up remote working directory");
        }
        result
    }
}

async fn converge_in(
    conn: &dyn TargetConnection,
    work_dir: &str,
    archive: &PolicyArchive,
    reporter: &TargetReporter,
) -> Result<ConvergeOutcome, JobFailure> {
    let staging = tempfile::tempdir()
        .context("failed to create local staging directory")
        .fail_as(FailureKind::Converge)?;
    let config_path = write_config(staging.path(), work_dir).fail_as(FailureKind::Converge)?;

    let config_path = conn
        .upload(&config_path, work_dir)
        .await
        .context("failed to upload agent configuration")
        .fail_as(FailureKind::Converge)?;
    let archive_path = conn
        .upload(&archive.path, work_dir)
        .await
        .context("failed to upload policy archive")
        .fail_as(FailureKind::Converge)?;

    reporter.emit(ConvergeEvent::RunningAgent);
    let invocation = AgentInvocation {
        work_dir: work_dir.to_string(),
        config_path,
        archive_path,
        run_list: archive.run_list.clone(),
    };
    let exit = conn
        .run_agent(&invocation)
        .await
        .context("failed to run agent")
        .fail_as(FailureKind::Converge)?;

    match classify_agent_exit(exit.code) {
        Ok(outcome) => Ok(outcome),
        Err(code) => {
            let stacktrace = conn
                .read_remote_file(&stacktrace_path(work_dir))
                .await
                .unwrap_or_else(|e| {
                    debug!(error = %e, "stacktrace not retrievable");
                    None
                });
            let detail = stacktrace.unwrap_or_else(|| tail(&exit.output, OUTPUT_TAIL_LINES));
            let failure = JobFailure::new(
                FailureKind::Converge,
                format!("agent run failed with exit code {code}"),
            );
            Err(if detail.trim().is_empty() { failure } else { failure.with_detail(detail) })
        }
    }
}

fn write_config(dir: &Path, work_dir: &str) -> anyhow::Result<std::path::PathBuf> {
    let path = dir.join("config.rb");
    std::fs::write(&path, render_agent_config(work_dir))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn tail(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
