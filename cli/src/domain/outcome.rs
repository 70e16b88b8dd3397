//! Job outcomes and multi-target aggregation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::error::JobFailure;

/// Exit code the agent uses when a reboot has been scheduled.
pub const EXIT_REBOOT_SCHEDULED: i32 = 35;
/// Exit code the agent uses when a reboot is needed but not scheduled.
pub const EXIT_REBOOT_NEEDED: i32 = 37;

/// Furthest pipeline phase a job entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Connect,
    Install,
    Converge,
    Complete,
}

/// Successful converge variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergeOutcome {
    Success,
    RebootRequired,
}

/// Classify the agent's exit code. `Err` carries the failing code.
///
/// # Errors
///
/// Returns `Err(code)` for any exit that is neither success nor a reboot
/// request; `None` (killed by a signal) maps to `Err(-1)`.
pub fn classify_agent_exit(code: Option<i32>) -> Result<ConvergeOutcome, i32> {
    match code {
        Some(0) => Ok(ConvergeOutcome::Success),
        Some(EXIT_REBOOT_SCHEDULED | EXIT_REBOOT_NEEDED) => Ok(ConvergeOutcome::RebootRequired),
        Some(other) => Err(other),
        None => Err(-1),
    }
}

/// Terminal record of one job. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub target: String,
    pub phase: Phase,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converge: Option<ConvergeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    pub finished_at: DateTime<Utc>,
}

impl JobOutcome {
    #[must_use]
    pub fn succeeded(target: impl Into<String>, converge: ConvergeOutcome) -> Self {
        Self {
            target: target.into(),
            phase: Phase::Complete,
            success: true,
            converge: Some(converge),
            failure: None,
            finished_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn failed(target: impl Into<String>, phase: Phase, failure: JobFailure) -> Self {
        Self {
            target: target.into(),
            phase,
            success: false,
            converge: None,
            failure: Some(failure),
            finished_at: Utc::now(),
        }
    }
}

/// Every job's outcome, in resolved-target order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateResult {
    pub outcomes: Vec<JobOutcome>,
}

impl AggregateResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    /// Overall success, or one uniform failure however many targets failed.
    ///
    /// # Errors
    ///
    /// Returns [`MultiTargetFailure`] when at least one job failed.
    pub fn into_result(self) -> Result<Self, MultiTargetFailure> {
        if self.is_success() {
            return Ok(self);
        }
        Err(MultiTargetFailure { result: self })
    }
}

/// Collect outcomes into an aggregate result.
#[must_use]
pub fn aggregate(outcomes: Vec<JobOutcome>) -> AggregateResult {
    AggregateResult { outcomes }
}

/// One or more targets failed in a multi-target run.
///
/// Carries every outcome, so succeeded and reboot-required targets are still
/// reported next to the failures.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("{} of {} targets failed", .result.failed().count(), .result.outcomes.len())]
pub struct MultiTargetFailure {
    pub result: AggregateResult,
}

impl MultiTargetFailure {
    #[must_use]
    pub fn total(&self) -> usize {
        self.result.outcomes.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.result.failed()
    }
}
