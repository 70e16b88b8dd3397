//! Unit tests for jobs and concurrent execution with failure isolation.

#![allow(clippy::expect_used)]

use std::sync::Arc;

use pushrun_cli::application::services::job::{Job, JobRunner};
use pushrun_cli::application::ports::StatusSink;
use pushrun_cli::domain::{ConvergeOutcome, FailureKind, JobEvent, Phase};

use crate::mocks::{
    CallLog, HostScript, RecordingSink, artifacts_unused, host, installed, job_context,
};

fn runner(sink: &Arc<RecordingSink>) -> JobRunner {
    JobRunner::new(Arc::clone(sink) as Arc<dyn StatusSink>)
}

#[tokio::test]
async fn test_successful_job_reports_connect_then_install_then_converge() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let ctx = job_context(true, artifacts_unused(), &sink);

    let outcome = Job::new(host("web1", HostScript::default(), &log), ctx)
        .run()
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.phase, Phase::Complete);
    assert_eq!(outcome.converge, Some(ConvergeOutcome::Success));
    let events = sink.events_for("web1");
    assert_eq!(events.first(), Some(&JobEvent::Connecting));
    assert_eq!(events.get(1), Some(&JobEvent::Connected));
    assert_eq!(log.for_host("web1").last().map(String::as_str), Some("disconnect"));
    assert_eq!(sink.finished_count(), 1);
}

#[tokio::test]
async fn test_connection_failure_stops_at_connect_phase() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let ctx = job_context(true, artifacts_unused(), &sink);

    let outcome = Job::new(
        host("web1", HostScript::unreachable("connection refused"), &log),
        ctx,
    )
    .run()
    .await;

    assert!(!outcome.success);
    assert_eq!(outcome.phase, Phase::Connect);
    let failure = outcome.failure.expect("failure recorded");
    assert_eq!(failure.kind, FailureKind::Connection);
    assert_eq!(failure.message, "connection refused");
    // Never connected, so nothing to release.
    assert_eq!(log.for_host("web1"), vec!["connect"]);
}

#[tokio::test]
async fn test_check_only_failure_is_recorded_in_install_phase() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let ctx = job_context(false, artifacts_unused(), &sink);

    let outcome = Job::new(
        host("web1", HostScript::default().with_installed(installed("12.0.0")), &log),
        ctx,
    )
    .run()
    .await;

    assert_eq!(outcome.phase, Phase::Install);
    assert_eq!(
        outcome.failure.map(|f| f.kind),
        Some(FailureKind::CheckOnly)
    );
    assert!(log.contains("web1", "disconnect"));
}

#[tokio::test]
async fn test_outcomes_follow_input_order_not_completion_order() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let ctx = job_context(true, artifacts_unused(), &sink);

    let jobs = vec![
        Job::new(host("slow", HostScript::default().with_agent_delay(150), &log), Arc::clone(&ctx)),
        Job::new(host("medium", HostScript::default().with_agent_delay(50), &log), Arc::clone(&ctx)),
        Job::new(host("fast", HostScript::default(), &log), Arc::clone(&ctx)),
    ];

    let outcomes = runner(&sink).run_all(jobs).await;

    let order: Vec<_> = outcomes.iter().map(|o| o.target.as_str()).collect();
    assert_eq!(order, vec!["slow", "medium", "fast"]);
    assert!(outcomes.iter().all(|o| o.success));
    assert_eq!(sink.finished_count(), 3);
}

#[tokio::test]
async fn test_one_failing_target_does_not_affect_the_others() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let ctx = job_context(true, artifacts_unused(), &sink);

    let jobs = vec![
        Job::new(host("web1", HostScript::default(), &log), Arc::clone(&ctx)),
        Job::new(host("web2", HostScript::unreachable("no route to host"), &log), Arc::clone(&ctx)),
        Job::new(host("web3", HostScript::default().with_agent_exit(Some(37)), &log), Arc::clone(&ctx)),
    ];

    let outcomes = runner(&sink).run_all(jobs).await;

    assert!(outcomes[0].success);
    assert!(!outcomes[1].success);
    assert_eq!(outcomes[1].phase, Phase::Connect);
    assert!(outcomes[2].success);
    assert_eq!(outcomes[2].converge, Some(ConvergeOutcome::RebootRequired));
    assert!(log.contains("web1", "agent recipe[pushrun_run::default]"));
    assert!(log.contains("web3", "agent recipe[pushrun_run::default]"));
}

#[tokio::test]
async fn test_panicking_job_becomes_internal_failure_and_siblings_finish() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let ctx = job_context(true, artifacts_unused(), &sink);

    let jobs = vec![
        Job::new(host("web1", HostScript::default().panicking(), &log), Arc::clone(&ctx)),
        Job::new(host("web2", HostScript::default().with_agent_delay(20), &log), Arc::clone(&ctx)),
    ];

    let outcomes = runner(&sink).run_all(jobs).await;

    assert_eq!(outcomes.len(), 2);
    let failure = outcomes[0].failure.as_ref().expect("panic recorded");
    assert_eq!(failure.kind, FailureKind::Internal);
    assert!(failure.message.contains("agent exploded"), "got: {}", failure.message);
    assert_eq!(outcomes[0].phase, Phase::Converge);
    assert!(outcomes[1].success);
    // The panicking job still released its connection and reported once.
    assert!(log.contains("web1", "disconnect"));
    let finished = sink.finished();
    assert_eq!(finished.iter().filter(|o| o.target == "web1").count(), 1);
    assert_eq!(finished.iter().filter(|o| o.target == "web2").count(), 1);
}

#[tokio::test]
async fn test_empty_job_list_yields_no_outcomes() {
    let sink = Arc::new(RecordingSink::default());
    let outcomes = runner(&sink).run_all(Vec::new()).await;
    assert!(outcomes.is_empty());
    assert_eq!(sink.finished_count(), 0);
}
