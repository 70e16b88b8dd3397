//! Unit tests for the converge state machine.

#![allow(clippy::expect_used)]

use std::sync::Arc;

use pushrun_cli::application::ports::StatusSink;
use pushrun_cli::application::services::converge::Converger;
use pushrun_cli::application::services::host::TargetHost;
use pushrun_cli::application::services::job::TargetReporter;
use pushrun_cli::domain::{ConvergeEvent, ConvergeOutcome, FailureKind, JobEvent};

use crate::mocks::{CallLog, HostScript, RecordingSink, archive, host};

async fn connected(script: HostScript, log: &CallLog) -> TargetHost {
    let mut host = host("db1", script, log);
    host.connect().await.expect("fake connect succeeds");
    host
}

fn reporter(sink: &Arc<RecordingSink>) -> TargetReporter {
    TargetReporter::new("db1", Arc::clone(sink) as Arc<dyn StatusSink>)
}

#[tokio::test]
async fn test_clean_exit_converges_and_cleans_up() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let host = connected(HostScript::default(), &log).await;

    let outcome = Converger::new()
        .run(&host, &archive(), &reporter(&sink))
        .await
        .expect("converge succeeds");

    assert_eq!(outcome, ConvergeOutcome::Success);
    assert_eq!(
        log.for_host("db1"),
        vec![
            "connect",
            "mkdir /tmp/pushrun.0",
            "upload config.rb",
            "upload policy.tgz",
            "agent recipe[pushrun_run::default]",
            "rmdir /tmp/pushrun.0",
        ]
    );
    assert_eq!(
        sink.events_for("db1"),
        vec![
            JobEvent::Converge(ConvergeEvent::CreatingRemotePolicy),
            JobEvent::Converge(ConvergeEvent::RunningAgent),
        ]
    );
}

#[tokio::test]
async fn test_reboot_exit_codes_are_successful_converges() {
    for code in [35, 37] {
        let log = CallLog::default();
        let sink = Arc::new(RecordingSink::default());
        let host = connected(HostScript::default().with_agent_exit(Some(code)), &log).await;

        let outcome = Converger::new()
            .run(&host, &archive(), &reporter(&sink))
            .await
            .expect("reboot codes are not failures");

        assert_eq!(outcome, ConvergeOutcome::RebootRequired, "exit code {code}");
    }
}

#[tokio::test]
async fn test_failed_run_attaches_remote_stacktrace() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let script = HostScript::default()
        .with_agent_exit(Some(1))
        .with_stacktrace("Errno::EACCES: Permission denied @ rb_sysopen - /etc/motd");
    let host = connected(script, &log).await;

    let failure = Converger::new()
        .run(&host, &archive(), &reporter(&sink))
        .await
        .expect_err("exit code 1 is a failure");

    assert_eq!(failure.kind, FailureKind::Converge);
    assert_eq!(failure.message, "agent run failed with exit code 1");
    assert_eq!(
        failure.detail.as_deref(),
        Some("Errno::EACCES: Permission denied @ rb_sysopen - /etc/motd")
    );
    assert!(log.contains("db1", "read /tmp/pushrun.0/cache/chef-stacktrace.out"));
    assert!(log.contains("db1", "rmdir /tmp/pushrun.0"), "work dir removed on failure too");
}

#[tokio::test]
async fn test_failed_run_without_stacktrace_falls_back_to_output_tail() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let script = HostScript::default()
        .with_agent_exit(Some(2))
        .with_agent_output("Starting Chef Infra Client\nFATAL: compile error\n");
    let host = connected(script, &log).await;

    let failure = Converger::new()
        .run(&host, &archive(), &reporter(&sink))
        .await
        .expect_err("exit code 2 is a failure");

    assert_eq!(failure.message, "agent run failed with exit code 2");
    let detail = failure.detail.expect("output tail attached");
    assert!(detail.ends_with("FATAL: compile error"), "got: {detail}");
}

#[tokio::test]
async fn test_agent_killed_by_signal_is_a_failure() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let host = connected(HostScript::default().with_agent_exit(None), &log).await;

    let failure = Converger::new()
        .run(&host, &archive(), &reporter(&sink))
        .await
        .expect_err("a killed agent is a failure");

    assert_eq!(failure.kind, FailureKind::Converge);
    assert!(failure.detail.is_none());
}

#[tokio::test]
async fn test_unconnected_host_is_rejected_before_any_remote_call() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let host = host("db1", HostScript::default(), &log);

    let failure = Converger::new()
        .run(&host, &archive(), &reporter(&sink))
        .await
        .expect_err("converging an unconnected host must fail");

    assert_eq!(failure.kind, FailureKind::Converge);
    assert!(log.for_host("db1").is_empty());
}
