//! Unit tests for the agent install state machine.

#![allow(clippy::expect_used)]

use std::sync::Arc;

use pushrun_cli::application::ports::StatusSink;
use pushrun_cli::application::services::host::TargetHost;
use pushrun_cli::application::services::install::InstallReport;
use pushrun_cli::application::services::job::TargetReporter;
use pushrun_cli::domain::{FailureKind, InstallEvent, InstalledAgent, JobEvent};

use crate::mocks::{
    CallLog, HostScript, MockArtifacts, RecordingSink, artifacts_serving, artifacts_unused,
    descriptor, host, installed, installer, ubuntu, version,
};

async fn connected(script: HostScript, log: &CallLog) -> TargetHost {
    let mut host = host("web1", script, log);
    host.connect().await.expect("fake connect succeeds");
    host
}

fn reporter(sink: &Arc<RecordingSink>) -> TargetReporter {
    TargetReporter::new("web1", Arc::clone(sink) as Arc<dyn StatusSink>)
}

#[tokio::test]
async fn test_version_equal_to_minimum_skips_install() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let mut host = connected(HostScript::default().with_installed(installed("15.3.14")), &log).await;

    let report = installer(true, artifacts_unused())
        .run(&mut host, &reporter(&sink))
        .await
        .expect("install step succeeds");

    assert_eq!(report, InstallReport::AlreadySatisfied(version("15.3.14")));
    assert_eq!(
        sink.events_for("web1"),
        vec![
            JobEvent::Install(InstallEvent::Checking),
            JobEvent::Install(InstallEvent::AlreadyInstalled {
                version: version("15.3.14")
            }),
        ]
    );
    assert_eq!(log.for_host("web1"), vec!["connect", "version"]);
}

#[tokio::test]
async fn test_check_only_fails_without_contacting_artifact_source() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let mut host = connected(HostScript::default().with_installed(installed("14.1.1")), &log).await;

    let failure = installer(false, artifacts_unused())
        .run(&mut host, &reporter(&sink))
        .await
        .expect_err("check-only with an old agent must fail");

    assert_eq!(failure.kind, FailureKind::CheckOnly);
    assert!(
        failure.message.contains("agent 14.1.1 found"),
        "got: {}",
        failure.message
    );
    assert!(failure.message.contains("15.3.14 or later"));
    assert!(!log.for_host("web1").iter().any(|c| c == "platform"));
}

#[tokio::test]
async fn test_check_only_with_missing_agent_reports_no_agent() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let mut host =
        connected(HostScript::default().with_installed(InstalledAgent::NotInstalled), &log).await;

    let failure = installer(false, artifacts_unused())
        .run(&mut host, &reporter(&sink))
        .await
        .expect_err("check-only without an agent must fail");

    assert_eq!(failure.kind, FailureKind::CheckOnly);
    assert!(failure.message.starts_with("no agent found"), "got: {}", failure.message);
}

#[tokio::test]
async fn test_upgrade_walks_every_install_state_in_order() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let script = HostScript::default()
        .with_installed(installed("14.1.1"))
        .with_after_install(installed("18.4.2"));
    let mut host = connected(script, &log).await;

    let report = installer(true, artifacts_serving("18.4.2"))
        .run(&mut host, &reporter(&sink))
        .await
        .expect("upgrade succeeds");

    assert_eq!(report, InstallReport::Installed(version("18.4.2")));
    assert_eq!(
        sink.events_for("web1"),
        vec![
            JobEvent::Install(InstallEvent::Checking),
            JobEvent::Install(InstallEvent::LocatingArtifact { platform: ubuntu() }),
            JobEvent::Install(InstallEvent::Downloading {
                version: version("18.4.2")
            }),
            JobEvent::Install(InstallEvent::Uploading),
            JobEvent::Install(InstallEvent::Installing),
            JobEvent::Install(InstallEvent::InstallComplete {
                version: version("18.4.2")
            }),
        ]
    );
    assert_eq!(
        log.for_host("web1"),
        vec![
            "connect",
            "version",
            "platform",
            "mkdir /tmp/pushrun.0",
            "upload chef_18.4.2-1_amd64.deb",
            "install /tmp/pushrun.0/chef_18.4.2-1_amd64.deb",
            "version",
            "rmdir /tmp/pushrun.0",
        ]
    );
}

#[tokio::test]
async fn test_fresh_install_when_agent_is_missing() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let script = HostScript::default()
        .with_installed(InstalledAgent::NotInstalled)
        .with_after_install(installed("18.4.2"));
    let mut host = connected(script, &log).await;

    let report = installer(true, artifacts_serving("18.4.2"))
        .run(&mut host, &reporter(&sink))
        .await
        .expect("fresh install succeeds");

    assert_eq!(report, InstallReport::Installed(version("18.4.2")));
}

#[tokio::test]
async fn test_agent_still_old_after_install_is_remote_install_failure() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let script = HostScript::default()
        .with_installed(installed("14.1.1"))
        .with_after_install(installed("14.1.1"));
    let mut host = connected(script, &log).await;

    let failure = installer(true, artifacts_serving("18.4.2"))
        .run(&mut host, &reporter(&sink))
        .await
        .expect_err("an unchanged version must fail");

    assert_eq!(failure.kind, FailureKind::RemoteInstall);
    assert!(failure.message.contains("14.1.1"), "got: {}", failure.message);
    assert!(log.contains("web1", "rmdir /tmp/pushrun.0"), "staging dir must be removed");
    assert!(
        !sink
            .events_for("web1")
            .iter()
            .any(|e| matches!(e, JobEvent::Install(InstallEvent::InstallComplete { .. })))
    );
}

#[tokio::test]
async fn test_download_failure_is_classified_and_nothing_is_uploaded() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let mut host = connected(HostScript::default().with_installed(installed("14.1.1")), &log).await;

    let mut artifacts = MockArtifacts::new();
    artifacts
        .expect_locate()
        .times(1)
        .returning(|_| Ok(descriptor("18.4.2")));
    artifacts
        .expect_download()
        .times(1)
        .returning(|_| Err(anyhow::anyhow!("checksum mismatch")));

    let failure = installer(true, Arc::new(artifacts))
        .run(&mut host, &reporter(&sink))
        .await
        .expect_err("download failure must fail the install");

    assert_eq!(failure.kind, FailureKind::Download);
    assert!(failure.message.contains("checksum mismatch"), "got: {}", failure.message);
    assert!(!log.for_host("web1").iter().any(|c| c.starts_with("mkdir")));
}

#[tokio::test]
async fn test_unknown_platform_artifact_is_lookup_failure() {
    let log = CallLog::default();
    let sink = Arc::new(RecordingSink::default());
    let mut host = connected(HostScript::default().with_installed(installed("14.1.1")), &log).await;

    let mut artifacts = MockArtifacts::new();
    artifacts
        .expect_locate()
        .returning(|_| Err(anyhow::anyhow!("no release for ubuntu 22.04")));
    artifacts.expect_download().never();

    let failure = installer(true, Arc::new(artifacts))
        .run(&mut host, &reporter(&sink))
        .await
        .expect_err("lookup failure must fail the install");

    assert_eq!(failure.kind, FailureKind::ArtifactLookup);
}
