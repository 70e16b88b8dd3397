//! Unit tests for the run use-case: validation, single and multi-target
//! modes, failure aggregation and bundle lifetime.

#![allow(clippy::expect_used)]

use std::sync::Arc;

use pushrun_cli::application::ports::{BundleBuilder, ConfigBundle, StatusSink};
use pushrun_cli::application::services::run::{RunDeps, RunError, RunRequest, run_converge};
use pushrun_cli::domain::{
    AggregateResult, ConvergeEvent, ConvergeOutcome, FailureKind, InstallEvent, JobEvent, Phase,
    ResolutionError, RunConfig, ValidationError, WorkItem,
};

use crate::mocks::{
    FakeBundleBuilder, FakeFactory, HostScript, NoopReporter, RecordingSink, artifacts_unused,
    installed, version,
};

fn recipe_request(targets: &str) -> RunRequest {
    RunRequest {
        targets: targets.to_string(),
        subject: "apache2::default".to_string(),
        name: None,
        properties: Vec::new(),
    }
}

fn resource_request(targets: &str, properties: &[&str]) -> RunRequest {
    RunRequest {
        targets: targets.to_string(),
        subject: "file".to_string(),
        name: Some("/etc/motd".to_string()),
        properties: properties.iter().map(|p| (*p).to_string()).collect(),
    }
}

struct Rig {
    factory: FakeFactory,
    sink: Arc<RecordingSink>,
    bundles: FakeBundleBuilder,
}

impl Rig {
    fn new(factory: FakeFactory) -> Self {
        let sink = Arc::new(RecordingSink::default());
        let bundles = FakeBundleBuilder::new(Arc::clone(&sink));
        Self {
            factory,
            sink,
            bundles,
        }
    }

    async fn run(&self, request: &RunRequest) -> Result<AggregateResult, RunError> {
        self.run_with(request, &RunConfig::default()).await
    }

    async fn run_with(
        &self,
        request: &RunRequest,
        config: &RunConfig,
    ) -> Result<AggregateResult, RunError> {
        let deps = RunDeps {
            connections: &self.factory,
            artifacts: artifacts_unused(),
            bundles: &self.bundles,
            sink: Arc::clone(&self.sink) as Arc<dyn StatusSink>,
        };
        run_converge(request, config, deps, &NoopReporter).await
    }
}

#[tokio::test]
async fn test_single_target_resource_run_succeeds() {
    let rig = Rig::new(FakeFactory::default());

    let result = rig
        .run(&resource_request("web1", &["content=hello", "mode=0644"]))
        .await
        .expect("run succeeds");

    assert!(result.is_success());
    assert_eq!(result.outcomes.len(), 1);
    assert_eq!(result.outcomes[0].target, "web1");
    assert_eq!(rig.bundles.snapshot().built, vec!["file[/etc/motd]"]);
    assert_eq!(rig.bundles.snapshot().deleted, 1);
}

#[tokio::test]
async fn test_single_target_failure_is_returned_as_is() {
    let rig = Rig::new(
        FakeFactory::default().with_host("web1", HostScript::default().with_agent_exit(Some(1))),
    );

    let err = rig
        .run(&recipe_request("web1"))
        .await
        .expect_err("agent failure fails the run");

    match &err {
        RunError::Target { target, failure } => {
            assert_eq!(target, "web1");
            assert_eq!(failure.kind, FailureKind::Converge);
        }
        other => panic!("expected a single-target failure, got {other:?}"),
    }
    assert_eq!(err.code(), "converge_error");
    assert_eq!(rig.bundles.snapshot().deleted, 1);
}

#[tokio::test]
async fn test_unreachable_target_among_three_yields_multi_target_failure() {
    let rig = Rig::new(
        FakeFactory::default().with_host("web2", HostScript::unreachable("connection timed out")),
    );

    let err = rig
        .run(&recipe_request("web[1:3]"))
        .await
        .expect_err("one failed target fails the run");

    let RunError::MultiTarget(multi) = &err else {
        panic!("expected a multi-target failure, got {err:?}");
    };
    assert_eq!(multi.total(), 3);
    let outcomes = &multi.result.outcomes;
    assert_eq!(outcomes.len(), 3);
    let failures: Vec<_> = multi.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].target, "web2");
    assert_eq!(failures[0].phase, Phase::Connect);
    assert_eq!(
        failures[0].failure.as_ref().map(|f| f.kind),
        Some(FailureKind::Connection)
    );
    for ok in [&outcomes[0], &outcomes[2]] {
        assert!(ok.success, "{ok:?}");
        assert_eq!(ok.converge, Some(ConvergeOutcome::Success));
    }
    assert_eq!(err.to_string(), "1 of 3 targets failed");
    assert_eq!(err.code(), "multi_target_failure");
    // The healthy targets still converged.
    assert!(rig.factory.log.contains("web1", "agent recipe[pushrun_run::default]"));
    assert!(rig.factory.log.contains("web3", "agent recipe[pushrun_run::default]"));
}

#[tokio::test]
async fn test_every_target_failing_is_still_one_uniform_failure() {
    let rig = Rig::new(
        FakeFactory::default()
            .with_host("a", HostScript::unreachable("refused"))
            .with_host("b", HostScript::default().with_agent_exit(Some(1))),
    );

    let err = rig.run(&recipe_request("a,b")).await.expect_err("both fail");

    let RunError::MultiTarget(failure) = err else {
        panic!("expected a multi-target failure");
    };
    let targets: Vec<_> = failure.failures().map(|o| o.target.as_str()).collect();
    assert_eq!(targets, vec!["a", "b"]);
}

#[tokio::test]
async fn test_malformed_property_fails_before_any_target_is_resolved() {
    let rig = Rig::new(FakeFactory::default());

    let err = rig
        .run(&resource_request("web[1:3]", &["mode"]))
        .await
        .expect_err("malformed property is rejected");

    assert!(matches!(
        err,
        RunError::Validation(ValidationError::MalformedProperty(ref p)) if p == "mode"
    ));
    assert_eq!(rig.factory.opened(), 0);
    assert!(rig.factory.log.all().is_empty());
    assert!(rig.sink.resolved_ids().is_empty());
    assert!(rig.bundles.snapshot().built.is_empty());
}

#[tokio::test]
async fn test_resolved_targets_are_reported_once_before_jobs_start() {
    let rig = Rig::new(FakeFactory::default());

    rig.run(&recipe_request("web[1:2],db:2222"))
        .await
        .expect("run succeeds");

    assert_eq!(
        rig.sink.resolved_ids(),
        vec![vec!["web1".to_string(), "web2".to_string(), "db:2222".to_string()]]
    );
}

#[tokio::test]
async fn test_recipe_path_with_agent_at_minimum_skips_install_and_converges() {
    let rig = Rig::new(
        FakeFactory::default()
            .with_host("web1", HostScript::default().with_installed(installed("18.4.2"))),
    );
    let mut config = RunConfig::default();
    config.agent.minimum_version = "18.4.2".to_string();
    let request = RunRequest {
        targets: "web1".to_string(),
        subject: "site/recipes/default.rb".to_string(),
        name: None,
        properties: Vec::new(),
    };

    let result = rig.run_with(&request, &config).await.expect("run succeeds");

    assert!(result.is_success());
    assert_eq!(result.outcomes[0].converge, Some(ConvergeOutcome::Success));
    assert_eq!(
        rig.bundles.snapshot().built,
        vec!["recipe site/recipes/default.rb"]
    );
    let events = rig.sink.events_for("web1");
    assert!(
        events.contains(&JobEvent::Install(InstallEvent::AlreadyInstalled {
            version: version("18.4.2")
        })),
        "{events:?}"
    );
    assert!(events.contains(&JobEvent::Converge(ConvergeEvent::RunningAgent)));
    let calls = rig.factory.log.for_host("web1");
    assert!(!calls.iter().any(|c| c.starts_with("install ")), "{calls:?}");
}

#[tokio::test]
async fn test_bad_target_spec_fails_before_bundle_is_built() {
    let rig = Rig::new(FakeFactory::default());

    let err = rig
        .run(&recipe_request("web[3:1]"))
        .await
        .expect_err("reversed range is rejected");

    assert!(matches!(err, RunError::Resolution(ResolutionError::Malformed { .. })));
    assert_eq!(err.code(), "resolution_error");
    assert!(rig.bundles.snapshot().built.is_empty());
}

#[tokio::test]
async fn test_bundle_is_deleted_once_after_every_job_finished() {
    let rig = Rig::new(
        FakeFactory::default()
            .with_host("web1", HostScript::default().with_agent_delay(80))
            .with_host("web4", HostScript::unreachable("refused")),
    );

    let _ = rig.run(&recipe_request("web[1:4]")).await;

    let bundles = rig.bundles.snapshot();
    assert_eq!(bundles.built.len(), 1);
    assert_eq!(bundles.deleted, 1);
    assert_eq!(bundles.finished_at_delete, Some(4));
    assert_eq!(rig.sink.finished_count(), 4);
}

#[tokio::test]
async fn test_jobs_share_one_archive() {
    let rig = Rig::new(FakeFactory::default());

    rig.run(&recipe_request("a,b")).await.expect("run succeeds");

    for target in ["a", "b"] {
        let calls = rig.factory.log.for_host(target);
        assert!(calls.contains(&"upload policy.tgz".to_string()), "{target}: {calls:?}");
    }
    assert_eq!(rig.bundles.snapshot().built.len(), 1);
}

struct MissingRecipe;

impl BundleBuilder for MissingRecipe {
    fn build(&self, _work: &WorkItem) -> anyhow::Result<Box<dyn ConfigBundle>> {
        Err(ValidationError::RecipeNotFound("apache2::default".to_string()).into())
    }
}

#[tokio::test]
async fn test_missing_recipe_is_a_validation_error_and_no_job_runs() {
    let factory = FakeFactory::default();
    let sink = Arc::new(RecordingSink::default());
    let deps = RunDeps {
        connections: &factory,
        artifacts: artifacts_unused(),
        bundles: &MissingRecipe,
        sink: Arc::clone(&sink) as Arc<dyn StatusSink>,
    };

    let err = run_converge(&recipe_request("web1"), &RunConfig::default(), deps, &NoopReporter)
        .await
        .expect_err("missing recipe fails the run");

    assert!(matches!(err, RunError::Validation(ValidationError::RecipeNotFound(_))));
    assert_eq!(err.code(), "validation_error");
    assert!(factory.log.all().is_empty());
    assert_eq!(sink.finished_count(), 0);
}
