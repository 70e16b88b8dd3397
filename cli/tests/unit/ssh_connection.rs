//! Unit tests for the SSH connection, driven through a scripted command runner.

#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pushrun_cli::application::ports::{AgentInvocation, CommandRunner, ConnectionFactory};
use pushrun_cli::domain::{InstalledAgent, Protocol, Target};
use pushrun_cli::infra::ssh::{SshConnectionFactory, SshOptions};
use tempfile::TempDir;

use crate::helpers::{err_output, exit_output, ok_output};
use crate::mocks::{ScriptedRunner, target, version};

fn options(control_dir: &Path, sudo: bool) -> SshOptions {
    SshOptions {
        identity_file: None,
        sudo,
        connect_timeout_secs: 5,
        control_dir: control_dir.to_path_buf(),
    }
}

fn factory(runner: &Arc<ScriptedRunner>, control_dir: &Path, sudo: bool) -> SshConnectionFactory {
    SshConnectionFactory::new(
        options(control_dir, sudo),
        Arc::clone(runner) as Arc<dyn CommandRunner>,
    )
}

fn control_dir() -> TempDir {
    tempfile::tempdir().expect("tempdir")
}

#[tokio::test]
async fn test_installed_version_is_parsed_from_agent_banner() {
    let dir = control_dir();
    let runner = Arc::new(ScriptedRunner::new(vec![ok_output(
        b"Chef Infra Client: 17.10.3\n",
    )]));
    let conn = factory(&runner, dir.path(), false).open(&target("web1"));

    let got = conn.installed_agent_version().await.expect("query succeeds");

    assert_eq!(got, InstalledAgent::Version(version("17.10.3")));
    let calls = runner.calls();
    assert_eq!(calls[0].program, "ssh");
    assert_eq!(calls[0].remote_command(), Some("chef-client -v"));
}

#[tokio::test]
async fn test_missing_agent_binary_is_not_installed() {
    let dir = control_dir();
    let runner = Arc::new(ScriptedRunner::new(vec![err_output(
        127,
        b"bash: chef-client: command not found",
    )]));
    let conn = factory(&runner, dir.path(), false).open(&target("web1"));

    let got = conn.installed_agent_version().await.expect("absence is not an error");

    assert_eq!(got, InstalledAgent::NotInstalled);
}

#[tokio::test]
async fn test_ssh_transport_failure_fails_connect() {
    let dir = control_dir();
    let runner = Arc::new(ScriptedRunner::new(vec![err_output(
        255,
        b"ssh: connect to host web1 port 22: Connection refused",
    )]));
    let conn = factory(&runner, dir.path(), false).open(&target("web1"));

    let err = conn.connect().await.expect_err("exit 255 is a transport failure");

    assert!(format!("{err:#}").contains("Connection refused"), "got: {err:#}");
    assert_eq!(runner.calls()[0].remote_command(), Some("true"));
}

#[tokio::test]
async fn test_password_is_passed_through_environment_only() {
    let dir = control_dir();
    let runner = Arc::new(ScriptedRunner::new(vec![ok_output(b"/tmp/pushrun.AbC123\n")]));
    let target = Target {
        protocol: Protocol::Ssh,
        host: "db1".to_string(),
        port: 22,
        user: Some("deploy".to_string()),
        password: Some("s3cret".to_string()),
    };
    let conn = factory(&runner, dir.path(), false).open(&target);

    let remote_dir = conn.create_remote_dir().await.expect("mktemp succeeds");

    assert_eq!(remote_dir, "/tmp/pushrun.AbC123");
    let call = &runner.calls()[0];
    assert_eq!(call.program, "sshpass");
    assert_eq!(call.args[..2], ["-e", "ssh"]);
    assert!(call.envs.contains(&("SSHPASS".to_string(), "s3cret".to_string())));
    assert!(!call.args.iter().any(|a| a.contains("s3cret")));
    assert!(call.args.contains(&"deploy@db1".to_string()));
}

#[tokio::test]
async fn test_agent_runs_from_work_dir_with_sudo_and_reports_exit_code() {
    let dir = control_dir();
    let runner = Arc::new(ScriptedRunner::new(vec![exit_output(
        35,
        b"Chef Infra Client finished, 3/10 resources updated\n",
    )]));
    let conn = factory(&runner, dir.path(), true).open(&target("web1"));

    let exit = conn
        .run_agent(&AgentInvocation {
            work_dir: "/tmp/pushrun.1".to_string(),
            config_path: "/tmp/pushrun.1/config.rb".to_string(),
            archive_path: "/tmp/pushrun.1/policy.tgz".to_string(),
            run_list: "recipe[pushrun_run::default]".to_string(),
        })
        .await
        .expect("agent ran");

    assert_eq!(exit.code, Some(35));
    assert!(exit.output.contains("resources updated"));
    let calls = runner.calls();
    let command = calls[0].remote_command().expect("remote command");
    assert!(
        command.starts_with("cd /tmp/pushrun.1 && sudo -n chef-client -z"),
        "got: {command}"
    );
    assert!(command.contains("--recipe-url /tmp/pushrun.1/policy.tgz"));
    assert!(command.contains("-o 'recipe[pushrun_run::default]'"));
}

#[tokio::test]
async fn test_missing_remote_file_reads_as_none() {
    let dir = control_dir();
    let runner = Arc::new(ScriptedRunner::new(vec![err_output(1, b"")]));
    let conn = factory(&runner, dir.path(), false).open(&target("web1"));

    let got = conn
        .read_remote_file("/tmp/pushrun.1/cache/chef-stacktrace.out")
        .await
        .expect("read succeeds");

    assert!(got.is_none());
}

#[tokio::test]
async fn test_upload_copies_into_remote_dir_with_scp() {
    let dir = control_dir();
    let runner = Arc::new(ScriptedRunner::new(vec![ok_output(b"")]));
    let conn = factory(&runner, dir.path(), false).open(&target("web1"));

    let remote = conn
        .upload(&PathBuf::from("/tmp/bundle/policy.tgz"), "/tmp/pushrun.1")
        .await
        .expect("upload succeeds");

    assert_eq!(remote, "/tmp/pushrun.1/policy.tgz");
    let call = &runner.calls()[0];
    assert_eq!(call.program, "scp");
    assert_eq!(call.args.last().map(String::as_str), Some("web1:/tmp/pushrun.1/policy.tgz"));
}
