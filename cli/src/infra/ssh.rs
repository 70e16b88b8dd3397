//! SSH implementation of the `TargetConnection` port.
//!
//! Shells out to the system `ssh` and `scp`. One control master per target
//! multiplexes every remote command; `connect` opens it and `disconnect`
//! closes it. Password credentials go through `sshpass -e`, so the secret
//! travels in the environment, not on the command line.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::application::ports::{
    AgentExit, AgentInvocation, CommandRunner, ConnectionFactory, TargetConnection,
};
use crate::domain::agent::parse_version_output;
use crate::domain::config::ConnectionConfig;
use crate::domain::platform::detect;
use crate::domain::{InstalledAgent, PackageKind, Platform, Target};

/// Exit status `ssh` itself uses for connection and authentication errors.
const SSH_ERROR: i32 = 255;

/// Settings shared by every SSH connection of a run.
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub identity_file: Option<PathBuf>,
    pub sudo: bool,
    pub connect_timeout_secs: u64,
    /// Directory holding control-master sockets.
    pub control_dir: PathBuf,
}

impl SshOptions {
    #[must_use]
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            identity_file: config.identity_file.clone(),
            sudo: config.sudo,
            connect_timeout_secs: config.connect_timeout_secs,
            control_dir: std::env::temp_dir().join("pushrun-cm"),
        }
    }
}

pub struct SshConnectionFactory {
    options: SshOptions,
    runner: Arc<dyn CommandRunner>,
}

impl SshConnectionFactory {
    #[must_use]
    pub fn new(options: SshOptions, runner: Arc<dyn CommandRunner>) -> Self {
        Self { options, runner }
    }
}

impl ConnectionFactory for SshConnectionFactory {
    fn open(&self, target: &Target) -> Box<dyn TargetConnection> {
        Box::new(SshConnection {
            target: target.clone(),
            options: self.options.clone(),
            runner: Arc::clone(&self.runner),
        })
    }
}

pub struct SshConnection {
    target: Target,
    options: SshOptions,
    runner: Arc<dyn CommandRunner>,
}

impl SshConnection {
    /// Options common to `ssh` and `scp`.
    fn common_options(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.options.connect_timeout_secs),
            "-o".to_string(),
            "ControlMaster=auto".to_string(),
            "-o".to_string(),
            format!("ControlPath={}/%C", self.options.control_dir.display()),
            "-o".to_string(),
            "ControlPersist=300".to_string(),
        ];
        if self.target.password.is_some() {
            args.extend(["-o".to_string(), "NumberOfPasswordPrompts=1".to_string()]);
        } else {
            args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
        }
        if let Some(identity) = &self.options.identity_file {
            args.extend(["-i".to_string(), identity.display().to_string()]);
        }
        args
    }

    /// Full `ssh` argument list for a remote shell command.
    fn ssh_args(&self, remote_command: &str) -> Vec<String> {
        let mut args = self.common_options();
        args.extend(["-p".to_string(), self.target.port.to_string()]);
        args.push(self.target.destination());
        args.push("--".to_string());
        args.push(remote_command.to_string());
        args
    }

    /// Full `scp` argument list copying `local` into `remote_path`.
    fn scp_args(&self, local: &Path, remote_path: &str) -> Vec<String> {
        let mut args = self.common_options();
        args.extend(["-P".to_string(), self.target.port.to_string()]);
        args.push(local.display().to_string());
        args.push(format!("{}:{remote_path}", self.target.destination()));
        args
    }

    /// Prefix a command with non-interactive sudo when enabled.
    fn privileged(&self, command: &str) -> String {
        if self.options.sudo {
            format!("sudo -n {command}")
        } else {
            command.to_string()
        }
    }

    async fn invoke(&self, program: &str, args: Vec<String>) -> Result<Output> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match &self.target.password {
            Some(password) => {
                let mut wrapped = vec!["-e", program];
                wrapped.extend(args);
                self.runner
                    .run_with_env("sshpass", &wrapped, &[("SSHPASS", password.as_str())])
                    .await
            }
            None => self.runner.run(program, &args).await,
        }
    }

    /// Run a remote command. Fails only when `ssh` itself fails.
    async fn exec(&self, remote_command: &str) -> Result<Output> {
        debug!(target_host = %self.target, command = remote_command, "ssh exec");
        let output = self.invoke("ssh", self.ssh_args(remote_command)).await?;
        if output.status.code() == Some(SSH_ERROR) {
            anyhow::bail!(
                "ssh to {} failed: {}",
                self.target,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output)
    }

    /// Run a remote command that must succeed, returning its stdout.
    async fn exec_ok(&self, remote_command: &str) -> Result<String> {
        let output = self.exec(remote_command).await?;
        anyhow::ensure!(
            output.status.success(),
            "`{remote_command}` failed on {}: {}",
            self.target,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TargetConnection for SshConnection {
    async fn connect(&self) -> Result<()> {
        std::fs::create_dir_all(&self.options.control_dir).with_context(|| {
            format!("cannot create {}", self.options.control_dir.display())
        })?;
        let output = self.exec("true").await?;
        anyhow::ensure!(
            output.status.success(),
            "cannot open a shell on {}: {}",
            self.target,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut args = self.common_options();
        args.extend([
            "-p".to_string(),
            self.target.port.to_string(),
            "-O".to_string(),
            "exit".to_string(),
            self.target.destination(),
        ]);
        let output = self.invoke("ssh", args).await?;
        anyhow::ensure!(
            output.status.success(),
            "failed to close control connection: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
        Ok(())
    }

    async fn installed_agent_version(&self) -> Result<InstalledAgent> {
        let output = self.exec("chef-client -v").await?;
        Ok(parse_version_output(
            output.status.code(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        ))
    }

    async fn platform(&self) -> Result<Platform> {
        let stdout = self
            .exec_ok("uname -s && uname -m && cat /etc/os-release")
            .await?;
        let mut lines = stdout.splitn(3, '\n');
        let kernel = lines.next().unwrap_or_default().trim();
        let machine = lines.next().unwrap_or_default().trim();
        let os_release = lines.next().unwrap_or_default();
        detect(kernel, machine, os_release)
    }

    async fn create_remote_dir(&self) -> Result<String> {
        let stdout = self.exec_ok("mktemp -d /tmp/pushrun.XXXXXXXX").await?;
        let dir = stdout.trim();
        anyhow::ensure!(!dir.is_empty(), "mktemp returned no directory");
        Ok(dir.to_string())
    }

    async fn upload(&self, local: &Path, remote_dir: &str) -> Result<String> {
        let name = local
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("{} has no file name", local.display()))?
            .to_string_lossy();
        let remote_path = format!("{remote_dir}/{name}");
        debug!(target_host = %self.target, local = %local.display(), remote = %remote_path, "scp upload");
        let output = self.invoke("scp", self.scp_args(local, &remote_path)).await?;
        anyhow::ensure!(
            output.status.success(),
            "scp of {} to {} failed: {}",
            local.display(),
            self.target,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        Ok(remote_path)
    }

    async fn run_remote_install(&self, remote_path: &str, package: PackageKind) -> Result<()> {
        let command = shell_join(&package.install_command(remote_path));
        self.exec_ok(&self.privileged(&command)).await?;
        Ok(())
    }

    async fn run_agent(&self, invocation: &AgentInvocation) -> Result<AgentExit> {
        let agent = shell_join(&[
            "chef-client",
            "-z",
            "--chef-license",
            "accept-no-persist",
            "-c",
            invocation.config_path.as_str(),
            "--recipe-url",
            invocation.archive_path.as_str(),
            "-o",
            invocation.run_list.as_str(),
        ]);
        let command = format!(
            "cd {} && {}",
            shell_quote(&invocation.work_dir),
            self.privileged(&agent)
        );
        let output = self.exec(&command).await?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(AgentExit {
            code: output.status.code(),
            output: combined,
        })
    }

    async fn read_remote_file(&self, path: &str) -> Result<Option<String>> {
        let quoted = shell_quote(path);
        let output = self
            .exec(&self.privileged(&format!("sh -c 'test -f \"$1\" && cat \"$1\"' _ {quoted}")))
            .await?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
        } else {
            Ok(None)
        }
    }

    async fn remove_remote_dir(&self, path: &str) -> Result<()> {
        self.exec_ok(&self.privileged(&format!("rm -rf {}", shell_quote(path))))
            .await?;
        Ok(())
    }
}

/// Quote one word for a POSIX shell.
fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c))
    {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

fn shell_join<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
