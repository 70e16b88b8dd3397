//! Agent install state machine.
//!
//! `Checking → AlreadyInstalled` or
//! `Checking → LocatingArtifact → Downloading → Uploading → Installing → InstallComplete`.
//! Each step's failure is classified so the aggregate report can tell an
//! unreachable package mirror from a failing package manager.

use std::sync::Arc;

use anyhow::Context;
use semver::Version;
use tracing::{info, warn};

use crate::application::ports::ArtifactSource;
use crate::application::services::host::TargetHost;
use crate::application::services::job::TargetReporter;
use crate::domain::config::AgentConfig;
use crate::domain::{
    FailAs, FailureKind, InstallDecision, InstallEvent, InstalledAgent, JobFailure, Platform,
    decide,
};

/// What the installer left on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallReport {
    /// The installed agent already met the minimum.
    AlreadySatisfied(Version),
    /// A package was installed; the target now reports this version.
    Installed(Version),
}

pub struct AgentInstaller {
    minimum: Version,
    install_enabled: bool,
    artifacts: Arc<dyn ArtifactSource>,
}

impl AgentInstaller {
    /// # Errors
    ///
    /// Returns an error if the configured minimum version does not parse.
    pub fn new(config: &AgentConfig, artifacts: Arc<dyn ArtifactSource>) -> anyhow::Result<Self> {
        Ok(Self {
            minimum: config.minimum()?,
            install_enabled: config.install,
            artifacts,
        })
    }

    #[must_use]
    pub fn minimum(&self) -> &Version {
        &self.minimum
    }

    /// Ensure a sufficient agent is present on a connected host.
    ///
    /// # Errors
    ///
    /// Returns a classified [`JobFailure`] for the step that failed. With
    /// installation disabled and the requirement unmet, fails with
    /// [`FailureKind::CheckOnly`] without contacting the artifact source.
    pub async fn run(
        &self,
        host: &mut TargetHost,
        reporter: &TargetReporter,
    ) -> Result<InstallReport, JobFailure> {
        reporter.emit(InstallEvent::Checking);
        let installed = host
            .installed_agent()
            .await
            .context("failed to query installed agent version")
            .fail_as(FailureKind::Connection)?;

        let decision = decide(&installed, &self.minimum, self.install_enabled);
        info!(target_host = %host.id(), ?decision, minimum = %self.minimum, "install decision");

        match decision {
            InstallDecision::AlreadySatisfied { installed } => {
                reporter.emit(InstallEvent::AlreadyInstalled { version: installed.clone() });
                Ok(InstallReport::AlreadySatisfied(installed))
            }
            InstallDecision::CheckOnlySkip { installed } => {
                let found = installed.map_or_else(|| "no agent".to_string(), |v| format!("agent {v}"));
                Err(JobFailure::new(
                    FailureKind::CheckOnly,
                    format!(
                        "{found} found, {} or later required, and installation is disabled",
                        self.minimum
                    ),
                ))
            }
            InstallDecision::Upgrade { .. } | InstallDecision::FreshInstall => {
                self.install(host, reporter).await.map(InstallReport::Installed)
            }
        }
    }

    async fn install(
        &self,
        host: &mut TargetHost,
        reporter: &TargetReporter,
    ) -> Result<Version, JobFailure> {
        let platform = host
            .platform()
            .await
            .context("failed to detect target platform")
            .fail_as(FailureKind::ArtifactLookup)?;
        reporter.emit(InstallEvent::LocatingArtifact { platform: platform.clone() });

        let artifact = self
            .artifacts
            .locate(&platform)
            .await
            .with_context(|| format!("no agent package found for {platform}"))
            .fail_as(FailureKind::ArtifactLookup)?;

        reporter.emit(InstallEvent::Downloading { version: artifact.version.clone() });
        let local = self
            .artifacts
            .download(&artifact)
            .await
            .with_context(|| format!("failed to download {}", artifact.url))
            .fail_as(FailureKind::Download)?;

        let conn = host.connection().fail_as(FailureKind::Upload)?;
        reporter.emit(InstallEvent::Uploading);
        let remote_dir = conn
            .create_remote_dir()
            .await
            .context("failed to create remote staging directory")
            .fail_as(FailureKind::Upload)?;

        let installed = self
            .upload_and_install(host, &platform, &local, &remote_dir, reporter)
            .await;

        if let Ok(conn) = host.connection()
            && let Err(e) = conn.remove_remote_dir(&remote_dir).await
        {
            warn!(target_host = %host.id(), dir = %remote_dir, error = %e, "failed to clean up staging directory");
        }

        let version = installed?;
        reporter.emit(InstallEvent::InstallComplete { version: version.clone() });
        Ok(version)
    }

    async fn upload_and_install(
        &self,
        host: &mut TargetHost,
        platform: &Platform,
        local: &std::path::Path,
        remote_dir: &str,
        reporter: &TargetReporter,
    ) -> Result<Version, JobFailure> {
        let conn = host.connection().fail_as(FailureKind::Upload)?;
        let remote_path = conn
            .upload(local, remote_dir)
            .await
            .context("failed to upload agent package")
            .fail_as(FailureKind::Upload)?;

        reporter.emit(InstallEvent::Installing);
        conn.run_remote_install(&remote_path, platform.package)
            .await
            .context("package installation failed")
            .fail_as(FailureKind::RemoteInstall)?;

        host.forget_installed_agent();
        let installed = host
            .installed_agent()
            .await
            .context("failed to re-read agent version after install")
            .fail_as(FailureKind::RemoteInstall)?;

        match installed {
            InstalledAgent::Version(v) if v >= self.minimum => Ok(v),
            other => Err(JobFailure::new(
                FailureKind::RemoteInstall,
                format!(
                    "agent reports {other} after install, {} or later required",
                    self.minimum
                ),
            )),
        }
    }
}
