//! `TargetHost`: one target's connection handle and cached facts.
//!
//! Owned by exactly one job for its whole lifetime; the connection state
//! changes only through `connect` and `disconnect`.

use anyhow::Result;
use tracing::{debug, warn};

use crate::application::ports::TargetConnection;
use crate::domain::{FailAs, FailureKind, InstalledAgent, JobFailure, Platform, Target};

/// Lifecycle of the underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connected,
    Failed,
}

pub struct TargetHost {
    target: Target,
    conn: Box<dyn TargetConnection>,
    state: ConnectionState,
    installed: Option<InstalledAgent>,
    platform: Option<Platform>,
}

impl TargetHost {
    #[must_use]
    pub fn new(target: Target, conn: Box<dyn TargetConnection>) -> Self {
        Self {
            target,
            conn,
            state: ConnectionState::Unconnected,
            installed: None,
            platform: None,
        }
    }

    /// Reporting identity of this target.
    #[must_use]
    pub fn id(&self) -> String {
        self.target.id()
    }

    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connect to the target.
    ///
    /// # Errors
    ///
    /// Returns a [`FailureKind::Connection`] failure when the target cannot be
    /// reached or authenticated; the state becomes `Failed`.
    pub async fn connect(&mut self) -> Result<(), JobFailure> {
        debug!(target_host = %self.target, "connecting");
        match self.conn.connect().await.fail_as(FailureKind::Connection) {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(failure) => {
                self.state = ConnectionState::Failed;
                Err(failure)
            }
        }
    }

    /// Disconnect if connected. Best effort: failures are logged.
    pub async fn disconnect(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        if let Err(e) = self.conn.disconnect().await {
            warn!(target_host = %self.target, error = %e, "disconnect failed");
        }
        self.state = ConnectionState::Unconnected;
    }

    /// The connection, available only while connected.
    ///
    /// # Errors
    ///
    /// Returns an error when the host is not connected.
    pub fn connection(&self) -> Result<&dyn TargetConnection> {
        anyhow::ensure!(
            self.state == ConnectionState::Connected,
            "{} is not connected",
            self.target
        );
        Ok(self.conn.as_ref())
    }

    /// Installed agent version, queried once and cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the query itself fails. An absent agent is `Ok`.
    pub async fn installed_agent(&mut self) -> Result<InstalledAgent> {
        if let Some(installed) = &self.installed {
            return Ok(installed.clone());
        }
        let installed = self.connection()?.installed_agent_version().await?;
        debug!(target_host = %self.target, installed = %installed, "agent version");
        self.installed = Some(installed.clone());
        Ok(installed)
    }

    /// Drop the cached agent version, e.g. after an install.
    pub fn forget_installed_agent(&mut self) {
        self.installed = None;
    }

    /// Target platform, probed once and cached.
    ///
    /// # Errors
    ///
    /// Returns an error if probing fails or the platform is unsupported.
    pub async fn platform(&mut self) -> Result<Platform> {
        if let Some(platform) = &self.platform {
            return Ok(platform.clone());
        }
        let platform = self.connection()?.platform().await?;
        self.platform = Some(platform.clone());
        Ok(platform)
    }
}
