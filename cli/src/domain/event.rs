//! Progress events emitted by the per-target state machines.
//!
//! Events are closed enums; the presentation layer maps each variant to a
//! message with an exhaustive `match`.

use semver::Version;

use crate::domain::platform::Platform;

/// Agent-install state machine transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    /// Querying the installed agent version.
    Checking,
    /// Installed version meets the minimum.
    AlreadyInstalled { version: Version },
    /// Platform probed and an artifact is being located.
    LocatingArtifact { platform: Platform },
    Downloading { version: Version },
    Uploading,
    Installing,
    InstallComplete { version: Version },
}

/// Converge state machine transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergeEvent {
    CreatingRemotePolicy,
    RunningAgent,
}

/// Any event a job may report for its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Connecting,
    Connected,
    Install(InstallEvent),
    Converge(ConvergeEvent),
}

impl From<InstallEvent> for JobEvent {
    fn from(e: InstallEvent) -> Self {
        Self::Install(e)
    }
}

impl From<ConvergeEvent> for JobEvent {
    fn from(e: ConvergeEvent) -> Self {
        Self::Converge(e)
    }
}
