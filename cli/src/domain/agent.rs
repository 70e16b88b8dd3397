//! Agent version detection and the install decision.
//!
//! "Not installed" is an ordinary value here, so deciding what to do with a
//! target is a pure function over [`InstalledAgent`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use serde::Serialize;

use crate::domain::config::parse_loose_version;

/// Exit code returned by a shell when the requested command does not exist.
pub const COMMAND_NOT_FOUND: i32 = 127;

static VERSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // compile-time constant pattern
    Regex::new(r"Chef(?: Infra Client)?:\s*(\d+(?:\.\d+){0,2})").expect("valid regex")
});

/// What the target reported about its agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstalledAgent {
    Version(Version),
    NotInstalled,
}

impl InstalledAgent {
    #[must_use]
    pub fn version(&self) -> Option<&Version> {
        match self {
            Self::Version(v) => Some(v),
            Self::NotInstalled => None,
        }
    }
}

impl fmt::Display for InstalledAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version(v) => write!(f, "{v}"),
            Self::NotInstalled => f.write_str("not installed"),
        }
    }
}

/// Interpret the result of running `chef-client -v` on a target.
///
/// A missing binary is [`InstalledAgent::NotInstalled`]. Output that cannot
/// be parsed as a version also counts as not installed, since the install
/// path replaces whatever is there.
#[must_use]
pub fn parse_version_output(exit_code: Option<i32>, stdout: &str, stderr: &str) -> InstalledAgent {
    if exit_code == Some(COMMAND_NOT_FOUND) || stderr.contains("not found") {
        return InstalledAgent::NotInstalled;
    }
    VERSION_LINE
        .captures(stdout)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_loose_version(m.as_str()))
        .map_or(InstalledAgent::NotInstalled, InstalledAgent::Version)
}

/// What the installer should do for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum InstallDecision {
    /// Installed version meets the minimum; nothing to do.
    AlreadySatisfied { installed: Version },
    /// An older version is installed and will be replaced.
    Upgrade { installed: Version },
    /// No agent is present and one will be installed.
    FreshInstall,
    /// Installation is disabled and the requirement is not met. The install
    /// chain is skipped and the job fails.
    CheckOnlySkip { installed: Option<Version> },
}

impl InstallDecision {
    /// Whether the install chain has to run.
    #[must_use]
    pub fn requires_install(&self) -> bool {
        matches!(self, Self::Upgrade { .. } | Self::FreshInstall)
    }
}

/// Decide what to do given the installed agent, the minimum and the install flag.
#[must_use]
pub fn decide(installed: &InstalledAgent, minimum: &Version, install_enabled: bool) -> InstallDecision {
    match installed {
        InstalledAgent::Version(v) if v >= minimum => {
            InstallDecision::AlreadySatisfied { installed: v.clone() }
        }
        _ if !install_enabled => InstallDecision::CheckOnlySkip {
            installed: installed.version().cloned(),
        },
        InstalledAgent::Version(v) => InstallDecision::Upgrade { installed: v.clone() },
        InstalledAgent::NotInstalled => InstallDecision::FreshInstall,
    }
}

/// Stacktrace the agent writes under its cache directory on failure.
#[must_use]
pub fn stacktrace_path(work_dir: &str) -> String {
    format!("{work_dir}/cache/chef-stacktrace.out")
}

/// Local-mode agent configuration rooted at a per-run remote directory.
#[must_use]
pub fn render_agent_config(work_dir: &str) -> String {
    format!(
        "local_mode true\n\
         chef_repo_path \"{work_dir}\"\n\
         file_cache_path \"{work_dir}/cache\"\n\
         file_backup_path \"{work_dir}/backup\"\n\
         cookbook_path [\"{work_dir}/cookbooks\"]\n\
         log_location STDOUT\n\
         log_level :warn\n\
         verify_api_cert false\n"
    )
}
