//! Target platform detection from `uname` and `/etc/os-release` output.

use std::collections::HashMap;
use std::fmt;

use anyhow::Result;
use serde::Serialize;

/// Native package format of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Deb,
    Rpm,
}

impl PackageKind {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Deb => "deb",
            Self::Rpm => "rpm",
        }
    }

    /// Remote command that installs a package file of this kind.
    #[must_use]
    pub fn install_command(self, remote_path: &str) -> Vec<String> {
        let mut cmd: Vec<String> = match self {
            Self::Deb => vec!["dpkg".into(), "-i".into()],
            Self::Rpm => vec![
                "rpm".into(),
                "-Uvh".into(),
                "--oldpackage".into(),
                "--replacepkgs".into(),
            ],
        };
        cmd.push(remote_path.to_string());
        cmd
    }
}

/// Platform facts used to pick an installable agent artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Platform {
    /// Artifact platform name, e.g. `ubuntu` or `el`.
    pub name: String,
    /// Artifact platform version, e.g. `22.04` or `8`.
    pub version: String,
    /// Normalised machine architecture, e.g. `x86_64`.
    pub arch: String,
    pub package: PackageKind,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.name, self.version, self.arch)
    }
}

/// Parse `KEY=value` lines of an os-release file, unquoting values.
#[must_use]
pub fn parse_os_release(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (key, value) = line.split_once('=')?;
            let value = value.trim().trim_matches('"').trim_matches('\'');
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

fn normalise_arch(machine: &str) -> Result<String> {
    let arch = match machine.trim() {
        "x86_64" | "amd64" => "x86_64",
        "aarch64" | "arm64" => "aarch64",
        "ppc64le" => "ppc64le",
        "s390x" => "s390x",
        other => anyhow::bail!("unsupported architecture: {other}"),
    };
    Ok(arch.to_string())
}

/// Map os-release identity onto an artifact platform and package format.
fn classify(id: &str, id_like: &str, version_id: &str) -> Option<(String, String, PackageKind)> {
    let major = version_id.split('.').next().unwrap_or(version_id).to_string();
    let like = |family: &str| id_like.split_whitespace().any(|l| l == family);
    match id {
        "ubuntu" => Some(("ubuntu".into(), version_id.into(), PackageKind::Deb)),
        "debian" => Some(("debian".into(), major, PackageKind::Deb)),
        "rhel" | "centos" | "rocky" | "almalinux" | "ol" => {
            Some(("el".into(), major, PackageKind::Rpm))
        }
        "amzn" => Some(("amazon".into(), major, PackageKind::Rpm)),
        "fedora" => Some(("fedora".into(), major, PackageKind::Rpm)),
        "sles" | "opensuse-leap" => Some(("sles".into(), major, PackageKind::Rpm)),
        _ if like("debian") || like("ubuntu") => {
            Some(("debian".into(), major, PackageKind::Deb))
        }
        _ if like("rhel") || like("fedora") || like("centos") => {
            Some(("el".into(), major, PackageKind::Rpm))
        }
        _ => None,
    }
}

/// Build a [`Platform`] from raw probe output.
///
/// # Errors
///
/// Returns an error for non-Linux kernels, unknown architectures, or
/// distributions without a known package format.
pub fn detect(kernel: &str, machine: &str, os_release: &str) -> Result<Platform> {
    let kernel = kernel.trim();
    anyhow::ensure!(
        kernel.eq_ignore_ascii_case("linux"),
        "unsupported operating system: {kernel}"
    );
    let arch = normalise_arch(machine)?;
    let fields = parse_os_release(os_release);
    let get = |key: &str| fields.get(key).map(String::as_str).unwrap_or_default();
    let (name, version, package) = classify(get("ID"), get("ID_LIKE"), get("VERSION_ID"))
        .ok_or_else(|| anyhow::anyhow!("unsupported distribution: '{}'", get("ID")))?;
    Ok(Platform {
        name,
        version,
        arch,
        package,
    })
}
