//! Installable agent artifact descriptors.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::domain::config::parse_loose_version;
use crate::domain::platform::Platform;

/// Where to fetch an agent package for one platform, and how to verify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactDescriptor {
    pub url: String,
    pub sha256: String,
    pub version: semver::Version,
}

impl ArtifactDescriptor {
    /// File name of the package, taken from the last URL path segment.
    #[must_use]
    pub fn filename(&self) -> String {
        self.url
            .split('?')
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .map_or_else(|| format!("agent-{}.pkg", self.version), str::to_string)
    }
}

/// Build the metadata query URL for a platform.
#[must_use]
pub fn metadata_url(base: &str, channel: &str, platform: &Platform) -> String {
    format!(
        "{}/{channel}/chef/metadata?p={}&pv={}&m={}&v=latest",
        base.trim_end_matches('/'),
        platform.name,
        platform.version,
        platform.arch
    )
}

/// Parse the tab/space separated `key value` metadata document.
///
/// # Errors
///
/// Returns an error if `url`, `sha256` or `version` is missing or invalid.
pub fn parse_metadata(body: &str) -> Result<ArtifactDescriptor> {
    let mut url = None;
    let mut sha256 = None;
    let mut version = None;
    for line in body.lines() {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("url"), Some(v)) => url = Some(v.to_string()),
            (Some("sha256"), Some(v)) => sha256 = Some(v.to_ascii_lowercase()),
            (Some("version"), Some(v)) => version = Some(v.to_string()),
            _ => {}
        }
    }
    let url = url.context("artifact metadata has no url")?;
    let sha256 = sha256.context("artifact metadata has no sha256")?;
    anyhow::ensure!(
        sha256.len() == 64 && sha256.chars().all(|c| c.is_ascii_hexdigit()),
        "artifact metadata has an invalid sha256: {sha256}"
    );
    let raw_version = version.context("artifact metadata has no version")?;
    let version = parse_loose_version(&raw_version)
        .with_context(|| format!("artifact metadata has an invalid version: {raw_version}"))?;
    Ok(ArtifactDescriptor {
        url,
        sha256,
        version,
    })
}

/// Encode bytes as lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}
