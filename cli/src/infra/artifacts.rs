//! Artifact infrastructure: implements `ArtifactSource` over the vendor
//! metadata endpoint, with a checksum-verified local download cache.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::application::ports::ArtifactSource;
use crate::domain::artifact::{hex_encode, metadata_url, parse_metadata};
use crate::domain::config::AgentConfig;
use crate::domain::{ArtifactDescriptor, Platform};

/// Upper bound on a downloaded package.
const MAX_PACKAGE_BYTES: u64 = 512 * 1024 * 1024;

pub struct MetadataArtifactSource {
    base_url: String,
    channel: String,
    cache_dir: PathBuf,
}

impl MetadataArtifactSource {
    #[must_use]
    pub fn new(config: &AgentConfig, cache_dir: PathBuf) -> Self {
        Self {
            base_url: config.metadata_url.clone(),
            channel: config.channel.clone(),
            cache_dir,
        }
    }

    /// `~/.pushrun/cache`, the default download cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn default_cache_dir() -> Result<PathBuf> {
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(home.join(".pushrun").join("cache"))
    }
}

#[async_trait]
impl ArtifactSource for MetadataArtifactSource {
    async fn locate(&self, platform: &Platform) -> Result<ArtifactDescriptor> {
        let url = metadata_url(&self.base_url, &self.channel, platform);
        debug!(%url, "querying artifact metadata");
        let body = tokio::task::spawn_blocking(move || -> Result<String> {
            ureq::get(&url)
                .call()
                .with_context(|| format!("metadata request to {url} failed"))?
                .into_string()
                .context("failed to read metadata response")
        })
        .await
        .context("metadata task failed")??;
        parse_metadata(&body)
    }

    async fn download(&self, artifact: &ArtifactDescriptor) -> Result<PathBuf> {
        let dest = self.cache_dir.join(artifact.filename());
        let artifact = artifact.clone();
        tokio::task::spawn_blocking(move || fetch_verified(&artifact, &dest))
            .await
            .context("download task failed")?
    }
}

/// Reuse `dest` if its checksum matches, otherwise download and verify.
fn fetch_verified(artifact: &ArtifactDescriptor, dest: &Path) -> Result<PathBuf> {
    if dest.exists() && file_sha256(dest)? == artifact.sha256 {
        info!(path = %dest.display(), "using cached package");
        return Ok(dest.to_path_buf());
    }

    let dir = dest
        .parent()
        .ok_or_else(|| anyhow::anyhow!("{} has no parent directory", dest.display()))?;
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;

    info!(url = %artifact.url, "downloading package");
    let response = ureq::get(&artifact.url)
        .call()
        .with_context(|| format!("failed to download {}", artifact.url))?;

    // Partial downloads never land at `dest`.
    let mut staged = tempfile::NamedTempFile::new_in(dir).context("cannot create temp file")?;
    let mut hasher = Sha256::new();
    let mut reader = response.into_reader().take(MAX_PACKAGE_BYTES);
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).context("failed to read package")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        staged.write_all(&buf[..n]).context("failed to write package")?;
    }

    let actual = hex_encode(&hasher.finalize());
    anyhow::ensure!(
        actual == artifact.sha256,
        "checksum mismatch for {}: expected {}, got {actual}",
        artifact.filename(),
        artifact.sha256
    );
    staged
        .persist(dest)
        .with_context(|| format!("cannot move package to {}", dest.display()))?;
    Ok(dest.to_path_buf())
}

fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).with_context(|| format!("cannot read {}", path.display()))?;
    Ok(hex_encode(&hasher.finalize()))
}
