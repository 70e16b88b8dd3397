//! Configuration bundle infrastructure: packs the work item into a gzipped
//! tar of cookbooks the agent can consume with `--recipe-url`.
//!
//! Layout inside the archive is always `cookbooks/<name>/...`.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;
use tracing::debug;

use crate::application::ports::{BundleBuilder, ConfigBundle, PolicyArchive};
use crate::domain::{RecipeSpecifier, ValidationError, WorkItem};

/// Cookbook generated for single resources and loose recipe files.
pub const GENERATED_COOKBOOK: &str = "pushrun_run";

const ARCHIVE_NAME: &str = "pushrun-bundle.tgz";

/// A bundle in its own temporary directory.
pub struct TarBundle {
    dir: TempDir,
    archive: PolicyArchive,
}

impl ConfigBundle for TarBundle {
    fn archive(&self) -> &PolicyArchive {
        &self.archive
    }

    fn delete(self: Box<Self>) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .with_context(|| format!("cannot remove {}", path.display()))
    }
}

pub struct TarBundleBuilder {
    cookbook_repo_paths: Vec<PathBuf>,
}

impl TarBundleBuilder {
    #[must_use]
    pub fn new(cookbook_repo_paths: Vec<PathBuf>) -> Self {
        Self { cookbook_repo_paths }
    }

    /// Find a named cookbook recipe in the configured repo paths.
    fn find_named(&self, cookbook: &str, recipe: &str) -> Option<PathBuf> {
        self.cookbook_repo_paths
            .iter()
            .map(|repo| repo.join(cookbook))
            .find(|dir| dir.join("recipes").join(format!("{recipe}.rb")).is_file())
    }
}

/// What goes into the archive, and what to run.
enum Contents {
    Generated { recipe: String },
    Cookbook { dir: PathBuf, name: String, recipe: String },
}

impl BundleBuilder for TarBundleBuilder {
    fn build(&self, work: &WorkItem) -> Result<Box<dyn ConfigBundle>> {
        let contents = match work {
            WorkItem::Resource(spec) => Contents::Generated { recipe: spec.to_recipe() },
            WorkItem::Recipe(RecipeSpecifier::Path(path)) => from_path(path)?,
            WorkItem::Recipe(RecipeSpecifier::Named { cookbook, recipe }) => {
                let dir = self.find_named(cookbook, recipe).ok_or_else(|| {
                    ValidationError::RecipeNotFound(format!("{cookbook}::{recipe}"))
                })?;
                Contents::Cookbook {
                    name: cookbook_name(&dir)?,
                    dir,
                    recipe: recipe.clone(),
                }
            }
        };

        let dir = tempfile::Builder::new()
            .prefix("pushrun-bundle-")
            .tempdir()
            .context("cannot create bundle directory")?;
        let path = dir.path().join(ARCHIVE_NAME);
        let run_list = write_archive(&path, &contents)?;
        debug!(archive = %path.display(), %run_list, "bundle written");

        Ok(Box::new(TarBundle {
            dir,
            archive: PolicyArchive { path, run_list },
        }))
    }
}

/// Classify a recipe path: loose file, file inside a cookbook, or cookbook.
fn from_path(path: &Path) -> Result<Contents> {
    let not_found = || ValidationError::RecipeNotFound(path.display().to_string());
    if path.is_dir() {
        anyhow::ensure!(
            path.join("metadata.rb").is_file() || path.join("recipes").is_dir(),
            not_found()
        );
        return Ok(Contents::Cookbook {
            name: cookbook_name(path)?,
            dir: path.to_path_buf(),
            recipe: "default".to_string(),
        });
    }
    if !path.is_file() {
        return Err(not_found().into());
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(not_found)?;
    let cookbook_dir = path
        .parent()
        .filter(|p| p.file_name().is_some_and(|n| n == "recipes"))
        .and_then(Path::parent)
        .filter(|p| p.join("metadata.rb").is_file());
    if let Some(dir) = cookbook_dir {
        return Ok(Contents::Cookbook {
            name: cookbook_name(dir)?,
            dir: dir.to_path_buf(),
            recipe: stem,
        });
    }

    let recipe = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    Ok(Contents::Generated { recipe })
}

/// Cookbook name from `metadata.rb`, falling back to the directory name.
fn cookbook_name(dir: &Path) -> Result<String> {
    if let Ok(metadata) = std::fs::read_to_string(dir.join("metadata.rb"))
        && let Some(name) = metadata_name(&metadata)
    {
        return Ok(name);
    }
    dir.canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .ok_or_else(|| anyhow::anyhow!("cannot determine cookbook name for {}", dir.display()))
}

fn metadata_name(metadata: &str) -> Option<String> {
    metadata.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("name")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let value = rest.trim().trim_matches(|c| c == '\'' || c == '"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Write the archive and return the run list it satisfies.
fn write_archive(path: &Path, contents: &Contents) -> Result<String> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut tar = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    let run_list = match contents {
        Contents::Generated { recipe } => {
            let root = format!("cookbooks/{GENERATED_COOKBOOK}");
            append_text(
                &mut tar,
                &format!("{root}/metadata.rb"),
                &format!("name '{GENERATED_COOKBOOK}'\nversion '0.1.0'\n"),
            )?;
            append_text(&mut tar, &format!("{root}/recipes/default.rb"), recipe)?;
            format!("recipe[{GENERATED_COOKBOOK}::default]")
        }
        Contents::Cookbook { dir, name, recipe } => {
            tar.append_dir_all(format!("cookbooks/{name}"), dir)
                .with_context(|| format!("cannot archive {}", dir.display()))?;
            format!("recipe[{name}::{recipe}]")
        }
    };

    tar.into_inner()
        .context("cannot finish archive")?
        .finish()
        .context("cannot finish compression")?;
    Ok(run_list)
}

fn append_text<W: std::io::Write>(tar: &mut tar::Builder<W>, path: &str, body: &str) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(body.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    tar.append_data(&mut header, path, body.as_bytes())
        .with_context(|| format!("cannot add {path} to archive"))
}
