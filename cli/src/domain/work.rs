//! The unit of configuration pushed to every target.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::error::ValidationError;
use crate::domain::properties::ResourceSpec;

static NAMED_RECIPE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // compile-time constant pattern
    Regex::new(r"^([A-Za-z0-9_-]+)(?:::([A-Za-z0-9_-]+))?$").expect("valid regex")
});

/// How a recipe was named on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeSpecifier {
    /// A recipe file or cookbook directory on local disk.
    Path(PathBuf),
    /// `cookbook` or `cookbook::recipe`, looked up in the cookbook repo paths.
    Named { cookbook: String, recipe: String },
}

impl RecipeSpecifier {
    /// Classify a recipe argument. Anything that looks like a path is a path.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidRecipeSpecifier`] for an empty argument
    /// or a `::` form with invalid segments.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ValidationError::InvalidRecipeSpecifier(raw.to_string()));
        }
        let looks_like_path = raw.contains('/')
            || raw.contains(std::path::MAIN_SEPARATOR)
            || raw.ends_with(".rb")
            || raw.starts_with('.');
        if looks_like_path {
            return Ok(Self::Path(PathBuf::from(raw)));
        }
        let caps = NAMED_RECIPE
            .captures(raw)
            .ok_or_else(|| ValidationError::InvalidRecipeSpecifier(raw.to_string()))?;
        Ok(Self::Named {
            cookbook: caps[1].to_string(),
            recipe: caps
                .get(2)
                .map_or_else(|| "default".to_string(), |m| m.as_str().to_string()),
        })
    }
}

/// A validated work item: either a recipe or a single resource.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkItem {
    Recipe(RecipeSpecifier),
    Resource(ResourceSpec),
}

impl WorkItem {
    /// Validate command-line positionals into a work item.
    ///
    /// With a resource name present the first argument is a resource type and
    /// the rest are properties; otherwise it names a recipe.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the arguments do not describe a
    /// valid recipe or resource.
    pub fn parse(subject: &str, name: Option<&str>, properties: &[String]) -> Result<Self, ValidationError> {
        match name {
            Some(name) => Ok(Self::Resource(ResourceSpec::parse(subject, Some(name), properties)?)),
            None => Ok(Self::Recipe(RecipeSpecifier::parse(subject)?)),
        }
    }

    /// Short description used in progress headers.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Recipe(RecipeSpecifier::Path(p)) => format!("recipe {}", p.display()),
            Self::Recipe(RecipeSpecifier::Named { cookbook, recipe }) => {
                format!("recipe {cookbook}::{recipe}")
            }
            Self::Resource(r) => format!("{}[{}]", r.resource_type, r.name),
        }
    }
}
