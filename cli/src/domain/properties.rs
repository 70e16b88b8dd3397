//! Resource-mode work items: property parsing and recipe synthesis.
//!
//! Validation here runs before any target is resolved, so a malformed
//! property never costs a connection.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::domain::error::ValidationError;

static RESOURCE_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // compile-time constant pattern
    Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid regex")
});

/// A coerced property value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<PropertyValue>),
    String(String),
}

impl PropertyValue {
    /// Coerce a raw command-line value.
    #[must_use]
    pub fn coerce(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some(inner) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            let items = inner
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Self::coerce)
                .collect();
            return Self::Array(items);
        }
        match trimmed {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        // Leading zeros are significant (file modes), keep them verbatim.
        let zero_padded = trimmed.len() > 1 && trimmed.starts_with('0') && !trimmed.starts_with("0.");
        if !zero_padded && let Ok(i) = trimmed.parse::<i64>() {
            return Self::Integer(i);
        }
        if trimmed.contains('.') && let Ok(f) = trimmed.parse::<f64>() {
            return Self::Float(f);
        }
        Self::String(raw.to_string())
    }

    /// Render as a Ruby literal for the synthesized recipe.
    #[must_use]
    pub fn to_ruby(&self) -> String {
        match self {
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => format!("{f:?}"),
            Self::Bool(b) => b.to_string(),
            Self::Array(items) => {
                let inner: Vec<String> = items.iter().map(Self::to_ruby).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::String(s) => ruby_string(s),
        }
    }
}

fn ruby_string(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Parse `key=value` arguments into an ordered property map.
///
/// # Errors
///
/// Returns [`ValidationError::MalformedProperty`] for an argument without `=`
/// and [`ValidationError::EmptyPropertyKey`] for `=value`.
pub fn parse_properties(args: &[String]) -> Result<BTreeMap<String, PropertyValue>, ValidationError> {
    let mut props = BTreeMap::new();
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| ValidationError::MalformedProperty(arg.clone()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ValidationError::EmptyPropertyKey(arg.clone()));
        }
        props.insert(key.to_string(), PropertyValue::coerce(value));
    }
    Ok(props)
}

/// A validated single-resource work item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSpec {
    pub resource_type: String,
    pub name: String,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl ResourceSpec {
    /// Validate and build a resource work item.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an invalid type, empty name or
    /// malformed property.
    pub fn parse(resource_type: &str, name: Option<&str>, raw_properties: &[String]) -> Result<Self, ValidationError> {
        if !RESOURCE_TYPE.is_match(resource_type) {
            return Err(ValidationError::InvalidResourceType(resource_type.to_string()));
        }
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ValidationError::MissingResourceName(resource_type.to_string()))?;
        Ok(Self {
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            properties: parse_properties(raw_properties)?,
        })
    }

    /// Recipe source declaring this one resource.
    #[must_use]
    pub fn to_recipe(&self) -> String {
        let mut out = format!("{} {} do\n", self.resource_type, ruby_string(&self.name));
        for (key, value) in &self.properties {
            let _ = writeln!(out, "  {key} {}", value.to_ruby());
        }
        out.push_str("end\n");
        out
    }
}
