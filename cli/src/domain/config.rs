//! Domain types and validators for pushrun configuration.
//!
//! Pure functions only: no I/O, no async, no filesystem access.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Constants ────────────────────────────────────────────────────────────────

pub const VALID_CONFIG_KEYS: &[&str] = &[
    "connection.default_protocol",
    "connection.default_user",
    "connection.port",
    "connection.sudo",
    "agent.install",
    "agent.minimum_version",
    "agent.channel",
    "targets.max",
    "log.level",
];
pub const VALID_PROTOCOLS: &[&str] = &["ssh"];
pub const VALID_CHANNELS: &[&str] = &["stable", "current"];
pub const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
pub const VALID_BOOLEANS: &[&str] = &["true", "false"];

/// Oldest agent release the converge step is known to work with.
pub const DEFAULT_MINIMUM_AGENT_VERSION: &str = "15.3.14";
pub const DEFAULT_METADATA_URL: &str = "https://omnitruck.chef.io";
pub const DEFAULT_MAX_TARGETS: usize = 25;

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.pushrun/config.yaml`.
///
/// Built once per run, with command-line overrides applied, and passed
/// by reference into every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunConfig {
    pub connection: ConnectionConfig,
    pub agent: AgentConfig,
    pub targets: TargetsConfig,
    pub log: LogConfig,
    pub cache: CacheConfig,
    pub chef: ChefConfig,
}

/// How targets are reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Protocol used when a target carries no `scheme://`.
    pub default_protocol: String,
    /// User used when a target carries no `user@`.
    pub default_user: Option<String>,
    /// Port used when a target carries no `:port`.
    pub port: Option<u16>,
    /// Private key passed to the SSH client.
    pub identity_file: Option<PathBuf>,
    /// Prefix privileged remote commands with `sudo -n`.
    pub sudo: bool,
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            default_protocol: "ssh".to_string(),
            default_user: None,
            port: None,
            identity_file: None,
            sudo: false,
            connect_timeout_secs: 10,
        }
    }
}

/// Remote agent requirements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// When `false`, only check the installed version (check-only mode).
    pub install: bool,
    pub minimum_version: String,
    pub channel: String,
    pub metadata_url: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            install: true,
            minimum_version: DEFAULT_MINIMUM_AGENT_VERSION.to_string(),
            channel: "stable".to_string(),
            metadata_url: DEFAULT_METADATA_URL.to_string(),
        }
    }
}

impl AgentConfig {
    /// Parsed minimum version.
    ///
    /// # Errors
    ///
    /// Returns an error if `minimum_version` is not a semantic version.
    pub fn minimum(&self) -> Result<semver::Version> {
        parse_loose_version(&self.minimum_version).ok_or_else(|| {
            ConfigError::InvalidValue {
                key: "agent.minimum_version".to_string(),
                value: self.minimum_version.clone(),
                valid: "a version such as 15.3.14".to_string(),
            }
            .into()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    /// Upper bound on hosts a single specification may expand to.
    pub max: usize,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            max: DEFAULT_MAX_TARGETS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    /// Download cache; defaults to `~/.pushrun/cache` when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChefConfig {
    /// Directories searched for `cookbook` / `cookbook::recipe` specifiers.
    pub cookbook_repo_paths: Vec<PathBuf>,
}

/// Parse `X.Y.Z`, `X.Y` or `X` into a semantic version.
#[must_use]
pub fn parse_loose_version(raw: &str) -> Option<semver::Version> {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split('.').collect();
    let padded = match parts.len() {
        1 => format!("{raw}.0.0"),
        2 => format!("{raw}.0"),
        _ => raw.to_string(),
    };
    semver::Version::parse(&padded).ok()
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a configuration key against the whitelist.
///
/// # Errors
///
/// Returns an error if the key is not in the allowed list.
pub fn validate_config_key(key: &str) -> Result<()> {
    if !VALID_CONFIG_KEYS.contains(&key) {
        return Err(ConfigError::UnknownKey {
            key: key.to_string(),
            valid: VALID_CONFIG_KEYS.join(", "),
        }
        .into());
    }
    Ok(())
}

fn invalid(key: &str, value: &str, valid: &str) -> anyhow::Error {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        valid: valid.to_string(),
    }
    .into()
}

/// Validates a configuration value for the given key.
///
/// # Errors
///
/// Returns an error if the value is not valid for the key.
pub fn validate_config_value(key: &str, value: &str) -> Result<()> {
    let one_of = |allowed: &[&str]| {
        if allowed.contains(&value) {
            Ok(())
        } else {
            Err(invalid(key, value, &allowed.join(", ")))
        }
    };
    match key {
        "connection.default_protocol" => one_of(VALID_PROTOCOLS),
        "agent.channel" => one_of(VALID_CHANNELS),
        "log.level" => one_of(VALID_LOG_LEVELS),
        "connection.sudo" | "agent.install" => one_of(VALID_BOOLEANS),
        "connection.port" => match value.parse::<u16>() {
            Ok(p) if p > 0 => Ok(()),
            _ => Err(invalid(key, value, "1-65535")),
        },
        "targets.max" => match value.parse::<usize>() {
            Ok(n) if n > 0 => Ok(()),
            _ => Err(invalid(key, value, "a positive integer")),
        },
        "agent.minimum_version" => parse_loose_version(value)
            .map(|_| ())
            .ok_or_else(|| invalid(key, value, "a version such as 15.3.14")),
        "connection.default_user" if value.trim().is_empty() => {
            Err(invalid(key, value, "a non-empty user name"))
        }
        _ => Ok(()),
    }
}

/// Apply a validated `key = value` pair to the configuration.
///
/// # Errors
///
/// Returns an error if the key is unknown or the value is invalid.
pub fn apply_config_value(config: &mut RunConfig, key: &str, value: &str) -> Result<()> {
    validate_config_key(key)?;
    validate_config_value(key, value)?;
    let parse_bool = |v: &str| v == "true";
    match key {
        "connection.default_protocol" => config.connection.default_protocol = value.to_string(),
        "connection.default_user" => config.connection.default_user = Some(value.to_string()),
        "connection.port" => config.connection.port = value.parse().ok(),
        "connection.sudo" => config.connection.sudo = parse_bool(value),
        "agent.install" => config.agent.install = parse_bool(value),
        "agent.minimum_version" => config.agent.minimum_version = value.to_string(),
        "agent.channel" => config.agent.channel = value.to_string(),
        "targets.max" => {
            if let Ok(max) = value.parse() {
                config.targets.max = max;
            }
        }
        "log.level" => config.log.level = value.to_string(),
        _ => {}
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
