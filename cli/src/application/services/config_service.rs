//! Application service: configuration use-cases.

use anyhow::Result;

use crate::application::ports::ConfigStore;
use crate::domain::config::{RunConfig, apply_config_value, validate_config_key, validate_config_value};

/// Load configuration.
pub fn load_config(store: &impl ConfigStore) -> Result<RunConfig> {
    store.load()
}

/// Validate and persist a single `key = value` setting.
///
/// # Errors
///
/// Returns an error for an unknown key, an invalid value, or a store failure.
/// Nothing is written unless the value is valid.
pub fn set_value(store: &impl ConfigStore, key: &str, value: &str) -> Result<RunConfig> {
    validate_config_key(key)?;
    validate_config_value(key, value)?;
    let mut config = store.load()?;
    apply_config_value(&mut config, key, value)?;
    store.save(&config)?;
    Ok(config)
}
