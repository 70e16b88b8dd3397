//! Diagnostic log setup.
//!
//! Terminal output belongs to the progress renderer, so tracing events go to
//! `~/.pushrun/logs/pushrun.log` instead of stderr.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding an `EnvFilter` directive, e.g. `pushrun_cli=debug`.
pub const LOG_ENV: &str = "PUSHRUN_LOG";

/// Default log file location.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_log_path() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(".pushrun").join("logs").join("pushrun.log"))
}

/// Install the global subscriber, appending to `path`.
///
/// `PUSHRUN_LOG` takes precedence over `level`.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a subscriber is
/// already installed.
pub fn init(path: &PathBuf, level: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open {}", path.display()))?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .try_init()
        .context("cannot install log subscriber")
}
