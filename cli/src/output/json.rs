//! JSON output helpers.
//!
//! Every `--json` code path prints exactly one pretty-printed document to
//! stdout. Failures use the error object below, extended with per-target
//! failures where there are any.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use crate::application::services::run::RunError;
use crate::domain::{AggregateResult, RunConfig};

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails (should not happen in
/// practice: `serde_json` only fails on non-finite floats and maps with
/// non-string keys, neither of which appear here).
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Format a failed run, including per-target failures.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_run_error(err: &RunError) -> Result<String> {
    let mut obj = json!({
        "error": true,
        "message": err.to_string(),
        "code": err.code(),
    });
    match err {
        RunError::Target { target, failure } => {
            obj["target"] = json!(target);
            obj["failure"] = serde_json::to_value(failure).context("JSON serialization failed")?;
        }
        RunError::MultiTarget(multi) => {
            let failures: Vec<_> = multi.failures().collect();
            obj["total"] = json!(multi.total());
            obj["failures"] =
                serde_json::to_value(&failures).context("JSON serialization failed")?;
            obj["targets"] = serde_json::to_value(&multi.result.outcomes)
                .context("JSON serialization failed")?;
        }
        _ => {}
    }
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Machine-readable renderer; mirrors `HumanRenderer`.
pub struct JsonRenderer;

impl JsonRenderer {
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_version(&self, version: &str) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(&json!({ "version": version }))?);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_config(&self, config: &RunConfig, path: &Path) -> Result<()> {
        let obj = json!({
            "path": path.display().to_string(),
            "config": config,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_report(&self, result: &AggregateResult) -> Result<()> {
        let obj = json!({
            "success": result.is_success(),
            "targets": result.outcomes,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_run_error(&self, err: &RunError) -> Result<()> {
        println!("{}", format_run_error(err)?);
        Ok(())
    }
}
