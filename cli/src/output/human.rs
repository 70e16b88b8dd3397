//! Human-readable terminal renderer.

use std::path::Path;

use owo_colors::OwoColorize as _;

use crate::application::services::run::RunError;
use crate::domain::{AggregateResult, ConvergeOutcome, JobFailure, RunConfig};
use crate::output::OutputContext;

/// Lines of failure detail shown before truncating.
const DETAIL_LINES: usize = 12;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        println!("pushrun {version}");
    }

    /// Render the effective configuration.
    pub fn render_config(&self, config: &RunConfig, path: &Path) {
        println!();
        println!(
            "  {}",
            format!("Configuration ({})", path.display()).style(self.ctx.styles.header)
        );
        println!();
        let c = config;
        let unset = || "(not set)".to_string();
        let rows = [
            ("connection.default_protocol:", c.connection.default_protocol.clone()),
            ("connection.default_user:", c.connection.default_user.clone().unwrap_or_else(unset)),
            ("connection.port:", c.connection.port.map_or_else(unset, |p| p.to_string())),
            (
                "connection.identity_file:",
                c.connection
                    .identity_file
                    .as_ref()
                    .map_or_else(unset, |p| p.display().to_string()),
            ),
            ("connection.sudo:", c.connection.sudo.to_string()),
            ("connection.connect_timeout_secs:", c.connection.connect_timeout_secs.to_string()),
            ("agent.install:", c.agent.install.to_string()),
            ("agent.minimum_version:", c.agent.minimum_version.clone()),
            ("agent.channel:", c.agent.channel.clone()),
            ("agent.metadata_url:", c.agent.metadata_url.clone()),
            ("targets.max:", c.targets.max.to_string()),
            ("log.level:", c.log.level.clone()),
            (
                "cache.path:",
                c.cache.path.as_ref().map_or_else(unset, |p| p.display().to_string()),
            ),
            (
                "chef.cookbook_repo_paths:",
                if c.chef.cookbook_repo_paths.is_empty() {
                    unset()
                } else {
                    c.chef
                        .cookbook_repo_paths
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                },
            ),
        ];
        for (key, value) in rows {
            println!("  {key:<34} {value}");
        }
        println!();
        println!("  {}", "Environment:".style(self.ctx.styles.bold));
        for var in ["PUSHRUN_CONFIG", "PUSHRUN_LOG", "NO_COLOR"] {
            println!(
                "    {:<18} {}",
                format!("{var}:"),
                std::env::var(var).unwrap_or_else(|_| "(not set)".to_string())
            );
        }
        println!();
    }

    /// Render the summary of a successful run.
    pub fn render_report(&self, result: &AggregateResult) {
        let reboots: Vec<&str> = result
            .outcomes
            .iter()
            .filter(|o| o.converge == Some(ConvergeOutcome::RebootRequired))
            .map(|o| o.target.as_str())
            .collect();
        if !reboots.is_empty() {
            self.ctx
                .warn(&format!("reboot required on: {}", reboots.join(", ")));
        }
        self.ctx.success(&format_summary(result));
    }

    /// Render a failed run. Never suppressed.
    pub fn render_run_error(&self, err: &RunError) {
        match err {
            RunError::Target { target, failure } => {
                self.ctx.error(&format!("{}: {failure}", target.style(self.ctx.styles.target)));
                self.print_detail(failure);
            }
            RunError::MultiTarget(multi) => {
                self.ctx.error(&multi.to_string());
                for outcome in &multi.result.outcomes {
                    if let Some(failure) = &outcome.failure {
                        eprintln!(
                            "    {} {}: {failure}",
                            "✗".style(self.ctx.styles.error),
                            outcome.target.style(self.ctx.styles.target)
                        );
                        self.print_detail(failure);
                    } else {
                        let note = match outcome.converge {
                            Some(ConvergeOutcome::RebootRequired) => " (reboot required)",
                            _ => "",
                        };
                        eprintln!(
                            "    {} {}{note}",
                            "✓".style(self.ctx.styles.success),
                            outcome.target.style(self.ctx.styles.target)
                        );
                    }
                }
            }
            other => self.ctx.error(&other.to_string()),
        }
    }

    fn print_detail(&self, failure: &JobFailure) {
        let Some(detail) = &failure.detail else {
            return;
        };
        for line in truncate_lines(detail, DETAIL_LINES) {
            eprintln!("      {}", line.style(self.ctx.styles.dim));
        }
    }
}

// ── Display helpers (used by tests and output layer) ─────────────────────────

/// `"3 of 3 targets converged"`.
#[must_use]
pub fn format_summary(result: &AggregateResult) -> String {
    let ok = result.outcomes.iter().filter(|o| o.success).count();
    let total = result.outcomes.len();
    let noun = if total == 1 { "target" } else { "targets" };
    format!("{ok} of {total} {noun} converged")
}

/// First `max` lines, plus a marker when lines were dropped.
#[must_use]
pub fn truncate_lines(text: &str, max: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = lines.iter().take(max).map(|l| (*l).to_string()).collect();
    if lines.len() > max {
        out.push(format!("... ({} more lines)", lines.len() - max));
    }
    out
}
