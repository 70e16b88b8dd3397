//! Live per-target status: implementations of the `StatusSink` port.
//!
//! Every event variant maps to its message here and nowhere else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use indicatif::{MultiProgress, ProgressBar};
use owo_colors::OwoColorize as _;

use crate::application::ports::StatusSink;
use crate::domain::{ConvergeEvent, ConvergeOutcome, InstallEvent, JobEvent, JobOutcome};
use crate::output::{OutputContext, Styles, progress};

/// Progress message for one job event.
#[must_use]
pub fn event_message(event: &JobEvent) -> String {
    match event {
        JobEvent::Connecting => "connecting...".to_string(),
        JobEvent::Connected => "connected".to_string(),
        JobEvent::Install(e) => match e {
            InstallEvent::Checking => "checking for an installed agent...".to_string(),
            InstallEvent::AlreadyInstalled { version } => format!("agent {version} already installed"),
            InstallEvent::LocatingArtifact { platform } => {
                format!("locating agent package for {platform}...")
            }
            InstallEvent::Downloading { version } => format!("downloading agent {version}..."),
            InstallEvent::Uploading => "uploading agent package...".to_string(),
            InstallEvent::Installing => "installing agent...".to_string(),
            InstallEvent::InstallComplete { version } => format!("agent {version} installed"),
        },
        JobEvent::Converge(e) => match e {
            ConvergeEvent::CreatingRemotePolicy => "uploading policy...".to_string(),
            ConvergeEvent::RunningAgent => "converging...".to_string(),
        },
    }
}

/// Final one-line message for an outcome.
#[must_use]
pub fn outcome_message(outcome: &JobOutcome) -> String {
    match (&outcome.failure, outcome.converge) {
        (Some(failure), _) => failure.to_string(),
        (None, Some(ConvergeOutcome::RebootRequired)) => "converged, reboot required".to_string(),
        (None, _) => "converged".to_string(),
    }
}

/// One spinner line per target inside a shared `MultiProgress`.
///
/// When progress is hidden (not a TTY, or `--quiet`), only final outcomes are
/// printed, one line each.
pub struct TerminalSink {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    styles: Styles,
    live: bool,
    quiet: bool,
    width: AtomicUsize,
}

impl TerminalSink {
    /// Lines appear as targets report their first event. The name column is
    /// sized once the run reports its resolved targets.
    #[must_use]
    pub fn new(ctx: &OutputContext) -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            styles: ctx.styles.clone(),
            live: ctx.show_progress(),
            quiet: ctx.quiet,
            width: AtomicUsize::new(0),
        }
    }

    /// Width of the target name column.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width.load(Ordering::Relaxed)
    }
}

impl StatusSink for TerminalSink {
    fn resolved(&self, targets: &[String]) {
        let width = targets.iter().map(String::len).max().unwrap_or(0);
        self.width.fetch_max(width, Ordering::Relaxed);
    }

    fn event(&self, target: &str, event: &JobEvent) {
        if !self.live {
            return;
        }
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        let bar = bars
            .entry(target.to_string())
            .or_insert_with(|| self.multi.add(progress::target_spinner(target, self.width())));
        bar.set_message(event_message(event));
    }

    fn finished(&self, outcome: &JobOutcome) {
        let message = outcome_message(outcome);
        let bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = bars.get(&outcome.target) {
            if outcome.success {
                progress::finish_ok(bar, &message);
            } else {
                progress::finish_error(bar, &message);
            }
            return;
        }
        drop(bars);

        if self.quiet && outcome.success {
            return;
        }
        let (mark, style) = if outcome.success {
            ("✓", self.styles.success)
        } else {
            ("✗", self.styles.error)
        };
        let line = format!(
            "  {} {:<width$} {message}",
            mark.style(style),
            outcome.target.style(self.styles.target),
            width = self.width()
        );
        if outcome.success {
            println!("{line}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Discards live status; used when stdout carries a JSON document.
pub struct SilentSink;

impl StatusSink for SilentSink {
    fn event(&self, target: &str, event: &JobEvent) {
        tracing::trace!(target_host = target, ?event, "status");
    }

    fn finished(&self, _outcome: &JobOutcome) {}
}
