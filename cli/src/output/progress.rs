//! Progress indicators using indicatif

#![allow(clippy::expect_used)] // Templates are compile-time constants

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TICKS: &[&str] = &[
    "⠁", "⠂", "⠄", "⡀", "⡈", "⡐", "⡠", "⣀", "⣁", "⣂", "⣄", "⣌", "⣔", "⣤", "⣥", "⣦", "⣮", "⣶", "⣷",
    "⣿", "⡿", "⠿", "⢟", "⠟", "⡛", "⠛", "⠫", "⢋", "⠋", "⠍", "⡉", "⠉", "⠑", "⠡", "⢁",
];

/// Create a spinner for indeterminate progress.
///
/// # Panics
///
/// Panics if the spinner template string is invalid (it is a compile-time constant and will not panic).
#[must_use]
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(TICKS)
            .template("{spinner:.cyan} {msg}")
            .expect("valid template"),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Create a spinner line for one target, with the target name as a fixed-width prefix.
///
/// # Panics
///
/// Panics if the template string is invalid (it is a compile-time constant and will not panic).
#[must_use]
pub fn target_spinner(target: &str, width: usize) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(TICKS)
            .template("  {spinner:.cyan} {prefix:.bold} {msg}")
            .expect("valid template"),
    );
    pb.set_prefix(format!("{target:<width$}"));
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Finish a spinner with a checkmark in place of the spinner.
pub fn finish_ok(pb: &ProgressBar, msg: &str) {
    finish_with_mark(pb, "✓", msg);
}

/// Finish a spinner with a cross in place of the spinner.
pub fn finish_error(pb: &ProgressBar, msg: &str) {
    finish_with_mark(pb, "✗", msg);
}

fn finish_with_mark(pb: &ProgressBar, mark: &str, msg: &str) {
    let prefix = pb.prefix();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {prefix} {msg}")
            .expect("valid template"),
    );
    if prefix.is_empty() {
        pb.set_prefix(mark.to_string());
    } else {
        pb.set_prefix(format!("{mark} {prefix}"));
    }
    pb.finish_with_message(msg.to_string());
}
