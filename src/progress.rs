//! Terminal progress display using indicatif.
//!
//! The pipeline reports into a [`ProgressTracker`](crate::control::ProgressTracker);
//! this module only polls [`ProgressSnapshot`]s off the controller and
//! renders them, so the library never depends on a terminal.

use std::thread;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::control::{OperationController, ProgressSnapshot};

/// Bar resolution: overall progress in tenths of a percent.
const BAR_LENGTH: u64 = 1000;

/// How often [`ProgressDisplay::watch`] samples the controller.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A single overall progress bar.
pub struct ProgressDisplay {
    bar: ProgressBar,
}

impl ProgressDisplay {
    /// Create a display. `quiet` hides it; `plain` uses ASCII without color.
    ///
    /// ```
    /// use dupsweep::progress::ProgressDisplay;
    ///
    /// let display = ProgressDisplay::new(true, false);
    /// display.finish("done");
    /// ```
    #[must_use]
    pub fn new(quiet: bool, plain: bool) -> Self {
        if quiet {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }
        let bar = ProgressBar::new(BAR_LENGTH);
        bar.set_style(bar_style(plain));
        Self { bar }
    }

    /// Render one snapshot.
    pub fn update(&self, snapshot: &ProgressSnapshot) {
        let position = (snapshot.fraction.clamp(0.0, 1.0) * BAR_LENGTH as f64).round() as u64;
        self.bar.set_position(position);
        self.bar.set_message(describe(snapshot));
    }

    /// Poll `controller` until its operation is no longer active.
    pub fn watch(&self, controller: &OperationController) {
        while controller.state().is_active() {
            self.update(&controller.progress());
            thread::sleep(POLL_INTERVAL);
        }
        self.update(&controller.progress());
    }

    /// Leave the bar on screen with a final message.
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Remove the bar.
    pub fn clear(&self) {
        self.bar.finish_and_clear();
    }
}

fn bar_style(plain: bool) -> ProgressStyle {
    if plain {
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
    } else {
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
    }
}

/// One-line description of a snapshot: step, label, percent and ETA.
#[must_use]
pub fn describe(snapshot: &ProgressSnapshot) -> String {
    let mut text = format!(
        "{}/{} {} {:.1}%",
        (snapshot.step + 1).min(snapshot.steps.max(1)),
        snapshot.steps.max(1),
        if snapshot.label.is_empty() {
            "starting"
        } else {
            snapshot.label.as_str()
        },
        snapshot.percent()
    );
    if snapshot.paused {
        text.push_str(" (paused)");
    } else if let Some(eta) = snapshot.eta {
        text.push_str(&format!(" ETA {}", format_eta(eta)));
    }
    text
}

fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ProgressSnapshot {
        ProgressSnapshot {
            step: 2,
            steps: 4,
            label: "hash".to_string(),
            done: 50,
            total: 100,
            fraction: 0.625,
            eta: Some(Duration::from_secs(75)),
            paused: false,
        }
    }

    #[test]
    fn test_describe_running() {
        assert_eq!(describe(&snapshot()), "3/4 hash 62.5% ETA 1m15s");
    }

    #[test]
    fn test_describe_paused_hides_eta() {
        let snap = ProgressSnapshot {
            paused: true,
            ..snapshot()
        };
        assert_eq!(describe(&snap), "3/4 hash 62.5% (paused)");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(Duration::from_secs(9)), "9s");
        assert_eq!(format_eta(Duration::from_secs(3725)), "1h02m");
    }

    #[test]
    fn test_hidden_display_accepts_updates() {
        let display = ProgressDisplay::new(true, true);
        display.update(&snapshot());
        display.clear();
    }
}
