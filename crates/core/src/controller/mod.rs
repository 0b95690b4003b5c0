pub mod run;

use chrono::{DateTime, TimeZone};
use std::fmt;

pub use run::{Devices, RunConfig, RunController};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Acquiring,
    Rendering,
    Sleeping,
    Scheduling,
    ShuttingDown,
    Idle,
    Terminal,
}

/// What the cycle decided about host power.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOutcome {
    /// Scheduled boot: power-off was invoked after the grace interval.
    PoweredOff,
    /// Scheduled boot, but power-off is disabled for this run.
    DryRun,
    /// Not inside a wake hour; probably a manual boot.
    SkippedManualBoot,
    /// The wake alarm could not be set, so powering off could leave the device off for good.
    BlockedBySchedulingError,
}

#[derive(Debug)]
pub enum ControllerError {
    /// The display could not be put into its low-power state.
    DisplayStuckActive(anyhow::Error),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DisplayStuckActive(e) => write!(f, "display could not be put to sleep: {e:#}"),
        }
    }
}

impl std::error::Error for ControllerError {}

/// Footer text: local timestamp, battery level and, when any quote is stale, a marker.
pub fn footer<Tz: TimeZone>(now: &DateTime<Tz>, battery: Option<u8>, used_fallback: bool) -> String {
    let timestamp = now.naive_local().format("%b %d %I:%M %p");
    let battery = battery
        .map(|b| b.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let mut out = format!("{timestamp} | {battery}%");
    if used_fallback {
        out.push_str(" | stale");
    }
    out
}
