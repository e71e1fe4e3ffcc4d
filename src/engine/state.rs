//! The snapshot of a measurement run exposed to consumers.

use serde::Serialize;
use std::fmt;

/// Stage of a measurement run.
///
/// A run moves strictly forward through `Ping`, `Download` and `Upload`
/// into `Complete`; cancellation or failure returns it to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Not started, stopped, or failed
    #[default]
    Idle,
    /// Measuring round-trip latency and jitter
    Ping,
    /// Measuring download throughput
    Download,
    /// Measuring upload throughput
    Upload,
    /// All phases finished successfully
    Complete,
}

impl Phase {
    /// Whether a sampler is active in this phase.
    pub fn is_measuring(&self) -> bool {
        matches!(self, Phase::Ping | Phase::Download | Phase::Upload)
    }

    /// Unit of the live value shown during this phase.
    pub fn unit(&self) -> &'static str {
        match self {
            Phase::Ping => "ms",
            Phase::Download | Phase::Upload => "Mbps",
            Phase::Idle | Phase::Complete => "",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Ping => "ping",
            Phase::Download => "download",
            Phase::Upload => "upload",
            Phase::Complete => "complete",
        };
        f.pad(name)
    }
}

/// Results accumulated during a run. Each field is set once its phase
/// completes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Results {
    /// Mean round-trip latency in milliseconds
    pub ping: Option<f64>,
    /// Mean absolute deviation of round-trip latency in milliseconds
    pub jitter: Option<f64>,
    /// Download throughput in Mbps
    pub download: Option<f64>,
    /// Upload throughput in Mbps
    pub upload: Option<f64>,
}

impl Results {
    /// True once every measurement has been recorded.
    pub fn is_complete(&self) -> bool {
        self.ping.is_some()
            && self.jitter.is_some()
            && self.download.is_some()
            && self.upload.is_some()
    }

    /// True when no measurement has been recorded.
    pub fn is_empty(&self) -> bool {
        *self == Results::default()
    }
}

/// State snapshot delivered to consumers.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MeasurementState {
    /// Current phase
    pub phase: Phase,
    /// Percentage in [0, 100] within the current phase
    pub progress: f64,
    /// Live reading for the active phase: ms during ping, Mbps otherwise
    pub current_speed_or_latency: f64,
    /// Results of the phases completed in this run
    pub results: Results,
    /// True from start until completion or cancellation
    pub is_running: bool,
}

impl MeasurementState {
    /// A fresh, idle state with no results.
    pub fn new() -> Self {
        Self::default()
    }

    /// State at the beginning of a run.
    pub(crate) fn started() -> Self {
        Self { phase: Phase::Ping, is_running: true, ..Self::default() }
    }

    /// Move to the next phase, resetting progress and the live reading.
    pub(crate) fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.progress = 0.0;
        self.current_speed_or_latency = 0.0;
    }

    /// Apply a live update from the active sampler.
    ///
    /// Progress is clamped to [0, 100] and never moves backwards within a
    /// phase.
    pub(crate) fn apply_progress(&mut self, progress: f64, value: f64) {
        let progress = if progress.is_finite() {
            progress.clamp(0.0, 100.0)
        } else {
            self.progress
        };

        self.progress = self.progress.max(progress);
        self.current_speed_or_latency = value;
    }

    /// Return to idle, keeping whatever results were recorded.
    pub(crate) fn halt(&mut self) {
        self.phase = Phase::Idle;
        self.is_running = false;
    }

    /// Finish the run successfully.
    pub(crate) fn complete(&mut self) {
        self.phase = Phase::Complete;
        self.progress = 100.0;
        self.current_speed_or_latency = 0.0;
        self.is_running = false;
    }
}
