//! Result data structures for speed test output.
//!
//! [`SpeedTestResults`] is the final report of a completed run. It
//! implements Serialize for JSON output.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::{MeasurementState, Phase};
use crate::measurements::{RunSummary, ThroughputSummary};

/// Complete results from a speed test run.
///
/// # Example
/// ```no_run
/// use speed_gauge::results::SpeedTestResults;
/// # use speed_gauge::engine::MeasurementState;
/// # use speed_gauge::measurements::RunSummary;
/// # let state = MeasurementState::new();
/// # let summary = RunSummary::default();
///
/// if let Some(results) =
///     SpeedTestResults::from_run("http://localhost:3000/", &state, &summary)
/// {
///     println!("{}", serde_json::to_string_pretty(&results).unwrap());
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct SpeedTestResults {
    /// Timestamp when the test was completed
    pub timestamp: DateTime<Utc>,
    /// Server the run measured against
    pub server: String,
    /// Latency measurement results
    pub latency: LatencyResults,
    /// Download bandwidth results
    pub download: BandwidthResults,
    /// Upload bandwidth results
    pub upload: BandwidthResults,
}

impl SpeedTestResults {
    /// Create a new SpeedTestResults from component results.
    pub fn new(
        server: impl Into<String>,
        latency: LatencyResults,
        download: BandwidthResults,
        upload: BandwidthResults,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            server: server.into(),
            latency,
            download,
            upload,
        }
    }

    /// Build the report for a finished run.
    ///
    /// Returns `None` unless the run reached [`Phase::Complete`] with every
    /// result recorded.
    pub fn from_run(
        server: impl Into<String>,
        state: &MeasurementState,
        summary: &RunSummary,
    ) -> Option<Self> {
        if state.phase != Phase::Complete {
            return None;
        }

        let results = &state.results;
        let ping = summary.ping?;

        let latency = LatencyResults {
            ping_ms: results.ping?,
            jitter_ms: results.jitter?,
            samples: ping.samples,
        };
        let download = BandwidthResults::new(results.download?, summary.download);
        let upload = BandwidthResults::new(results.upload?, summary.upload);

        Some(Self::new(server, latency, download, upload))
    }
}

/// Latency measurement results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyResults {
    /// Mean round-trip time in milliseconds
    pub ping_ms: f64,
    /// Jitter (mean absolute deviation) in milliseconds
    pub jitter_ms: f64,
    /// Number of pings
    pub samples: usize,
}

/// Bandwidth measurement results for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandwidthResults {
    /// Trimmed mean speed in Mbps
    pub speed_mbps: f64,
    /// Chunks that produced a sample
    pub samples: usize,
    /// Chunks that failed and were skipped
    pub failed_chunks: usize,
}

impl BandwidthResults {
    fn new(speed_mbps: f64, summary: Option<ThroughputSummary>) -> Self {
        let (samples, failed_chunks) =
            summary.map_or((0, 0), |s| (s.samples, s.failed_chunks));
        Self { speed_mbps, samples, failed_chunks }
    }

    /// True when no chunk succeeded and the speed is a placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.samples == 0
    }
}
