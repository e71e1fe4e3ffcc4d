use crate::stats::{mean, mean_absolute_deviation, trimmed_mean};
use log::warn;
use serde::Serialize;
use std::time::Duration;

/// Bits in one megabit, as used for reported speeds.
const BITS_PER_MEGABIT: f64 = 1_000_000.0;

/// Result reported for a throughput phase in which no chunk succeeded.
pub const ZERO_SAMPLE_SPEED_MBPS: f64 = 0.0;

/// Throughput of one chunk in megabits per second.
///
/// Returns `None` when the elapsed time is zero, since no rate can be
/// derived from it.
pub fn chunk_speed_mbps(bytes: u64, elapsed: Duration) -> Option<f64> {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        return None;
    }

    Some((bytes as f64 * 8.0) / seconds / BITS_PER_MEGABIT)
}

/// Latency summary for a ping phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PingSummary {
    /// Mean round-trip time in milliseconds
    pub ping_ms: f64,
    /// Mean absolute deviation of the round-trip times in milliseconds
    pub jitter_ms: f64,
    /// Number of pings the summary was computed from
    pub samples: usize,
}

/// Summarize round-trip samples (milliseconds) into ping and jitter.
pub fn summarize_ping(samples: &[f64]) -> Option<PingSummary> {
    Some(PingSummary {
        ping_ms: mean(samples)?,
        jitter_ms: mean_absolute_deviation(samples)?,
        samples: samples.len(),
    })
}

/// Throughput summary for a download or upload phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThroughputSummary {
    /// Trimmed mean of the chunk speeds in Mbps
    pub mbps: f64,
    /// Number of chunks that produced a sample
    pub samples: usize,
    /// Number of chunks that failed and were skipped
    pub failed_chunks: usize,
}

/// Summaries of the phases a run has completed so far.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RunSummary {
    pub ping: Option<PingSummary>,
    pub download: Option<ThroughputSummary>,
    pub upload: Option<ThroughputSummary>,
}

/// Aggregate chunk speeds with outlier trimming.
///
/// An empty sample set yields [`ZERO_SAMPLE_SPEED_MBPS`].
pub fn summarize_throughput(
    samples: &[f64],
    failed_chunks: usize,
    trim_fraction: f64,
) -> ThroughputSummary {
    let mbps = trimmed_mean(samples, trim_fraction).unwrap_or_else(|| {
        warn!(
            "No throughput samples recorded ({} failed chunks), reporting {} Mbps",
            failed_chunks, ZERO_SAMPLE_SPEED_MBPS
        );
        ZERO_SAMPLE_SPEED_MBPS
    });

    ThroughputSummary { mbps, samples: samples.len(), failed_chunks }
}
