//! Latency and jitter sampler.

use super::progress::{ProgressCallback, ProgressUpdate};
use super::{TestConfig, Transport};
use crate::errors::SpeedTestError;
use crate::measurements::{summarize_ping, PingSummary};
use log::debug;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Run `config.ping_count` sequential pings and summarize them.
///
/// Each ping is timed from issuance to response; after each one the
/// callback receives the completed percentage and that ping's round-trip
/// time. Pings are separated by `config.ping_interval_ms`.
///
/// Any ping failure aborts the phase. If the token fires, the phase fails
/// with a cancellation error instead.
pub async fn measure_ping<T: Transport>(
    transport: &T,
    config: &TestConfig,
    cancel: &CancellationToken,
    progress: &dyn ProgressCallback,
) -> Result<PingSummary, SpeedTestError> {
    let count = config.ping_count;
    let mut samples = Vec::with_capacity(count);

    for i in 0..count {
        if cancel.is_cancelled() {
            return Err(SpeedTestError::cancelled());
        }

        let start = Instant::now();
        transport.ping(cancel).await.map_err(|e| {
            if cancel.is_cancelled() {
                SpeedTestError::cancelled()
            } else {
                e
            }
        })?;
        let rtt_ms = start.elapsed().as_secs_f64() * 1000.0;

        samples.push(rtt_ms);
        debug!("Latency ping {}/{}: {:.2} ms", i + 1, count, rtt_ms);

        progress.on_progress(ProgressUpdate::new(
            (i + 1) as f64 / count as f64 * 100.0,
            rtt_ms,
        ));

        if i + 1 < count {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SpeedTestError::cancelled()),
                _ = sleep(config.ping_interval()) => {}
            }
        }
    }

    summarize_ping(&samples)
        .ok_or_else(|| SpeedTestError::measurement("no latency samples recorded"))
}
