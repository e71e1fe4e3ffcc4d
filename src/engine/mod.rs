//! The measurement engine: a phase state machine driving a ping sampler
//! and a download/upload throughput sampler over a [`Transport`].

use crate::errors::SpeedTestError;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
pub(crate) mod fakes;
pub mod machine;
pub mod ping;
pub mod progress;
pub mod state;
pub mod throughput;

pub use machine::{SpeedTest, StateReceiver};
pub use progress::{ProgressCallback, ProgressUpdate};
pub use state::{MeasurementState, Phase, Results};
pub use throughput::Direction;

/// One mebibyte.
pub const MIB: usize = 1024 * 1024;

/// Acknowledgement returned by the upload sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAck {
    /// Whether the server accepted the chunk
    pub success: bool,
    /// Bytes the server reports having consumed
    #[serde(default)]
    pub bytes_received: u64,
    /// Server-side processing time in milliseconds
    #[serde(default, rename = "duration")]
    pub duration_ms: u64,
}

/// The network primitive the samplers measure through.
///
/// Every operation receives the run's cancellation token and must resolve
/// to a [`SpeedTestError::cancelled`] error, dropping any in-flight request,
/// as soon as the token fires.
pub trait Transport: Send + Sync + 'static {
    /// Perform one latency ping round-trip.
    fn ping(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), SpeedTestError>> + Send;

    /// Fetch a payload of `size_mib` mebibytes, returning the bytes received.
    fn download(
        &self,
        size_mib: u32,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<u64, SpeedTestError>> + Send;

    /// Post `payload` to the upload sink.
    fn upload(
        &self,
        payload: Vec<u8>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<UploadAck, SpeedTestError>> + Send;
}

/// Configuration for the measurement engine.
///
/// This struct contains every tunable constant of a run: ping counts,
/// phase budgets, transfer sizes and the live-display smoothing settings.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Number of pings.
    /// Default: 10
    pub ping_count: usize,

    /// Delay between consecutive pings in ms.
    /// Default: 100ms
    pub ping_interval_ms: u64,

    /// Wall-clock budget of the download phase in ms.
    /// Default: 10000ms
    pub download_duration_ms: u64,

    /// Wall-clock budget of the upload phase in ms.
    /// Default: 10000ms
    pub upload_duration_ms: u64,

    /// Size of each download request in MiB.
    /// Default: 1
    pub download_chunk_mib: u32,

    /// Size of each upload payload in bytes.
    /// Default: 1 MiB
    pub upload_chunk_bytes: usize,

    /// Minimum interval between live throughput updates in ms.
    /// Default: 100ms
    pub progress_interval_ms: u64,

    /// Number of recent samples averaged for the live speed.
    /// Default: 5
    pub smoothing_window: usize,

    /// Fraction of samples trimmed from each end before averaging.
    /// Default: 0.1
    pub trim_fraction: f64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            ping_count: 10,
            ping_interval_ms: 100,
            download_duration_ms: 10_000,
            upload_duration_ms: 10_000,
            download_chunk_mib: 1,
            upload_chunk_bytes: MIB,
            progress_interval_ms: 100,
            smoothing_window: 5,
            trim_fraction: 0.1,
        }
    }
}

impl TestConfig {
    /// Check that the configuration can drive a run.
    pub fn validate(&self) -> Result<(), SpeedTestError> {
        if self.ping_count == 0 {
            return Err(SpeedTestError::config("ping count must be at least 1"));
        }
        if self.download_chunk_mib == 0 || self.upload_chunk_bytes == 0 {
            return Err(SpeedTestError::config(
                "transfer chunk size must be greater than zero",
            ));
        }
        if !(0.0..0.5).contains(&self.trim_fraction) {
            return Err(SpeedTestError::config(format!(
                "trim fraction must be in [0, 0.5), got {}",
                self.trim_fraction
            )));
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Time budget for a throughput phase.
    pub fn budget(&self, direction: Direction) -> Duration {
        match direction {
            Direction::Download => {
                Duration::from_millis(self.download_duration_ms)
            }
            Direction::Upload => Duration::from_millis(self.upload_duration_ms),
        }
    }
}
