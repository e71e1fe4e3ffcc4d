//! Time-boxed throughput sampler shared by the download and upload phases.

use super::progress::{ProgressCallback, ProgressUpdate};
use super::{TestConfig, Transport};
use crate::errors::SpeedTestError;
use crate::measurements::{chunk_speed_mbps, summarize_throughput, ThroughputSummary};
use crate::stats::trailing_mean;
use log::{debug, info, warn};
use rand::RngCore;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Direction of a throughput measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Server to client
    Download,
    /// Client to server
    Upload,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Download => f.write_str("download"),
            Direction::Upload => f.write_str("upload"),
        }
    }
}

/// Measure throughput in `direction` until the phase budget expires.
///
/// Chunks are transferred one at a time. A failed chunk is skipped and the
/// loop keeps going; only the budget or the cancellation token ends the
/// phase. Live updates are throttled to `config.progress_interval_ms` and
/// carry the mean of the last `config.smoothing_window` chunk speeds. One
/// final update at 100% is always emitted when the budget runs out.
pub async fn measure_throughput<T: Transport>(
    transport: &T,
    direction: Direction,
    config: &TestConfig,
    cancel: &CancellationToken,
    progress: &dyn ProgressCallback,
) -> Result<ThroughputSummary, SpeedTestError> {
    let budget = config.budget(direction);
    let interval = config.progress_interval();
    let payload = match direction {
        Direction::Download => None,
        Direction::Upload => Some(random_payload(config.upload_chunk_bytes)),
    };

    let started = Instant::now();
    let mut last_update = started;
    let mut samples: Vec<f64> = Vec::new();
    let mut failed_chunks = 0;

    while started.elapsed() < budget {
        if cancel.is_cancelled() {
            return Err(SpeedTestError::cancelled());
        }

        // Copy the payload outside the timed window.
        let body = payload.clone();
        let chunk_start = Instant::now();
        let outcome = transfer_chunk(transport, config, body, cancel).await;

        match outcome {
            Ok(bytes) => match chunk_speed_mbps(bytes, chunk_start.elapsed()) {
                Some(speed) => {
                    debug!(
                        "{} chunk {}: {} bytes at {:.2} Mbps",
                        direction,
                        samples.len() + 1,
                        bytes,
                        speed
                    );
                    samples.push(speed);
                }
                None => debug!("{} chunk finished in zero time, skipped", direction),
            },
            Err(_) if cancel.is_cancelled() => {
                return Err(SpeedTestError::cancelled());
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                failed_chunks += 1;
                warn!("{} chunk failed, skipping: {}", direction, e.message);
            }
        }

        if last_update.elapsed() >= interval {
            progress.on_progress(ProgressUpdate::new(
                phase_progress(started.elapsed(), budget),
                live_speed(&samples, config.smoothing_window),
            ));
            last_update = Instant::now();
        }
    }

    progress.on_progress(ProgressUpdate::new(
        100.0,
        live_speed(&samples, config.smoothing_window),
    ));

    let summary = summarize_throughput(&samples, failed_chunks, config.trim_fraction);
    info!(
        "{} finished: {:.2} Mbps from {} samples ({} failed chunks)",
        direction, summary.mbps, summary.samples, summary.failed_chunks
    );

    Ok(summary)
}

/// Transfer one chunk, returning the number of bytes moved. A body means an
/// upload; without one a download of the configured size is fetched.
async fn transfer_chunk<T: Transport>(
    transport: &T,
    config: &TestConfig,
    body: Option<Vec<u8>>,
    cancel: &CancellationToken,
) -> Result<u64, SpeedTestError> {
    let Some(body) = body else {
        return transport.download(config.download_chunk_mib, cancel).await;
    };

    let len = body.len() as u64;
    let ack = transport.upload(body, cancel).await?;
    if !ack.success {
        return Err(SpeedTestError::api("upload sink rejected the chunk"));
    }
    if ack.bytes_received != len {
        warn!(
            "Upload sink reported {} bytes for a {} byte chunk",
            ack.bytes_received, len
        );
    }
    Ok(len)
}

/// Percentage of `budget` covered by `elapsed`, capped at 100.
fn phase_progress(elapsed: Duration, budget: Duration) -> f64 {
    if budget.is_zero() {
        return 100.0;
    }

    (elapsed.as_secs_f64() / budget.as_secs_f64() * 100.0).min(100.0)
}

/// Smoothed speed for display; zero until the first sample exists.
fn live_speed(samples: &[f64], window: usize) -> f64 {
    trailing_mean(samples, window).unwrap_or(0.0)
}

/// A pseudo-random upload payload. Random bytes defeat compression on the
/// path.
fn random_payload(len: usize) -> Vec<u8> {
    let mut payload = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut payload);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fakes::{Behavior, FakeTransport};
    use crate::engine::progress::recording::RecordingCallback;
    use crate::engine::{UploadAck, MIB};
    use crate::measurements::ZERO_SAMPLE_SPEED_MBPS;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::sleep;

    const MIB_OVER_100MS_MBPS: f64 = 83.88608;

    fn assert_monotonic(updates: &[ProgressUpdate]) {
        for pair in updates.windows(2) {
            assert!(
                pair[1].progress >= pair[0].progress,
                "progress regressed: {} -> {}",
                pair[0].progress,
                pair[1].progress
            );
        }
        for update in updates {
            assert!((0.0..=100.0).contains(&update.progress));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_runs_for_the_budget() {
        let transport = FakeTransport::default();
        let callback = RecordingCallback::default();
        let start = Instant::now();

        let summary = measure_throughput(
            &transport,
            Direction::Download,
            &TestConfig::default(),
            &CancellationToken::new(),
            &callback,
        )
        .await
        .unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(summary.samples, 100);
        assert_eq!(summary.failed_chunks, 0);
        assert!((summary.mbps - MIB_OVER_100MS_MBPS).abs() < 1e-6);
        assert_eq!(transport.last_download_size.load(Ordering::SeqCst), 1);

        let updates = callback.updates();
        assert_monotonic(&updates);
        let last = updates.last().unwrap();
        assert_eq!(last.progress, 100.0);
        assert!((last.value - MIB_OVER_100MS_MBPS).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_posts_full_chunks() {
        let transport = FakeTransport::default();
        let callback = RecordingCallback::default();

        let summary = measure_throughput(
            &transport,
            Direction::Upload,
            &TestConfig::default(),
            &CancellationToken::new(),
            &callback,
        )
        .await
        .unwrap();

        // 200ms per chunk over a 10s budget.
        assert_eq!(summary.samples, 50);
        assert!((summary.mbps - MIB_OVER_100MS_MBPS / 2.0).abs() < 1e-6);
        assert_eq!(transport.last_upload_len.load(Ordering::SeqCst), MIB);
        assert_eq!(transport.downloads.load(Ordering::SeqCst), 0);
        assert_monotonic(&callback.updates());
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_transport_reports_sentinel() {
        let transport = FakeTransport {
            download: Behavior::Fail(Duration::from_millis(50)),
            ..FakeTransport::default()
        };
        let callback = RecordingCallback::default();

        let summary = measure_throughput(
            &transport,
            Direction::Download,
            &TestConfig::default(),
            &CancellationToken::new(),
            &callback,
        )
        .await
        .unwrap();

        assert!(!summary.mbps.is_nan());
        assert_eq!(summary.mbps, ZERO_SAMPLE_SPEED_MBPS);
        assert_eq!(summary.samples, 0);
        assert_eq!(summary.failed_chunks, 200);

        let updates = callback.updates();
        assert_monotonic(&updates);
        assert!(updates.iter().all(|u| u.value == 0.0));
        assert_eq!(updates.last().unwrap().progress, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_uploads_are_not_counted() {
        let transport =
            FakeTransport { upload_success: false, ..FakeTransport::default() };
        let callback = RecordingCallback::default();

        let summary = measure_throughput(
            &transport,
            Direction::Upload,
            &TestConfig::default(),
            &CancellationToken::new(),
            &callback,
        )
        .await
        .unwrap();

        assert_eq!(summary.samples, 0);
        assert_eq!(summary.failed_chunks, 50);
        assert_eq!(summary.mbps, ZERO_SAMPLE_SPEED_MBPS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_in_flight_chunk() {
        let transport =
            FakeTransport { download: Behavior::Hang, ..FakeTransport::default() };
        let callback = RecordingCallback::default();
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let error = measure_throughput(
            &transport,
            Direction::Download,
            &TestConfig::default(),
            &cancel,
            &callback,
        )
        .await
        .unwrap_err();

        assert!(error.is_cancelled());
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(transport.downloads.load(Ordering::SeqCst), 1);
        assert!(callback.updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_are_throttled() {
        let transport = FakeTransport {
            download: Behavior::Succeed(Duration::from_millis(10)),
            ..FakeTransport::default()
        };
        let stamps: Mutex<Vec<(Instant, ProgressUpdate)>> = Mutex::new(Vec::new());
        let callback = |update: ProgressUpdate| {
            stamps.lock().unwrap().push((Instant::now(), update));
        };

        let summary = measure_throughput(
            &transport,
            Direction::Download,
            &TestConfig::default(),
            &CancellationToken::new(),
            &callback,
        )
        .await
        .unwrap();

        assert_eq!(summary.samples, 1000);

        let stamps = stamps.into_inner().unwrap();
        // The closing update may follow the last throttled one immediately.
        let throttled = &stamps[..stamps.len() - 1];
        for pair in throttled.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(100));
        }
        assert!(stamps.len() <= 101);
    }

    /// Fails every other download.
    struct FlakyTransport {
        calls: AtomicUsize,
    }

    impl Transport for FlakyTransport {
        async fn ping(&self, _cancel: &CancellationToken) -> Result<(), SpeedTestError> {
            Ok(())
        }

        async fn download(
            &self,
            _size_mib: u32,
            _cancel: &CancellationToken,
        ) -> Result<u64, SpeedTestError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(100)).await;
            if call % 2 == 0 {
                Ok(MIB as u64)
            } else {
                Err(SpeedTestError::network("connection reset"))
            }
        }

        async fn upload(
            &self,
            _payload: Vec<u8>,
            _cancel: &CancellationToken,
        ) -> Result<UploadAck, SpeedTestError> {
            Err(SpeedTestError::network("unused"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_skipped() {
        let transport = FlakyTransport { calls: AtomicUsize::new(0) };
        let callback = RecordingCallback::default();

        let summary = measure_throughput(
            &transport,
            Direction::Download,
            &TestConfig::default(),
            &CancellationToken::new(),
            &callback,
        )
        .await
        .unwrap();

        assert_eq!(summary.samples, 50);
        assert_eq!(summary.failed_chunks, 50);
        assert!((summary.mbps - MIB_OVER_100MS_MBPS).abs() < 1e-6);
    }

    /// Keeps every upload body it receives and answers after 200ms.
    #[derive(Default)]
    struct CapturingUploads {
        bodies: Mutex<Vec<Vec<u8>>>,
    }

    impl Transport for CapturingUploads {
        async fn ping(&self, _cancel: &CancellationToken) -> Result<(), SpeedTestError> {
            Ok(())
        }

        async fn download(
            &self,
            _size_mib: u32,
            _cancel: &CancellationToken,
        ) -> Result<u64, SpeedTestError> {
            Err(SpeedTestError::network("unused"))
        }

        async fn upload(
            &self,
            payload: Vec<u8>,
            _cancel: &CancellationToken,
        ) -> Result<UploadAck, SpeedTestError> {
            let len = payload.len() as u64;
            self.bodies.lock().unwrap().push(payload);
            sleep(Duration::from_millis(200)).await;
            Ok(UploadAck { success: true, bytes_received: len, duration_ms: 200 })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_chunks_share_one_payload() {
        let transport = CapturingUploads::default();
        let callback = RecordingCallback::default();

        let summary = measure_throughput(
            &transport,
            Direction::Upload,
            &TestConfig::default(),
            &CancellationToken::new(),
            &callback,
        )
        .await
        .unwrap();

        let bodies = transport.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 50);
        assert!(bodies.iter().all(|body| body.len() == MIB));
        assert!(bodies.iter().all(|body| body == &bodies[0]));

        // Only the transfer itself is timed.
        assert_eq!(summary.samples, 50);
        assert!((summary.mbps - MIB_OVER_100MS_MBPS / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_phase_progress_caps_at_100() {
        let budget = Duration::from_secs(10);
        assert_eq!(phase_progress(Duration::ZERO, budget), 0.0);
        assert!((phase_progress(Duration::from_secs(5), budget) - 50.0).abs() < 1e-9);
        assert_eq!(phase_progress(Duration::from_secs(12), budget), 100.0);
        assert_eq!(phase_progress(Duration::from_secs(1), Duration::ZERO), 100.0);
    }

    #[test]
    fn test_live_speed_uses_recent_window() {
        let samples = [100.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((live_speed(&samples, 5) - 3.0).abs() < 1e-9);
        assert_eq!(live_speed(&[], 5), 0.0);
    }

    #[test]
    fn test_random_payload_length() {
        let payload = random_payload(MIB);
        assert_eq!(payload.len(), MIB);
        assert!(payload.iter().any(|b| *b != 0));
    }
}
