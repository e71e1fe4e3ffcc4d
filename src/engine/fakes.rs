//! Scripted transports for engine tests.

use super::{Transport, UploadAck};
use crate::errors::SpeedTestError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// How one kind of operation behaves.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Succeed after the delay
    Succeed(Duration),
    /// Fail with a network error after the delay
    Fail(Duration),
    /// Never complete; only cancellation ends the call
    Hang,
}

impl Behavior {
    async fn perform(&self, cancel: &CancellationToken) -> Result<(), SpeedTestError> {
        let (delay, succeed) = match *self {
            Behavior::Succeed(delay) => (delay, true),
            Behavior::Fail(delay) => (delay, false),
            Behavior::Hang => {
                cancel.cancelled().await;
                return Err(SpeedTestError::cancelled());
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(SpeedTestError::cancelled()),
            _ = sleep(delay) => {
                if succeed {
                    Ok(())
                } else {
                    Err(SpeedTestError::network("connection reset by peer"))
                }
            }
        }
    }
}

/// A transport whose timing and failures are fixed up front.
pub struct FakeTransport {
    pub ping: Behavior,
    /// Round-trip delays consumed one per ping, overriding `ping`.
    pub ping_script: Mutex<Vec<Duration>>,
    pub download: Behavior,
    pub download_bytes: u64,
    pub upload: Behavior,
    pub upload_success: bool,
    pub pings: AtomicUsize,
    pub downloads: AtomicUsize,
    pub uploads: AtomicUsize,
    pub last_download_size: AtomicUsize,
    pub last_upload_len: AtomicUsize,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self {
            ping: Behavior::Succeed(Duration::from_millis(10)),
            ping_script: Mutex::new(Vec::new()),
            download: Behavior::Succeed(Duration::from_millis(100)),
            download_bytes: super::MIB as u64,
            upload: Behavior::Succeed(Duration::from_millis(200)),
            upload_success: true,
            pings: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            last_download_size: AtomicUsize::new(0),
            last_upload_len: AtomicUsize::new(0),
        }
    }
}

impl FakeTransport {
    /// Pings that take exactly `delays_ms`, in order.
    pub fn with_ping_script(delays_ms: &[u64]) -> Self {
        let mut script: Vec<Duration> =
            delays_ms.iter().map(|ms| Duration::from_millis(*ms)).collect();
        script.reverse();
        Self { ping_script: Mutex::new(script), ..Self::default() }
    }
}

impl Transport for FakeTransport {
    async fn ping(&self, cancel: &CancellationToken) -> Result<(), SpeedTestError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        let scripted = self.ping_script.lock().unwrap().pop();
        let behavior = match scripted {
            Some(delay) => Behavior::Succeed(delay),
            None => self.ping,
        };
        behavior.perform(cancel).await
    }

    async fn download(
        &self,
        size_mib: u32,
        cancel: &CancellationToken,
    ) -> Result<u64, SpeedTestError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.last_download_size.store(size_mib as usize, Ordering::SeqCst);
        self.download.perform(cancel).await?;
        Ok(self.download_bytes)
    }

    async fn upload(
        &self,
        payload: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<UploadAck, SpeedTestError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.last_upload_len.store(payload.len(), Ordering::SeqCst);
        self.upload.perform(cancel).await?;
        Ok(UploadAck {
            success: self.upload_success,
            bytes_received: payload.len() as u64,
            duration_ms: 1,
        })
    }
}
