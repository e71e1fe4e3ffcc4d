//! Progress updates emitted by the samplers.

/// A live reading from the active sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    /// Percentage of the phase completed, in [0, 100]
    pub progress: f64,
    /// Latest latency in ms (ping) or smoothed speed in Mbps (transfers)
    pub value: f64,
}

impl ProgressUpdate {
    pub fn new(progress: f64, value: f64) -> Self {
        Self { progress, value }
    }
}

/// Callback interface for progress updates.
///
/// Implementations must be non-blocking to avoid affecting
/// measurement accuracy.
pub trait ProgressCallback: Send + Sync {
    /// Called after each sample, or at the throttled update interval.
    fn on_progress(&self, update: ProgressUpdate);
}

impl<F> ProgressCallback for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn on_progress(&self, update: ProgressUpdate) {
        self(update)
    }
}
