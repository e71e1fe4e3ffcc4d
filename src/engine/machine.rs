//! The phase state machine.
//!
//! [`SpeedTest`] owns the [`MeasurementState`] and is its only writer. A run
//! is a spawned task that drives the ping sampler, then the download and
//! upload samplers, publishing every state change to subscribers in order.

use super::ping::measure_ping;
use super::progress::ProgressUpdate;
use super::state::{MeasurementState, Phase};
use super::throughput::{measure_throughput, Direction};
use super::{TestConfig, Transport};
use crate::errors::SpeedTestError;
use crate::measurements::RunSummary;
use log::{debug, error, info};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ordered stream of state snapshots.
///
/// Every change is delivered; nothing is coalesced.
pub struct StateReceiver {
    rx: UnboundedReceiver<MeasurementState>,
}

impl StateReceiver {
    /// Wait for the next snapshot.
    pub async fn recv(&mut self) -> Option<MeasurementState> {
        self.rx.recv().await
    }

    /// Take the next snapshot if one is already queued.
    pub fn try_recv(&mut self) -> Option<MeasurementState> {
        self.rx.try_recv().ok()
    }
}

struct StoreInner {
    state: MeasurementState,
    /// Identifies the run allowed to write. Advanced by start, stop and
    /// reset so that a superseded run task cannot touch the state.
    generation: u64,
    last_error: Option<SpeedTestError>,
    summary: RunSummary,
    subscribers: Vec<UnboundedSender<MeasurementState>>,
}

impl StoreInner {
    fn publish(&mut self) {
        let state = &self.state;
        self.subscribers.retain(|tx| tx.send(state.clone()).is_ok());
    }
}

/// Single-writer home of the measurement state.
struct StateStore {
    inner: Mutex<StoreInner>,
}

impl StateStore {
    fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                state: MeasurementState::new(),
                generation: 0,
                last_error: None,
                summary: RunSummary::default(),
                subscribers: Vec::new(),
            }),
        }
    }

    fn snapshot(&self) -> MeasurementState {
        lock(&self.inner).state.clone()
    }

    fn last_error(&self) -> Option<SpeedTestError> {
        lock(&self.inner).last_error.as_ref().map(SpeedTestError::detached)
    }

    fn summary(&self) -> RunSummary {
        lock(&self.inner).summary
    }

    fn subscribe(&self) -> StateReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = lock(&self.inner);
        // Receiver is alive, so this cannot fail.
        let _ = tx.send(inner.state.clone());
        inner.subscribers.push(tx);
        StateReceiver { rx }
    }

    /// Claim the state for a new run.
    fn begin_run(&self) -> Result<u64, SpeedTestError> {
        let mut inner = lock(&self.inner);
        if inner.state.is_running {
            return Err(SpeedTestError::invalid_state(
                "a measurement run is already in progress",
            ));
        }

        inner.generation += 1;
        inner.state = MeasurementState::started();
        inner.last_error = None;
        inner.summary = RunSummary::default();
        inner.publish();
        Ok(inner.generation)
    }

    /// Apply `f` on behalf of run `generation`. Ignored once that run has
    /// been superseded.
    fn update<F>(&self, generation: u64, f: F) -> bool
    where
        F: FnOnce(&mut MeasurementState),
    {
        self.record(generation, |state, _| f(state))
    }

    /// Like [`update`](Self::update), also giving access to the run summary.
    fn record<F>(&self, generation: u64, f: F) -> bool
    where
        F: FnOnce(&mut MeasurementState, &mut RunSummary),
    {
        let mut inner = lock(&self.inner);
        if inner.generation != generation {
            return false;
        }

        let StoreInner { state, summary, .. } = &mut *inner;
        f(state, summary);
        inner.publish();
        true
    }

    /// Record a failure of run `generation` and return to idle.
    fn fail(&self, generation: u64, error: SpeedTestError) {
        let mut inner = lock(&self.inner);
        if inner.generation != generation {
            return;
        }

        inner.state.halt();
        inner.last_error = Some(error);
        inner.publish();
    }

    /// Halt the running run. Returns false when nothing was running.
    fn halt(&self) -> bool {
        let mut inner = lock(&self.inner);
        if !inner.state.is_running {
            return false;
        }

        inner.generation += 1;
        inner.state.halt();
        inner.publish();
        true
    }

    /// Discard everything and return to a fresh idle state.
    fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        inner.state = MeasurementState::new();
        inner.last_error = None;
        inner.summary = RunSummary::default();
        inner.publish();
    }
}

struct RunHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// A measurement engine instance.
///
/// Drives ping, download and upload phases over a [`Transport`] and
/// exposes the live [`MeasurementState`]. One instance corresponds to one
/// test session; runs may be started repeatedly.
///
/// # Example
/// ```no_run
/// use speed_gauge::client::{Client, ClientConfig};
/// use speed_gauge::engine::{SpeedTest, TestConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::new(ClientConfig::default())?;
///     let engine = SpeedTest::new(client, TestConfig::default());
///     let mut updates = engine.subscribe();
///
///     engine.start()?;
///     while let Some(state) = updates.recv().await {
///         if state.phase.is_measuring() {
///             println!("{} {:.0}%", state.phase, state.progress);
///         } else if !state.is_running {
///             break;
///         }
///     }
///     println!("{:?}", engine.state().results);
///     Ok(())
/// }
/// ```
pub struct SpeedTest<T: Transport> {
    transport: Arc<T>,
    config: Arc<TestConfig>,
    store: Arc<StateStore>,
    run: Mutex<Option<RunHandle>>,
}

impl<T: Transport> SpeedTest<T> {
    /// Create an idle engine.
    pub fn new(transport: T, config: TestConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config: Arc::new(config),
            store: Arc::new(StateStore::new()),
            run: Mutex::new(None),
        }
    }

    /// The configuration runs use.
    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> MeasurementState {
        self.store.snapshot()
    }

    /// The error that ended the last run, if it failed for a reason other
    /// than cancellation.
    pub fn last_error(&self) -> Option<SpeedTestError> {
        self.store.last_error()
    }

    /// Summaries of the phases completed in the current or last run,
    /// including sample counts.
    pub fn summary(&self) -> RunSummary {
        self.store.summary()
    }

    /// Receive every state change from now on, starting with the current
    /// state.
    pub fn subscribe(&self) -> StateReceiver {
        self.store.subscribe()
    }

    /// Begin a run.
    ///
    /// Clears previous results and spawns the run on the current tokio
    /// runtime. Fails without touching the state if a run is in progress
    /// or if called outside a runtime.
    pub fn start(&self) -> Result<(), SpeedTestError> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|_| {
            SpeedTestError::invalid_state("start must be called within a tokio runtime")
        })?;

        let mut run = lock(&self.run);
        let generation = self.store.begin_run()?;
        let cancel = CancellationToken::new();

        info!("Starting speed test run #{}", generation);

        let task = runtime.spawn(execute(
            Arc::clone(&self.transport),
            Arc::clone(&self.config),
            Arc::clone(&self.store),
            generation,
            cancel.clone(),
        ));

        *run = Some(RunHandle { cancel, task: Some(task) });
        Ok(())
    }

    /// Cancel the run in progress, keeping results recorded so far.
    ///
    /// Does nothing when no run is in progress.
    pub fn stop(&self) {
        if let Some(run) = lock(&self.run).as_ref() {
            run.cancel.cancel();
        }

        if self.store.halt() {
            info!("Speed test stopped");
        }
    }

    /// Cancel any run and return to a fresh idle state with no results.
    pub fn reset(&self) {
        if let Some(run) = lock(&self.run).as_ref() {
            run.cancel.cancel();
        }

        self.store.clear();
        debug!("Speed test reset");
    }

    /// Wait for the most recently started run task to exit.
    ///
    /// Returns immediately if there is no task to wait for.
    pub async fn wait(&self) {
        let task = lock(&self.run).as_mut().and_then(|run| run.task.take());

        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Speed test task ended abnormally: {}", e);
            }
        }
    }
}

impl<T: Transport> Drop for SpeedTest<T> {
    fn drop(&mut self) {
        if let Some(run) = lock(&self.run).as_ref() {
            run.cancel.cancel();
        }
    }
}

/// Body of a run task.
async fn execute<T: Transport>(
    transport: Arc<T>,
    config: Arc<TestConfig>,
    store: Arc<StateStore>,
    generation: u64,
    cancel: CancellationToken,
) {
    match run_phases(transport.as_ref(), &config, &store, generation, &cancel).await
    {
        Ok(()) => info!("Speed test run #{} complete", generation),
        Err(e) if e.is_cancelled() => {
            info!("Speed test run #{} cancelled", generation);
            store.update(generation, MeasurementState::halt);
        }
        Err(e) => {
            error!("Speed test run #{} failed: {}", generation, e);
            store.fail(generation, e);
        }
    }
}

async fn run_phases<T: Transport>(
    transport: &T,
    config: &TestConfig,
    store: &StateStore,
    generation: u64,
    cancel: &CancellationToken,
) -> Result<(), SpeedTestError> {
    let report = |update: ProgressUpdate| {
        store.update(generation, |state| {
            state.apply_progress(update.progress, update.value)
        });
    };

    let ping = measure_ping(transport, config, cancel, &report).await?;
    info!("Ping: {:.2} ms, jitter: {:.2} ms", ping.ping_ms, ping.jitter_ms);
    advance(store, generation, cancel, |state, summary| {
        state.results.ping = Some(ping.ping_ms);
        state.results.jitter = Some(ping.jitter_ms);
        summary.ping = Some(ping);
        state.enter(Phase::Download);
    })?;

    let download =
        measure_throughput(transport, Direction::Download, config, cancel, &report)
            .await?;
    advance(store, generation, cancel, |state, summary| {
        state.results.download = Some(download.mbps);
        summary.download = Some(download);
        state.enter(Phase::Upload);
    })?;

    let upload =
        measure_throughput(transport, Direction::Upload, config, cancel, &report)
            .await?;
    advance(store, generation, cancel, |state, summary| {
        state.results.upload = Some(upload.mbps);
        summary.upload = Some(upload);
        state.complete();
    })?;

    Ok(())
}

/// Record a phase result, or report cancellation if the run was
/// superseded while the phase finished.
fn advance<F>(
    store: &StateStore,
    generation: u64,
    cancel: &CancellationToken,
    f: F,
) -> Result<(), SpeedTestError>
where
    F: FnOnce(&mut MeasurementState, &mut RunSummary),
{
    if cancel.is_cancelled() || !store.record(generation, f) {
        return Err(SpeedTestError::cancelled());
    }
    Ok(())
}
