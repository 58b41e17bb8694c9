use std::{
    fmt,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{at, bounded, select, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::{
    data::{Metric, Temporality},
    exporter::{ConsoleExporter, ExportError},
    producer::{CollectContext, CollectError, MetricProducer},
};

/// Lifecycle state of a periodic exporter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ExporterState {
    /// Waiting for the next tick or control request.
    Idle = 0,

    /// An export is in progress.
    Exporting = 1,

    /// The exporter has shut down and will not export again.
    Stopped = 2,
}

impl ExporterState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ExporterState::Idle,
            1 => ExporterState::Exporting,
            _ => ExporterState::Stopped,
        }
    }
}

#[derive(Clone, Default)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn get(&self) -> ExporterState {
        ExporterState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ExporterState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Control requests sent from an [`ExporterHandle`] to the scheduler thread.
enum ControlFrame {
    /// Run one export immediately and send back its result.
    ForceFlush(Sender<Result<(), ExportError>>),

    /// Run a final export, send back its result, and stop.
    Shutdown(Sender<Result<(), ExportError>>),
}

/// Scheduler configuration.
pub(crate) struct SchedulerConfiguration {
    pub export_interval: Duration,
    pub export_timeout: Option<Duration>,
    pub temporality: Temporality,
}

/// Drives a [`ConsoleExporter`] from a background thread.
///
/// Exports run on interval boundaries measured from when the scheduler started, and can additionally be requested on
/// demand through the [`ExporterHandle`]. Only one export runs at a time: boundaries that pass while an export is in
/// progress are skipped rather than queued, and the next export waits for the next boundary.
///
/// A collection that outlives the export timeout keeps running on its helper thread. Until it returns, no other
/// collection is started, and exports fail with [`ExportError::CollectionInProgress`].
pub(crate) struct PeriodicExporter {
    config: SchedulerConfiguration,
    producer: Arc<dyn MetricProducer>,
    exporter: ConsoleExporter,
    state: SharedState,
    collector: Option<JoinHandle<()>>,
}

impl PeriodicExporter {
    pub fn new(config: SchedulerConfiguration, producer: Arc<dyn MetricProducer>, exporter: ConsoleExporter) -> Self {
        Self { config, producer, exporter, state: SharedState::default(), collector: None }
    }

    /// Spawns the scheduler thread.
    ///
    /// # Errors
    ///
    /// If the background thread could not be spawned, an error is returned.
    pub fn spawn(self) -> std::io::Result<ExporterHandle> {
        let (control_tx, control_rx) = bounded(16);
        let state = self.state.clone();

        let thread = thread::Builder::new()
            .name(format!("metrics-exporter-{}", self.exporter.name()))
            .spawn(move || self.run(&control_rx))?;

        Ok(ExporterHandle { control_tx, state, thread: Mutex::new(Some(thread)) })
    }

    fn run(mut self, control_rx: &Receiver<ControlFrame>) {
        let interval = self.config.export_interval;
        let origin = Instant::now();
        let mut next_tick = add_or_far_future(origin, interval);

        debug!(
            exporter = self.exporter.name(),
            export_interval = ?self.config.export_interval,
            export_timeout = ?self.config.export_timeout,
            "Periodic exporter started."
        );

        loop {
            let timer = at(next_tick);
            let stop = select! {
                recv(timer) -> _ => {
                    trace!(exporter = self.exporter.name(), "Export interval elapsed.");
                    let _ = self.export();
                    false
                },
                recv(control_rx) -> frame => match frame {
                    Ok(ControlFrame::ForceFlush(reply_tx)) => {
                        let result = self.export();
                        let _ = reply_tx.send(result);
                        false
                    },
                    Ok(ControlFrame::Shutdown(reply_tx)) => {
                        let result = self.export();
                        self.state.set(ExporterState::Stopped);
                        let _ = reply_tx.send(result);
                        true
                    },
                    Err(_) => {
                        // Every handle is gone, so there's nobody left to report to. `export` has already logged
                        // the outcome.
                        let _ = self.export();
                        self.state.set(ExporterState::Stopped);
                        true
                    },
                },
            };

            if stop {
                break;
            }

            let now = Instant::now();
            if next_tick <= now {
                let upcoming = next_tick_after(origin, interval, now);
                if upcoming > next_tick + interval {
                    trace!(exporter = self.exporter.name(), "Skipping export intervals that elapsed during an export.");
                }
                next_tick = upcoming;
            }
        }

        debug!(exporter = self.exporter.name(), "Periodic exporter stopped.");
    }

    fn export(&mut self) -> Result<(), ExportError> {
        self.state.set(ExporterState::Exporting);
        let start = Instant::now();

        let result = self.collect().and_then(|batch| self.exporter.export(batch));
        match &result {
            Ok(()) => debug!(exporter = self.exporter.name(), elapsed = ?start.elapsed(), "Export completed."),
            Err(ExportError::CollectorTimeout(timeout)) => {
                warn!(exporter = self.exporter.name(), ?timeout, "Metric collection timed out; skipping export.");
            }
            Err(ExportError::CollectionInProgress) => {
                warn!(exporter = self.exporter.name(), "Previous metric collection is still running; skipping export.");
            }
            Err(e) => error!(exporter = self.exporter.name(), error = %e, "Export failed."),
        }

        self.state.set(ExporterState::Idle);
        result
    }

    fn collect(&mut self) -> Result<Vec<Metric>, ExportError> {
        let Some(timeout) = self.config.export_timeout else {
            let cx = CollectContext::new(self.config.temporality, None);
            return self.producer.produce(&cx).map_err(ExportError::from);
        };

        // A collection abandoned by an earlier export may still be running, and producers aren't required to be
        // reentrant.
        if let Some(collector) = self.collector.take() {
            if !collector.is_finished() {
                self.collector = Some(collector);
                return Err(ExportError::CollectionInProgress);
            }
            let _ = collector.join();
        }

        let cx = CollectContext::new(self.config.temporality, Some(Instant::now() + timeout));

        // Collection runs on its own thread so that we can stop waiting on it. If it finishes late, the send fails and
        // the batch is dropped without being rendered.
        let (batch_tx, batch_rx) = bounded(1);
        let producer = Arc::clone(&self.producer);
        let collector_cx = cx.clone();
        let collector = thread::Builder::new()
            .name(format!("metrics-exporter-{}-collector", self.exporter.name()))
            .spawn(move || {
                let _ = batch_tx.send(producer.produce(&collector_cx));
            })
            .map_err(|e| CollectError::Failed(format!("failed to spawn collector thread: {e}")))?;

        match batch_rx.recv_timeout(timeout) {
            Ok(result) => {
                let _ = collector.join();
                result.map_err(ExportError::from)
            }
            Err(RecvTimeoutError::Timeout) => {
                cx.cancel();
                self.collector = Some(collector);
                Err(ExportError::CollectorTimeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(CollectError::Failed("collector thread exited without producing a batch".to_string()).into())
            }
        }
    }
}

/// Returns the first interval boundary, counted from `origin`, that comes strictly after `now`.
fn next_tick_after(origin: Instant, interval: Duration, now: Instant) -> Instant {
    let elapsed = now.saturating_duration_since(origin).as_nanos();
    let into_interval = u64::try_from(elapsed % interval.as_nanos().max(1)).unwrap_or(0);
    add_or_far_future(now, interval.saturating_sub(Duration::from_nanos(into_interval)))
}

fn add_or_far_future(instant: Instant, duration: Duration) -> Instant {
    // Roughly thirty years, which any platform's `Instant` can represent.
    instant.checked_add(duration).unwrap_or_else(|| instant + Duration::from_secs(86_400 * 365 * 30))
}

/// Handle to a running periodic exporter.
///
/// Dropping the handle shuts the exporter down, running one final export first.
pub struct ExporterHandle {
    control_tx: Sender<ControlFrame>,
    state: SharedState,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ExporterHandle {
    /// Returns the current state of the exporter.
    pub fn state(&self) -> ExporterState {
        self.state.get()
    }

    /// Runs an export immediately, outside of the regular interval.
    ///
    /// Blocks until the export has completed.
    ///
    /// # Errors
    ///
    /// If the export fails, or the exporter has already been shut down, an error is returned.
    pub fn force_flush(&self) -> Result<(), ExportError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.control_tx.send(ControlFrame::ForceFlush(reply_tx)).map_err(|_| ExportError::Shutdown)?;
        reply_rx.recv().map_err(|_| ExportError::Shutdown)?
    }

    /// Shuts down the exporter.
    ///
    /// A final export is run before the background thread exits, and its result is returned. Blocks until the
    /// background thread has exited.
    ///
    /// # Errors
    ///
    /// If the final export fails, or the exporter has already been shut down, an error is returned.
    pub fn shutdown(&self) -> Result<(), ExportError> {
        let thread = self.thread.lock().take().ok_or(ExportError::Shutdown)?;

        let (reply_tx, reply_rx) = bounded(1);
        let result = match self.control_tx.send(ControlFrame::Shutdown(reply_tx)) {
            Ok(()) => reply_rx.recv().unwrap_or(Err(ExportError::Shutdown)),
            Err(_) => Err(ExportError::Shutdown),
        };

        if thread.join().is_err() {
            error!("Periodic exporter thread panicked.");
        }
        self.state.set(ExporterState::Stopped);

        result
    }
}

impl fmt::Debug for ExporterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterHandle").field("state", &self.state()).finish_non_exhaustive()
    }
}

impl Drop for ExporterHandle {
    fn drop(&mut self) {
        if self.thread.get_mut().is_some() {
            let _ = self.shutdown();
        }
    }
}
