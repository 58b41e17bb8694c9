use std::{io, sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    data::{InstrumentationScope, Temporality},
    exporter::ConsoleExporter,
    producer::MetricProducer,
    recorder::{ConsoleRecorder, RecorderConfiguration, DEFAULT_HISTOGRAM_BOUNDS},
    render::MetricFilter,
    scheduler::{ExporterHandle, PeriodicExporter, SchedulerConfiguration},
};

const DEFAULT_EXPORTER_NAME: &str = "console";
const DEFAULT_EXPORT_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_PERIODIC_EXPORT_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_PERIODIC_EXPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that could occur while building or installing a console recorder/exporter.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The export interval was zero.
    #[error("export interval must be greater than zero")]
    ZeroExportInterval,

    /// The export timeout was zero.
    #[error("export timeout must be greater than zero")]
    ZeroExportTimeout,

    /// The histogram bucket boundaries were empty, not finite, or not strictly increasing.
    #[error("histogram bounds must be non-empty, finite, and strictly increasing")]
    InvalidHistogramBounds,

    /// Failed to spawn the background thread.
    #[error("failed to spawn background thread for exporter: {0}")]
    Backend(#[source] io::Error),

    /// Failed to install the recorder due to an existing global recorder already being installed.
    #[error("failed to install exporter as global recorder")]
    FailedToInstall,
}

/// Builder for a console exporter.
///
/// The builder starts out with the console profile (see [`ConsoleExporterBuilder::new`]), and can be switched to the
/// more conservative periodic profile with [`ConsoleExporterBuilder::periodic`].
pub struct ConsoleExporterBuilder {
    name: String,
    export_interval: Duration,
    export_timeout: Option<Duration>,
    temporality: Temporality,
    filter: MetricFilter,
    sink: Option<Box<dyn io::Write + Send>>,
    scope: InstrumentationScope,
    histogram_bounds: Vec<f64>,
    record_min_max: bool,
}

impl ConsoleExporterBuilder {
    /// Creates a new `ConsoleExporterBuilder` using the console profile.
    ///
    /// Metrics are exported every 10 seconds, and collection is allowed to take as long as it needs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `ConsoleExporterBuilder` using the periodic profile.
    ///
    /// Metrics are exported every 60 seconds, and each collection is abandoned after 30 seconds.
    pub fn periodic() -> Self {
        Self {
            export_interval: DEFAULT_PERIODIC_EXPORT_INTERVAL,
            export_timeout: Some(DEFAULT_PERIODIC_EXPORT_TIMEOUT),
            ..Self::default()
        }
    }

    /// Sets the name of the exporter.
    ///
    /// The name is used to name the background thread, as `metrics-exporter-<name>`, and is attached to the exporter's
    /// own log events.
    ///
    /// Defaults to `console`.
    #[must_use]
    pub fn with_name<N>(mut self, name: N) -> Self
    where
        N: Into<String>,
    {
        self.name = name.into();
        self
    }

    /// Sets the export interval.
    ///
    /// This controls how often metrics are collected and written out. Exports happen on interval boundaries counted
    /// from when the exporter started. If an export is still in progress when a boundary passes, that interval is
    /// skipped, and the next export happens on the following boundary.
    ///
    /// Defaults to 10 seconds, or 60 seconds for the periodic profile.
    #[must_use]
    pub fn with_export_interval(mut self, interval: Duration) -> Self {
        self.export_interval = interval;
        self
    }

    /// Sets the export timeout.
    ///
    /// This controls how long an export waits for metrics to be collected. When the timeout elapses, the collection is
    /// cancelled and the export is skipped. Later exports are skipped too, until the cancelled collection returns.
    /// `None` waits indefinitely.
    ///
    /// Defaults to `None`, or 30 seconds for the periodic profile.
    #[must_use]
    pub fn with_export_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.export_timeout = timeout;
        self
    }

    /// Sets the aggregation temporality requested when collecting metrics.
    ///
    /// Defaults to [`Temporality::Cumulative`].
    #[must_use]
    pub fn with_temporality(mut self, temporality: Temporality) -> Self {
        self.temporality = temporality;
        self
    }

    /// Restricts the exported metrics to those with exactly one of the given names.
    ///
    /// Defaults to exporting every metric.
    #[must_use]
    pub fn with_metric_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter = MetricFilter::names(names);
        self
    }

    /// Sets the filter that decides which metrics are exported.
    ///
    /// Defaults to [`MetricFilter::All`].
    #[must_use]
    pub fn with_metric_filter(mut self, filter: MetricFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Sets where reports are written.
    ///
    /// Defaults to standard output.
    #[must_use]
    pub fn with_sink<W>(mut self, sink: W) -> Self
    where
        W: io::Write + Send + 'static,
    {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Sets the meter identity attached to every metric recorded through the recorder.
    ///
    /// Defaults to no meter identity.
    #[must_use]
    pub fn with_meter<N>(mut self, name: N, version: Option<&str>) -> Self
    where
        N: Into<String>,
    {
        self.scope = InstrumentationScope { name: name.into(), version: version.map(ToString::to_string) };
        self
    }

    /// Sets the upper bounds of the explicit histogram buckets used by the recorder.
    ///
    /// A final bucket with an upper bound of `+inf` is always added.
    ///
    /// Defaults to `[0, 5, 10, 25, 50, 75, 100, 250, 500, 750, 1000, 2500, 5000, 7500, 10000]`.
    #[must_use]
    pub fn with_histogram_bounds(mut self, bounds: &[f64]) -> Self {
        self.histogram_bounds = bounds.to_vec();
        self
    }

    /// Sets whether or not the recorder tracks the minimum and maximum value of histograms.
    ///
    /// Defaults to `true`.
    #[must_use]
    pub fn with_min_max(mut self, record_min_max: bool) -> Self {
        self.record_min_max = record_min_max;
        self
    }

    fn validate(&self) -> Result<(), BuildError> {
        if self.export_interval.is_zero() {
            return Err(BuildError::ZeroExportInterval);
        }

        if self.export_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(BuildError::ZeroExportTimeout);
        }

        let increasing = self.histogram_bounds.windows(2).all(|pair| pair[0] < pair[1]);
        let finite = self.histogram_bounds.iter().all(|bound| bound.is_finite());
        if self.histogram_bounds.is_empty() || !increasing || !finite {
            return Err(BuildError::InvalidHistogramBounds);
        }

        Ok(())
    }

    /// Builds the exporter around the given producer, and spawns its background thread.
    ///
    /// Settings that only apply to the recorder (meter identity, histogram bounds, and min/max tracking) are validated
    /// but otherwise unused.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, or the background thread could not be spawned, an error will be returned.
    pub fn build_with_producer<P>(self, producer: P) -> Result<ExporterHandle, BuildError>
    where
        P: MetricProducer + 'static,
    {
        self.validate()?;
        self.spawn(Arc::new(producer))
    }

    /// Builds the recorder and the exporter, and spawns the exporter's background thread.
    ///
    /// The recorder must be manually installed by the caller. The exporter keeps running until the returned handle is
    /// shut down or dropped.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, or the background thread could not be spawned, an error will be returned.
    pub fn build(mut self) -> Result<(ConsoleRecorder, ExporterHandle), BuildError> {
        self.validate()?;

        let recorder = ConsoleRecorder::new(RecorderConfiguration {
            scope: std::mem::take(&mut self.scope),
            histogram_bounds: std::mem::take(&mut self.histogram_bounds),
            record_min_max: self.record_min_max,
        });
        let handle = self.spawn(Arc::new(recorder.clone()))?;

        Ok((recorder, handle))
    }

    /// Builds the recorder and the exporter, and installs the recorder as the global recorder.
    ///
    /// The returned handle controls the exporter. Dropping it stops the exporter, while the recorder stays installed.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, the background thread could not be spawned, or a global recorder is already
    /// installed, an error will be returned.
    pub fn install(self) -> Result<ExporterHandle, BuildError> {
        let (recorder, handle) = self.build()?;

        metrics::set_global_recorder(recorder).map_err(|_| BuildError::FailedToInstall)?;
        Ok(handle)
    }

    fn spawn(self, producer: Arc<dyn MetricProducer>) -> Result<ExporterHandle, BuildError> {
        let sink: Box<dyn io::Write + Send> = match self.sink {
            Some(sink) => sink,
            None => Box::new(io::stdout()),
        };
        let exporter = ConsoleExporter::new(self.name, self.filter, sink);
        let config = SchedulerConfiguration {
            export_interval: self.export_interval,
            export_timeout: self.export_timeout,
            temporality: self.temporality,
        };

        PeriodicExporter::new(config, producer, exporter).spawn().map_err(BuildError::Backend)
    }
}

impl Default for ConsoleExporterBuilder {
    fn default() -> Self {
        ConsoleExporterBuilder {
            name: DEFAULT_EXPORTER_NAME.to_string(),
            export_interval: DEFAULT_EXPORT_INTERVAL,
            export_timeout: None,
            temporality: Temporality::Cumulative,
            filter: MetricFilter::All,
            sink: None,
            scope: InstrumentationScope::default(),
            histogram_bounds: DEFAULT_HISTOGRAM_BOUNDS.to_vec(),
            record_min_max: true,
        }
    }
}
