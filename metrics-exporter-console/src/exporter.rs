use std::{
    io::{self, Write as _},
    time::Duration,
};

use thiserror::Error;
use tracing::debug;

use crate::{
    data::Metric,
    producer::CollectError,
    render::{MetricFilter, MetricRenderer},
};

/// Errors that could occur during a single export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The producer did not hand over a batch before the export timeout elapsed.
    #[error("metric collection did not complete within {0:?}")]
    CollectorTimeout(Duration),

    /// A collection abandoned by an earlier export has not returned yet, so no new collection was started.
    #[error("previous metric collection is still running")]
    CollectionInProgress,

    /// The producer failed to collect a batch.
    #[error("failed to collect metrics: {0}")]
    Collect(#[from] CollectError),

    /// The rendered report could not be written to the sink.
    #[error("failed to write report: {0}")]
    Sink(#[from] io::Error),

    /// The exporter has already been shut down.
    #[error("exporter is shut down")]
    Shutdown,
}

/// Renders batches of metrics and writes them to a sink.
///
/// Each export renders the whole batch into a single report, and the report is written with one `write_all` followed
/// by a `flush`. Within the report, every rendered metric is preceded by an empty line, and every block (the metric
/// header, and each point) is terminated by a newline.
pub struct ConsoleExporter {
    name: String,
    renderer: MetricRenderer,
    sink: Box<dyn io::Write + Send>,
}

impl ConsoleExporter {
    /// Creates a new `ConsoleExporter`.
    pub fn new<N>(name: N, filter: MetricFilter, sink: Box<dyn io::Write + Send>) -> Self
    where
        N: Into<String>,
    {
        Self { name: name.into(), renderer: MetricRenderer::new(filter), sink }
    }

    /// Returns the name of this exporter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders `batch` into a report without writing it.
    pub fn render(&mut self, batch: &[Metric]) -> String {
        let mut report = String::new();

        for metric in batch {
            let blocks = self.renderer.render(metric);
            if blocks.is_empty() {
                continue;
            }

            report.push('\n');
            for block in blocks {
                report.push_str(&block);
                report.push('\n');
            }
        }

        report
    }

    /// Renders `batch` and writes the resulting report to the sink.
    ///
    /// The batch is consumed, and dropped once the report has been rendered.
    ///
    /// # Errors
    ///
    /// If the report could not be written to the sink, an error is returned. The sink may have received part of the
    /// report in that case.
    pub fn export(&mut self, batch: Vec<Metric>) -> Result<(), ExportError> {
        let num_metrics = batch.len();
        let report = self.render(&batch);
        drop(batch);

        if report.is_empty() {
            debug!(exporter = %self.name, num_metrics, "No metrics to report.");
            return Ok(());
        }

        self.sink.write_all(report.as_bytes())?;
        self.sink.flush()?;

        debug!(exporter = %self.name, num_metrics, report_len = report.len(), "Wrote metrics report.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Write as _},
        sync::{Arc, Mutex},
    };

    use chrono::{TimeZone as _, Utc};

    use super::{ConsoleExporter, ExportError};
    use crate::{
        data::{Metric, MetricKind, MetricPoint, PointValue},
        render::MetricFilter,
    };

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenSink;

    impl io::Write for BrokenSink {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn counter(name: &str, value: i64) -> Metric {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 10).unwrap();
        Metric::new(name, MetricKind::LongSum).with_point(MetricPoint::new(start, end, PointValue::Long(value)))
    }

    #[test]
    fn metrics_are_separated_by_empty_lines() {
        let buffer = SharedBuffer::default();
        let mut exporter = ConsoleExporter::new("test", MetricFilter::All, Box::new(buffer.clone()));

        exporter.export(vec![counter("a", 1), counter("b", 2)]).unwrap();

        let expected = "\nMetric Name: a\n\
                        (2024-05-01T12:00:00.0000000Z, 2024-05-01T12:00:10.0000000Z] LongSum\nValue: 1\n\
                        \nMetric Name: b\n\
                        (2024-05-01T12:00:00.0000000Z, 2024-05-01T12:00:10.0000000Z] LongSum\nValue: 2\n";
        assert_eq!(buffer.contents(), expected);
    }

    #[test]
    fn filtered_metrics_leave_no_trace() {
        let buffer = SharedBuffer::default();
        let filter = MetricFilter::names(["b"]);
        let mut exporter = ConsoleExporter::new("test", filter, Box::new(buffer.clone()));

        exporter.export(vec![counter("a", 1), counter("b", 2), counter("c", 3)]).unwrap();

        let contents = buffer.contents();
        assert!(contents.starts_with("\nMetric Name: b\n"));
        assert!(!contents.contains("Metric Name: a"));
        assert!(!contents.contains("Metric Name: c"));
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let mut exporter = ConsoleExporter::new("test", MetricFilter::All, Box::new(BrokenSink));
        exporter.export(Vec::new()).unwrap();
    }

    #[test]
    fn sink_failures_are_reported() {
        let mut exporter = ConsoleExporter::new("test", MetricFilter::All, Box::new(BrokenSink));
        let result = exporter.export(vec![counter("a", 1)]);
        assert!(matches!(result, Err(ExportError::Sink(e)) if e.kind() == io::ErrorKind::BrokenPipe));
        assert_eq!(exporter.name(), "test");
    }
}
