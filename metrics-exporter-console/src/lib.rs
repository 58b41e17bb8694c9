//! A [`metrics`]-compatible exporter that periodically writes human-readable metric reports to a console or any other
//! [`Write`][std::io::Write] sink.
//!
//! # Usage
//!
//! Using the exporter is straightforward:
//!
//! ```no_run
//! # use metrics_exporter_console::ConsoleExporterBuilder;
//! // First, create a builder.
//! //
//! // The builder can configure how often metrics are exported, how long collection may take, which metrics are
//! // reported, where the reports are written, and so on.
//! let builder = ConsoleExporterBuilder::new();
//!
//! // Normally, most users will want to "install" the exporter, which sets it as the global recorder for all `metrics`
//! // calls, and spawns the background thread that periodically writes out the reports.
//! //
//! // The returned handle controls the exporter: dropping it runs one final export and stops the background thread.
//! let handle = builder.install().expect("failed to install recorder/exporter");
//!
//! metrics::counter!("http.server.requests", "method" => "GET").increment(1);
//!
//! // Reports can also be requested on demand.
//! handle.force_flush().expect("failed to export metrics");
//!
//! // For scenarios where you need access to the `Recorder` object, perhaps to wrap it in a layer stack, or something
//! // else, you can simply call `build` instead of `install`:
//! # let builder = ConsoleExporterBuilder::new();
//! let (recorder, handle) = builder.build().expect("failed to build recorder/exporter");
//! ```
//!
//! Metrics don't have to come from the `metrics` facade: any [`MetricProducer`] can feed the exporter, via
//! [`ConsoleExporterBuilder::build_with_producer`].
//!
//! # Report format
//!
//! Each export writes a single report. Every metric in the report is preceded by an empty line and starts with a
//! header:
//!
//! ```text
//! Metric Name: http.server.active_requests, Number of active HTTP server requests., Unit: {request}, Meter: Microsoft.AspNetCore.Hosting
//! ```
//!
//! The header is followed by one block per point, giving the point's time window, tags, and metric kind, and then its
//! value:
//!
//! ```text
//! (2024-05-01T12:00:00.0000000Z, 2024-05-01T12:00:10.0000000Z] http.request.method: GET LongSumNonMonotonic
//! Value: 3
//! ```
//!
//! Histograms report their sum and count, along with their minimum and maximum when tracked, and one line per bucket:
//!
//! ```text
//! Value: Sum: 27.5 Count: 6 Min: 0.5 Max: 12
//! (-Infinity,1]:2
//! (1,5]:3
//! (5,+Infinity]:1
//! ```
//!
//! Exponential histograms report their zero bucket, when non-empty, and one line per positive bucket, with bucket
//! boundaries derived from the bucket index and the histogram scale:
//!
//! ```text
//! Value: Sum: 15 Count: 10
//! Zero Bucket:2
//! (1, 2]:4
//! (2, 4]:4
//! ```
//!
//! Numbers are always rendered the same way regardless of locale, and timestamps are always in UTC.
//!
//! # Profiles
//!
//! [`ConsoleExporterBuilder::new`] exports every 10 seconds, and lets collection take as long as it needs.
//! [`ConsoleExporterBuilder::periodic`] exports every 60 seconds, and abandons a collection after 30 seconds.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod boundary;
pub use self::boundary::lower_boundary;

mod builder;
pub use self::builder::{BuildError, ConsoleExporterBuilder};

pub mod data;

mod exporter;
pub use self::exporter::{ConsoleExporter, ExportError};

mod format;

mod producer;
pub use self::producer::{CollectContext, CollectError, MetricProducer};

mod recorder;
pub use self::recorder::{ConsoleRecorder, DEFAULT_HISTOGRAM_BOUNDS};

pub mod render;

mod scheduler;
pub use self::scheduler::{ExporterHandle, ExporterState};
