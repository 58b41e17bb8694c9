//! Metric snapshot types handed to the exporter by a [`MetricProducer`][crate::MetricProducer].
//!
//! Every type here is a plain owned value. A batch of [`Metric`]s is moved from the producer into the exporter for the
//! duration of a single export, and is dropped once it has been rendered.

use std::fmt;

use chrono::{DateTime, Utc};
use metrics::Label;

/// Aggregation temporality requested from the producer.
///
/// The exporter itself never interprets this value: it is passed through to the producer on every collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Temporality {
    /// Values accumulate from a fixed start time.
    #[default]
    Cumulative,

    /// Values are reset after every collection.
    Delta,
}

/// The kind of a metric, which determines the shape of its point values and how they are rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Monotonic sum of integer measurements.
    LongSum,

    /// Monotonic sum of floating-point measurements.
    DoubleSum,

    /// Non-monotonic sum of integer measurements, such as an up/down counter.
    LongSumNonMonotonic,

    /// Non-monotonic sum of floating-point measurements.
    DoubleSumNonMonotonic,

    /// Last observed integer value.
    LongGauge,

    /// Last observed floating-point value.
    DoubleGauge,

    /// Histogram with explicit bucket boundaries.
    Histogram,

    /// Base-2 exponential histogram.
    ExponentialHistogram,
}

impl MetricKind {
    /// Returns the display name of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            MetricKind::LongSum => "LongSum",
            MetricKind::DoubleSum => "DoubleSum",
            MetricKind::LongSumNonMonotonic => "LongSumNonMonotonic",
            MetricKind::DoubleSumNonMonotonic => "DoubleSumNonMonotonic",
            MetricKind::LongGauge => "LongGauge",
            MetricKind::DoubleGauge => "DoubleGauge",
            MetricKind::Histogram => "Histogram",
            MetricKind::ExponentialHistogram => "ExponentialHistogram",
        }
    }

    /// Returns `true` if this kind is a sum, monotonic or not.
    pub const fn is_sum(self) -> bool {
        matches!(
            self,
            MetricKind::LongSum
                | MetricKind::DoubleSum
                | MetricKind::LongSumNonMonotonic
                | MetricKind::DoubleSumNonMonotonic
        )
    }

    /// Returns `true` if this kind is a gauge.
    pub const fn is_gauge(self) -> bool {
        matches!(self, MetricKind::LongGauge | MetricKind::DoubleGauge)
    }

    /// Returns `true` if this kind is one of the histogram kinds.
    pub const fn is_histogram(self) -> bool {
        matches!(self, MetricKind::Histogram | MetricKind::ExponentialHistogram)
    }

    /// Returns `true` if this kind carries integer values.
    pub const fn is_long(self) -> bool {
        matches!(self, MetricKind::LongSum | MetricKind::LongSumNonMonotonic | MetricKind::LongGauge)
    }

    /// Returns `true` if this kind carries floating-point scalar values.
    pub const fn is_double(self) -> bool {
        matches!(self, MetricKind::DoubleSum | MetricKind::DoubleSumNonMonotonic | MetricKind::DoubleGauge)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the meter (instrumentation scope) that produced a metric.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstrumentationScope {
    /// Meter name. An empty name means the metric has no meter identity.
    pub name: String,

    /// Meter version, if any.
    pub version: Option<String>,
}

impl InstrumentationScope {
    /// Creates a new `InstrumentationScope` with the given name and no version.
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self { name: name.into(), version: None }
    }

    /// Sets the version.
    #[must_use]
    pub fn with_version<V: Into<String>>(mut self, version: V) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// A metric: its descriptor, and the points collected for it.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    /// Metric name.
    pub name: String,

    /// Human-readable description. May be empty.
    pub description: String,

    /// Unit of measurement. May be empty.
    pub unit: String,

    /// Meter that owns the instrument behind this metric.
    pub scope: InstrumentationScope,

    /// Metric kind.
    pub kind: MetricKind,

    /// Points, in collection order.
    pub points: Vec<MetricPoint>,
}

impl Metric {
    /// Creates a new `Metric` with no description, unit, scope, or points.
    pub fn new<N: Into<String>>(name: N, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            unit: String::new(),
            scope: InstrumentationScope::default(),
            kind,
            points: Vec::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description<D: Into<String>>(mut self, description: D) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the unit.
    #[must_use]
    pub fn with_unit<U: Into<String>>(mut self, unit: U) -> Self {
        self.unit = unit.into();
        self
    }

    /// Sets the instrumentation scope.
    #[must_use]
    pub fn with_scope(mut self, scope: InstrumentationScope) -> Self {
        self.scope = scope;
        self
    }

    /// Appends a point.
    #[must_use]
    pub fn with_point(mut self, point: MetricPoint) -> Self {
        self.points.push(point);
        self
    }
}

/// One aggregated measurement over a time window, for a single set of tags.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricPoint {
    /// Start of the aggregation window.
    pub start_time: DateTime<Utc>,

    /// End of the aggregation window.
    pub end_time: DateTime<Utc>,

    /// Tags (attributes), in rendering order.
    pub tags: Vec<Label>,

    /// Aggregated value.
    pub value: PointValue,

    /// Sampled measurements attached to this point.
    pub exemplars: Vec<Exemplar>,
}

impl MetricPoint {
    /// Creates a new `MetricPoint` over `[start_time, end_time]` with no tags or exemplars.
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>, value: PointValue) -> Self {
        Self { start_time, end_time, tags: Vec::new(), value, exemplars: Vec::new() }
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags<I>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = Label>,
    {
        self.tags = tags.into_iter().collect();
        self
    }

    /// Appends an exemplar.
    #[must_use]
    pub fn with_exemplar(mut self, exemplar: Exemplar) -> Self {
        self.exemplars.push(exemplar);
        self
    }
}

/// The value payload of a point.
///
/// Which variant is valid for a point is determined by the [`MetricKind`] of its metric: scalar kinds carry `Long` or
/// `Double`, and the histogram kinds carry their respective aggregations.
#[derive(Clone, Debug, PartialEq)]
pub enum PointValue {
    /// Integer sum or gauge value.
    Long(i64),

    /// Floating-point sum or gauge value.
    Double(f64),

    /// Explicit-bucket histogram aggregation.
    Histogram(HistogramData),

    /// Exponential histogram aggregation.
    ExponentialHistogram(ExponentialHistogramData),
}

impl PointValue {
    /// Returns a short name describing the shape of this value.
    pub const fn shape(&self) -> &'static str {
        match self {
            PointValue::Long(_) => "long",
            PointValue::Double(_) => "double",
            PointValue::Histogram(_) => "histogram",
            PointValue::ExponentialHistogram(_) => "exponential histogram",
        }
    }
}

/// A single explicit histogram bucket.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistogramBucket {
    /// Inclusive upper bound of the bucket.
    pub upper_bound: f64,

    /// Number of measurements that fell into the bucket.
    pub count: u64,
}

/// Explicit-bucket histogram aggregation.
///
/// Buckets are ordered by strictly increasing upper bound, and the last bucket's upper bound is `+inf`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistogramData {
    /// Sum of all measurements.
    pub sum: f64,

    /// Number of measurements.
    pub count: u64,

    /// Minimum and maximum measurement, when tracked.
    pub min_max: Option<(f64, f64)>,

    /// Buckets.
    pub buckets: Vec<HistogramBucket>,
}

/// A contiguous run of exponential histogram buckets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExponentialBuckets {
    /// Bucket index of the first entry in `counts`.
    pub offset: i32,

    /// Per-bucket counts, starting at `offset`.
    pub counts: Vec<u64>,
}

/// Base-2 exponential histogram aggregation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExponentialHistogramData {
    /// Sum of all measurements.
    pub sum: f64,

    /// Number of measurements.
    pub count: u64,

    /// Minimum and maximum measurement, when tracked.
    pub min_max: Option<(f64, f64)>,

    /// Resolution of the buckets.
    pub scale: i32,

    /// Number of measurements that fell into the zero bucket.
    pub zero_count: u64,

    /// Buckets for positive measurements.
    pub positive: ExponentialBuckets,
}

/// Value of an exemplar.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ExemplarValue {
    /// Integer measurement.
    Long(i64),

    /// Floating-point measurement.
    Double(f64),
}

/// A W3C trace identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceId(pub [u8; 16]);

impl TraceId {
    /// Returns `true` if every byte of the identifier is zero, which denotes an invalid trace.
    pub fn is_invalid(&self) -> bool {
        self.0 == [0; 16]
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

/// A W3C span identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SpanId(pub [u8; 8]);

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for byte in bytes {
        write!(f, "{byte:02x}")?;
    }
    Ok(())
}

/// Trace correlation for an exemplar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceContext {
    /// Trace the measurement was recorded in.
    pub trace_id: TraceId,

    /// Span the measurement was recorded in.
    pub span_id: SpanId,
}

/// A sampled raw measurement retained alongside an aggregation.
#[derive(Clone, Debug, PartialEq)]
pub struct Exemplar {
    /// When the measurement was recorded.
    pub timestamp: DateTime<Utc>,

    /// Measured value.
    pub value: ExemplarValue,

    /// Trace the measurement was recorded in, if any.
    pub trace: Option<TraceContext>,
}
