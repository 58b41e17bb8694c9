use std::{
    collections::HashMap,
    sync::{atomic::Ordering, Arc},
};

use chrono::{DateTime, Utc};
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Label, Metadata, Recorder, SharedString, Unit};
use metrics_util::registry::{AtomicStorage, Registry};
use parking_lot::{Mutex, RwLock};

use crate::{
    data::{
        HistogramBucket, HistogramData, InstrumentationScope, Metric, MetricKind, MetricPoint, PointValue, Temporality,
    },
    producer::{CollectContext, CollectError, MetricProducer},
};

/// Default explicit histogram bucket boundaries.
pub const DEFAULT_HISTOGRAM_BOUNDS: [f64; 15] =
    [0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0, 10000.0];

/// Recorder configuration.
pub(crate) struct RecorderConfiguration {
    /// Meter identity attached to every metric.
    pub scope: InstrumentationScope,

    /// Upper bounds of the explicit histogram buckets, excluding the implicit `+inf` bucket.
    pub histogram_bounds: Vec<f64>,

    /// Whether or not to track the minimum and maximum of histograms.
    pub record_min_max: bool,
}

struct Description {
    unit: Option<Unit>,
    text: SharedString,
}

/// Explicit-bucket aggregation of histogram samples.
struct HistogramAggregation {
    sum: f64,
    count: u64,
    min: f64,
    max: f64,
    // One more entry than there are bounds, for the overflow bucket.
    counts: Vec<u64>,
}

impl HistogramAggregation {
    fn new(num_bounds: usize) -> Self {
        Self { sum: 0.0, count: 0, min: f64::INFINITY, max: f64::NEG_INFINITY, counts: vec![0; num_bounds + 1] }
    }

    fn record_many(&mut self, bounds: &[f64], samples: &[f64]) {
        for &sample in samples {
            self.sum += sample;
            self.count += 1;
            self.min = self.min.min(sample);
            self.max = self.max.max(sample);

            // Buckets are upper-inclusive: a sample equal to a bound lands in that bound's bucket.
            let idx = bounds.partition_point(|bound| *bound < sample);
            self.counts[idx] += 1;
        }
    }

    fn to_data(&self, bounds: &[f64], record_min_max: bool) -> HistogramData {
        let buckets = bounds
            .iter()
            .copied()
            .chain(std::iter::once(f64::INFINITY))
            .zip(self.counts.iter().copied())
            .map(|(upper_bound, count)| HistogramBucket { upper_bound, count })
            .collect();

        let min_max = (record_min_max && self.count > 0).then_some((self.min, self.max));

        HistogramData { sum: self.sum, count: self.count, min_max, buckets }
    }

    fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
        self.counts.iter_mut().for_each(|count| *count = 0);
    }
}

struct State {
    config: RecorderConfiguration,
    registry: Registry<Key, AtomicStorage>,
    descriptions: RwLock<HashMap<String, Description>>,
    histograms: Mutex<HashMap<Key, HistogramAggregation>>,
    counter_checkpoints: Mutex<HashMap<Key, u64>>,
    created_at: DateTime<Utc>,
    last_collected_at: Mutex<DateTime<Utc>>,
}

impl State {
    fn describe(&self, key_name: &KeyName, unit: Option<Unit>, text: SharedString) {
        self.descriptions.write().insert(key_name.as_str().to_string(), Description { unit, text });
    }

    fn collect(&self, temporality: Temporality) -> Vec<Metric> {
        let end_time = Utc::now();
        let previous_collection = std::mem::replace(&mut *self.last_collected_at.lock(), end_time);
        let start_time = match temporality {
            Temporality::Cumulative => self.created_at,
            Temporality::Delta => previous_collection,
        };

        let mut points: HashMap<(String, MetricKind), Vec<MetricPoint>> = HashMap::new();
        let mut add_point = |key: &Key, kind: MetricKind, value: PointValue| {
            let point = MetricPoint::new(start_time, end_time, value).with_tags(key.labels().cloned());
            points.entry((key.name().to_string(), kind)).or_default().push(point);
        };

        {
            let mut checkpoints = self.counter_checkpoints.lock();
            self.registry.visit_counters(|key, counter| {
                let current = counter.load(Ordering::Acquire);
                let value = match temporality {
                    Temporality::Cumulative => current,
                    Temporality::Delta => {
                        let previous = checkpoints.insert(key.clone(), current).unwrap_or(0);
                        // A counter that went backwards was reset with an absolute value, so the whole value is new.
                        current.checked_sub(previous).unwrap_or(current)
                    }
                };
                add_point(key, MetricKind::LongSum, PointValue::Long(i64::try_from(value).unwrap_or(i64::MAX)));
            });
        }

        self.registry.visit_gauges(|key, gauge| {
            let value = f64::from_bits(gauge.load(Ordering::Acquire));
            add_point(key, MetricKind::DoubleGauge, PointValue::Double(value));
        });

        {
            let bounds = &self.config.histogram_bounds;
            let mut histograms = self.histograms.lock();
            self.registry.visit_histograms(|key, bucket| {
                let aggregation =
                    histograms.entry(key.clone()).or_insert_with(|| HistogramAggregation::new(bounds.len()));
                bucket.clear_with(|samples| aggregation.record_many(bounds, samples));

                let data = aggregation.to_data(bounds, self.config.record_min_max);
                if temporality == Temporality::Delta {
                    aggregation.reset();
                }
                add_point(key, MetricKind::Histogram, PointValue::Histogram(data));
            });
        }

        let descriptions = self.descriptions.read();
        let mut metrics = points
            .into_iter()
            .map(|((name, kind), mut points)| {
                points.sort_by(|a, b| label_pairs(&a.tags).cmp(label_pairs(&b.tags)));

                let mut metric = Metric::new(name, kind).with_scope(self.config.scope.clone());
                if let Some(description) = descriptions.get(&metric.name) {
                    metric.description = description.text.to_string();
                    metric.unit = description
                        .unit
                        .as_ref()
                        .map(|unit| unit.as_canonical_label().to_string())
                        .unwrap_or_default();
                }
                metric.points = points;
                metric
            })
            .collect::<Vec<_>>();

        metrics.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.kind.as_str().cmp(b.kind.as_str())));
        metrics
    }
}

fn label_pairs(labels: &[Label]) -> impl Iterator<Item = (&str, &str)> {
    labels.iter().map(|label| (label.key(), label.value()))
}

/// A recorder that aggregates metrics in memory until they're collected by the console exporter.
///
/// Counters are reported as [`MetricKind::LongSum`], gauges as [`MetricKind::DoubleGauge`], and histograms as
/// [`MetricKind::Histogram`] over the configured bucket boundaries. Whether values are cumulative or only cover the
/// time since the previous collection depends on the [`Temporality`] requested by the exporter.
///
/// Clones share the same underlying data.
#[derive(Clone)]
pub struct ConsoleRecorder {
    state: Arc<State>,
}

impl ConsoleRecorder {
    pub(crate) fn new(config: RecorderConfiguration) -> Self {
        let created_at = Utc::now();
        let state = State {
            config,
            registry: Registry::atomic(),
            descriptions: RwLock::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
            counter_checkpoints: Mutex::new(HashMap::new()),
            created_at,
            last_collected_at: Mutex::new(created_at),
        };

        Self { state: Arc::new(state) }
    }
}

impl MetricProducer for ConsoleRecorder {
    fn produce(&self, cx: &CollectContext) -> Result<Vec<Metric>, CollectError> {
        cx.check()?;
        Ok(self.state.collect(cx.temporality()))
    }
}

impl Recorder for ConsoleRecorder {
    fn describe_counter(&self, key_name: KeyName, unit: Option<Unit>, description: SharedString) {
        self.state.describe(&key_name, unit, description);
    }

    fn describe_gauge(&self, key_name: KeyName, unit: Option<Unit>, description: SharedString) {
        self.state.describe(&key_name, unit, description);
    }

    fn describe_histogram(&self, key_name: KeyName, unit: Option<Unit>, description: SharedString) {
        self.state.describe(&key_name, unit, description);
    }

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        self.state.registry.get_or_create_counter(key, |existing| Counter::from_arc(Arc::clone(existing)))
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        self.state.registry.get_or_create_gauge(key, |existing| Gauge::from_arc(Arc::clone(existing)))
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        self.state.registry.get_or_create_histogram(key, |existing| Histogram::from_arc(Arc::clone(existing)))
    }
}
