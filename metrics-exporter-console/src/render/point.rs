use std::fmt;

use crate::{
    boundary::lower_boundary,
    data::{
        Exemplar, ExemplarValue, ExponentialHistogramData, HistogramData, Metric, MetricKind, MetricPoint, PointValue,
    },
    format::{push_timestamp, InvariantFormatter},
};

use super::RenderError;

/// Renders a single metric point as a block of text.
///
/// The block starts with the point's time window, tags, and metric kind, followed by a `Value:` line whose contents
/// depend on the metric kind:
///
/// - sums and gauges render their scalar value
/// - histograms render a `Sum/Count/Min/Max` summary followed by one line per explicit bucket, `(lower,upper]:count`
/// - exponential histograms render the same summary, the zero bucket (if non-empty), and one line per positive bucket,
///   `(lower, upper]:count`, with boundaries derived from the bucket index and scale
///
/// If the point has exemplars, they are listed after a blank line under an `Exemplars` heading.
///
/// The returned block has no trailing newline.
pub struct PointRenderer {
    formatter: InvariantFormatter,
}

impl PointRenderer {
    /// Creates a new `PointRenderer`.
    pub fn new() -> Self {
        Self { formatter: InvariantFormatter::new() }
    }

    /// Renders `point`, which belongs to `metric`.
    ///
    /// # Errors
    ///
    /// If the point's value does not have the shape implied by the metric's kind, an error is returned and nothing is
    /// rendered.
    pub fn render(&mut self, metric: &Metric, point: &MetricPoint) -> Result<String, RenderError> {
        // Render the value first so that a mismatched point doesn't cost us the rest of the block.
        let mut value = String::new();
        self.write_value(&mut value, metric, &point.value)?;

        let mut buf = String::with_capacity(value.len() + 96);
        buf.push('(');
        push_timestamp(&mut buf, &point.start_time);
        buf.push_str(", ");
        push_timestamp(&mut buf, &point.end_time);
        buf.push_str("] ");

        for tag in &point.tags {
            buf.push_str(tag.key());
            buf.push_str(": ");
            buf.push_str(tag.value());
            buf.push(' ');
        }

        buf.push_str(metric.kind.as_str());
        buf.push_str("\nValue: ");
        buf.push_str(&value);

        if !point.exemplars.is_empty() {
            buf.push_str("\n\nExemplars");
            for exemplar in &point.exemplars {
                buf.push('\n');
                self.write_exemplar(&mut buf, metric.kind, exemplar);
            }
        }

        Ok(buf)
    }

    fn write_value(&mut self, buf: &mut String, metric: &Metric, value: &PointValue) -> Result<(), RenderError> {
        match metric.kind {
            MetricKind::LongSum | MetricKind::LongSumNonMonotonic | MetricKind::LongGauge => match value {
                PointValue::Long(value) => self.formatter.push_i64(buf, *value),
                other => return Err(mismatch(metric, other)),
            },
            MetricKind::DoubleSum | MetricKind::DoubleSumNonMonotonic | MetricKind::DoubleGauge => match value {
                PointValue::Double(value) => self.formatter.push_f64(buf, *value),
                other => return Err(mismatch(metric, other)),
            },
            MetricKind::Histogram => match value {
                PointValue::Histogram(data) => self.write_histogram(buf, data),
                other => return Err(mismatch(metric, other)),
            },
            MetricKind::ExponentialHistogram => match value {
                PointValue::ExponentialHistogram(data) => self.write_exponential_histogram(buf, data),
                other => return Err(mismatch(metric, other)),
            },
        }

        Ok(())
    }

    fn write_summary(&mut self, buf: &mut String, sum: f64, count: u64, min_max: Option<(f64, f64)>) {
        buf.push_str("Sum: ");
        self.formatter.push_f64(buf, sum);
        buf.push_str(" Count: ");
        self.formatter.push_u64(buf, count);

        if let Some((min, max)) = min_max {
            buf.push_str(" Min: ");
            self.formatter.push_f64(buf, min);
            buf.push_str(" Max: ");
            self.formatter.push_f64(buf, max);
        }
    }

    fn write_histogram(&mut self, buf: &mut String, data: &HistogramData) {
        self.write_summary(buf, data.sum, data.count, data.min_max);

        let mut previous_bound = None;
        for bucket in &data.buckets {
            buf.push_str("\n(");
            match previous_bound {
                None => buf.push_str("-Infinity"),
                Some(bound) => self.formatter.push_f64(buf, bound),
            }
            buf.push(',');
            if bucket.upper_bound.is_infinite() && bucket.upper_bound.is_sign_positive() {
                buf.push_str("+Infinity");
            } else {
                self.formatter.push_f64(buf, bucket.upper_bound);
            }
            buf.push_str("]:");
            self.formatter.push_u64(buf, bucket.count);

            previous_bound = Some(bucket.upper_bound);
        }
    }

    fn write_exponential_histogram(&mut self, buf: &mut String, data: &ExponentialHistogramData) {
        self.write_summary(buf, data.sum, data.count, data.min_max);

        if data.zero_count != 0 {
            buf.push_str("\nZero Bucket:");
            self.formatter.push_u64(buf, data.zero_count);
        }

        let mut index = data.positive.offset;
        for count in &data.positive.counts {
            let next_index = index.wrapping_add(1);

            buf.push_str("\n(");
            self.formatter.push_f64(buf, lower_boundary(index, data.scale));
            buf.push_str(", ");
            self.formatter.push_f64(buf, lower_boundary(next_index, data.scale));
            buf.push_str("]:");
            self.formatter.push_u64(buf, *count);

            index = next_index;
        }
    }

    fn write_exemplar(&mut self, buf: &mut String, kind: MetricKind, exemplar: &Exemplar) {
        buf.push_str("Timestamp: ");
        push_timestamp(buf, &exemplar.timestamp);

        // The value is shown in the metric's numeric kind, whichever variant the producer recorded it as.
        buf.push_str(" Value: ");
        if kind.is_long() {
            let value = match exemplar.value {
                ExemplarValue::Long(value) => value,
                ExemplarValue::Double(value) => value as i64,
            };
            self.formatter.push_i64(buf, value);
        } else {
            let value = match exemplar.value {
                ExemplarValue::Long(value) => value as f64,
                ExemplarValue::Double(value) => value,
            };
            self.formatter.push_f64(buf, value);
        }

        if let Some(trace) = exemplar.trace.filter(|trace| !trace.trace_id.is_invalid()) {
            buf.push_str(" TraceId: ");
            buf.push_str(&trace.trace_id.to_string());
            buf.push_str(" SpanId: ");
            buf.push_str(&trace.span_id.to_string());
        }
    }
}

impl Default for PointRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PointRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointRenderer").finish_non_exhaustive()
    }
}

fn mismatch(metric: &Metric, value: &PointValue) -> RenderError {
    RenderError::KindMismatch { metric: metric.name.clone(), kind: metric.kind, value: value.shape() }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone as _, Utc};
    use metrics::Label;

    use super::PointRenderer;
    use crate::{
        data::{
            Exemplar, ExemplarValue, ExponentialBuckets, ExponentialHistogramData, HistogramBucket, HistogramData,
            Metric, MetricKind, MetricPoint, PointValue, SpanId, TraceContext, TraceId,
        },
        render::RenderError,
    };

    const WINDOW: &str = "(2024-05-01T12:00:00.0000000Z, 2024-05-01T12:00:10.5000000Z]";

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn end() -> DateTime<Utc> {
        start() + chrono::Duration::milliseconds(10_500)
    }

    fn render(kind: MetricKind, point: MetricPoint) -> String {
        let metric = Metric::new("test.metric", kind);
        PointRenderer::new().render(&metric, &point).expect("point should render")
    }

    #[test]
    fn scalar_values() {
        let cases = [
            (MetricKind::LongSum, PointValue::Long(42), "LongSum\nValue: 42"),
            (MetricKind::LongSumNonMonotonic, PointValue::Long(-3), "LongSumNonMonotonic\nValue: -3"),
            (MetricKind::DoubleSum, PointValue::Double(1.5), "DoubleSum\nValue: 1.5"),
            (MetricKind::DoubleSumNonMonotonic, PointValue::Double(-0.25), "DoubleSumNonMonotonic\nValue: -0.25"),
            (MetricKind::LongGauge, PointValue::Long(7), "LongGauge\nValue: 7"),
            (MetricKind::DoubleGauge, PointValue::Double(98.0), "DoubleGauge\nValue: 98"),
            (MetricKind::DoubleGauge, PointValue::Double(1e-7), "DoubleGauge\nValue: 1E-07"),
        ];

        for (kind, value, expected) in cases {
            let actual = render(kind, MetricPoint::new(start(), end(), value));
            assert_eq!(actual, format!("{WINDOW} {expected}"));
        }
    }

    #[test]
    fn tags_render_in_order_without_dedup() {
        let point = MetricPoint::new(start(), end(), PointValue::Long(1)).with_tags([
            Label::new("http.request.method", "GET"),
            Label::new("url.scheme", "https"),
            Label::new("url.scheme", "http"),
        ]);

        let actual = render(MetricKind::LongSumNonMonotonic, point);
        let expected = format!(
            "{WINDOW} http.request.method: GET url.scheme: https url.scheme: http LongSumNonMonotonic\nValue: 1"
        );
        assert_eq!(actual, expected);
    }

    #[test]
    fn explicit_histogram() {
        let data = HistogramData {
            sum: 27.5,
            count: 6,
            min_max: None,
            buckets: vec![
                HistogramBucket { upper_bound: 1.0, count: 2 },
                HistogramBucket { upper_bound: 5.0, count: 3 },
                HistogramBucket { upper_bound: f64::INFINITY, count: 1 },
            ],
        };

        let actual = render(MetricKind::Histogram, MetricPoint::new(start(), end(), PointValue::Histogram(data)));
        let lines = actual.lines().collect::<Vec<_>>();
        assert_eq!(
            lines,
            [
                &format!("{WINDOW} Histogram")[..],
                "Value: Sum: 27.5 Count: 6",
                "(-Infinity,1]:2",
                "(1,5]:3",
                "(5,+Infinity]:1",
            ]
        );
    }

    #[test]
    fn explicit_histogram_with_min_max() {
        let data = HistogramData {
            sum: 0.75,
            count: 2,
            min_max: Some((0.25, 0.5)),
            buckets: vec![
                HistogramBucket { upper_bound: 0.1, count: 0 },
                HistogramBucket { upper_bound: f64::INFINITY, count: 2 },
            ],
        };

        let actual = render(MetricKind::Histogram, MetricPoint::new(start(), end(), PointValue::Histogram(data)));
        assert!(actual.ends_with("Value: Sum: 0.75 Count: 2 Min: 0.25 Max: 0.5\n(-Infinity,0.1]:0\n(0.1,+Infinity]:2"));
    }

    #[test]
    fn exponential_histogram_without_zero_bucket() {
        let data = ExponentialHistogramData {
            sum: 15.0,
            count: 10,
            scale: 0,
            zero_count: 0,
            positive: ExponentialBuckets { offset: 0, counts: vec![4, 6] },
            ..Default::default()
        };

        let point = MetricPoint::new(start(), end(), PointValue::ExponentialHistogram(data));
        let actual = render(MetricKind::ExponentialHistogram, point);
        let lines = actual.lines().collect::<Vec<_>>();
        assert_eq!(
            lines,
            [&format!("{WINDOW} ExponentialHistogram")[..], "Value: Sum: 15 Count: 10", "(1, 2]:4", "(2, 4]:6"]
        );
        assert!(!actual.contains("Zero Bucket"));
    }

    #[test]
    fn exponential_histogram_with_zero_bucket_and_negative_scale() {
        let data = ExponentialHistogramData {
            sum: 100.0,
            count: 5,
            min_max: Some((0.0, 60.0)),
            scale: -1,
            zero_count: 2,
            positive: ExponentialBuckets { offset: 2, counts: vec![1, 0, 2] },
        };

        let point = MetricPoint::new(start(), end(), PointValue::ExponentialHistogram(data));
        let actual = render(MetricKind::ExponentialHistogram, point);
        let lines = actual.lines().skip(1).collect::<Vec<_>>();
        assert_eq!(
            lines,
            ["Value: Sum: 100 Count: 5 Min: 0 Max: 60", "Zero Bucket:2", "(16, 64]:1", "(64, 256]:0", "(256, 1024]:2"]
        );
    }

    #[test]
    fn exponential_histogram_positive_scale() {
        let data = ExponentialHistogramData {
            scale: 1,
            positive: ExponentialBuckets { offset: -1, counts: vec![3, 5] },
            ..Default::default()
        };

        let point = MetricPoint::new(start(), end(), PointValue::ExponentialHistogram(data));
        let actual = render(MetricKind::ExponentialHistogram, point);
        let lines = actual.lines().skip(2).collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("(0.70710678118654"), "{}", lines[0]);
        assert!(lines[0].ends_with(", 1]:3"), "{}", lines[0]);
        assert!(lines[1].starts_with("(1, 1.41421356237309"), "{}", lines[1]);
        assert!(lines[1].ends_with("]:5"), "{}", lines[1]);
    }

    #[test]
    fn gauge_without_exemplars_has_no_exemplar_section() {
        let actual = render(MetricKind::DoubleGauge, MetricPoint::new(start(), end(), PointValue::Double(3.5)));
        assert!(!actual.contains("Exemplars"));
    }

    #[test]
    fn exemplars_follow_a_blank_line() {
        let trace = TraceContext {
            trace_id: TraceId([
                0x4b, 0xf9, 0x2f, 0x35, 0x77, 0xb3, 0x4d, 0xa6, 0xa3, 0xce, 0x92, 0x9d, 0x0e, 0x0e, 0x47, 0x36,
            ]),
            span_id: SpanId([0x00, 0xf0, 0x67, 0xaa, 0x0b, 0xa9, 0x02, 0xb7]),
        };
        let point = MetricPoint::new(start(), end(), PointValue::Long(12))
            .with_exemplar(Exemplar { timestamp: start(), value: ExemplarValue::Long(5), trace: Some(trace) })
            .with_exemplar(Exemplar { timestamp: end(), value: ExemplarValue::Long(7), trace: None });

        let actual = render(MetricKind::LongGauge, point);
        let expected = format!(
            "{WINDOW} LongGauge\nValue: 12\n\nExemplars\n\
             Timestamp: 2024-05-01T12:00:00.0000000Z Value: 5 \
             TraceId: 4bf92f3577b34da6a3ce929d0e0e4736 SpanId: 00f067aa0ba902b7\n\
             Timestamp: 2024-05-01T12:00:10.5000000Z Value: 7"
        );
        assert_eq!(actual, expected);
    }

    #[test]
    fn single_double_exemplar_with_invalid_trace() {
        let point = MetricPoint::new(start(), end(), PointValue::Double(0.5)).with_exemplar(Exemplar {
            timestamp: start(),
            value: ExemplarValue::Double(0.125),
            trace: Some(TraceContext::default()),
        });

        let actual = render(MetricKind::DoubleGauge, point);
        let exemplar_lines = actual.lines().skip_while(|line| *line != "Exemplars").skip(1).collect::<Vec<_>>();
        assert_eq!(exemplar_lines, ["Timestamp: 2024-05-01T12:00:00.0000000Z Value: 0.125"]);
    }

    #[test]
    fn exemplar_values_follow_the_metric_kind() {
        let exemplar = |value| Exemplar { timestamp: start(), value, trace: None };
        let cases = [
            (MetricKind::LongGauge, PointValue::Long(3), ExemplarValue::Double(2.75), "Value: 2"),
            (MetricKind::LongSum, PointValue::Long(3), ExemplarValue::Double(-1.5), "Value: -1"),
            (
                MetricKind::DoubleGauge,
                PointValue::Double(3.0),
                ExemplarValue::Long(9_007_199_254_740_993),
                "Value: 9.007199254740992E+15",
            ),
            (MetricKind::DoubleSum, PointValue::Double(3.0), ExemplarValue::Long(5), "Value: 5"),
            (
                MetricKind::Histogram,
                PointValue::Histogram(HistogramData::default()),
                ExemplarValue::Long(1_000_000_000_000_000),
                "Value: 1E+18",
            ),
        ];

        for (kind, value, exemplar_value, expected) in cases {
            let point = MetricPoint::new(start(), end(), value).with_exemplar(exemplar(exemplar_value));
            let actual = render(kind, point);
            let exemplar_line = actual.lines().last().unwrap_or_default();
            assert_eq!(exemplar_line, format!("Timestamp: 2024-05-01T12:00:00.0000000Z {expected}"), "{kind}");
        }
    }

    #[test]
    fn kind_mismatch_is_an_error() {
        let metric = Metric::new("broken", MetricKind::Histogram);
        let point = MetricPoint::new(start(), end(), PointValue::Long(1));

        let result = PointRenderer::new().render(&metric, &point);
        assert_eq!(
            result,
            Err(RenderError::KindMismatch { metric: "broken".to_string(), kind: MetricKind::Histogram, value: "long" })
        );
    }
}
