use std::{collections::HashSet, fmt, sync::Arc};

use tracing::warn;

use crate::data::Metric;

use super::PointRenderer;

/// Selects which metrics are rendered.
#[derive(Clone, Default)]
pub enum MetricFilter {
    /// Every metric is rendered.
    #[default]
    All,

    /// Only metrics whose name exactly matches one of the given names are rendered.
    Names(HashSet<String>),

    /// Only metrics whose name satisfies the predicate are rendered.
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl MetricFilter {
    /// Creates a filter that matches the given metric names exactly.
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MetricFilter::Names(names.into_iter().map(Into::into).collect())
    }

    /// Creates a filter from a predicate over metric names.
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        MetricFilter::Predicate(Arc::new(predicate))
    }

    /// Returns `true` if a metric with the given name should be rendered.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            MetricFilter::All => true,
            MetricFilter::Names(names) => names.contains(name),
            MetricFilter::Predicate(predicate) => predicate(name),
        }
    }
}

impl fmt::Debug for MetricFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricFilter::All => f.write_str("All"),
            MetricFilter::Names(names) => f.debug_tuple("Names").field(names).finish(),
            MetricFilter::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Renders a metric as a header block followed by one block per point.
///
/// The header has the form `Metric Name: <name>[, <description>][, Unit: <unit>][, Meter: <meter>[/<version>]]`,
/// where each optional clause only appears when the corresponding field is non-empty.
///
/// Metrics rejected by the configured [`MetricFilter`] produce no blocks at all. Points whose value does not match the
/// metric kind are logged and skipped, without affecting the other points of the metric.
#[derive(Debug, Default)]
pub struct MetricRenderer {
    filter: MetricFilter,
    points: PointRenderer,
}

impl MetricRenderer {
    /// Creates a new `MetricRenderer` with the given filter.
    pub fn new(filter: MetricFilter) -> Self {
        Self { filter, points: PointRenderer::new() }
    }

    /// Returns the filter used by this renderer.
    pub fn filter(&self) -> &MetricFilter {
        &self.filter
    }

    /// Renders `metric` into text blocks.
    ///
    /// Returns an empty vector if the metric is filtered out. Otherwise, the first block is the metric header, and it
    /// is followed by one block per renderable point, in the order the points appear in the metric.
    pub fn render(&mut self, metric: &Metric) -> Vec<String> {
        if !self.filter.matches(&metric.name) {
            return Vec::new();
        }

        let mut blocks = Vec::with_capacity(metric.points.len() + 1);
        blocks.push(render_header(metric));

        for point in &metric.points {
            match self.points.render(metric, point) {
                Ok(block) => blocks.push(block),
                Err(e) => warn!(metric_name = %metric.name, error = %e, "Skipping malformed metric point."),
            }
        }

        blocks
    }
}

fn render_header(metric: &Metric) -> String {
    let mut header = String::from("Metric Name: ");
    header.push_str(&metric.name);

    if !metric.description.is_empty() {
        header.push_str(", ");
        header.push_str(&metric.description);
    }

    if !metric.unit.is_empty() {
        header.push_str(", Unit: ");
        header.push_str(&metric.unit);
    }

    if !metric.scope.name.is_empty() {
        header.push_str(", Meter: ");
        header.push_str(&metric.scope.name);

        if let Some(version) = metric.scope.version.as_deref().filter(|version| !version.is_empty()) {
            header.push('/');
            header.push_str(version);
        }
    }

    header
}
