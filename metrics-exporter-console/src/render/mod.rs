//! Text rendering of metric snapshots.
//!
//! Rendering happens in two layers: [`MetricRenderer`] emits a header for each metric and walks its points, and
//! [`PointRenderer`] turns a single point into a block of text, picking the value representation based on the metric
//! kind.

use thiserror::Error;

use crate::data::MetricKind;

mod metric;
pub use self::metric::{MetricFilter, MetricRenderer};

mod point;
pub use self::point::PointRenderer;

/// Errors that could occur while rendering a point.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    /// The point's value does not have the shape implied by the metric kind.
    #[error("point of metric '{metric}' has a {value} value, which does not match metric kind {kind}")]
    KindMismatch {
        /// Name of the metric the point belongs to.
        metric: String,

        /// Declared kind of the metric.
        kind: MetricKind,

        /// Shape of the value that was found instead.
        value: &'static str,
    },
}
