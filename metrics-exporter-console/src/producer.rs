use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use thiserror::Error;

use crate::data::{Metric, Temporality};

/// Errors that a [`MetricProducer`] may return when asked for a batch.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CollectError {
    /// The producer gave up because the collection deadline passed.
    #[error("collection deadline exceeded")]
    Timeout,

    /// The producer observed that the collection was cancelled.
    #[error("collection was cancelled")]
    Cancelled,

    /// The producer failed for some other reason.
    #[error("collection failed: {0}")]
    Failed(String),
}

/// Per-collection context handed to a [`MetricProducer`].
///
/// Cancellation is cooperative: when the exporter stops waiting on a collection, it flips the cancellation flag, and
/// producers that take a while are expected to check [`is_cancelled`][CollectContext::is_cancelled] (or compare
/// against [`deadline`][CollectContext::deadline]) and bail out early. Whatever they return afterwards is discarded.
#[derive(Clone, Debug)]
pub struct CollectContext {
    temporality: Temporality,
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl CollectContext {
    /// Creates a new `CollectContext`.
    pub fn new(temporality: Temporality, deadline: Option<Instant>) -> Self {
        Self { temporality, deadline, cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Returns the requested aggregation temporality.
    pub fn temporality(&self) -> Temporality {
        self.temporality
    }

    /// Returns the instant by which the collection must finish, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` if the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Returns `true` if the exporter is no longer waiting on this collection.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Marks the collection as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns an error if the collection has been cancelled or its deadline has passed.
    ///
    /// Convenient for producers that want to check in between expensive steps with `?`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::Cancelled`] if the collection was cancelled, or [`CollectError::Timeout`] if the
    /// deadline has passed.
    pub fn check(&self) -> Result<(), CollectError> {
        if self.is_cancelled() {
            Err(CollectError::Cancelled)
        } else if self.is_expired() {
            Err(CollectError::Timeout)
        } else {
            Ok(())
        }
    }
}

/// A source of metric snapshots.
///
/// The exporter calls [`produce`][MetricProducer::produce] once per export, and takes ownership of the returned batch
/// for the duration of that export.
pub trait MetricProducer: Send + Sync {
    /// Collects a batch of metrics.
    ///
    /// # Errors
    ///
    /// If the batch could not be collected, an error is returned and the export is abandoned.
    fn produce(&self, cx: &CollectContext) -> Result<Vec<Metric>, CollectError>;
}

impl<F> MetricProducer for F
where
    F: Fn(&CollectContext) -> Result<Vec<Metric>, CollectError> + Send + Sync,
{
    fn produce(&self, cx: &CollectContext) -> Result<Vec<Metric>, CollectError> {
        self(cx)
    }
}

impl<P> MetricProducer for Arc<P>
where
    P: MetricProducer + ?Sized,
{
    fn produce(&self, cx: &CollectContext) -> Result<Vec<Metric>, CollectError> {
        (**self).produce(cx)
    }
}
