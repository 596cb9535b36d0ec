use histogram::{AtomicHistogram, Histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

const ORDER_TYPE: Ordering = Ordering::Relaxed;

/// Error that occured upon a metrics operation.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum MetricsError {
    /// The histogram rejected an operation.
    #[error("Histogram error: {0}")]
    HistogramError(#[from] Arc<dyn std::error::Error + Send + Sync>),
    /// No latency has been recorded yet.
    #[error("Histogram is empty")]
    Empty,
}

/// Counters describing how a session used its connection manager.
pub struct Metrics {
    read_acquisitions: AtomicU64,
    write_acquisitions: AtomicU64,
    failed_acquisitions: AtomicU64,
    pinned_reuses: AtomicU64,
    releases: AtomicU64,
    failed_releases: AtomicU64,
    acquisition_latency: Arc<AtomicHistogram>,
}

impl Metrics {
    /// Creates zeroed metrics.
    pub fn new() -> Self {
        Metrics::default()
    }

    pub(crate) fn inc_read_acquisitions(&self) {
        self.read_acquisitions.fetch_add(1, ORDER_TYPE);
    }

    pub(crate) fn inc_write_acquisitions(&self) {
        self.write_acquisitions.fetch_add(1, ORDER_TYPE);
    }

    pub(crate) fn inc_failed_acquisitions(&self) {
        self.failed_acquisitions.fetch_add(1, ORDER_TYPE);
    }

    /// Increments counter of requests served by an already pinned connection.
    pub(crate) fn inc_pinned_reuses(&self) {
        self.pinned_reuses.fetch_add(1, ORDER_TYPE);
    }

    /// Counts every release attempt, including failed ones.
    pub(crate) fn inc_releases(&self) {
        self.releases.fetch_add(1, ORDER_TYPE);
    }

    pub(crate) fn inc_failed_releases(&self) {
        self.failed_releases.fetch_add(1, ORDER_TYPE);
    }

    /// Saves to histogram the time a successful acquisition took, in milliseconds.
    pub(crate) fn log_acquisition_latency(&self, latency: u64) -> Result<(), MetricsError> {
        if let Err(err) = self.acquisition_latency.increment(latency) {
            Err(MetricsError::HistogramError(Arc::new(err)))
        } else {
            Ok(())
        }
    }

    /// Returns average acquisition latency in milliseconds
    pub fn get_latency_avg_ms(&self) -> Result<u64, MetricsError> {
        Self::mean(&self.acquisition_latency.load())
    }

    /// Returns acquisition latency from histogram for a given percentile,
    /// as the upper bound of the bucket the percentile falls into.
    /// # Arguments
    ///
    /// * `percentile` - float value (0.0 - 100.0)
    pub fn get_latency_percentile_ms(&self, percentile: f64) -> Result<u64, MetricsError> {
        let res = self.acquisition_latency.load().percentile(percentile);

        match res {
            Err(err) => Err(MetricsError::HistogramError(Arc::new(err))),

            Ok(None) => Err(MetricsError::Empty),

            Ok(Some(p)) => Ok(p.end()),
        }
    }

    /// Returns counter of connections acquired for reads
    pub fn get_read_acquisitions(&self) -> u64 {
        self.read_acquisitions.load(ORDER_TYPE)
    }

    /// Returns counter of connections acquired for writes
    pub fn get_write_acquisitions(&self) -> u64 {
        self.write_acquisitions.load(ORDER_TYPE)
    }

    /// Returns counter of acquisitions the connection manager failed
    pub fn get_failed_acquisitions(&self) -> u64 {
        self.failed_acquisitions.load(ORDER_TYPE)
    }

    /// Returns counter of requests served by an already pinned connection
    pub fn get_pinned_reuses(&self) -> u64 {
        self.pinned_reuses.load(ORDER_TYPE)
    }

    /// Returns counter of connections handed back to the connection manager
    pub fn get_releases(&self) -> u64 {
        self.releases.load(ORDER_TYPE)
    }

    /// Returns counter of releases that failed and were suppressed
    pub fn get_failed_releases(&self) -> u64 {
        self.failed_releases.load(ORDER_TYPE)
    }

    // Buckets are counted at the centre of their interval.
    fn mean(h: &Histogram) -> Result<u64, MetricsError> {
        let mut weighted_sum = 0_u128;
        let mut count = 0_u128;

        for bucket in h {
            let mid = ((bucket.start() + bucket.end()) / 2) as u128;
            weighted_sum += mid * bucket.count() as u128;
            count += bucket.count() as u128;
        }

        if count != 0 {
            Ok((weighted_sum / count) as u64)
        } else {
            Err(MetricsError::Empty)
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        // Configuration:
        //  - exponent of max value: n = 16
        //  - inverse exponent of relative error: p = 12,
        //  - max value: N = 65535,
        //  - relative error: e = 0.000244,
        //  - total number of buckets: (n - p + 1) * 2^p = 20480,
        //  - histogram size: 1.7 MiB.
        let max_value_power = 16;
        let grouping_power = 12;

        Self {
            read_acquisitions: AtomicU64::new(0),
            write_acquisitions: AtomicU64::new(0),
            failed_acquisitions: AtomicU64::new(0),
            pinned_reuses: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            failed_releases: AtomicU64::new(0),
            acquisition_latency: Arc::new(
                AtomicHistogram::new(grouping_power, max_value_power).unwrap(),
            ),
        }
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let h = self.acquisition_latency.load();
        f.debug_struct("Metrics")
            .field("read_acquisitions", &self.read_acquisitions)
            .field("write_acquisitions", &self.write_acquisitions)
            .field("failed_acquisitions", &self.failed_acquisitions)
            .field("pinned_reuses", &self.pinned_reuses)
            .field("releases", &self.releases)
            .field("failed_releases", &self.failed_releases)
            .field("acquisition_latency", &h)
            .finish()
    }
}
