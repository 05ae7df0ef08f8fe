//! Metrics infrastructure for the tile toolkit.
//!
//! Every metric the pipelines record is declared here as a const [`Metric`]
//! carrying its name, kind, unit, description and expected labels. The
//! `metrics` crate is re-exported so callers record through the same facade.
//! No recorder is installed by the libraries; without one, recording is a no-op.
//!
//! # Example
//!
//! ```rust
//! use tnm_metrics::{metric_defs, MetricKind};
//!
//! assert_eq!(metric_defs::CACHE_HITS.kind, MetricKind::Counter);
//! tnm_metrics::metrics::counter!(metric_defs::CACHE_HITS.name, "kind" => "dem").increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use tnm_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const TILES: Metric = Metric::counter("tnm.example.tiles")
///     .with_description("Tiles touched")
///     .with_unit(Unit::Count)
///     .with_labels(&["kind"]);
///
/// assert_eq!(TILES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "tnm.cache.hits").
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn with_kind(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Declare a counter.
    pub const fn counter(name: &'static str) -> Self {
        Self::with_kind(name, MetricKind::Counter)
    }

    /// Declare a gauge.
    pub const fn gauge(name: &'static str) -> Self {
        Self::with_kind(name, MetricKind::Gauge)
    }

    /// Declare a histogram.
    pub const fn histogram(name: &'static str) -> Self {
        Self::with_kind(name, MetricKind::Histogram)
    }

    /// Sets the description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the toolkit.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Label carried by cache metrics: `dem` or `topo`.
    pub const KIND_LABEL: &str = "kind";

    // ========================================================================
    // Cache
    // ========================================================================

    /// Artifacts served from the local cache without network access.
    pub const CACHE_HITS: Metric = Metric::counter("tnm.cache.hits")
        .with_description("Artifacts served from the local cache")
        .with_unit(Unit::Count)
        .with_labels(&[KIND_LABEL]);

    /// Artifacts that had to be fetched.
    pub const CACHE_MISSES: Metric = Metric::counter("tnm.cache.misses")
        .with_description("Artifacts missing from the local cache")
        .with_unit(Unit::Count)
        .with_labels(&[KIND_LABEL]);

    /// Cached artifacts discarded by the size check.
    pub const CACHE_REJECTED: Metric = Metric::counter("tnm.cache.rejected")
        .with_description("Cached artifacts below the minimum size")
        .with_unit(Unit::Count)
        .with_labels(&[KIND_LABEL]);

    // ========================================================================
    // Fetch
    // ========================================================================

    /// HTTP requests issued.
    pub const FETCH_REQUESTS: Metric = Metric::counter("tnm.fetch.requests")
        .with_description("HTTP requests issued against the archive")
        .with_unit(Unit::Count);

    /// Failed downloads.
    ///
    /// Labels: reason (`http`, `empty`, `transport`, `io`)
    pub const FETCH_FAILURES: Metric = Metric::counter("tnm.fetch.failures")
        .with_description("Downloads that did not produce a file")
        .with_unit(Unit::Count)
        .with_labels(&["reason"]);

    /// Bytes written by successful downloads.
    pub const FETCH_BYTES: Metric = Metric::counter("tnm.fetch.bytes")
        .with_description("Bytes downloaded")
        .with_unit(Unit::Bytes);

    /// Wall-clock duration of a download.
    pub const FETCH_DURATION: Metric = Metric::histogram("tnm.fetch.duration_ms")
        .with_description("Download duration in milliseconds")
        .with_unit(Unit::Milliseconds);

    // ========================================================================
    // Extraction and resolution
    // ========================================================================

    /// Archives unpacked successfully.
    pub const EXTRACT_COMPLETED: Metric = Metric::counter("tnm.extract.completed")
        .with_description("Archive members extracted")
        .with_unit(Unit::Count);

    /// Archives that could not be unpacked.
    ///
    /// Labels: reason (`member_not_found`, `corrupt`)
    pub const EXTRACT_FAILED: Metric = Metric::counter("tnm.extract.failed")
        .with_description("Archives that could not be extracted")
        .with_unit(Unit::Count)
        .with_labels(&["reason"]);

    /// Index records that could not be normalized.
    pub const RECORDS_SKIPPED: Metric = Metric::counter("tnm.resolve.records_skipped")
        .with_description("Index records skipped during normalization")
        .with_unit(Unit::Count);

    // ========================================================================
    // Composition
    // ========================================================================

    /// Clipped outputs written.
    pub const COMPOSE_OUTPUTS: Metric = Metric::counter("tnm.compose.outputs")
        .with_description("Clipped mosaics written")
        .with_unit(Unit::Count);

    /// Number of tiles merged into one output.
    pub const COMPOSE_INPUTS: Metric = Metric::histogram("tnm.compose.inputs")
        .with_description("Tiles merged per output")
        .with_unit(Unit::Count);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        &CACHE_HITS,
        &CACHE_MISSES,
        &CACHE_REJECTED,
        &FETCH_REQUESTS,
        &FETCH_FAILURES,
        &FETCH_BYTES,
        &FETCH_DURATION,
        &EXTRACT_COMPLETED,
        &EXTRACT_FAILED,
        &RECORDS_SKIPPED,
        &COMPOSE_OUTPUTS,
        &COMPOSE_INPUTS,
    ];
}

/// Describes all metrics with the installed recorder.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
