//! Structured progress reporting.
//!
//! Pipelines report what they are doing by emitting [`ProgressEvent`]s into a
//! [`ProgressSink`]. Rendering (console lines, log records, progress bars) is
//! the sink's business, so library code never prints.

use std::path::PathBuf;
use std::sync::Mutex;

/// Pipeline phase an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Enumerating the work for a bounding box.
    Plan,
    /// Looking up local cache entries.
    Cache,
    /// Transferring bytes from the remote archive.
    Fetch,
    /// Unpacking downloaded archives.
    Extract,
    /// Querying the spatial index.
    Index,
    /// Normalizing and deduplicating index records.
    Resolve,
    /// Building the mosaic and clipping the output.
    Compose,
}

impl Phase {
    /// Returns the phase as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Phase::Plan => "plan",
            Phase::Cache => "cache",
            Phase::Fetch => "fetch",
            Phase::Extract => "extract",
            Phase::Index => "index",
            Phase::Resolve => "resolve",
            Phase::Compose => "compose",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single progress report.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The tile set for a bounding box was enumerated.
    TilesPlanned {
        /// Tile keys in enumeration order.
        keys: Vec<String>,
    },
    /// The artifact for a key was already on disk.
    CacheHit {
        /// Cache key.
        key: String,
        /// Existing artifact.
        path: PathBuf,
    },
    /// A cached artifact failed the size check and will be fetched again.
    CacheRejected {
        /// Cache key.
        key: String,
        /// Rejected artifact.
        path: PathBuf,
        /// Size found on disk.
        bytes: u64,
    },
    /// A download is about to start.
    FetchStarted {
        /// Cache key.
        key: String,
        /// Remote URL.
        url: String,
    },
    /// A download finished and the file is in place.
    FetchCompleted {
        /// Cache key.
        key: String,
        /// Local file written.
        path: PathBuf,
        /// Bytes written.
        bytes: u64,
    },
    /// A download failed; nothing was left at the target path.
    FetchFailed {
        /// Cache key.
        key: String,
        /// Remote URL.
        url: String,
        /// Underlying reason.
        reason: String,
    },
    /// The spatial index was opened.
    IndexOpened {
        /// Index location.
        path: PathBuf,
        /// First line of the layer's spatial reference, when available.
        spatial_ref: Option<String>,
    },
    /// An index record could not be turned into a key.
    RecordSkipped {
        /// Cell name of the offending record (may be empty).
        cell_name: String,
        /// Why it was skipped.
        reason: String,
    },
    /// An archive member was extracted to its final location.
    Extracted {
        /// Cache key.
        key: String,
        /// Extracted file.
        path: PathBuf,
    },
    /// Extraction failed; the archive was removed.
    ExtractionFailed {
        /// Cache key.
        key: String,
        /// Underlying reason.
        reason: String,
    },
    /// The intermediate mosaic was built.
    MosaicBuilt {
        /// Number of input rasters.
        inputs: usize,
    },
    /// The final output was written.
    OutputWritten {
        /// Output file.
        path: PathBuf,
    },
}

impl ProgressEvent {
    /// The phase this event belongs to.
    pub fn phase(&self) -> Phase {
        match self {
            ProgressEvent::TilesPlanned { .. } => Phase::Plan,
            ProgressEvent::CacheHit { .. } | ProgressEvent::CacheRejected { .. } => Phase::Cache,
            ProgressEvent::FetchStarted { .. }
            | ProgressEvent::FetchCompleted { .. }
            | ProgressEvent::FetchFailed { .. } => Phase::Fetch,
            ProgressEvent::IndexOpened { .. } => Phase::Index,
            ProgressEvent::RecordSkipped { .. } => Phase::Resolve,
            ProgressEvent::Extracted { .. } | ProgressEvent::ExtractionFailed { .. } => {
                Phase::Extract
            }
            ProgressEvent::MosaicBuilt { .. } | ProgressEvent::OutputWritten { .. } => {
                Phase::Compose
            }
        }
    }

    /// The item (cache key or record name) this event is about, if any.
    pub fn item(&self) -> Option<&str> {
        match self {
            ProgressEvent::CacheHit { key, .. }
            | ProgressEvent::CacheRejected { key, .. }
            | ProgressEvent::FetchStarted { key, .. }
            | ProgressEvent::FetchCompleted { key, .. }
            | ProgressEvent::FetchFailed { key, .. }
            | ProgressEvent::Extracted { key, .. }
            | ProgressEvent::ExtractionFailed { key, .. } => Some(key),
            ProgressEvent::RecordSkipped { cell_name, .. } => Some(cell_name),
            ProgressEvent::TilesPlanned { .. }
            | ProgressEvent::IndexOpened { .. }
            | ProgressEvent::MosaicBuilt { .. }
            | ProgressEvent::OutputWritten { .. } => None,
        }
    }

    /// Whether this event reports a failure or a skipped item.
    pub fn is_problem(&self) -> bool {
        matches!(
            self,
            ProgressEvent::CacheRejected { .. }
                | ProgressEvent::FetchFailed { .. }
                | ProgressEvent::RecordSkipped { .. }
                | ProgressEvent::ExtractionFailed { .. }
        )
    }
}

/// Receiver for progress events.
///
/// Sinks are shared with worker threads during parallel fetches, so they must
/// be `Send + Sync`. Any matching closure is a sink.
pub trait ProgressSink: Send + Sync {
    /// Handle one event.
    fn emit(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: &ProgressEvent) {}
}

/// Sink that records every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events received so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of received events that match a predicate.
    pub fn count(&self, predicate: impl Fn(&ProgressEvent) -> bool) -> usize {
        self.events
            .lock()
            .map(|e| e.iter().filter(|&ev| predicate(ev)).count())
            .unwrap_or(0)
    }
}

impl ProgressSink for CollectingSink {
    fn emit(&self, event: &ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
