//! Progress rendering for the command line.

use tnm_common::{ProgressEvent, ProgressSink};
use tracing::{debug, info, warn};

/// Renders progress events as `tracing` records.
///
/// Problems (failed fetches, skipped records, rejected cache entries) are
/// logged at WARN, per-item cache and fetch chatter at DEBUG, and everything
/// else at INFO.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: &ProgressEvent) {
        let phase = event.phase().as_str();
        let item = event.item().unwrap_or("-");
        let message = describe(event);

        if event.is_problem() {
            warn!(phase, item, "{}", message);
            return;
        }
        match event {
            ProgressEvent::CacheHit { .. } | ProgressEvent::FetchStarted { .. } => {
                debug!(phase, item, "{}", message)
            }
            _ => info!(phase, item, "{}", message),
        }
    }
}

/// One-line human description of an event.
pub fn describe(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::TilesPlanned { keys } => match keys.len() {
            1 => format!("1 tile planned: {}", keys[0]),
            n => format!("{} tiles planned", n),
        },
        ProgressEvent::CacheHit { path, .. } => format!("cached at {}", path.display()),
        ProgressEvent::CacheRejected { path, bytes, .. } => {
            format!("cached file {} too small ({} bytes), fetching again", path.display(), bytes)
        }
        ProgressEvent::FetchStarted { url, .. } => format!("downloading {}", url),
        ProgressEvent::FetchCompleted { path, bytes, .. } => {
            format!("downloaded {} bytes to {}", bytes, path.display())
        }
        ProgressEvent::FetchFailed { url, reason, .. } => {
            format!("download of {} failed: {}", url, reason)
        }
        ProgressEvent::IndexOpened { path, spatial_ref } => format!(
            "opened index {} ({})",
            path.display(),
            spatial_ref.as_deref().unwrap_or("unknown spatial reference")
        ),
        ProgressEvent::RecordSkipped { reason, .. } => format!("record skipped: {}", reason),
        ProgressEvent::Extracted { path, .. } => format!("extracted {}", path.display()),
        ProgressEvent::ExtractionFailed { reason, .. } => format!("extraction failed: {}", reason),
        ProgressEvent::MosaicBuilt { inputs } => format!("mosaic built from {} tiles", inputs),
        ProgressEvent::OutputWritten { path } => format!("wrote {}", path.display()),
    }
}
