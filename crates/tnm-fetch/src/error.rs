//! Error types for downloads and extraction.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while downloading a file.
///
/// Whatever the variant, no file is left at the destination path.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The server answered successfully but sent no content.
    #[error("Response from {url} has no content")]
    EmptyBody {
        /// Requested URL.
        url: String,
    },

    /// Connection, timeout or body-read failure.
    #[error("Transport error for {url}: {reason}")]
    Transport {
        /// Requested URL.
        url: String,
        /// Error reported by the client.
        reason: String,
    },

    /// Local filesystem failure while writing the download.
    #[error("I/O error writing {}: {source}", .path.display())]
    Io {
        /// File or directory being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Short label used for metrics.
    pub fn kind_label(&self) -> &'static str {
        match self {
            FetchError::Client(_) => "client",
            FetchError::Status { .. } => "http",
            FetchError::EmptyBody { .. } => "empty",
            FetchError::Transport { .. } => "transport",
            FetchError::Io { .. } => "io",
        }
    }
}

/// Errors that can occur while extracting an archive member.
///
/// The archive itself has been deleted by the time any of these is returned.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// No member with the requested extension exists.
    #[error("No '{extension}' member found in {}", .archive.display())]
    MemberNotFound {
        /// Archive that was searched.
        archive: PathBuf,
        /// Extension that was looked for.
        extension: String,
    },

    /// The archive could not be read as a ZIP file.
    #[error("Corrupt archive {} (deleted): {reason}", .archive.display())]
    CorruptArchive {
        /// Archive that failed to read.
        archive: PathBuf,
        /// Decoder error.
        reason: String,
    },

    /// Local filesystem failure.
    #[error("I/O error extracting {}: {source}", .archive.display())]
    Io {
        /// Archive being extracted.
        archive: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    /// Short label used for metrics.
    pub fn kind_label(&self) -> &'static str {
        match self {
            ArchiveError::MemberNotFound { .. } => "member_not_found",
            ArchiveError::CorruptArchive { .. } => "corrupt",
            ArchiveError::Io { .. } => "io",
        }
    }
}
