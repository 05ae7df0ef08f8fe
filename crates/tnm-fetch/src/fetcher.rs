//! HTTP downloads with a shared request-rate limit.

use crate::{FetchError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tnm_metrics::{metric_defs, metrics};
use tracing::{debug, warn};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default read chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Default pause between consecutive requests in milliseconds.
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 500;

/// Moves a URL onto a local path.
///
/// Implementations must either leave the complete response body at `dest` and
/// return the number of bytes written, or fail and leave nothing at `dest`.
pub trait Fetcher: Send + Sync {
    /// Download `url` into `dest`, creating parent directories as needed.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Download settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// Read buffer size in bytes.
    pub chunk_size: usize,
    /// Minimum pause between consecutive requests, in milliseconds.
    pub request_delay_ms: u64,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Honor `HTTP_PROXY`/`HTTPS_PROXY` from the environment.
    pub use_system_proxy: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            user_agent: concat!("tnm/", env!("CARGO_PKG_VERSION")).to_string(),
            use_system_proxy: true,
        }
    }
}

impl FetchConfig {
    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Minimum interval between requests.
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Enforces a minimum interval between request starts.
///
/// The limiter is shared by every thread using the same fetcher; callers queue
/// on the internal lock, so the aggregate request rate never exceeds one per
/// interval no matter how many workers are downloading.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter. A zero interval disables waiting.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: Mutex::new(None),
        }
    }

    /// The configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until the next request may start, then claim the slot.
    pub fn wait(&self) {
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

/// Path of the in-progress file for a download target: `<name>.part`.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("download"));
    name.push(".part");
    dest.with_file_name(name)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> FetchError {
    let path = path.to_path_buf();
    move |source| FetchError::Io { path, source }
}

fn transport_error(url: &str, error: impl std::fmt::Display) -> FetchError {
    FetchError::Transport {
        url: url.to_string(),
        reason: error.to_string(),
    }
}

/// Removes an in-progress file unless the download was committed.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed && self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to remove partial download");
            }
        }
    }
}

/// Blocking HTTP fetcher.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    config: FetchConfig,
    limiter: RateLimiter,
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("config", &self.config)
            .finish()
    }
}

impl HttpFetcher {
    /// Build a fetcher from settings.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone());
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build().map_err(FetchError::Client)?;

        Ok(Self {
            client,
            limiter: RateLimiter::new(config.request_delay()),
            config,
        })
    }

    /// The active settings.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        self.limiter.wait();
        metrics::counter!(metric_defs::FETCH_REQUESTS.name).increment(1);

        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if response.content_length() == Some(0) {
            return Err(FetchError::EmptyBody {
                url: url.to_string(),
            });
        }

        let partial = partial_path(dest);
        let guard = PartialFile::new(partial.clone());
        let chunk_size = self.config.chunk_size.max(1);
        let file = File::create(&partial).map_err(io_error(&partial))?;
        let mut writer = BufWriter::with_capacity(chunk_size, file);
        let mut buffer = vec![0u8; chunk_size];
        let mut written: u64 = 0;

        loop {
            let n = response
                .read(&mut buffer)
                .map_err(|e| transport_error(url, e))?;
            if n == 0 {
                break;
            }
            writer.write_all(&buffer[..n]).map_err(io_error(&partial))?;
            written += n as u64;
        }
        writer.flush().map_err(io_error(&partial))?;
        drop(writer);

        if written == 0 {
            return Err(FetchError::EmptyBody {
                url: url.to_string(),
            });
        }

        fs::rename(&partial, dest).map_err(io_error(dest))?;
        guard.commit();

        Ok(written)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let started = Instant::now();
        debug!(url, dest = %dest.display(), "Downloading");

        let result = self.download(url, dest);
        match &result {
            Ok(bytes) => {
                metrics::counter!(metric_defs::FETCH_BYTES.name).increment(*bytes);
                metrics::histogram!(metric_defs::FETCH_DURATION.name)
                    .record(started.elapsed().as_secs_f64() * 1000.0);
                debug!(url, bytes, "Download complete");
            }
            Err(e) => {
                metrics::counter!(metric_defs::FETCH_FAILURES.name, "reason" => e.kind_label())
                    .increment(1);
                debug!(url, error = %e, "Download failed");
            }
        }
        result
    }
}
