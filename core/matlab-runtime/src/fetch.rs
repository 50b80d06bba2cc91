//! HTTP existence checks and downloads for runtime installers.
//!
//! Everything that talks to the download host goes through the [`Fetch`]
//! trait so that the installer and the resolver can be exercised offline.
//! [`HttpFetcher`] is the `reqwest` implementation used in production.
//!
//! ## Semantics
//!
//! - [`Fetch::exists`] issues a `HEAD` request **without following
//!   redirects** and reports whether the status is below 400. A 4xx/5xx is a
//!   plain `false`, never an error.
//! - [`Fetch::download`] issues a `GET`, fails on a status of 400 or more and
//!   streams the body to disk. No automatic retry is performed.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::errors::{Error, IoContext, Result};

/// Time allowed to establish a connection, in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Longest silence tolerated while reading a response, in seconds.
///
/// Installers run to several gigabytes, so downloads have no limit on their
/// total duration; only a stalled transfer is abandoned.
const READ_TIMEOUT_SECS: u64 = 60;

/// Total time allowed for a `HEAD` existence check, in seconds.
const PROBE_TIMEOUT_SECS: u64 = 30;

/// Minimum interval between progress updates in milliseconds.
const PROGRESS_INTERVAL_MS: u128 = 250;

/// Source of installer archives.
#[allow(async_fn_in_trait)]
pub trait Fetch {
    /// Returns whether `url` answers a `HEAD` request with a status below 400.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Download`] only if the host cannot be reached at all.
    async fn exists(&self, url: &str) -> Result<bool>;

    /// Downloads `url` to `destination` and returns the written file.
    ///
    /// If `destination` is a directory the file is named after the last
    /// segment of the URL path; otherwise `destination` is used verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Download`] on transport errors or a status of 400 or
    /// more, and [`Error::Io`] if the file cannot be written.
    async fn download(&self, url: &str, destination: &Path) -> Result<PathBuf>;
}

/// `reqwest`-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    probe_client: reqwest::Client,
    show_progress: bool,
}

impl HttpFetcher {
    /// Creates a fetcher that prints a progress line while downloading.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be constructed.
    pub fn new() -> Result<Self> {
        Self::with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
    }

    /// Creates a fetcher whose downloads give up after `connect` without a
    /// connection or `read` without receiving data.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be constructed.
    pub fn with_timeouts(connect: Duration, read: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect)
            .read_timeout(read)
            .build()
            .map_err(|e| Error::download_with_source("Failed to create HTTP client", e))?;
        let probe_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(connect)
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::download_with_source("Failed to create HTTP client", e))?;
        Ok(Self {
            client,
            probe_client,
            show_progress: true,
        })
    }

    /// Disables the progress line (used by tests and non-interactive callers).
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }
}

impl Fetch for HttpFetcher {
    async fn exists(&self, url: &str) -> Result<bool> {
        let response = self
            .probe_client
            .head(url)
            .send()
            .await
            .map_err(|e| Error::download_with_source(format!("Failed to connect to {url}"), e))?;
        let status = response.status();
        tracing::debug!(%url, %status, "probed installer URL");
        Ok(status.as_u16() < 400)
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<PathBuf> {
        let dest = resolve_destination(url, destination)?;
        let temp_path = dest.with_extension("part");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::download_with_source(format!("Failed to connect to {url}"), e))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(Error::download(format!(
                "[{}] Failed to download {url}",
                status.as_u16()
            )));
        }

        let total_size = response.content_length().unwrap_or(0);
        tracing::info!(%url, total_size, dest = %dest.display(), "downloading installer");

        let result = self
            .stream_to_file(response, url, &temp_path, total_size)
            .await;
        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }

        tokio::fs::rename(&temp_path, &dest).await.io_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                dest.display()
            )
        })?;
        Ok(dest)
    }
}

impl HttpFetcher {
    async fn stream_to_file(
        &self,
        response: reqwest::Response,
        url: &str,
        path: &Path,
        total_size: u64,
    ) -> Result<()> {
        let mut file = tokio::fs::File::create(path)
            .await
            .io_context(|| format!("Failed to create file: {}", path.display()))?;

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let start_time = Instant::now();
        let mut last_update = Instant::now();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| Error::download_with_source(format!("Failed to read from {url}"), e))?;
            file.write_all(&chunk)
                .await
                .io_context(|| format!("Failed to write to {}", path.display()))?;
            downloaded += chunk.len() as u64;

            let now = Instant::now();
            if self.show_progress
                && now.duration_since(last_update).as_millis() >= PROGRESS_INTERVAL_MS
            {
                print_progress(downloaded, total_size, start_time.elapsed().as_secs_f64());
                last_update = now;
            }
        }

        file.flush()
            .await
            .io_context(|| format!("Failed to flush {}", path.display()))?;

        if self.show_progress {
            print_progress(downloaded, total_size, start_time.elapsed().as_secs_f64());
            println!();
        }
        Ok(())
    }
}

/// Picks the output file for a download.
fn resolve_destination(url: &str, destination: &Path) -> Result<PathBuf> {
    if !destination.is_dir() {
        return Ok(destination.to_path_buf());
    }
    let basename = url_basename(url)
        .ok_or_else(|| Error::download(format!("Cannot derive a file name from {url}")))?;
    Ok(destination.join(basename))
}

/// Returns the last non-empty segment of the URL path.
fn url_basename(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .rev()
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Prints a simple text-based progress line.
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn print_progress(downloaded: u64, total: u64, elapsed_secs: f64) {
    let percent = if total > 0 {
        (downloaded as f64 / total as f64 * 100.0) as u8
    } else {
        0
    };
    let speed = if elapsed_secs > 0.0 {
        downloaded as f64 / elapsed_secs
    } else {
        0.0
    };

    print!(
        "\r{}/{} ({percent}%) {}     ",
        format_bytes(downloaded),
        format_bytes(total),
        format_speed(speed)
    );
    let _ = std::io::stdout().flush();
}

/// Formats bytes into a human-readable string (KB, MB, GB).
fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    #[allow(clippy::cast_precision_loss)]
    let bytes_f = bytes as f64;

    if bytes_f >= GB {
        format!("{:.2} GB", bytes_f / GB)
    } else if bytes_f >= MB {
        format!("{:.2} MB", bytes_f / MB)
    } else if bytes_f >= KB {
        format!("{:.2} KB", bytes_f / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Formats speed (bytes/sec) into a human-readable string.
fn format_speed(speed: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    if speed >= MB {
        format!("{:.2} MB/s", speed / MB)
    } else if speed >= KB {
        format!("{:.2} KB/s", speed / KB)
    } else {
        format!("{speed:.0} B/s")
    }
}
