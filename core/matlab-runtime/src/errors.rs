//! Error types for the MATLAB Runtime manager.
//!
//! This module defines the [`Error`] enum which consolidates every failure a
//! lifecycle operation can surface. All variants abort the current top-level
//! operation; the only place where they are caught internally is the
//! multi-version uninstall loop (see [`crate::Installer::uninstall_all`]).

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Consolidated error type for MATLAB Runtime operations.
///
/// Each variant carries enough context (path, URL, version) to produce a
/// message that tells the operator what went wrong without a backtrace.
#[derive(Debug, Error)]
pub enum Error {
    /// The operating system or CPU architecture has no runtime build.
    #[error("unsupported platform: {os} on {arch}")]
    UnsupportedPlatform {
        /// Operating system name as reported by the standard library.
        os: String,
        /// CPU architecture name as reported by the standard library.
        arch: String,
    },

    /// No catalog entry and no probed installer for this release.
    #[error("no {version} installer found for {platform}")]
    VersionNotFound {
        /// The requested release.
        version: String,
        /// Platform tag the lookup was made for.
        platform: String,
    },

    /// A version identifier that cannot be normalized to a release label.
    #[error("invalid MATLAB version: {version}")]
    InvalidVersion {
        /// The identifier as given by the caller.
        version: String,
    },

    /// Network error or non-success HTTP status.
    #[error("download error: {message}")]
    Download {
        /// Description naming the URL and status.
        message: String,
        /// The underlying transport error, if any.
        #[source]
        source: Option<reqwest::Error>,
    },

    /// A confirmation that was required was answered "no".
    #[error("user declined: {question}")]
    UserDeclined {
        /// The question that was declined.
        question: String,
    },

    /// A one-shot initialization was requested twice.
    #[error("{what} already initialized")]
    AlreadyInitialized {
        /// Which stage (`MATLAB SDK`, `MATLAB runtime`).
        what: &'static str,
    },

    /// An operation needs a stage that has not been initialized.
    #[error("{what} not initialized")]
    NotInitialized {
        /// Which stage is missing.
        what: &'static str,
    },

    /// The native runtime that got loaded is not the requested release.
    #[error(
        "runtime version of package ({expected}) does not match \
         runtime version of previously loaded package ({loaded})"
    )]
    VersionMismatch {
        /// `major.minor` of the requested release.
        expected: String,
        /// `major.minor` reported by the loaded runtime.
        loaded: String,
    },

    /// A file that must exist after install or extraction is missing.
    #[error("{what} not found where it is expected: {path}")]
    MarkerNotFound {
        /// What was being looked for.
        what: &'static str,
        /// Where it was expected.
        path: PathBuf,
    },

    /// Filesystem error.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the operation that failed.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The downloaded archive could not be read.
    #[error("archive error: {message}")]
    Archive {
        /// Description naming the archive or entry.
        message: String,
        /// The underlying ZIP error.
        #[source]
        source: zip::result::ZipError,
    },

    /// The vendor installer or uninstaller could not be started.
    #[error("installer error: {message}")]
    Installer {
        /// Description naming the executable.
        message: String,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// A native library or entry point failed.
    #[error("native runtime error: {message}")]
    NativeLibrary {
        /// Description naming the library or symbol.
        message: String,
        /// The underlying loader error, if any.
        #[source]
        source: Option<libloading::Error>,
    },
}

impl Error {
    /// Creates a new `UnsupportedPlatform` error.
    #[must_use]
    pub fn unsupported_platform(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Creates a new `VersionNotFound` error.
    #[must_use]
    pub fn version_not_found(version: impl Into<String>, platform: impl Into<String>) -> Self {
        Self::VersionNotFound {
            version: version.into(),
            platform: platform.into(),
        }
    }

    /// Creates a new `InvalidVersion` error.
    #[must_use]
    pub fn invalid_version(version: impl Into<String>) -> Self {
        Self::InvalidVersion {
            version: version.into(),
        }
    }

    /// Creates a new `Download` error without a transport source.
    #[must_use]
    pub fn download(message: impl Into<String>) -> Self {
        Self::Download {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new `Download` error wrapping a transport error.
    #[must_use]
    pub fn download_with_source(message: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Download {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new `UserDeclined` error.
    #[must_use]
    pub fn user_declined(question: impl Into<String>) -> Self {
        Self::UserDeclined {
            question: question.into(),
        }
    }

    /// Creates a new `AlreadyInitialized` error.
    #[must_use]
    pub const fn already_initialized(what: &'static str) -> Self {
        Self::AlreadyInitialized { what }
    }

    /// Creates a new `NotInitialized` error.
    #[must_use]
    pub const fn not_initialized(what: &'static str) -> Self {
        Self::NotInitialized { what }
    }

    /// Creates a new `VersionMismatch` error.
    #[must_use]
    pub fn version_mismatch(expected: impl Into<String>, loaded: impl Into<String>) -> Self {
        Self::VersionMismatch {
            expected: expected.into(),
            loaded: loaded.into(),
        }
    }

    /// Creates a new `MarkerNotFound` error.
    #[must_use]
    pub fn marker_not_found(what: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::MarkerNotFound {
            what,
            path: path.into(),
        }
    }

    /// Creates a new `Io` error with context.
    #[must_use]
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Creates a new `Archive` error with context.
    #[must_use]
    pub fn archive(message: impl Into<String>, source: zip::result::ZipError) -> Self {
        Self::Archive {
            message: message.into(),
            source,
        }
    }

    /// Creates a new `Installer` error with context.
    #[must_use]
    pub fn installer(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Installer {
            message: message.into(),
            source,
        }
    }

    /// Creates a new `NativeLibrary` error without a loader source.
    #[must_use]
    pub fn native(message: impl Into<String>) -> Self {
        Self::NativeLibrary {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new `NativeLibrary` error wrapping a loader error.
    #[must_use]
    pub fn native_with_source(message: impl Into<String>, source: libloading::Error) -> Self {
        Self::NativeLibrary {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Returns true if this error comes from a declined confirmation.
    #[must_use]
    pub fn is_user_declined(&self) -> bool {
        matches!(self, Self::UserDeclined { .. })
    }
}

/// Attaches a message to I/O results, in the manner of `anyhow::Context`.
pub(crate) trait IoContext<T> {
    fn io_context<F, S>(self, message: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F, S>(self, message: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| Error::io(message(), source))
    }
}
