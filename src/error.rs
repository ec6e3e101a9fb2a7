//! Error types for profilewatch.
//!
//! Errors are split by blast radius: [`FetchError`] and [`DownloadError`] come
//! from the remote collaborators, [`WatchError`] is what the core surfaces to
//! the scheduler and the binary.

use std::path::PathBuf;

/// Failure reported by a [`ProfileSource`](crate::source::ProfileSource).
///
/// Aborts the current cycle only; the schedule keeps running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, reset, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// Credentials missing, expired or rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Remote side asked us to back off.
    #[error("rate limited{}", retry_after_secs.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited {
        /// Value of `Retry-After`, when the remote sent one.
        retry_after_secs: Option<u64>,
    },

    /// The profile or collection does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success status.
    #[error("unexpected HTTP status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Body excerpt or reason.
        message: String,
    },

    /// Response could not be decoded.
    #[error("cannot decode response: {0}")]
    Decode(String),
}

/// Failure downloading one media entry or the profile archive.
///
/// Never aborts a cycle.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Remote fetch of the media bytes failed.
    #[error("download of {url} failed: {reason}")]
    Transfer { url: String, reason: String },

    /// Bytes arrived but could not be written.
    #[error("cannot store {}: {source}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error type for the monitor core.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Remote fetch failed during a cycle.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// State or metadata could not be read or written.
    #[error("persistence error at {}: {message}", path.display())]
    Persistence { path: PathBuf, message: String },

    /// Invalid entity id, interval or config file.
    #[error("config error: {0}")]
    Config(String),

    /// The very first cycle of an entity found no usable session.
    #[error("no usable session for {entity}: {source}")]
    NoSession {
        entity: String,
        #[source]
        source: FetchError,
    },

    /// A cycle exceeded the configured watchdog timeout.
    #[error("cycle for {entity} exceeded {secs}s")]
    CycleTimeout { entity: String, secs: u64 },

    /// The schedule was cancelled before its first cycle could run.
    #[error("schedule for {entity} is cancelled")]
    Cancelled { entity: String },

    /// I/O error outside the persisted documents.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Shorthand for a [`WatchError::Persistence`].
    pub fn persistence(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error should terminate the whole process when raised
    /// during registration or an entity's first cycle.
    #[must_use]
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(self, Self::Config(_) | Self::NoSession { .. })
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, WatchError>;
