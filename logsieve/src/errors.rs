/// Error types for a filtering run.
///
/// Configuration problems are detected before any I/O and reported as
/// `InvalidConfiguration`. I/O problems on the input or output path are
/// `FileAccess`. A worker that fails mid-scan produces a `SegmentReadError`;
/// the orchestrator surfaces the first one it observes wrapped in `RunFailed`.
///
/// ```rust,ignore
/// match logsieve::execute(&input, &output, &filters, None) {
///     Ok(report) => // Render the report,
///     Err(SieveError::RunFailed(e)) => // Segment e.ordinal failed at byte e.offset,
///     Err(e) => // Configuration or file access problem
/// }
/// ```
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for filtering operations
pub type SieveResult<T> = Result<T, SieveError>;

/// A worker could not finish reading its segment.
#[derive(Error, Debug)]
#[error("segment {ordinal} failed at byte offset {offset}: {source}")]
pub struct SegmentReadError {
    /// Ordinal of the segment that failed
    pub ordinal: usize,
    /// Absolute byte offset the worker had reached
    pub offset: u64,
    #[source]
    pub source: io::Error,
}

impl SegmentReadError {
    pub fn new(ordinal: usize, offset: u64, source: io::Error) -> Self {
        Self {
            ordinal,
            offset,
            source,
        }
    }
}

/// Errors that can occur while filtering a log file
#[derive(Error, Debug)]
pub enum SieveError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Cannot access {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Run failed: {0}")]
    RunFailed(#[source] SegmentReadError),
    #[error("Result for segment {0} is missing; refusing to write output")]
    MissingSegment(usize),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SieveError {
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn file_access(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::FileAccess {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Wraps a worker failure as the outcome of the whole run
    pub fn run_failed(err: SegmentReadError) -> Self {
        Self::RunFailed(err)
    }

    /// Returns the segment failure behind this error, if any
    pub fn segment_failure(&self) -> Option<&SegmentReadError> {
        match self {
            Self::RunFailed(e) => Some(e),
            _ => None,
        }
    }
}
