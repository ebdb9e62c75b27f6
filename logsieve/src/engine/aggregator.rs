use indexmap::IndexMap;
use std::fs::{self, Permissions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::errors::{SieveError, SieveResult};
use crate::filters::FilterSet;
use crate::results::{Report, WorkerResult};

const WRITE_BUFFER_CAPACITY: usize = 64 * 1024;

/// Merges worker results into the output file and the run report.
///
/// The output is written to a temporary file next to the destination and
/// renamed into place only after every byte is flushed, so the destination
/// either holds the complete result or is left untouched.
#[derive(Debug)]
pub struct Aggregator<'a> {
    filters: &'a FilterSet,
    output: PathBuf,
    segments: usize,
    total_lines: u64,
    total_bytes: u64,
    started: Instant,
}

impl<'a> Aggregator<'a> {
    pub fn new(filters: &'a FilterSet, output: impl AsRef<Path>, segments: usize) -> Self {
        Self {
            filters,
            output: output.as_ref().to_path_buf(),
            segments,
            total_lines: 0,
            total_bytes: 0,
            started: Instant::now(),
        }
    }

    /// Sets the precomputed size of the input
    pub fn with_totals(mut self, total_lines: u64, total_bytes: u64) -> Self {
        self.total_lines = total_lines;
        self.total_bytes = total_bytes;
        self
    }

    /// Measures elapsed time from `started` instead of from construction
    pub fn started_at(mut self, started: Instant) -> Self {
        self.started = started;
        self
    }

    /// Orders `results` by segment, writes matched lines, and sums counters.
    ///
    /// Results may arrive in any order. If any segment's result is missing
    /// nothing is written.
    pub fn merge(self, mut results: Vec<WorkerResult>) -> SieveResult<Report> {
        results.sort_unstable_by_key(|r| r.ordinal);
        self.check_complete(&results)?;

        self.write_output(&results)?;

        let mut totals = vec![0u64; self.filters.len()];
        let mut matched_lines = 0u64;
        for result in &results {
            matched_lines += result.matched() as u64;
            for (total, count) in totals.iter_mut().zip(&result.filter_counts) {
                *total += count;
            }
        }

        let filter_counts: IndexMap<String, u64> = self
            .filters
            .names()
            .map(str::to_string)
            .zip(totals)
            .collect();

        Ok(Report {
            total_lines: self.total_lines,
            matched_lines,
            filter_counts,
            bytes_scanned: self.total_bytes,
            elapsed: self.started.elapsed(),
            workers: self.segments,
        })
    }

    fn check_complete(&self, results: &[WorkerResult]) -> SieveResult<()> {
        for ordinal in 0..self.segments {
            match results.get(ordinal) {
                Some(result) if result.ordinal == ordinal => {}
                _ => return Err(SieveError::MissingSegment(ordinal)),
            }
        }
        if results.len() > self.segments {
            return Err(SieveError::invalid_configuration(format!(
                "received {} results for {} segments",
                results.len(),
                self.segments
            )));
        }

        debug_assert!(results
            .windows(2)
            .all(|pair| pair[0].index_range().end == pair[1].first_index));
        Ok(())
    }

    fn write_output(&self, results: &[WorkerResult]) -> SieveResult<()> {
        let dir = match self.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let tmp = tempfile::Builder::new()
            .prefix(".logsieve-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| SieveError::file_access(&dir, e))?;
        trace!("Writing matched lines to {}", tmp.path().display());

        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_CAPACITY, tmp);
        for line in results.iter().flat_map(|r| &r.lines) {
            writer
                .write_all(&line.text)
                .map_err(|e| SieveError::file_access(&self.output, e))?;
        }
        let tmp: NamedTempFile = writer
            .into_inner()
            .map_err(|e| SieveError::file_access(&self.output, e.into_error()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| SieveError::file_access(&self.output, e))?;

        // Temp files are owner-only; the output gets ordinary file permissions
        if let Some(permissions) = self.output_permissions() {
            tmp.as_file()
                .set_permissions(permissions)
                .map_err(|e| SieveError::file_access(&self.output, e))?;
        }

        tmp.persist(&self.output)
            .map_err(|e| SieveError::file_access(&self.output, e.error))?;
        debug!("Output written to {}", self.output.display());
        Ok(())
    }

    /// Permissions of the file being replaced, or the default for a new one
    fn output_permissions(&self) -> Option<Permissions> {
        match fs::metadata(&self.output) {
            Ok(metadata) => Some(metadata.permissions()),
            Err(_) => new_file_permissions(),
        }
    }
}

#[cfg(unix)]
fn new_file_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<Permissions> {
    None
}
