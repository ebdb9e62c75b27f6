/// Values produced by a filtering run.
///
/// `LogLine` and `WorkerResult` are created by workers and moved, never
/// shared, into the aggregator. `Report` is built once by the aggregator and
/// returned to the caller.
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::Range;
use std::time::Duration;

use crate::errors::SieveResult;

/// A matched line, exactly as it appeared in the source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Zero-based line index across the whole file
    pub index: u64,
    /// Raw bytes of the line including its terminator, if it had one
    pub text: Vec<u8>,
    /// Byte range of `text` in the source file
    pub span: Range<u64>,
}

/// Everything one worker learned about its segment
#[derive(Debug, Clone, Default)]
pub struct WorkerResult {
    /// Ordinal of the segment this result covers
    pub ordinal: usize,
    /// Global index of the first line in the segment
    pub first_index: u64,
    /// Number of lines the worker scanned
    pub lines_scanned: u64,
    /// Bytes the worker consumed
    pub bytes_scanned: u64,
    /// Matched lines in ascending index order
    pub lines: Vec<LogLine>,
    /// Per-filter hit counts, in filter-set order
    pub filter_counts: Vec<u64>,
}

impl WorkerResult {
    pub fn new(ordinal: usize, first_index: u64, filter_count: usize) -> Self {
        Self {
            ordinal,
            first_index,
            filter_counts: vec![0; filter_count],
            ..Default::default()
        }
    }

    /// Number of lines this segment contributes to the output
    pub fn matched(&self) -> usize {
        self.lines.len()
    }

    /// Range of global line indices this segment covered
    pub fn index_range(&self) -> Range<u64> {
        self.first_index..self.first_index + self.lines_scanned
    }
}

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Lines in the input file
    pub total_lines: u64,
    /// Lines written to the output file
    pub matched_lines: u64,
    /// Hits per filter name, in filter-set order; every filter is present
    pub filter_counts: IndexMap<String, u64>,
    /// Bytes in the input file
    pub bytes_scanned: u64,
    /// Wall-clock time of the whole run
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Number of workers (segments) actually dispatched
    pub workers: usize,
}

fn serialize_secs<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

impl Report {
    /// Filters ranked by hit count, highest first; ties keep filter order
    pub fn ranked_hits(&self) -> Vec<(&str, u64)> {
        let mut ranked: Vec<(&str, u64)> = self
            .filter_counts
            .iter()
            .map(|(name, &count)| (name.as_str(), count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    /// Ranked hits without the filters that never matched
    pub fn hits(&self) -> Vec<(&str, u64)> {
        self.ranked_hits()
            .into_iter()
            .filter(|&(_, count)| count > 0)
            .collect()
    }

    pub fn count_for(&self, filter: &str) -> Option<u64> {
        self.filter_counts.get(filter).copied()
    }

    pub fn lines_per_second(&self) -> f64 {
        rate(self.total_lines, self.elapsed)
    }

    pub fn bytes_per_second(&self) -> f64 {
        rate(self.bytes_scanned, self.elapsed)
    }

    pub fn to_json_pretty(&self) -> SieveResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn rate(amount: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        amount as f64 / secs
    } else {
        0.0
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Microsecond precision keeps humantime output short
        let elapsed = Duration::from_micros(self.elapsed.as_micros() as u64);
        write!(
            f,
            "{} of {} lines matched using {} worker(s) in {}",
            self.matched_lines,
            self.total_lines,
            self.workers,
            humantime::format_duration(elapsed)
        )
    }
}
