use indicatif::ProgressBar;
use std::io::{self, BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{trace, warn};

use super::chunker::Segment;
use crate::config::SieveConfig;
use crate::errors::SegmentReadError;
use crate::filters::FilterSet;
use crate::metrics::ScanMetrics;
use crate::results::{LogLine, WorkerResult};
use crate::source::LogSource;

/// How a worker's scan ended when it did not fail
#[derive(Debug)]
pub enum ScanOutcome {
    /// The whole segment was scanned
    Completed(WorkerResult),
    /// The run was cancelled before the segment was finished
    Abandoned { ordinal: usize },
}

/// Scans one segment at a time against a filter set
#[derive(Clone)]
pub struct SegmentWorker<'a> {
    filters: &'a FilterSet,
    metrics: ScanMetrics,
    progress: Option<ProgressBar>,
    buffer_capacity: usize,
    check_interval: u64,
}

impl<'a> SegmentWorker<'a> {
    pub fn new(filters: &'a FilterSet, config: &SieveConfig) -> Self {
        Self {
            filters,
            metrics: ScanMetrics::new(),
            progress: None,
            buffer_capacity: config.read_buffer_size.max(1),
            check_interval: config.cancel_check_interval.max(1) as u64,
        }
    }

    /// Shares counters with other workers of the same run
    pub fn with_metrics(mut self, metrics: ScanMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Advances `progress` by the bytes this worker scans
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    /// Scans `segment`, numbering its lines from `base_index`.
    ///
    /// Any read error fails the whole segment; nothing scanned so far is
    /// returned. `cancel` is polled every few thousand lines.
    pub fn run<S: LogSource + ?Sized>(
        &self,
        segment: &Segment,
        base_index: u64,
        source: &S,
        cancel: &AtomicBool,
    ) -> Result<ScanOutcome, SegmentReadError> {
        trace!(
            "Worker scanning segment {} [{}..{})",
            segment.ordinal,
            segment.start,
            segment.end
        );

        let ordinal = segment.ordinal;
        let mut result = WorkerResult::new(ordinal, base_index, self.filters.len());
        if segment.is_empty() {
            return Ok(ScanOutcome::Completed(result));
        }

        let reader = source
            .open_segment(segment)
            .map_err(|e| SegmentReadError::new(ordinal, segment.start, e))?;
        let mut reader = BufReader::with_capacity(self.buffer_capacity, reader);

        let mut offset = segment.start;
        let mut local_lines = 0u64;
        let mut line = Vec::with_capacity(256);
        let mut unreported_bytes = 0u64;
        let mut unreported_lines = 0u64;

        loop {
            line.clear();
            let read = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| SegmentReadError::new(ordinal, offset + line.len() as u64, e))?
                as u64;
            if read == 0 {
                break;
            }

            if self
                .filters
                .evaluate(strip_terminator(&line), &mut result.filter_counts)
            {
                result.lines.push(LogLine {
                    index: base_index + local_lines,
                    text: std::mem::take(&mut line),
                    span: offset..offset + read,
                });
            }

            offset += read;
            local_lines += 1;
            unreported_bytes += read;
            unreported_lines += 1;

            if local_lines % self.check_interval == 0 {
                self.report(&mut unreported_bytes, &mut unreported_lines);
                if cancel.load(Ordering::Relaxed) {
                    warn!("Segment {} abandoned at byte {}", ordinal, offset);
                    self.metrics.record_abandoned();
                    return Ok(ScanOutcome::Abandoned { ordinal });
                }
            }
        }
        self.report(&mut unreported_bytes, &mut unreported_lines);

        // A short read means the file changed under us
        if offset != segment.end {
            return Err(SegmentReadError::new(
                ordinal,
                offset,
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("segment ended at byte {}, expected {}", offset, segment.end),
                ),
            ));
        }

        result.lines_scanned = local_lines;
        result.bytes_scanned = offset - segment.start;
        self.metrics.record_completed();

        trace!(
            "Segment {} done: {} lines, {} matched",
            ordinal,
            result.lines_scanned,
            result.matched()
        );
        Ok(ScanOutcome::Completed(result))
    }

    fn report(&self, bytes: &mut u64, lines: &mut u64) {
        if *bytes == 0 {
            return;
        }
        self.metrics.record_scan(*bytes, *lines);
        if let Some(progress) = &self.progress {
            progress.inc(*bytes);
        }
        *bytes = 0;
        *lines = 0;
    }
}

/// Line content without its `\n` or `\r\n` terminator
fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
