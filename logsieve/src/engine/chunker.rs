use rayon::prelude::*;
use std::ops::Range;
use tracing::{debug, trace};

use crate::errors::{SieveError, SieveResult};

const LINE_TERMINATOR: u8 = b'\n';

/// A contiguous, line-aligned byte range handled by one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Position of this segment in file order, starting at 0
    pub ordinal: usize,
    /// First byte of the segment
    pub start: u64,
    /// One past the last byte of the segment
    pub end: u64,
}

impl Segment {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }
}

/// Moves `offset` forward to the start of a line.
///
/// An offset already at a line start (0, or just past a terminator) is kept.
/// Otherwise the result is just past the next terminator, or the end of
/// `data` when the remaining bytes hold no terminator.
pub fn align_to_line_start(data: &[u8], offset: usize) -> usize {
    if offset == 0 || offset >= data.len() {
        return offset.min(data.len());
    }
    if data[offset - 1] == LINE_TERMINATOR {
        return offset;
    }
    match data[offset..].iter().position(|&b| b == LINE_TERMINATOR) {
        Some(pos) => offset + pos + 1,
        None => data.len(),
    }
}

/// Number of lines in `data`; a trailing line without terminator still counts
pub fn count_lines(data: &[u8]) -> u64 {
    let terminated = data.iter().filter(|&&b| b == LINE_TERMINATOR).count() as u64;
    match data.last() {
        Some(&last) if last != LINE_TERMINATOR => terminated + 1,
        _ => terminated,
    }
}

/// Splits `data` into at most `worker_count` line-aligned segments.
///
/// Boundaries start at multiples of `len / workers` (the remainder goes to the
/// last segment) and are pushed forward to the next line start. Boundaries
/// that collapse onto each other are merged away, so every segment holds at
/// least one line. An empty input yields a single empty segment.
pub fn plan(data: &[u8], worker_count: usize) -> SieveResult<Vec<Segment>> {
    if worker_count == 0 {
        return Err(SieveError::invalid_configuration(
            "worker count must be positive",
        ));
    }

    let size = data.len();
    if size == 0 {
        debug!("Empty input, planning a single empty segment");
        return Ok(vec![Segment {
            ordinal: 0,
            start: 0,
            end: 0,
        }]);
    }

    // Every line holds at least one byte
    let workers = worker_count.min(size);
    let target = size / workers;

    let mut boundaries = Vec::with_capacity(workers + 1);
    boundaries.push(0usize);
    for i in 1..workers {
        let aligned = align_to_line_start(data, i * target);
        let last = boundaries.last().copied().unwrap_or(0);
        if aligned > last && aligned < size {
            boundaries.push(aligned);
        } else {
            trace!("Boundary {} at {} merged into its neighbour", i, aligned);
        }
    }
    boundaries.push(size);

    let segments: Vec<Segment> = boundaries
        .windows(2)
        .enumerate()
        .map(|(ordinal, pair)| Segment {
            ordinal,
            start: pair[0] as u64,
            end: pair[1] as u64,
        })
        .collect();

    debug!(
        "Planned {} segment(s) for {} bytes ({} requested)",
        segments.len(),
        size,
        worker_count
    );
    Ok(segments)
}

/// Global index of each segment's first line, plus the total line count.
///
/// Segment line counts are computed in parallel; the prefix sum is sequential.
pub fn line_bases(data: &[u8], segments: &[Segment]) -> (Vec<u64>, u64) {
    let counts: Vec<u64> = segments
        .par_iter()
        .map(|segment| count_lines(&data[segment.range()]))
        .collect();

    let mut bases = Vec::with_capacity(counts.len());
    let mut total = 0u64;
    for count in counts {
        bases.push(total);
        total += count;
    }
    (bases, total)
}
