use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Counters shared by the workers of one run
#[derive(Debug, Clone, Default)]
pub struct ScanMetrics {
    bytes_read: Arc<AtomicU64>,
    lines_read: Arc<AtomicU64>,
    segments_completed: Arc<AtomicU64>,
    segments_abandoned: Arc<AtomicU64>,
    segments_failed: Arc<AtomicU64>,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records progress of a worker through its segment
    pub fn record_scan(&self, bytes: u64, lines: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
        self.lines_read.fetch_add(lines, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.segments_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.segments_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.segments_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> ScanStats {
        ScanStats {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            lines_read: self.lines_read.load(Ordering::Relaxed),
            segments_completed: self.segments_completed.load(Ordering::Relaxed),
            segments_abandoned: self.segments_abandoned.load(Ordering::Relaxed),
            segments_failed: self.segments_failed.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Scan stats:\n\
             Bytes read: {}\n\
             Lines read: {}\n\
             Segments (completed/abandoned/failed): {}/{}/{}",
            stats.bytes_read,
            stats.lines_read,
            stats.segments_completed,
            stats.segments_abandoned,
            stats.segments_failed
        );
    }
}

/// Snapshot of `ScanMetrics`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub bytes_read: u64,
    pub lines_read: u64,
    pub segments_completed: u64,
    pub segments_abandoned: u64,
    pub segments_failed: u64,
}
